pub mod user;
pub mod worker;
pub mod category;
pub mod service;
pub mod booking;
pub mod review;

pub use user::*;
pub use worker::*;
pub use category::*;
pub use service::*;
pub use booking::*;
pub use review::*;
