pub mod admin;
pub mod auth;
pub mod booking;
pub mod category;
pub mod review;
pub mod service;
pub mod user;
pub mod worker;
