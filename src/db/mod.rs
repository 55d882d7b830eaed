use std::sync::Arc;

use rocket::fairing::AdHoc;

use crate::config::{Config, DatabaseBackend};
use crate::engine::BookingEngine;
use crate::store::{MemoryStore, MongoStore, Store, StoreResult};

pub type DbConn = Arc<dyn Store>;

pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("Storage", |rocket| async {
        match connect().await {
            Ok(store) => {
                let engine = BookingEngine::new(store.clone());
                Ok(rocket.manage(store).manage(engine))
            }
            Err(e) => {
                log::error!("✗ Failed to initialise storage: {}", e);
                Err(rocket)
            }
        }
    })
}

async fn connect() -> StoreResult<DbConn> {
    match Config::database_backend() {
        DatabaseBackend::MongoDb => {
            let uri = Config::mongodb_uri();
            let store = MongoStore::connect(&uri, &Config::database_name(), Config::mongodb_timeout()).await?;
            log::info!("✓ MongoDB connected successfully");
            Ok(Arc::new(store))
        }
        DatabaseBackend::Memory => {
            log::warn!("Using in-memory storage; data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
