use rocket::figment::{Figment, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;
use std::time::Duration;

/// Storage engine selected at launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    MongoDb,
    Memory,
}

pub struct Config;

impl Config {
    fn figment() -> Figment {
        // Get the current profile
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());

        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(&profile)
            .merge(Env::prefixed("ROCKET_").global())
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret-change-me".to_string())
    }

    /// Access token lifetime in seconds.
    pub fn jwt_expiry() -> i64 {
        let hours: i64 = Self::figment()
            .extract_inner("jwt_expiry_hours")
            .unwrap_or(24);
        hours * 60 * 60
    }

    pub fn database_backend() -> DatabaseBackend {
        let backend: String = Self::figment()
            .extract_inner("database_backend")
            .unwrap_or_else(|_| "mongodb".to_string());

        match backend.to_lowercase().as_str() {
            "memory" => DatabaseBackend::Memory,
            _ => DatabaseBackend::MongoDb,
        }
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string())
    }

    pub fn database_name() -> String {
        Self::figment()
            .extract_inner("database_name")
            .unwrap_or_else(|_| "marketplace".to_string())
    }

    /// Upper bound for server selection and connection establishment.
    pub fn mongodb_timeout() -> Duration {
        let millis: u64 = Self::figment()
            .extract_inner("mongodb_timeout_ms")
            .unwrap_or(5000);
        Duration::from_millis(millis)
    }

    pub fn bcrypt_cost() -> u32 {
        Self::figment()
            .extract_inner("bcrypt_cost")
            .unwrap_or(bcrypt::DEFAULT_COST)
    }

    pub fn is_development() -> bool {
        let profile = env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());
        profile == "development"
    }
}
