#[macro_use]
extern crate rocket;

mod config;
mod db;
mod engine;
mod guards;
mod models;
mod routes;
mod services;
mod store;
mod utils;

use dotenvy::dotenv;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- HEALTH ----------------------------- */

#[get("/health")]
fn health() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": true,
        "status": "ok"
    })
}

/* ----------------------------- ERRORS ----------------------------- */

#[catch(400)]
fn bad_request() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Bad request"
    })
}

#[catch(401)]
fn unauthorized() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Missing or invalid access token"
    })
}

#[catch(403)]
fn forbidden() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Your role does not allow this action"
    })
}

#[catch(404)]
fn not_found() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Resource not found (check /api/v1 prefix)"
    })
}

#[catch(422)]
fn unprocessable() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Malformed request body"
    })
}

#[catch(500)]
fn internal_error() -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": "Internal server error"
    })
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/v1/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- LAUNCH ----------------------------- */

/// Mounts every route and catcher. Storage and the booking engine are managed
/// by the caller.
fn mount(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(CORS)
        .mount("/", routes![options_handler, health])
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Auth
                routes::auth::register,
                routes::auth::login,
                // User
                routes::user::get_profile,
                routes::user::update_profile,
                routes::user::change_password,
                routes::user::delete_account,
                // Catalog
                routes::category::list_categories,
                routes::service::list_services,
                routes::service::get_service,
                // Workers
                routes::worker::list_workers,
                routes::worker::get_worker,
                routes::review::get_worker_reviews,
                routes::worker::get_worker_profile,
                routes::worker::update_worker_profile,
                routes::worker::update_availability,
                routes::worker::pending_bookings,
                routes::worker::accept_booking,
                routes::worker::start_booking,
                routes::worker::complete_booking,
                // Bookings
                routes::booking::create_booking,
                routes::booking::list_bookings,
                routes::booking::get_booking,
                routes::booking::cancel_booking,
                // Reviews
                routes::review::create_review,
                // Admin
                routes::admin::create_category,
                routes::admin::create_service,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![bad_request, unauthorized, forbidden, not_found, unprocessable, internal_error],
        )
}

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    log::info!("🚀 Marketplace API starting");
    if config::Config::is_development() {
        log::info!("📚 Swagger UI → http://localhost:8000/api/docs");
    }

    mount(rocket::build().attach(db::init()))
}
