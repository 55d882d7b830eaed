use rocket::request::{self, Request, FromRequest, Outcome};
use rocket::http::Status;
use rocket_okapi::request::OpenApiFromRequest;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::RequestHeaderInput;

use crate::guards::AuthGuard;
use crate::models::UserRole;

/// Authenticated caller with the `worker` role.
pub struct WorkerGuard {
    pub auth: AuthGuard,
}

/// Authenticated caller with the `admin` role.
pub struct AdminGuard {
    pub auth: AuthGuard,
}

fn is_worker(role: UserRole) -> bool {
    match role {
        UserRole::Worker => true,
        UserRole::Customer | UserRole::Admin => false,
    }
}

fn is_admin(role: UserRole) -> bool {
    match role {
        UserRole::Admin => true,
        UserRole::Customer | UserRole::Worker => false,
    }
}

async fn authorize<'r>(
    req: &'r Request<'_>,
    allowed: fn(UserRole) -> bool,
) -> request::Outcome<AuthGuard, ()> {
    match req.guard::<AuthGuard>().await {
        Outcome::Success(auth) if allowed(auth.role) => Outcome::Success(auth),
        Outcome::Success(auth) => {
            log::debug!("Role guard rejected {} with role {}", auth.user_id, auth.role.as_str());
            Outcome::Error((Status::Forbidden, ()))
        }
        Outcome::Error(e) => Outcome::Error(e),
        Outcome::Forward(f) => Outcome::Forward(f),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for WorkerGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        authorize(req, is_worker).await.map(|auth| WorkerGuard { auth })
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        authorize(req, is_admin).await.map(|auth| AdminGuard { auth })
    }
}

impl<'a> OpenApiFromRequest<'a> for WorkerGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
