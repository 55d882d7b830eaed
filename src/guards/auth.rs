use rocket::request::{self, FromRequest, Request, Outcome};
use rocket::http::Status;
use mongodb::bson::oid::ObjectId;

use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::r#gen::OpenApiGenerator;

use crate::engine::Actor;
use crate::models::UserRole;

/// JWT-based authentication guard
pub struct AuthGuard {
    pub user_id: ObjectId,
    pub role: UserRole,
}

impl AuthGuard {
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(header) = req.headers().get_one("Authorization") else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let Some(token) = header.strip_prefix("Bearer ") else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        match crate::services::JwtService::verify_token(token.trim()) {
            Ok(claims) => match ObjectId::parse_str(&claims.sub) {
                Ok(user_id) => Outcome::Success(AuthGuard {
                    user_id,
                    role: claims.role,
                }),
                Err(_) => Outcome::Error((Status::Unauthorized, ())),
            },
            Err(e) => {
                log::debug!("Rejected bearer token: {}", e);
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
