use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::Error;
use crate::model::mongodb::Id;

use super::user::{Rights, User};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// A verified identity handed over by the identity service, representing a
/// specific user with specific rights.
///
/// Credential and biometric checks have already happened by the time one of
/// these exists; we only check the signature, expiry and rights.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthToken<U> {
    /// The JWT `sub` claim must be a string, so this goes over the wire as hex.
    #[serde(rename = "sub", with = "hex_id")]
    pub id: Id,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }
}

impl<U> AuthToken<U>
where
    U: User,
{
    /// Create a new [`AuthToken`] for the given principal, with the correct rights for that user type.
    pub fn new(id: Id) -> Self {
        Self {
            id,
            rights: U::RIGHTS,
            phantom: PhantomData,
        }
    }

    /// Serialize this token into a signed JWT valid for `ttl`.
    pub fn encode(self, config: &Config, ttl: Duration) -> Result<String, Error> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + ttl,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(token)
    }

    /// Deserialize and verify a token from its JWT form.
    pub fn decode(raw: &str, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            raw,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<U>>| claims.claims.token)?;
        Ok(token)
    }
}

mod hex_id {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::model::{api::id::ApiId, mongodb::Id};

    pub fn serialize<S: Serializer>(id: &Id, serializer: S) -> Result<S::Ok, S::Error> {
        ApiId::from(*id).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Id, D::Error> {
        ApiId::deserialize(deserializer).map(Id::from)
    }
}

/// Token claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// Pull the raw token out of the `Authorization: Bearer` header, falling back to the cookie.
fn raw_token<'r>(req: &'r Request<'_>) -> Option<&'r str> {
    req.headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .or_else(|| req.cookies().get(AUTH_TOKEN_COOKIE).map(|c| c.value()))
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User + Send,
{
    type Error = Error;

    /// Get an [`AuthToken`] from the request and verify that it has the correct rights for this
    /// user type.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.guard::<&State<Config>>().await {
            Outcome::Success(config) => config,
            _ => {
                let err = Error::Internal("Config is not managed".to_string());
                return Outcome::Failure((Status::InternalServerError, err));
            }
        };

        let raw = match raw_token(req) {
            Some(raw) => raw,
            None => {
                let err = Error::Unauthorized("missing identity token".to_string());
                return Outcome::Failure((Status::Unauthorized, err));
            }
        };

        let token: Self = match Self::decode(raw, config) {
            Ok(token) => token,
            Err(e) => return Outcome::Failure((Status::Unauthorized, e)),
        };

        // Check it represents the correct rights.
        if !token.permits(U::RIGHTS) {
            let err = Error::Unauthorized(format!("{} rights required", U::RIGHTS));
            return Outcome::Failure((Status::Unauthorized, err));
        }

        // Voters must actually exist off-chain.
        match token.rights {
            Rights::Voter => {
                let coordinator = match req.guard::<&State<Coordinator>>().await {
                    Outcome::Success(coordinator) => coordinator,
                    _ => {
                        let err = Error::Internal("Coordinator is not managed".to_string());
                        return Outcome::Failure((Status::InternalServerError, err));
                    }
                };
                match coordinator.store().load_voter(token.id).await {
                    Ok(Some(_)) => Outcome::Success(token),
                    Ok(None) => Outcome::Failure((Status::Unauthorized, Error::VoterNotFound(token.id))),
                    Err(e) => Outcome::Failure((Status::InternalServerError, e)),
                }
            }
            Rights::Admin => Outcome::Success(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{api::auth::Admin, db::voter::Voter};

    #[test]
    fn encode_then_decode() {
        let config = Config::test_example(true);
        let id = Id::new();
        let raw = AuthToken::<Voter>::new(id)
            .encode(&config, Duration::minutes(5))
            .unwrap();
        let token = AuthToken::<Voter>::decode(&raw, &config).unwrap();
        assert_eq!(token.id, id);
        assert!(token.permits(Rights::Voter));
        assert!(!token.permits(Rights::Admin));
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = Config::test_example(true);
        let raw = AuthToken::<Admin>::new(Id::new())
            .encode(&config, Duration::minutes(-5))
            .unwrap();
        let err = AuthToken::<Admin>::decode(&raw, &config).unwrap_err();
        assert!(matches!(err, Error::Jwt(_)));
    }

    #[test]
    fn subject_is_a_hex_string() {
        let config = Config::test_example(true);
        let id = Id::new();
        let raw = AuthToken::<Admin>::new(id)
            .encode(&config, Duration::minutes(5))
            .unwrap();
        let mut validation = Validation::default();
        validation.sub = Some(id.to_string());
        let claims = jsonwebtoken::decode::<rocket::serde::json::Value>(
            &raw,
            &DecodingKey::from_secret(config.jwt_secret()),
            &validation,
        )
        .unwrap()
        .claims;
        assert_eq!(claims["sub"], rocket::serde::json::Value::String(id.to_string()));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let config = Config::test_example(true);
        let claims = Claims {
            token: AuthToken::<Admin>::new(Id::new()),
            expire_at: Utc::now() + Duration::minutes(5),
        };
        let raw = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"another secret"),
        )
        .unwrap();
        assert!(AuthToken::<Admin>::decode(&raw, &config).is_err());
    }
}
