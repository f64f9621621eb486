use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use rally_types::api::Claims;

use crate::config::TokenConfig;
use crate::error::{AuthError, CoreError, CoreResult};

/// Issues and checks HS256 identity tokens.
#[derive(Clone)]
pub struct Tokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl Tokens {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: config.ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid, username: &str) -> CoreResult<String> {
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: (chrono::Utc::now() + self.ttl).timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| CoreError::Crypto(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            })
    }
}
