use argon2::{
    Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::error::{CoreError, CoreResult};

/// Argon2id hashing for account and channel passwords. Stateless apart from
/// cost parameters and a lazily built decoy hash.
#[derive(Clone, Default)]
pub struct Credentials {
    argon2: Argon2<'static>,
    decoy: Arc<OnceLock<Option<String>>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom cost parameters, mostly so tests don't pay for production-grade hashing.
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
            decoy: Arc::default(),
        }
    }

    pub fn hash(&self, plaintext: &str) -> CoreResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| CoreError::Crypto(e.to_string()))
    }

    /// False on mismatch and on a stored hash that cannot be parsed.
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Unparseable password hash in storage: {}", e);
                return false;
            }
        };
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Pays for one full verification against a decoy hash and discards the result.
    /// Used when no account matches, so a miss takes as long as a wrong password.
    pub fn reject(&self, plaintext: &str) {
        let decoy = self
            .decoy
            .get_or_init(|| self.hash("rally-decoy-password").ok());
        if let Some(hash) = decoy.as_deref() {
            let _ = self.verify(plaintext, hash);
        }
    }
}
