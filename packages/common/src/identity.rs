//! Identity boundary.
//!
//! Token verification lives outside this workspace; the server only needs a
//! way to turn an opaque token into a user. Any failure is treated as
//! "unauthenticated" by callers.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

pub trait IdentityProvider: Send + Sync {
    fn current_user(&self, token: &str) -> Result<User, AuthError>;
}

/// In-memory token table for tests and the dev server.
#[derive(Default)]
pub struct TokenIdentity {
    tokens: Mutex<HashMap<String, User>>,
}

impl TokenIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: &str, user: User) {
        self.tokens.lock().unwrap().insert(token.to_string(), user);
    }
}

impl IdentityProvider for TokenIdentity {
    fn current_user(&self, token: &str) -> Result<User, AuthError> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}
