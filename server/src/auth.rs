//! Bearer-token authentication for incoming connections
//!
//! Tokens are HS256 JWTs carrying the user's `openId`. A token is accepted
//! only when its signature checks out, it has not expired, and the `openId`
//! belongs to a known user. All of this happens before the world actor
//! hears about the connection.

use crate::utils::unix_timestamp;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::{IdentityId, MAX_NAME_BYTES};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication token required")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    Expired,
    #[error("User not found")]
    UnknownIdentity,
    #[error("Identity store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "openId")]
    pub open_id: String,
    pub exp: u64,
    pub iat: u64,
}

/// Who a connection belongs to, once verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub identity_id: IdentityId,
    pub display_name: String,
}

/// A row of the user table as far as authentication cares
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: IdentityId,
    #[serde(rename = "openId")]
    pub open_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub trait IdentityStore: Send + Sync {
    fn find_by_open_id(&self, open_id: &str) -> Result<Option<UserRecord>, AuthError>;
}

#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    users: HashMap<String, UserRecord>,
}

impl MemoryIdentityStore {
    pub fn new(users: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|user| (user.open_id.clone(), user))
                .collect(),
        }
    }

    /// Loads a JSON array of `{ "id", "openId", "name" }` objects
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| AuthError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
        let users: Vec<UserRecord> = serde_json::from_str(&data)
            .map_err(|e| AuthError::StoreUnavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(users))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn find_by_open_id(&self, open_id: &str) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.users.get(open_id).cloned())
    }
}

pub struct Authenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    store: Arc<dyn IdentityStore>,
}

impl Authenticator {
    pub fn new(secret: &[u8], store: Arc<dyn IdentityStore>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            store,
        }
    }

    /// Resolves a bearer token to a verified identity
    pub fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken,
            })?;

        let user = self
            .store
            .find_by_open_id(&claims.open_id)?
            .ok_or(AuthError::UnknownIdentity)?;

        Ok(Identity {
            identity_id: user.id,
            display_name: display_name(user.name),
        })
    }
}

/// Trims a stored name to at most `MAX_NAME_BYTES`, cut on a char boundary
fn display_name(name: Option<String>) -> String {
    let Some(name) = name.filter(|name| !name.trim().is_empty()) else {
        return ANONYMOUS_NAME.to_string();
    };

    let mut end = name.len().min(MAX_NAME_BYTES);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

pub fn sign_claims(secret: &[u8], claims: &Claims) -> Result<String, AuthError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Signing(e.to_string()))
}

/// Mints a token for `open_id` valid for `ttl` from now
pub fn issue_token(secret: &[u8], open_id: &str, ttl: Duration) -> Result<String, AuthError> {
    let now = unix_timestamp();
    sign_claims(
        secret,
        &Claims {
            open_id: open_id.to_string(),
            exp: now + ttl.as_secs(),
            iat: now,
        },
    )
}
