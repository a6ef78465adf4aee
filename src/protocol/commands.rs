use bson::Document;
use serde::{Deserialize, Serialize};

use crate::connection::Connection;

/// Marker for top-level command documents. A query built from a `SystemQuery` is sent as-is
/// instead of being wrapped in `{query: ..., orderby: ...}`.
pub trait SystemQuery: Serialize {}

impl SystemQuery for Document {}

/// `{getnonce: 1}`
#[derive(Debug, Clone, Serialize)]
pub struct GetNonce {
    getnonce: i32,
}

impl Default for GetNonce {
    fn default() -> Self {
        Self { getnonce: 1 }
    }
}

impl SystemQuery for GetNonce {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetNonceResponse {
    #[serde(default)]
    pub ok: f64,
    #[serde(default)]
    pub nonce: String,
}

/// `{authenticate: 1, user, nonce, key}` where `key` is [`Connection::digest`] of the nonce.
#[derive(Clone, Serialize)]
pub struct Authenticate {
    authenticate: i32,
    user: String,
    nonce: String,
    key: String,
}

impl Authenticate {
    #[must_use]
    pub fn new(conn: &Connection, nonce: &str) -> Self {
        Self {
            authenticate: 1,
            user: conn.user_name().unwrap_or_default().to_string(),
            nonce: nonce.to_string(),
            key: conn.digest(nonce),
        }
    }
}

impl std::fmt::Debug for Authenticate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticate").field("user", &self.user).field("nonce", &self.nonce).finish_non_exhaustive()
    }
}

impl SystemQuery for Authenticate {}

/// Reply to `authenticate`. `ok` arrives as a double or an integer depending on the server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthenticateResponse {
    #[serde(default)]
    pub ok: f64,
    #[serde(default)]
    pub errmsg: Option<String>,
}

impl AuthenticateResponse {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.ok >= 1.0
    }
}

/// `{getlasterror: 1}`
#[derive(Debug, Clone, Serialize)]
pub struct GetLastError {
    getlasterror: i32,
}

impl Default for GetLastError {
    fn default() -> Self {
        Self { getlasterror: 1 }
    }
}

impl SystemQuery for GetLastError {}
