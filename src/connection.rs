//! One TCP session to one server.
//!
//! A `Connection` is not meant to be shared: a single caller owns it for the whole
//! request/reply cycle. Nothing inside is synchronized, and the wire protocol used here has no
//! way to tell interleaved replies apart.

use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use md5::{Digest, Md5};

use crate::config::{ConnectionString, QueryOverrides, ServerAddress, apply_overrides};
use crate::errors::DbError;

pub struct Connection {
    config: Arc<ConnectionString>,
    stream: Option<TcpStream>,
    created: DateTime<Utc>,
    query_timeout: Option<u64>,
    strict_mode: Option<bool>,
    invalid: bool,
}

impl Connection {
    /// Connect to the first server of `config` using its query timeout for socket I/O.
    ///
    /// # Errors
    /// `DbError::Connection` if no server is listed or the socket cannot be established.
    pub fn open(config: Arc<ConnectionString>) -> Result<Self, DbError> {
        let server = config
            .servers()
            .first()
            .ok_or_else(|| DbError::Connection("connection string names no server".into()))?;
        let stream = connect(server, config.query_timeout())?;
        info!("connected to {} ({})", server, config.redacted());
        Ok(Self {
            config,
            stream: Some(stream),
            created: Utc::now(),
            query_timeout: None,
            strict_mode: None,
            invalid: false,
        })
    }

    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Set once a socket operation failed; never cleared.
    #[must_use]
    pub const fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Effective query timeout in seconds: the per-connection override or the connection-string default.
    #[must_use]
    pub fn query_timeout(&self) -> u64 {
        self.query_timeout.unwrap_or_else(|| self.config.query_timeout())
    }

    #[must_use]
    pub fn strict_mode(&self) -> bool {
        self.strict_mode.unwrap_or_else(|| self.config.strict_mode())
    }

    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.config.user_name()
    }

    #[must_use]
    pub fn database(&self) -> &str {
        self.config.database()
    }

    /// The connection string this connection was opened from, verbatim.
    #[must_use]
    pub fn connection_string(&self) -> &str {
        self.config.as_str()
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ConnectionString> {
        &self.config
    }

    /// Authentication key: lowercase hex MD5 of `nonce + username + password`.
    #[must_use]
    pub fn digest(&self, nonce: &str) -> String {
        digest(nonce, self.user_name().unwrap_or_default(), self.config.password().unwrap_or_default())
    }

    /// Write all of `bytes` to the socket.
    ///
    /// # Errors
    /// `DbError::Connection` if the connection is closed or already invalid. An I/O failure
    /// marks the connection invalid and is returned unchanged as `DbError::Io`.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), DbError> {
        if self.invalid {
            return Err(DbError::Connection("connection is invalid and cannot be reused".into()));
        }
        let stream = self.stream.as_mut().ok_or_else(closed)?;
        if let Err(e) = stream.write_all(bytes) {
            self.invalidate(&e);
            return Err(DbError::Io(e));
        }
        Ok(())
    }

    /// The underlying byte stream, for framing and reply reading.
    ///
    /// # Errors
    /// `DbError::Connection` once the connection is closed.
    pub fn stream(&mut self) -> Result<&mut TcpStream, DbError> {
        self.stream.as_mut().ok_or_else(closed)
    }

    /// Apply a per-connection option string such as `querytimeout=5&strict=false`.
    ///
    /// # Errors
    /// `DbError::Configuration` if the string names a pool-level option or is malformed.
    pub fn load_options(&mut self, options: &str) -> Result<(), DbError> {
        apply_overrides(self, options)
    }

    /// Drop every per-connection override so the connection-string defaults apply again.
    pub fn reset_options(&mut self) {
        self.query_timeout = None;
        self.strict_mode = None;
    }

    pub(crate) fn invalidate(&mut self, cause: &dyn std::fmt::Display) {
        if !self.invalid {
            warn!("connection to {} marked invalid: {cause}", self.config.redacted());
        }
        self.invalid = true;
    }

    /// Close the socket. Safe to call more than once; also runs on drop.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            info!("closed connection ({})", self.config.redacted());
        }
    }
}

impl QueryOverrides for Connection {
    fn set_query_timeout(&mut self, seconds: u64) {
        self.query_timeout = Some(seconds);
    }

    fn set_strict_mode(&mut self, strict: bool) {
        self.strict_mode = Some(strict);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connection_string", &self.config.redacted())
            .field("connected", &self.is_connected())
            .field("invalid", &self.invalid)
            .field("created", &self.created)
            .field("query_timeout", &self.query_timeout())
            .field("strict_mode", &self.strict_mode())
            .finish()
    }
}

fn closed() -> DbError {
    DbError::Connection("connection is closed".into())
}

/// A zero timeout would mean "block forever" to the socket layer.
#[must_use]
pub(crate) fn timeout_duration(seconds: u64) -> Duration {
    Duration::from_secs(seconds.max(1))
}

/// Open a socket with Nagle disabled and send/receive timeouts of `timeout_secs`.
///
/// # Errors
/// `DbError::Connection` if the address does not resolve or no socket can be established.
pub fn connect(server: &ServerAddress, timeout_secs: u64) -> Result<TcpStream, DbError> {
    let timeout = timeout_duration(timeout_secs);
    let addrs = (server.host.as_str(), server.port)
        .to_socket_addrs()
        .map_err(|e| DbError::Connection(format!("cannot resolve {server}: {e}")))?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                let configure = || -> std::io::Result<()> {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))
                };
                configure().map_err(|e| DbError::Connection(format!("cannot configure socket to {server}: {e}")))?;
                debug!("socket to {addr} established");
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(DbError::Connection(match last_err {
        Some(e) => format!("cannot connect to {server}: {e}"),
        None => format!("{server} resolved to no addresses"),
    }))
}

/// Lowercase hex MD5 of `nonce`, `user_name` and `password` concatenated as UTF-8.
///
/// Servers that expect `md5(user + ":mongo:" + password)` in place of the raw password will
/// reject this key; it is kept byte-for-byte as the driver has always computed it.
#[must_use]
pub fn digest(nonce: &str, user_name: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(nonce.as_bytes());
    hasher.update(user_name.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_md5() {
        // md5("abc")
        assert_eq!(digest("a", "b", "c"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(digest("", "", ""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn digest_concatenates_without_separator() {
        assert_eq!(digest("ab", "c", ""), digest("a", "bc", ""));
    }

    #[test]
    fn zero_timeout_is_clamped() {
        assert_eq!(timeout_duration(0), Duration::from_secs(1));
        assert_eq!(timeout_duration(5), Duration::from_secs(5));
    }

    #[test]
    fn connect_to_closed_port_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = connect(&ServerAddress { host: "127.0.0.1".into(), port }, 1).unwrap_err();
        assert!(matches!(err, DbError::Connection(_)));
    }
}
