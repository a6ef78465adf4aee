use std::fmt;
use std::str::FromStr;

use zeroize::Zeroizing;

use super::options::{PoolSettings, QueryOverrides, apply_all};
use crate::errors::DbError;

pub const SCHEME: &str = "mongodb://";
pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_DATABASE: &str = "admin";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POOL_SIZE: usize = 25;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LIFETIME_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DbError::Configuration(format!("invalid port in '{s}'")))?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(DbError::Configuration(format!("missing host in '{s}'")));
        }
        Ok(Self { host: host.to_string(), port })
    }
}

/// A parsed `mongodb://` connection string.
///
/// Read-only once handed to a connection. The original text is kept verbatim as the
/// connection's identity; `Display` and `Debug` mask the password.
#[derive(Clone)]
pub struct ConnectionString {
    raw: String,
    servers: Vec<ServerAddress>,
    user_name: Option<String>,
    password: Option<Zeroizing<String>>,
    database: String,
    query_timeout: u64,
    strict_mode: bool,
    pool_size: usize,
    pooled: bool,
    timeout: u64,
    lifetime: u64,
}

impl ConnectionString {
    /// Parse `mongodb://[user:password@]host[:port][,host[:port]...][/database][?options]`.
    ///
    /// # Errors
    /// `DbError::Configuration` when the scheme, host list, credentials, or options are invalid.
    pub fn parse(uri: &str) -> Result<Self, DbError> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| DbError::Configuration(format!("connection string must start with '{SCHEME}'")))?;
        let (rest, options) = match rest.split_once('?') {
            Some((rest, options)) => (rest, Some(options)),
            None => (rest, None),
        };
        let (credentials, rest) = match rest.rsplit_once('@') {
            Some((credentials, rest)) => (Some(credentials), rest),
            None => (None, rest),
        };
        let (hosts, database) = match rest.split_once('/') {
            Some((hosts, database)) => (hosts, database),
            None => (rest, ""),
        };

        let (user_name, password) = match credentials {
            Some(c) => {
                let (user, password) = c.split_once(':').unwrap_or((c, ""));
                if user.is_empty() {
                    return Err(DbError::Configuration("credentials are missing a user name".into()));
                }
                (Some(user.to_string()), Some(Zeroizing::new(password.to_string())))
            }
            None => (None, None),
        };

        if hosts.trim().is_empty() {
            return Err(DbError::Configuration("connection string names no server".into()));
        }
        let servers = hosts
            .split(',')
            .map(str::parse::<ServerAddress>)
            .collect::<Result<Vec<_>, _>>()?;

        let mut cs = Self {
            raw: uri.to_string(),
            servers,
            user_name,
            password,
            database: if database.is_empty() { DEFAULT_DATABASE.to_string() } else { database.to_string() },
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            strict_mode: true,
            pool_size: DEFAULT_POOL_SIZE,
            pooled: true,
            timeout: DEFAULT_TIMEOUT_SECS,
            lifetime: DEFAULT_LIFETIME_SECS,
        };
        if let Some(options) = options {
            apply_all(&mut cs, options)?;
        }
        Ok(cs)
    }

    /// The connection string exactly as it was given, credentials included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The connection string with the password masked, safe for logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self.password.as_deref() {
            Some(pw) if !pw.is_empty() => self.raw.replacen(&format!(":{pw}@"), ":****@", 1),
            _ => self.raw.clone(),
        }
    }

    #[must_use]
    pub fn servers(&self) -> &[ServerAddress] {
        &self.servers
    }

    #[must_use]
    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().map(String::as_str)
    }

    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    #[must_use]
    pub const fn query_timeout(&self) -> u64 {
        self.query_timeout
    }

    #[must_use]
    pub const fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    #[must_use]
    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[must_use]
    pub const fn pooled(&self) -> bool {
        self.pooled
    }

    #[must_use]
    pub const fn timeout(&self) -> u64 {
        self.timeout
    }

    #[must_use]
    pub const fn lifetime(&self) -> u64 {
        self.lifetime
    }
}

impl QueryOverrides for ConnectionString {
    fn set_query_timeout(&mut self, seconds: u64) {
        self.query_timeout = seconds;
    }

    fn set_strict_mode(&mut self, strict: bool) {
        self.strict_mode = strict;
    }
}

impl PoolSettings for ConnectionString {
    fn set_pool_size(&mut self, size: usize) {
        self.pool_size = size;
    }

    fn set_pooled(&mut self, pooled: bool) {
        self.pooled = pooled;
    }

    fn set_timeout(&mut self, seconds: u64) {
        self.timeout = seconds;
    }

    fn set_lifetime(&mut self, seconds: u64) {
        self.lifetime = seconds;
    }
}

impl FromStr for ConnectionString {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("servers", &self.servers)
            .field("user_name", &self.user_name)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("database", &self.database)
            .field("query_timeout", &self.query_timeout)
            .field("strict_mode", &self.strict_mode)
            .field("pool_size", &self.pool_size)
            .field("pooled", &self.pooled)
            .field("timeout", &self.timeout)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
