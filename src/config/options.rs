//! `key=value&key=value` option strings and the two capability sets they are applied through.
//!
//! Query-level settings (`strict`, `querytimeout`) may be overridden per connection. Pool-level
//! settings only exist on the connection string: the setters live on [`PoolSettings`], which a
//! `Connection` does not implement.

use crate::errors::DbError;

/// Settings a single connection may override.
pub trait QueryOverrides {
    fn set_query_timeout(&mut self, seconds: u64);
    fn set_strict_mode(&mut self, strict: bool);
}

/// Settings that only make sense for the whole connection string.
pub trait PoolSettings: QueryOverrides {
    fn set_pool_size(&mut self, size: usize);
    fn set_pooled(&mut self, pooled: bool);
    fn set_timeout(&mut self, seconds: u64);
    fn set_lifetime(&mut self, seconds: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOption {
    Strict(bool),
    QueryTimeout(u64),
    Pooling(bool),
    PoolSize(usize),
    Timeout(u64),
    Lifetime(u64),
}

impl ConnectionOption {
    /// Human label used in error messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Strict(_) => "Strict mode",
            Self::QueryTimeout(_) => "Query timeout",
            Self::Pooling(_) => "Connection pooling",
            Self::PoolSize(_) => "PoolSize",
            Self::Timeout(_) => "Timeout",
            Self::Lifetime(_) => "Lifetime",
        }
    }

    #[must_use]
    pub const fn is_pool_level(&self) -> bool {
        matches!(self, Self::Pooling(_) | Self::PoolSize(_) | Self::Timeout(_) | Self::Lifetime(_))
    }

    fn apply_query<O: QueryOverrides + ?Sized>(self, target: &mut O) {
        match self {
            Self::Strict(strict) => target.set_strict_mode(strict),
            Self::QueryTimeout(secs) => target.set_query_timeout(secs),
            _ => {}
        }
    }
}

/// Parse an option string. Keys are case-insensitive; empty segments are ignored.
///
/// # Errors
/// `DbError::Configuration` for a segment without `=`, an unknown key, or an unparsable value.
pub fn parse_options(options: &str) -> Result<Vec<ConnectionOption>, DbError> {
    options
        .split('&')
        .filter(|pair| !pair.trim().is_empty())
        .map(parse_pair)
        .collect()
}

fn parse_pair(pair: &str) -> Result<ConnectionOption, DbError> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| DbError::Configuration(format!("malformed option '{pair}'")))?;
    let key = key.trim().to_ascii_lowercase();
    let value = value.trim();
    Ok(match key.as_str() {
        "strict" => ConnectionOption::Strict(parse_bool(&key, value)?),
        "querytimeout" => ConnectionOption::QueryTimeout(parse_num(&key, value)?),
        "pooling" => ConnectionOption::Pooling(parse_bool(&key, value)?),
        "poolsize" => ConnectionOption::PoolSize(parse_num(&key, value)?),
        "timeout" => ConnectionOption::Timeout(parse_num(&key, value)?),
        "lifetime" => ConnectionOption::Lifetime(parse_num(&key, value)?),
        _ => return Err(DbError::Configuration(format!("unknown option '{key}'"))),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, DbError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(DbError::Configuration(format!("option '{key}' expects a boolean, got '{value}'"))),
    }
}

fn parse_num<N: std::str::FromStr>(key: &str, value: &str) -> Result<N, DbError> {
    value
        .parse::<N>()
        .map_err(|_| DbError::Configuration(format!("option '{key}' expects a number, got '{value}'")))
}

/// Apply an option string to a per-connection target. Nothing is applied if any option is
/// pool-level or malformed.
///
/// # Errors
/// `DbError::Configuration` naming the first rejected option.
pub fn apply_overrides<O: QueryOverrides + ?Sized>(target: &mut O, options: &str) -> Result<(), DbError> {
    let parsed = parse_options(options)?;
    if let Some(opt) = parsed.iter().find(|o| o.is_pool_level()) {
        return Err(DbError::Configuration(format!(
            "{} cannot be provided as an override option",
            opt.label()
        )));
    }
    for opt in parsed {
        opt.apply_query(target);
    }
    Ok(())
}

/// Apply an option string to a connection-string level target.
///
/// # Errors
/// `DbError::Configuration` for malformed input; nothing is applied in that case.
pub fn apply_all<O: PoolSettings + ?Sized>(target: &mut O, options: &str) -> Result<(), DbError> {
    for opt in parse_options(options)? {
        match opt {
            ConnectionOption::Pooling(pooled) => target.set_pooled(pooled),
            ConnectionOption::PoolSize(size) => target.set_pool_size(size),
            ConnectionOption::Timeout(secs) => target.set_timeout(secs),
            ConnectionOption::Lifetime(secs) => target.set_lifetime(secs),
            other => other.apply_query(target),
        }
    }
    Ok(())
}
