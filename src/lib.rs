pub mod config;
pub mod connection;
pub mod database;
pub mod errors;
pub mod logger;
pub mod protocol;
pub mod qualifier;
pub mod responses;

pub use crate::config::{ClientConfig, ConnectionString};
pub use crate::connection::Connection;
pub use crate::database::{Collection, Database, FindOptions};
pub use crate::errors::DbError;
pub use crate::protocol::{QueryMessage, ReplyMessage};
pub use crate::qualifier::{Q, Qualifier};

use std::sync::Arc;

/// Parse `uri` and open a connection to its first server.
///
/// # Errors
/// `DbError::Configuration` for a malformed URI, or whatever [`Connection::open`] returns.
pub fn connect(uri: &str) -> Result<Connection, DbError> {
    Connection::open(Arc::new(ConnectionString::parse(uri)?))
}

/// Initializes the client library.
///
/// Sets up logging from `log4rs.yaml` when that file is present.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::init()?;
    Ok(())
}
