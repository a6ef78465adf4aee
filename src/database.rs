//! A thin database/collection handle over [`QueryMessage`]. Holds names only; the caller
//! supplies the connection for every call.

use std::marker::PhantomData;

use bson::{Document, doc};
use log::info;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::connection::Connection;
use crate::errors::DbError;
use crate::protocol::{
    Authenticate, AuthenticateResponse, FieldSelectionList, GetLastError, GetNonce, GetNonceResponse, QueryMessage, QueryOptions,
    ReplyMessage, SystemQuery,
};
use crate::responses::{LastErrorResponse, ProfilingInformationResponse};

/// Options for [`Collection::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub fields: Option<Vec<String>>,
    pub sort: Option<Document>,
    pub limit: Option<u32>,
    pub skip: u32,
    pub options: QueryOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Database {
    name: String,
}

impl Database {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The database named in the connection's connection string.
    #[must_use]
    pub fn for_connection(conn: &Connection) -> Self {
        Self::new(conn.database())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn full_name(&self, collection: &str) -> String {
        format!("{}.{collection}", self.name)
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.typed_collection(name)
    }

    #[must_use]
    pub fn typed_collection<T>(&self, name: &str) -> Collection<T> {
        Collection { full_name: self.full_name(name), _marker: PhantomData }
    }

    /// Run a command against `<db>.$cmd` and decode its single reply document.
    ///
    /// # Errors
    /// Anything [`QueryMessage::execute`] returns, or `DbError::Protocol` for an empty reply.
    pub fn run_command<R, C>(&self, conn: &mut Connection, command: C) -> Result<R, DbError>
    where
        R: DeserializeOwned,
        C: SystemQuery,
    {
        QueryMessage::<R, C>::system(self.full_name("$cmd"), command)
            .take(1)
            .execute(conn)?
            .first()?
            .ok_or_else(|| DbError::Protocol("command reply carried no document".into()))
    }

    /// Nonce handshake: `getnonce`, then `authenticate` with the connection's digest.
    ///
    /// # Errors
    /// `DbError::Configuration` when the connection string has no user name;
    /// `DbError::Connection` when the server refuses the credentials.
    pub fn authenticate(&self, conn: &mut Connection) -> Result<(), DbError> {
        let user = conn
            .user_name()
            .ok_or_else(|| DbError::Configuration("cannot authenticate without a user name".into()))?
            .to_string();
        let nonce: GetNonceResponse = self.run_command(conn, GetNonce::default())?;
        if nonce.ok < 1.0 || nonce.nonce.is_empty() {
            return Err(DbError::Connection("server did not issue a nonce".into()));
        }
        let command = Authenticate::new(conn, &nonce.nonce);
        let reply: AuthenticateResponse = self.run_command(conn, command)?;
        if !reply.is_ok() {
            let reason = reply.errmsg.as_deref().unwrap_or("auth fails");
            return Err(DbError::Connection(format!("authentication failed for user '{user}': {reason}")));
        }
        info!("authenticated user '{user}' on database '{}'", self.name);
        Ok(())
    }

    /// # Errors
    /// See [`Database::run_command`].
    pub fn last_error(&self, conn: &mut Connection) -> Result<LastErrorResponse, DbError> {
        self.run_command(conn, GetLastError::default())
    }

    /// Records from `<db>.system.profile` matching `filter`.
    ///
    /// # Errors
    /// See [`Collection::find`].
    pub fn profiling_information(
        &self,
        conn: &mut Connection,
        filter: Document,
    ) -> Result<Vec<ProfilingInformationResponse>, DbError> {
        self.typed_collection::<ProfilingInformationResponse>("system.profile")
            .find(conn, filter, &FindOptions::default())?
            .into_results()
    }
}

/// A typed, fully-qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection<T> {
    full_name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Collection<T> {
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Collection name without the database prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        self.full_name.split_once('.').map_or(self.full_name.as_str(), |(_, c)| c)
    }

    #[must_use]
    pub fn query<U>(&self, filter: U, opts: &FindOptions) -> QueryMessage<T, U> {
        let mut msg = QueryMessage::new(self.full_name.clone())
            .query(filter)
            .skip(opts.skip)
            .options(opts.options);
        if let Some(limit) = opts.limit {
            msg = msg.take(limit);
        }
        if let Some(sort) = &opts.sort {
            msg = msg.order_by(sort.clone());
        }
        if let Some(fields) = &opts.fields {
            msg = msg.select(FieldSelectionList::new(fields.iter().cloned()));
        }
        msg
    }
}

impl<T: DeserializeOwned> Collection<T> {
    /// # Errors
    /// Anything [`QueryMessage::execute`] returns.
    pub fn find<U: Serialize>(&self, conn: &mut Connection, filter: U, opts: &FindOptions) -> Result<ReplyMessage<T>, DbError> {
        self.query(filter, opts).execute(conn)
    }

    /// # Errors
    /// Anything [`QueryMessage::execute`] returns, or a decode failure.
    pub fn find_one<U: Serialize>(&self, conn: &mut Connection, filter: U) -> Result<Option<T>, DbError> {
        let opts = FindOptions { limit: Some(1), ..FindOptions::default() };
        self.find(conn, filter, &opts)?.first()
    }

    /// Everything in the collection.
    ///
    /// # Errors
    /// See [`Collection::find`].
    pub fn find_all(&self, conn: &mut Connection) -> Result<ReplyMessage<T>, DbError> {
        self.find(conn, doc! {}, &FindOptions::default())
    }
}
