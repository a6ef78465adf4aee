use std::io::{self, Read};
use std::marker::PhantomData;
use std::net::TcpStream;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use bson::{Document, doc};
use log::{debug, trace};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::commands::SystemQuery;
use super::op::{MongoOp, QueryOptions};
use super::reply::ReplyMessage;
use super::MAX_MESSAGE_SIZE;
use crate::connection::{Connection, timeout_duration};
use crate::errors::DbError;
use crate::logger::WIRE_TARGET;

/// Fixed part of an OP_QUERY header: 16 message header + flags + skip + take.
const QUERY_FIXED_LEN: usize = 28;

static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Process-wide request id; never 0, wraps back to 1.
pub fn next_request_id() -> i32 {
    loop {
        let id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        if id > 0 {
            return id;
        }
        let _ = REQUEST_ID.compare_exchange(id.wrapping_add(1), 1, Ordering::Relaxed, Ordering::Relaxed);
    }
}

/// Fields to return; serialized as `{field: 1, ...}` in the second payload section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelectionList(Vec<String>);

impl FieldSelectionList {
    #[must_use]
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self(fields.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        self.0.iter().map(|f| (f.clone(), bson::Bson::Int32(1))).collect()
    }
}

/// The three byte sections of one OP_QUERY, in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedQuery {
    pub header: Vec<u8>,
    pub payload: Vec<u8>,
    pub field_selection: Vec<u8>,
}

impl EncodedQuery {
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.header.len() + self.payload.len() + self.field_selection.len()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = self.header;
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.field_selection);
        out
    }
}

/// One read request against `database.collection`.
///
/// `T` is the type each returned document is decoded into; `U` the filter type.
pub struct QueryMessage<T, U = Document> {
    collection: String,
    query: Option<U>,
    system: bool,
    order_by: Option<Document>,
    field_selection: Option<FieldSelectionList>,
    number_to_skip: i32,
    number_to_take: i32,
    options: QueryOptions,
    _reply: PhantomData<fn() -> T>,
}

impl<T, U> QueryMessage<T, U> {
    /// A query that returns everything unless narrowed with the builder methods.
    #[must_use]
    pub fn new(full_collection_name: impl Into<String>) -> Self {
        Self {
            collection: full_collection_name.into(),
            query: None,
            system: false,
            order_by: None,
            field_selection: None,
            number_to_skip: 0,
            number_to_take: i32::MAX,
            options: QueryOptions::NONE,
            _reply: PhantomData,
        }
    }

    #[must_use]
    pub fn query(mut self, filter: U) -> Self {
        self.query = Some(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, sort: Document) -> Self {
        self.order_by = Some(sort);
        self
    }

    #[must_use]
    pub fn select(mut self, fields: FieldSelectionList) -> Self {
        self.field_selection = Some(fields);
        self
    }

    #[must_use]
    pub fn skip(mut self, n: u32) -> Self {
        self.number_to_skip = i32::try_from(n).unwrap_or(i32::MAX);
        self
    }

    #[must_use]
    pub fn take(mut self, n: u32) -> Self {
        self.number_to_take = i32::try_from(n).unwrap_or(i32::MAX);
        self
    }

    #[must_use]
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub const fn number_to_skip(&self) -> i32 {
        self.number_to_skip
    }

    #[must_use]
    pub const fn number_to_take(&self) -> i32 {
        self.number_to_take
    }

    #[must_use]
    pub const fn is_system_query(&self) -> bool {
        self.system
    }

    /// `28 + len(utf8(collection)) + 1`
    #[must_use]
    pub fn header_len(&self) -> usize {
        QUERY_FIXED_LEN + self.collection.len() + 1
    }
}

impl<T, U: SystemQuery> QueryMessage<T, U> {
    /// A command sent as-is, typically against `database.$cmd` with `take(1)`.
    #[must_use]
    pub fn system(full_collection_name: impl Into<String>, command: U) -> Self {
        let mut msg = Self::new(full_collection_name);
        msg.query = Some(command);
        msg.system = true;
        msg
    }
}

impl<T, U: Serialize> QueryMessage<T, U> {
    /// First payload section: the command itself, or `{query: filter, orderby: sort}`.
    ///
    /// # Errors
    /// `DbError::Bson` if the filter cannot be serialized.
    pub fn payload(&self) -> Result<Vec<u8>, DbError> {
        if self.system {
            if let Some(command) = &self.query {
                return Ok(bson::serialize_to_vec(command)?);
            }
        }
        let query = match &self.query {
            Some(q) => bson::serialize_to_bson(q)?,
            None => bson::Bson::Document(Document::new()),
        };
        let mut wrapped = doc! { "query": query };
        if let Some(sort) = &self.order_by {
            wrapped.insert("orderby", sort.clone());
        }
        Ok(bson::serialize_to_vec(&wrapped)?)
    }

    /// Frame the message with the given request id.
    ///
    /// # Errors
    /// `DbError::Protocol` if the collection name contains NUL or the message is too large;
    /// `DbError::Bson` if a payload cannot be serialized.
    pub fn encode_parts(&self, request_id: i32) -> Result<EncodedQuery, DbError> {
        let collection = self.collection.as_bytes();
        if collection.contains(&0) {
            return Err(DbError::Protocol(format!("collection name '{}' contains NUL", self.collection.escape_debug())));
        }
        let payload = self.payload()?;
        let field_selection = match &self.field_selection {
            Some(fields) => bson::serialize_to_vec(&fields.to_document())?,
            None => Vec::new(),
        };
        let head_len = self.header_len();
        let total = head_len + payload.len() + field_selection.len();
        if total > MAX_MESSAGE_SIZE {
            return Err(DbError::Protocol(format!("query of {total} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit")));
        }
        let total = i32::try_from(total).map_err(|_| DbError::Protocol(format!("query length {total} overflows i32")))?;

        let mut header = Vec::with_capacity(head_len);
        header.extend_from_slice(&total.to_le_bytes());
        header.extend_from_slice(&request_id.to_le_bytes());
        header.extend_from_slice(&0_i32.to_le_bytes());
        header.extend_from_slice(&MongoOp::Query.code().to_le_bytes());
        header.extend_from_slice(&self.options.bits().to_le_bytes());
        header.extend_from_slice(collection);
        header.push(0);
        header.extend_from_slice(&self.number_to_skip.to_le_bytes());
        header.extend_from_slice(&self.number_to_take.to_le_bytes());
        debug_assert_eq!(header.len(), head_len);

        Ok(EncodedQuery { header, payload, field_selection })
    }

    /// The whole message as one buffer, with request id 0.
    ///
    /// # Errors
    /// See [`QueryMessage::encode_parts`].
    pub fn encode(&self) -> Result<Vec<u8>, DbError> {
        Ok(self.encode_parts(0)?.into_bytes())
    }
}

impl<T: DeserializeOwned, U: Serialize> QueryMessage<T, U> {
    /// Send the query and block until the reply arrives or the connection's query timeout
    /// elapses.
    ///
    /// # Errors
    /// - write failures as returned by [`Connection::write`]
    /// - `DbError::Timeout` when no complete reply arrives in time
    /// - `DbError::Protocol` for a malformed reply or one answering another request
    /// - `DbError::Server` when the server flags the query as failed
    ///
    /// Timeouts, protocol, I/O and peer-closed failures on the reply side invalidate the connection.
    pub fn execute(&self, conn: &mut Connection) -> Result<ReplyMessage<T>, DbError> {
        let request_id = next_request_id();
        let encoded = self.encode_parts(request_id)?;
        debug!(
            target: WIRE_TARGET,
            "OP_QUERY id={request_id} ns={} skip={} take={} len={}",
            self.collection,
            self.number_to_skip,
            self.number_to_take,
            encoded.total_len()
        );

        conn.write(&encoded.header)?;
        conn.write(&encoded.payload)?;
        if !encoded.field_selection.is_empty() {
            conn.write(&encoded.field_selection)?;
        }

        let reply = match await_reply::<T>(conn, self.number_to_take) {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(
                    e,
                    DbError::Timeout { .. } | DbError::Protocol(_) | DbError::Io(_) | DbError::Connection(_)
                ) {
                    conn.invalidate(&e);
                }
                return Err(e);
            }
        };
        trace!(
            target: WIRE_TARGET,
            "OP_REPLY to={} flags={} cursor={} from={} returned={}",
            reply.response_to(),
            reply.response_flags().bits(),
            reply.cursor_id(),
            reply.starting_from(),
            reply.number_returned()
        );
        if reply.response_to() != request_id {
            let e = DbError::Protocol(format!(
                "reply answers request {} but {request_id} was sent",
                reply.response_to()
            ));
            conn.invalidate(&e);
            return Err(e);
        }
        if let Some(e) = reply.server_error() {
            return Err(e);
        }
        Ok(reply)
    }
}

fn await_reply<T>(conn: &mut Connection, number_to_take: i32) -> Result<ReplyMessage<T>, DbError> {
    let seconds = conn.query_timeout();
    let stream = conn.stream()?;
    let mut reader = DeadlineReader { stream, deadline: Instant::now() + timeout_duration(seconds) };
    let reply = ReplyMessage::read_from(&mut reader, MongoOp::Query, number_to_take);
    // The deadline shortened the socket's read timeout; put the connection's own back.
    if let Err(e) = reader.stream.set_read_timeout(Some(timeout_duration(seconds))) {
        debug!(target: WIRE_TARGET, "cannot restore read timeout: {e}");
    }
    reply.map_err(|e| match e {
        DbError::Io(io) if matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
            DbError::Timeout { seconds }
        }
        other => other,
    })
}

/// Applies one overall deadline across the many reads a reply takes.
struct DeadlineReader<'a> {
    stream: &'a mut TcpStream,
    deadline: Instant,
}

impl Read for DeadlineReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining < Duration::from_millis(1) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "reply deadline elapsed"));
        }
        self.stream.set_read_timeout(Some(remaining))?;
        self.stream.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le(b: &[u8], at: usize) -> i32 {
        i32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let msg: QueryMessage<Document> = QueryMessage::new("test.people")
            .query(doc! { "age": 1 })
            .skip(3)
            .take(10)
            .options(QueryOptions::SLAVE_OK);
        let parts = msg.encode_parts(77).unwrap();
        let h = &parts.header;
        assert_eq!(h.len(), 28 + "test.people".len() + 1);
        assert_eq!(le(h, 0) as usize, parts.total_len());
        assert_eq!(le(h, 4), 77);
        assert_eq!(le(h, 8), 0);
        assert_eq!(le(h, 12), 2004);
        assert_eq!(le(h, 16), 4);
        assert_eq!(&h[20..32], b"test.people\0");
        assert_eq!(le(h, 32), 3);
        assert_eq!(le(h, 36), 10);
    }

    #[test]
    fn take_defaults_to_everything() {
        let msg: QueryMessage<Document> = QueryMessage::new("a.b");
        assert_eq!(msg.number_to_take(), i32::MAX);
        assert_eq!(msg.number_to_skip(), 0);
        let payload = msg.payload().unwrap();
        assert_eq!(bson::deserialize_from_slice::<Document>(&payload).unwrap(), doc! { "query": {} });
    }

    #[test]
    fn order_by_is_wrapped_next_to_query() {
        let msg: QueryMessage<Document> = QueryMessage::new("a.b").query(doc! { "x": 1 }).order_by(doc! { "x": -1 });
        let payload = bson::deserialize_from_slice::<Document>(&msg.payload().unwrap()).unwrap();
        assert_eq!(payload, doc! { "query": { "x": 1 }, "orderby": { "x": -1 } });
    }

    #[test]
    fn system_query_is_not_wrapped() {
        let msg: QueryMessage<Document, _> = QueryMessage::system("admin.$cmd", doc! { "ping": 1 });
        assert!(msg.is_system_query());
        let payload = bson::deserialize_from_slice::<Document>(&msg.payload().unwrap()).unwrap();
        assert_eq!(payload, doc! { "ping": 1 });
    }

    #[test]
    fn field_selection_is_second_section() {
        let msg: QueryMessage<Document> =
            QueryMessage::new("a.b").select(FieldSelectionList::new(["name", "age"]));
        let parts = msg.encode_parts(1).unwrap();
        let fields = bson::deserialize_from_slice::<Document>(&parts.field_selection).unwrap();
        assert_eq!(fields, doc! { "name": 1, "age": 1 });
        assert_eq!(parts.clone().into_bytes().len(), parts.total_len());
    }

    #[test]
    fn nul_in_collection_name_is_rejected() {
        let msg: QueryMessage<Document> = QueryMessage::new("a\0b");
        assert!(matches!(msg.encode(), Err(DbError::Protocol(_))));
    }

    #[test]
    fn request_ids_are_positive_and_distinct() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(a > 0 && b > 0);
        assert_ne!(a, b);
    }
}
