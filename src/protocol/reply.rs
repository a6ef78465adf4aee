use std::io::{self, Read};
use std::marker::PhantomData;
use std::ops::Range;

use bson::{Bson, Document};
use serde::de::DeserializeOwned;

use super::op::{MongoOp, ResponseFlags};
use super::MAX_MESSAGE_SIZE;
use crate::errors::DbError;

/// Message header (16) + responseFlags (4) + cursorID (8) + startingFrom (4) + numberReturned (4).
pub const REPLY_HEADER_LEN: usize = 36;

/// Smallest valid BSON document: length prefix plus terminating NUL.
const MIN_DOCUMENT_LEN: usize = 5;

fn le_i32(b: &[u8], at: usize) -> i32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&b[at..at + 4]);
    i32::from_le_bytes(word)
}

fn le_i64(b: &[u8], at: usize) -> i64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&b[at..at + 8]);
    i64::from_le_bytes(word)
}

/// A decoded OP_REPLY.
///
/// The whole body is read and its document framing checked up front; documents themselves are
/// only deserialized into `T` when iterated.
#[derive(Debug, Clone)]
pub struct ReplyMessage<T> {
    answering: MongoOp,
    message_length: i32,
    request_id: i32,
    response_to: i32,
    response_flags: ResponseFlags,
    cursor_id: i64,
    starting_from: i32,
    number_returned: i32,
    body: Vec<u8>,
    documents: Vec<Range<usize>>,
    /// First framed document regardless of the take cap; carries `$err` on a query failure.
    first_document: Option<Range<usize>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ReplyMessage<T> {
    /// Read one reply from `reader`, keeping at most `number_to_take` documents.
    ///
    /// # Errors
    /// - `DbError::Connection` if the stream ends before a full reply header
    /// - `DbError::Protocol` for a wrong op code, a declared length that is out of range or
    ///   longer than the stream, or documents that do not exactly fill the body
    /// - `DbError::Io` for any other read failure (including read timeouts)
    pub fn read_from<R: Read>(reader: &mut R, answering: MongoOp, number_to_take: i32) -> Result<Self, DbError> {
        let mut head = [0u8; REPLY_HEADER_LEN];
        reader.read_exact(&mut head).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                DbError::Connection("connection closed before a complete reply header".into())
            }
            _ => DbError::Io(e),
        })?;

        let message_length = le_i32(&head, 0);
        let op_code = le_i32(&head, 12);
        if op_code != MongoOp::Reply.code() {
            return Err(DbError::Protocol(format!("expected OP_REPLY (1), got op code {op_code}")));
        }
        let total = usize::try_from(message_length)
            .ok()
            .filter(|len| (REPLY_HEADER_LEN..=MAX_MESSAGE_SIZE).contains(len))
            .ok_or_else(|| DbError::Protocol(format!("reply declares an invalid length of {message_length} bytes")))?;
        let number_returned = le_i32(&head, 32);
        if number_returned < 0 {
            return Err(DbError::Protocol(format!("reply declares {number_returned} documents")));
        }

        let mut body = vec![0u8; total - REPLY_HEADER_LEN];
        reader.read_exact(&mut body).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => DbError::Protocol(format!(
                "reply declares {total} bytes but the stream ended early"
            )),
            _ => DbError::Io(e),
        })?;

        let mut documents = frame_documents(&body, number_returned)?;
        let first_document = documents.first().cloned();
        documents.truncate(usize::try_from(number_to_take).unwrap_or(0));

        Ok(Self {
            answering,
            message_length,
            request_id: le_i32(&head, 4),
            response_to: le_i32(&head, 8),
            response_flags: ResponseFlags::from_bits(le_i32(&head, 16)),
            cursor_id: le_i64(&head, 20),
            starting_from: le_i32(&head, 28),
            number_returned,
            body,
            documents,
            first_document,
            _marker: PhantomData,
        })
    }

    /// Decode a reply held entirely in memory.
    ///
    /// # Errors
    /// As [`ReplyMessage::read_from`]; trailing bytes after the declared length are a protocol error.
    pub fn from_bytes(bytes: &[u8], answering: MongoOp, number_to_take: i32) -> Result<Self, DbError> {
        let mut cursor = io::Cursor::new(bytes);
        let reply = Self::read_from(&mut cursor, answering, number_to_take)?;
        let consumed = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
        if consumed != bytes.len() {
            return Err(DbError::Protocol(format!(
                "{} bytes follow the reply's declared length",
                bytes.len().saturating_sub(consumed)
            )));
        }
        Ok(reply)
    }

    /// The request op code this reply answers.
    #[must_use]
    pub const fn answering(&self) -> MongoOp {
        self.answering
    }

    #[must_use]
    pub const fn message_length(&self) -> i32 {
        self.message_length
    }

    #[must_use]
    pub const fn request_id(&self) -> i32 {
        self.request_id
    }

    #[must_use]
    pub const fn response_to(&self) -> i32 {
        self.response_to
    }

    #[must_use]
    pub const fn response_flags(&self) -> ResponseFlags {
        self.response_flags
    }

    #[must_use]
    pub const fn cursor_id(&self) -> i64 {
        self.cursor_id
    }

    /// Offset of the first returned document within the server-side result set.
    #[must_use]
    pub const fn starting_from(&self) -> i32 {
        self.starting_from
    }

    /// Document count declared by the server.
    #[must_use]
    pub const fn number_returned(&self) -> i32 {
        self.number_returned
    }

    /// Documents available to the caller (never more than the query's take).
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn raw_documents(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.documents.iter().map(|r| &self.body[r.clone()])
    }

    /// The server's `$err` when the QueryFailure flag is set.
    #[must_use]
    pub fn server_error(&self) -> Option<DbError> {
        if !self.response_flags.query_failure() {
            return None;
        }
        let doc = self
            .first_document
            .as_ref()
            .and_then(|r| bson::deserialize_from_slice::<Document>(&self.body[r.clone()]).ok())
            .unwrap_or_default();
        let message = doc.get_str("$err").unwrap_or("query failure without $err").to_string();
        let code = match doc.get("code") {
            Some(Bson::Int32(c)) => *c,
            Some(Bson::Int64(c)) => i32::try_from(*c).unwrap_or(-1),
            #[allow(clippy::cast_possible_truncation)]
            Some(Bson::Double(c)) => *c as i32,
            _ => -1,
        };
        Some(DbError::Server { code, message })
    }
}

impl<T: DeserializeOwned> ReplyMessage<T> {
    /// Deserialize documents one at a time, in server order.
    pub fn results(&self) -> impl Iterator<Item = Result<T, DbError>> + '_ {
        self.raw_documents()
            .map(|raw| bson::deserialize_from_slice::<T>(raw).map_err(DbError::from))
    }

    /// # Errors
    /// The first deserialization failure.
    pub fn into_results(self) -> Result<Vec<T>, DbError> {
        self.results().collect()
    }

    /// # Errors
    /// Deserialization failure of the first document.
    pub fn first(&self) -> Result<Option<T>, DbError> {
        self.results().next().transpose()
    }
}

fn frame_documents(body: &[u8], number_returned: i32) -> Result<Vec<Range<usize>>, DbError> {
    let mut ranges = Vec::new();
    let mut offset = 0usize;
    for index in 0..number_returned {
        let remaining = body.len() - offset;
        if remaining < MIN_DOCUMENT_LEN {
            return Err(DbError::Protocol(format!(
                "reply declares {number_returned} documents but the body ends after {index}"
            )));
        }
        let declared = le_i32(body, offset);
        let len = usize::try_from(declared)
            .ok()
            .filter(|len| (MIN_DOCUMENT_LEN..=remaining).contains(len))
            .ok_or_else(|| {
                DbError::Protocol(format!("document {index} declares {declared} bytes with {remaining} left"))
            })?;
        ranges.push(offset..offset + len);
        offset += len;
    }
    if offset != body.len() {
        return Err(DbError::Protocol(format!(
            "{} unread bytes after {number_returned} documents",
            body.len() - offset
        )));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn reply_bytes(flags: i32, docs: &[Document], starting_from: i32) -> Vec<u8> {
        let mut body = Vec::new();
        for d in docs {
            body.extend(bson::serialize_to_vec(d).unwrap());
        }
        let len = (REPLY_HEADER_LEN + body.len()) as i32;
        let mut out = Vec::new();
        for word in [len, 9, 5, 1, flags] {
            out.extend(word.to_le_bytes());
        }
        out.extend(0_i64.to_le_bytes());
        out.extend(starting_from.to_le_bytes());
        out.extend((docs.len() as i32).to_le_bytes());
        out.extend(body);
        out
    }

    #[test]
    fn decodes_header_and_documents() {
        let bytes = reply_bytes(0, &[doc! { "a": 1 }, doc! { "a": 2 }], 4);
        let reply: ReplyMessage<Document> = ReplyMessage::from_bytes(&bytes, MongoOp::Query, i32::MAX).unwrap();
        assert_eq!(reply.request_id(), 9);
        assert_eq!(reply.response_to(), 5);
        assert_eq!(reply.starting_from(), 4);
        assert_eq!(reply.number_returned(), 2);
        assert_eq!(reply.answering(), MongoOp::Query);
        assert_eq!(reply.into_results().unwrap(), vec![doc! { "a": 1 }, doc! { "a": 2 }]);
    }

    #[test]
    fn take_limits_exposed_documents() {
        let bytes = reply_bytes(0, &[doc! { "a": 1 }, doc! { "a": 2 }, doc! { "a": 3 }], 0);
        let reply: ReplyMessage<Document> = ReplyMessage::from_bytes(&bytes, MongoOp::Query, 2).unwrap();
        assert_eq!(reply.len(), 2);
        assert_eq!(reply.number_returned(), 3);
    }

    #[test]
    fn truncated_body_is_protocol_error() {
        let mut bytes = reply_bytes(0, &[doc! { "a": 1 }], 0);
        bytes.truncate(bytes.len() - 3);
        let err = ReplyMessage::<Document>::from_bytes(&bytes, MongoOp::Query, 10).unwrap_err();
        assert!(matches!(err, DbError::Protocol(_)));
    }

    #[test]
    fn document_count_mismatch_is_protocol_error() {
        let mut bytes = reply_bytes(0, &[doc! { "a": 1 }], 0);
        bytes[32..36].copy_from_slice(&2_i32.to_le_bytes());
        assert!(matches!(
            ReplyMessage::<Document>::from_bytes(&bytes, MongoOp::Query, 10),
            Err(DbError::Protocol(_))
        ));
        bytes[32..36].copy_from_slice(&0_i32.to_le_bytes());
        assert!(matches!(
            ReplyMessage::<Document>::from_bytes(&bytes, MongoOp::Query, 10),
            Err(DbError::Protocol(_))
        ));
    }

    #[test]
    fn wrong_op_code_is_protocol_error() {
        let mut bytes = reply_bytes(0, &[], 0);
        bytes[12..16].copy_from_slice(&2004_i32.to_le_bytes());
        assert!(matches!(
            ReplyMessage::<Document>::from_bytes(&bytes, MongoOp::Query, 10),
            Err(DbError::Protocol(_))
        ));
    }

    #[test]
    fn query_failure_surfaces_err_document() {
        let bytes = reply_bytes(ResponseFlags::QUERY_FAILURE.bits(), &[doc! { "$err": "bad query", "code": 2 }], 0);
        let reply: ReplyMessage<Document> = ReplyMessage::from_bytes(&bytes, MongoOp::Query, 1).unwrap();
        match reply.server_error() {
            Some(DbError::Server { code, message }) => {
                assert_eq!(code, 2);
                assert_eq!(message, "bad query");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn query_failure_survives_a_zero_take() {
        let bytes = reply_bytes(ResponseFlags::QUERY_FAILURE.bits(), &[doc! { "$err": "unauthorized", "code": 13 }], 0);
        let reply: ReplyMessage<Document> = ReplyMessage::from_bytes(&bytes, MongoOp::Query, 0).unwrap();
        assert!(reply.is_empty());
        match reply.server_error() {
            Some(DbError::Server { code, message }) => {
                assert_eq!(code, 13);
                assert_eq!(message, "unauthorized");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
