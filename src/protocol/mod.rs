//! Wire-protocol framing: OP_QUERY requests and OP_REPLY responses.
//!
//! All integers on the wire are little-endian `i32` unless noted.

mod commands;
mod op;
mod query;
mod reply;

pub use commands::{Authenticate, AuthenticateResponse, GetLastError, GetNonce, GetNonceResponse, SystemQuery};
pub use op::{MongoOp, QueryOptions, ResponseFlags};
pub use query::{EncodedQuery, FieldSelectionList, QueryMessage, next_request_id};
pub use reply::{REPLY_HEADER_LEN, ReplyMessage};

/// Standard message header: length, requestID, responseTo, opCode.
pub const MSG_HEADER_LEN: usize = 16;

/// Largest message either side may send.
pub const MAX_MESSAGE_SIZE: usize = 48_000_000;
