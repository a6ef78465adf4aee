use std::ops::BitOr;

/// Operation codes carried in the message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MongoOp {
    Reply = 1,
    Message = 1000,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
}

impl MongoOp {
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Reply,
            1000 => Self::Message,
            2001 => Self::Update,
            2002 => Self::Insert,
            2004 => Self::Query,
            2005 => Self::GetMore,
            2006 => Self::Delete,
            2007 => Self::KillCursors,
            _ => return None,
        })
    }
}

/// OP_QUERY flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions(i32);

impl QueryOptions {
    pub const NONE: Self = Self(0);
    pub const TAILABLE_CURSOR: Self = Self(2);
    pub const SLAVE_OK: Self = Self(4);
    // 8 (oplog replay) is reserved for server-internal use.
    pub const NO_CURSOR_TIMEOUT: Self = Self(16);

    #[must_use]
    pub const fn bits(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for QueryOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// OP_REPLY `responseFlags` bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseFlags(i32);

impl ResponseFlags {
    pub const NONE: Self = Self(0);
    pub const CURSOR_NOT_FOUND: Self = Self(1);
    pub const QUERY_FAILURE: Self = Self(2);
    pub const AWAIT_CAPABLE: Self = Self(8);

    #[must_use]
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn cursor_not_found(self) -> bool {
        self.contains(Self::CURSOR_NOT_FOUND)
    }

    #[must_use]
    pub const fn query_failure(self) -> bool {
        self.contains(Self::QUERY_FAILURE)
    }

    #[must_use]
    pub const fn await_capable(self) -> bool {
        self.contains(Self::AWAIT_CAPABLE)
    }
}
