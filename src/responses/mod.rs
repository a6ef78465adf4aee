//! Typed shapes for specific server replies.
//!
//! Wire names differ from field names; each type lists its mapping in [`FieldAliases::ALIASES`]
//! and carries the same mapping as serde renames.

mod last_error;
mod map_reduce;
mod profiling;

pub use last_error::LastErrorResponse;
pub use map_reduce::{MapReduceCount, MapReduceResponse};
pub use profiling::ProfilingInformationResponse;

/// One wire-name to field-name mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAlias {
    pub wire: &'static str,
    pub field: &'static str,
}

impl FieldAlias {
    #[must_use]
    pub const fn new(wire: &'static str, field: &'static str) -> Self {
        Self { wire, field }
    }
}

/// Per-type alias table.
pub trait FieldAliases {
    const ALIASES: &'static [FieldAlias];

    /// The wire name for `field`, if it is aliased.
    #[must_use]
    fn wire_name(field: &str) -> Option<&'static str> {
        Self::ALIASES.iter().find(|a| a.field == field).map(|a| a.wire)
    }
}

/// Every command reply carries `ok`; 1 means success.
pub trait StatusMessage {
    fn ok(&self) -> f64;

    fn is_ok(&self) -> bool {
        self.ok() >= 1.0
    }
}
