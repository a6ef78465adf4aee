//! Query qualifiers: the `$gt`, `$in`, `$elemMatch`, ... operators embedded as field values of a
//! filter document.
//!
//! ```
//! use bson::doc;
//! use docwire::qualifier::Q;
//!
//! let filter = doc! { "age": Q::greater_than(21), "tags": Q::in_set(["a", "b"]) };
//! assert_eq!(filter, doc! { "age": { "$gt": 21 }, "tags": { "$in": ["a", "b"] } });
//! ```

use bson::{Bson, Document, doc};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Operand of the ordering operators: a number or a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Int32(i32),
    Int64(i64),
    Double(f64),
    Date(DateTime<Utc>),
}

impl From<i32> for Bound {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Bound {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Bound {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<DateTime<Utc>> for Bound {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Date(v)
    }
}

impl From<Bound> for Bson {
    fn from(b: Bound) -> Self {
        match b {
            Bound::Int32(v) => Self::Int32(v),
            Bound::Int64(v) => Self::Int64(v),
            Bound::Double(v) => Self::Double(v),
            Bound::Date(v) => Self::DateTime(bson::DateTime::from_millis(v.timestamp_millis())),
        }
    }
}

/// One filter operator. Built through [`Q`]; converts into the `{"$op": operand}` document the
/// server expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Qualifier {
    NotEqual(Bson),
    LessThan(Bound),
    LessOrEqual(Bound),
    GreaterThan(Bound),
    GreaterOrEqual(Bound),
    In(Vec<Bson>),
    NotIn(Vec<Bson>),
    All(Vec<Bson>),
    Size(i64),
    ElementMatch(Document),
    Exists(bool),
    Matches { pattern: String, options: String },
    Where(String),
}

impl Qualifier {
    /// The server-side operator name.
    #[must_use]
    pub const fn operator(&self) -> &'static str {
        match self {
            Self::NotEqual(_) => "$ne",
            Self::LessThan(_) => "$lt",
            Self::LessOrEqual(_) => "$lte",
            Self::GreaterThan(_) => "$gt",
            Self::GreaterOrEqual(_) => "$gte",
            Self::In(_) => "$in",
            Self::NotIn(_) => "$nin",
            Self::All(_) => "$all",
            Self::Size(_) => "$size",
            Self::ElementMatch(_) => "$elemMatch",
            Self::Exists(_) => "$exists",
            Self::Matches { .. } => "$regex",
            Self::Where(_) => "$where",
        }
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        let op = self.operator();
        match self {
            Self::NotEqual(v) => doc! { op: v.clone() },
            Self::LessThan(b) | Self::LessOrEqual(b) | Self::GreaterThan(b) | Self::GreaterOrEqual(b) => {
                doc! { op: Bson::from(*b) }
            }
            Self::In(items) | Self::NotIn(items) | Self::All(items) => doc! { op: items.clone() },
            Self::Size(n) => doc! { op: *n },
            Self::ElementMatch(sub) => doc! { op: sub.clone() },
            Self::Exists(flag) => doc! { op: *flag },
            Self::Matches { pattern, options } => doc! { op: pattern.as_str(), "$options": options.as_str() },
            Self::Where(expr) => doc! { op: expr.as_str() },
        }
    }
}

impl From<Qualifier> for Bson {
    fn from(q: Qualifier) -> Self {
        Self::Document(q.to_document())
    }
}

impl Serialize for Qualifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

#[cfg(feature = "regex")]
impl From<&regex::Regex> for Qualifier {
    fn from(re: &regex::Regex) -> Self {
        Q::matches(re.as_str())
    }
}

fn collect<T: Into<Bson>>(items: impl IntoIterator<Item = T>) -> Vec<Bson> {
    items.into_iter().map(Into::into).collect()
}

/// Qualifier constructors. None of them fail, perform I/O, or look at any schema.
pub struct Q;

impl Q {
    /// Returns `value` unchanged: a plain value already is an equality filter.
    #[must_use]
    pub fn equals<T>(value: T) -> T {
        value
    }

    /// `null` itself, i.e. an equality test against null.
    #[must_use]
    pub const fn is_null() -> Bson {
        Bson::Null
    }

    /// `{$ne: null}`
    #[must_use]
    pub const fn is_not_null() -> Qualifier {
        Qualifier::NotEqual(Bson::Null)
    }

    #[must_use]
    pub fn not_equal<T: Into<Bson>>(value: T) -> Qualifier {
        Qualifier::NotEqual(value.into())
    }

    #[must_use]
    pub fn less_than(value: impl Into<Bound>) -> Qualifier {
        Qualifier::LessThan(value.into())
    }

    #[must_use]
    pub fn less_or_equal(value: impl Into<Bound>) -> Qualifier {
        Qualifier::LessOrEqual(value.into())
    }

    #[must_use]
    pub fn greater_than(value: impl Into<Bound>) -> Qualifier {
        Qualifier::GreaterThan(value.into())
    }

    #[must_use]
    pub fn greater_or_equal(value: impl Into<Bound>) -> Qualifier {
        Qualifier::GreaterOrEqual(value.into())
    }

    #[must_use]
    pub fn in_set<T: Into<Bson>>(items: impl IntoIterator<Item = T>) -> Qualifier {
        Qualifier::In(collect(items))
    }

    #[must_use]
    pub fn not_in<T: Into<Bson>>(items: impl IntoIterator<Item = T>) -> Qualifier {
        Qualifier::NotIn(collect(items))
    }

    #[must_use]
    pub fn all<T: Into<Bson>>(items: impl IntoIterator<Item = T>) -> Qualifier {
        Qualifier::All(collect(items))
    }

    #[must_use]
    pub fn size(len: u32) -> Qualifier {
        Qualifier::Size(i64::from(len))
    }

    #[must_use]
    pub const fn element_match(sub_filter: Document) -> Qualifier {
        Qualifier::ElementMatch(sub_filter)
    }

    #[must_use]
    pub const fn exists(present: bool) -> Qualifier {
        Qualifier::Exists(present)
    }

    /// Pattern match with the server's regular expression operator. The pattern is passed
    /// through as-is; the server compiles it.
    #[must_use]
    pub fn matches(pattern: impl Into<String>) -> Qualifier {
        Qualifier::Matches { pattern: pattern.into(), options: String::new() }
    }

    /// Pattern match with regex flags such as `"i"` or `"ms"`.
    #[must_use]
    pub fn matches_with(pattern: impl Into<String>, options: impl Into<String>) -> Qualifier {
        Qualifier::Matches { pattern: pattern.into(), options: options.into() }
    }

    /// A `$where` JavaScript expression evaluated by the server.
    #[must_use]
    pub fn where_expr(expression: impl Into<String>) -> Qualifier {
        Qualifier::Where(expression.into())
    }
}
