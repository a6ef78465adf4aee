use serde::{Deserialize, Serialize};

use super::{FieldAlias, FieldAliases, StatusMessage};

/// Reply to `getlasterror`: the outcome of the previous operation on the same connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastErrorResponse {
    #[serde(rename = "ok", default)]
    pub ok: f64,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub number_of_errors: Option<i64>,
    #[serde(rename = "err", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "code", default)]
    pub code: i32,
    /// For an upsert: true if an existing record was updated, false if one was inserted.
    #[serde(rename = "updatedExisting", default)]
    pub updated_existing: bool,
}

impl StatusMessage for LastErrorResponse {
    fn ok(&self) -> f64 {
        self.ok
    }
}

impl FieldAliases for LastErrorResponse {
    const ALIASES: &'static [FieldAlias] = &[
        FieldAlias::new("ok", "ok"),
        FieldAlias::new("n", "number_of_errors"),
        FieldAlias::new("err", "error"),
        FieldAlias::new("code", "code"),
        FieldAlias::new("updatedExisting", "updated_existing"),
    ];
}
