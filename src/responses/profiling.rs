use serde::{Deserialize, Serialize};

use super::{FieldAlias, FieldAliases};

/// One record of `<database>.system.profile`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilingInformationResponse {
    #[serde(rename = "ts", default, deserialize_with = "lenient_string")]
    pub ts: Option<String>,
    #[serde(rename = "info", default)]
    pub info: Option<String>,
    #[serde(rename = "millis", default)]
    pub millis: Option<f64>,
}

impl FieldAliases for ProfilingInformationResponse {
    const ALIASES: &'static [FieldAlias] =
        &[FieldAlias::new("ts", "ts"), FieldAlias::new("info", "info"), FieldAlias::new("millis", "millis")];
}

/// Profilers write `ts` as a date; render any scalar as text.
fn lenient_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<bson::Bson>::deserialize(d)?;
    Ok(value.and_then(|v| match v {
        bson::Bson::Null => None,
        bson::Bson::String(s) => Some(s),
        bson::Bson::DateTime(dt) => Some(dt.try_to_rfc3339_string().unwrap_or_else(|_| dt.to_string())),
        other => Some(other.to_string()),
    }))
}
