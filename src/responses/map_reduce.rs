use std::sync::{Arc, Weak};

use bson::Document;
use serde::{Deserialize, Serialize};

use super::{FieldAlias, FieldAliases, StatusMessage};
use crate::database::{Collection, Database};
use crate::errors::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapReduceCount {
    #[serde(rename = "input", default)]
    pub input: i64,
    #[serde(rename = "emit", default)]
    pub emit: i64,
    #[serde(rename = "output", default)]
    pub output: i64,
}

/// Summary returned by a `mapreduce` command.
///
/// The output collection can be opened from the response once it has been attached to its
/// database with [`MapReduceResponse::prepare_for_querying`]. The link is weak: the response
/// never keeps the database alive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapReduceResponse {
    #[serde(rename = "ok", default)]
    pub ok: f64,
    #[serde(rename = "result", default)]
    pub result: String,
    #[serde(rename = "counts", default)]
    pub counts: MapReduceCount,
    #[serde(rename = "timeMillis", default)]
    pub time_millis: i64,
    #[serde(skip)]
    database: Option<Weak<Database>>,
}

impl MapReduceResponse {
    pub fn prepare_for_querying(&mut self, database: &Arc<Database>) {
        self.database = Some(Arc::downgrade(database));
    }

    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        self.database.is_some()
    }

    fn database(&self) -> Result<Arc<Database>, DbError> {
        let weak = self.database.as_ref().ok_or_else(|| {
            DbError::NotInitialized("map-reduce response used before prepare_for_querying".into())
        })?;
        weak.upgrade()
            .ok_or_else(|| DbError::NotInitialized("the database of this map-reduce response is gone".into()))
    }

    /// # Errors
    /// `DbError::NotInitialized` if no database is attached.
    pub fn collection(&self, name: &str) -> Result<Collection<Document>, DbError> {
        Ok(self.database()?.collection(name))
    }

    /// The collection named by `result`, typed.
    ///
    /// # Errors
    /// `DbError::NotInitialized` if no database is attached.
    pub fn result_collection<T>(&self) -> Result<Collection<T>, DbError> {
        Ok(self.database()?.typed_collection(&self.result))
    }
}

impl StatusMessage for MapReduceResponse {
    fn ok(&self) -> f64 {
        self.ok
    }
}

impl FieldAliases for MapReduceResponse {
    const ALIASES: &'static [FieldAlias] = &[
        FieldAlias::new("ok", "ok"),
        FieldAlias::new("result", "result"),
        FieldAlias::new("counts", "counts"),
        FieldAlias::new("timeMillis", "time_millis"),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn sample() -> MapReduceResponse {
        bson::deserialize_from_document(doc! {
            "result": "mr_out",
            "timeMillis": 14,
            "counts": { "input": 10, "emit": 8, "output": 3 },
            "ok": 1.0,
        })
        .unwrap()
    }

    #[test]
    fn decodes_counts() {
        let r = sample();
        assert_eq!(r.counts, MapReduceCount { input: 10, emit: 8, output: 3 });
        assert_eq!(r.time_millis, 14);
        assert!(r.is_ok());
        assert!(!r.is_prepared());
    }

    #[test]
    fn collection_access_requires_attachment() {
        let r = sample();
        assert!(matches!(r.collection("x"), Err(DbError::NotInitialized(_))));
        assert!(matches!(r.result_collection::<Document>(), Err(DbError::NotInitialized(_))));
    }

    #[test]
    fn attached_response_resolves_result_collection() {
        let db = Arc::new(Database::new("shop"));
        let mut r = sample();
        r.prepare_for_querying(&db);
        assert_eq!(r.result_collection::<Document>().unwrap().full_name(), "shop.mr_out");
        assert_eq!(r.collection("other").unwrap().full_name(), "shop.other");
        drop(db);
        assert!(matches!(r.collection("other"), Err(DbError::NotInitialized(_))));
    }
}
