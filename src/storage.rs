//! Persistence collaborator contract and an in-memory implementation.
//!
//! Records are opaque JSON objects identified by an integer id. The
//! authorization layer never looks inside them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record {0} not found")]
    #[diagnostic(code(warden::storage::not_found))]
    NotFound(i64),

    #[error("Invalid record: {0}")]
    #[diagnostic(code(warden::storage::invalid))]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[async_trait]
pub trait Repository: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn create(&self, record: Value) -> Result<Record, Self::Error>;
    async fn read(&self, id: i64) -> Result<Record, Self::Error>;
    async fn update(&self, id: i64, record: Value) -> Result<Record, Self::Error>;
    async fn delete(&self, id: i64) -> Result<(), Self::Error>;
    async fn list(&self) -> Result<Vec<Record>, Self::Error>;
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<i64, Map<String, Value>>,
}

/// Ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn into_fields(record: Value) -> Result<Map<String, Value>, StoreError> {
    match record {
        Value::Object(mut fields) => {
            // The id is owned by the store
            fields.remove("id");
            Ok(fields)
        }
        other => Err(StoreError::Invalid(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    type Error = StoreError;

    async fn create(&self, record: Value) -> Result<Record, StoreError> {
        let fields = into_fields(record)?;
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.insert(id, fields.clone());
        Ok(Record { id, fields })
    }

    async fn read(&self, id: i64) -> Result<Record, StoreError> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(&id)
            .map(|fields| Record {
                id,
                fields: fields.clone(),
            })
            .ok_or(StoreError::NotFound(id))
    }

    async fn update(&self, id: i64, record: Value) -> Result<Record, StoreError> {
        let fields = into_fields(record)?;
        let mut inner = self.inner.write().await;
        let slot = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        *slot = fields.clone();
        Ok(Record { id, fields })
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<Record>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .map(|(id, fields)| Record {
                id: *id,
                fields: fields.clone(),
            })
            .collect())
    }
}
