use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RawRecord is the opaque JSON payload a fetcher yields for one third-party item.
///
/// The core treats it as immutable during mapping: nothing downstream of a fetcher
/// ever mutates a `RawRecord` in place, only reads through it to produce an [`Entity`](crate::Entity).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Value);

impl RawRecord {
    /// New wraps a JSON value as a raw record.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Value returns a reference to the underlying JSON value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Into_value consumes the record, returning the underlying JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for RawRecord {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl AsRef<Value> for RawRecord {
    fn as_ref(&self) -> &Value {
        &self.0
    }
}
