// Wire types for the task endpoints.

use serde::{Deserialize, Deserializer};

/// Body of the 202 answer to a submission.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Accepted {
    pub task_id: String,
}

/// Server-side task identifier, issued once per submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot returned by `GET /api/progress/{task_id}`.
///
/// The server stores extra bookkeeping next to these fields (output paths,
/// task type); those are ignored.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressInfo {
    Uploading {
        #[serde(default, deserialize_with = "percent")]
        pct: Option<u8>,
    },
    Processing {
        #[serde(default, deserialize_with = "percent")]
        pct: Option<u8>,
    },
    Done,
    Partial {
        #[serde(default)]
        unpaired: Vec<String>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    /// Any status this client does not know; polling carries on.
    #[serde(other)]
    Unknown,
}

impl ProgressInfo {
    /// Decode a progress body. A body without a `status` (or with a null
    /// one) is read as `Unknown` so the poller keeps going.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.get("status").map_or(true, serde_json::Value::is_null) {
            return Ok(Self::Unknown);
        }
        serde_json::from_value(value)
    }
}

// The backend reports whatever its worker computed, ints or floats.
fn percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw
        .filter(|p| p.is_finite())
        .map(|p| p.round().clamp(0.0, 100.0) as u8))
}
