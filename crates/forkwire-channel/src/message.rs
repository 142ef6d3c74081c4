use forkwire_frame::Value;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Discriminator field carried by every typed worker message.
pub const TYPE_FIELD: &str = "__TYPE";

/// Application messages a launcher sends to a progress worker.
///
/// Encoded as a JSON object whose `__TYPE` field names the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__TYPE")]
pub enum WorkerMessage {
    ProgressUpdate { state: String, percent: i32 },
}

impl WorkerMessage {
    pub fn progress(state: impl Into<String>, percent: i32) -> Self {
        Self::ProgressUpdate {
            state: state.into(),
            percent,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Interpret a received value. Unknown or missing discriminators are errors.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }
}
