use chrono::{DateTime, Local};
use serde::Serialize;

use crate::controller::facade::DriveCommand;
use crate::controller::input_state::InputSnapshot;
use crate::mapping::SinkError;

/// JSON body published every cycle
///
/// One boolean per logical button at top level, followed by the facade output when
/// a facade is attached.
#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    #[serde(flatten)]
    pub buttons: InputSnapshot,
    #[serde(flatten)]
    pub drive: Option<DriveCommand>,
    pub timestamp: DateTime<Local>,
    pub platform: String,
}

impl StatePayload {
    pub fn new(buttons: InputSnapshot, drive: Option<DriveCommand>) -> Self {
        Self {
            buttons,
            drive,
            timestamp: Local::now(),
            platform: platform(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, SinkError> {
        serde_json::to_vec(self).map_err(|e| SinkError::Serialization(e.to_string()))
    }
}

fn platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
