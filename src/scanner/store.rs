//! Scanner state persisted across restarts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// The few fields worth surviving a restart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerState {
    /// Newest notification ID already processed.
    #[serde(default)]
    pub last_note_id: Option<String>,
    /// Unix time the horn last sounded, 0 if never.
    #[serde(default)]
    pub last_horn_time: i64,
    /// Observed API rate limit reset period in seconds, 0 if never observed.
    /// A state file written before this field existed reads as the API default.
    #[serde(default = "default_reset_period")]
    pub api_reset_period: f64,
}

fn default_reset_period() -> f64 {
    300.0
}

impl ScannerState {
    /// Read state from `path`. A missing, unreadable, or corrupt file
    /// starts fresh rather than failing.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("no state file at {:?}, starting fresh", path);
            return Self::default();
        }

        let result = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Self>(&text).map_err(|e| e.to_string()));

        match result {
            Ok(state) => {
                info!(
                    "loaded state from {:?} (last note {:?})",
                    path, state.last_note_id
                );
                state
            }
            Err(e) => {
                warn!("failed to read state from {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize state: {e}"))?;
        std::fs::write(path, json)
            .map_err(|e| format!("failed to persist state to {:?}: {e}", path))
    }
}
