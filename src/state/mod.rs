//! Cross-invocation session state.
//!
//! The `run` and `post` phases execute as separate processes, so everything
//! the cleanup needs (session id, keychain path, key paths) is persisted to
//! a small JSON file in the runner temp directory. The post phase treats
//! every field as optional: a crashed or partially completed run must still
//! clean up whatever was recorded.

use crate::error::{Result, StateError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current version of the state format
pub const STATE_FORMAT_VERSION: u32 = 1;

/// File name of the session state inside the runner temp directory
const STATE_FILE_NAME: &str = ".xcode_builder_session.json";

/// Session state shared between the run and post phases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Version of the state format
    pub format_version: u32,
    /// Random session identifier namespacing all temp files
    pub session_id: String,
    /// Timestamp when the session started
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Path of the ephemeral keychain, when one was created
    #[serde(default)]
    pub keychain_path: Option<PathBuf>,
    /// App Store Connect key id used to derive the .p8 path
    #[serde(default)]
    pub app_store_connect_key_id: Option<String>,
    /// Path the decoded .p8 key was written to
    #[serde(default)]
    pub app_store_connect_key_path: Option<PathBuf>,
    /// Path the provisioning profile was installed to
    #[serde(default)]
    pub provisioning_profile_path: Option<PathBuf>,
}

impl SessionState {
    /// Create a fresh session state with a random identifier
    pub fn new() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            session_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now(),
            keychain_path: None,
            app_store_connect_key_id: None,
            app_store_connect_key_path: None,
            provisioning_profile_path: None,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Manager for the persisted session state file
#[derive(Debug)]
pub struct StateManager {
    state_file_path: PathBuf,
}

impl StateManager {
    /// Create a state manager for an explicit state file path
    pub fn new<P: AsRef<Path>>(state_file_path: P) -> Self {
        Self {
            state_file_path: state_file_path.as_ref().to_path_buf(),
        }
    }

    /// Create a state manager rooted in the runner temp directory
    pub fn for_runner_temp() -> Self {
        Self::new(runner_temp().join(STATE_FILE_NAME))
    }

    /// Check if a state file exists
    pub fn state_exists(&self) -> bool {
        self.state_file_path.exists()
    }

    /// Save session state, writing to a temp file then renaming
    pub fn save_state(&self, state: &SessionState) -> Result<()> {
        let serialized =
            serde_json::to_string_pretty(state).map_err(|e| StateError::SaveFailed {
                reason: format!("Failed to serialize state: {}", e),
            })?;

        let temp_file_path = self.state_file_path.with_extension("tmp");
        fs::write(&temp_file_path, serialized).map_err(|e| StateError::SaveFailed {
            reason: format!("Failed to write temp file: {}", e),
        })?;
        fs::rename(&temp_file_path, &self.state_file_path).map_err(|e| {
            StateError::SaveFailed {
                reason: format!("Failed to rename temp file: {}", e),
            }
        })?;

        Ok(())
    }

    /// Load session state
    pub fn load_state(&self) -> Result<SessionState> {
        if !self.state_file_path.exists() {
            return Err(StateError::NotFound.into());
        }

        let contents = fs::read_to_string(&self.state_file_path)?;
        let state: SessionState =
            serde_json::from_str(&contents).map_err(|e| StateError::Corrupted {
                reason: format!("Failed to deserialize state: {}", e),
            })?;

        Ok(state)
    }

    /// Delete the state file (missing file is fine)
    pub fn cleanup_state(&self) -> Result<()> {
        if self.state_file_path.exists() {
            fs::remove_file(&self.state_file_path)?;
        }
        Ok(())
    }
}

/// The temp directory shared by the run and post invocations of a job
pub fn runner_temp() -> PathBuf {
    std::env::var_os("RUNNER_TEMP")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionState::new();
        let b = SessionState::new();
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = StateManager::new(dir.path().join("session.json"));

        let mut state = SessionState::new();
        state.keychain_path = Some(dir.path().join("a.keychain-db"));
        state.app_store_connect_key_id = Some("AB12CD34EF".to_string());
        manager.save_state(&state).expect("save");

        let loaded = manager.load_state().expect("load");
        assert_eq!(loaded.session_id, state.session_id);
        assert_eq!(loaded.keychain_path, state.keychain_path);
    }

    #[test]
    fn load_missing_state_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = StateManager::new(dir.path().join("missing.json"));
        assert!(manager.load_state().is_err());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manager = StateManager::new(dir.path().join("session.json"));
        manager.save_state(&SessionState::new()).expect("save");
        manager.cleanup_state().expect("first cleanup");
        manager.cleanup_state().expect("second cleanup");
    }

    #[test]
    fn partial_state_fields_deserialize() {
        let json = r#"{
            "format_version": 1,
            "session_id": "abc",
            "started_at": "2026-01-01T00:00:00Z"
        }"#;
        let state: SessionState = serde_json::from_str(json).expect("parse");
        assert!(state.keychain_path.is_none());
        assert!(state.provisioning_profile_path.is_none());
    }
}
