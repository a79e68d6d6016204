//! Session persistence.
//!
//! The stores only hold data; the epoch rules live in [`SessionManager`](super::SessionManager).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{LogoutMarker, PersistedSession},
    error::ClientError,
};

/// Where the session and the logout marker survive restarts
pub trait SessionStore: Send + Sync {
    fn load_session(&self) -> Result<Option<PersistedSession>, ClientError>;
    fn save_session(&self, session: &PersistedSession) -> Result<(), ClientError>;
    fn clear_session(&self) -> Result<(), ClientError>;
    fn load_marker(&self) -> Result<Option<LogoutMarker>, ClientError>;
    fn save_marker(&self, marker: &LogoutMarker) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredState {
    #[serde(default)]
    session: Option<PersistedSession>,
    #[serde(default)]
    logout_marker: Option<LogoutMarker>,
}

/// Store that lives as long as the process
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    state: Mutex<StoredState>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoredState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for InMemorySessionStore {
    fn load_session(&self) -> Result<Option<PersistedSession>, ClientError> {
        Ok(self.lock().session.clone())
    }

    fn save_session(&self, session: &PersistedSession) -> Result<(), ClientError> {
        self.lock().session = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> Result<(), ClientError> {
        self.lock().session = None;
        Ok(())
    }

    fn load_marker(&self) -> Result<Option<LogoutMarker>, ClientError> {
        Ok(self.lock().logout_marker)
    }

    fn save_marker(&self, marker: &LogoutMarker) -> Result<(), ClientError> {
        self.lock().logout_marker = Some(*marker);
        Ok(())
    }
}

/// Store backed by a single JSON file.
///
/// Writes go to a sibling temporary file first and are renamed into place.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // serializes read-modify-write cycles within the process
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredState, ClientError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(StoredState::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::Storage(format!("corrupt session file {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoredState::default()),
            Err(e) => Err(ClientError::Storage(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn update(&self, f: impl FnOnce(&mut StoredState)) -> Result<(), ClientError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.read()?;
        f(&mut state);

        let json = serde_json::to_vec_pretty(&state)?;
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }
        fs::write(&tmp, json).map_err(|e| storage_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, e))?;
        tracing::debug!("Session file {} updated", self.path.display());
        Ok(())
    }
}

fn storage_error(path: &Path, e: std::io::Error) -> ClientError {
    ClientError::Storage(format!("failed to write {}: {}", path.display(), e))
}

impl SessionStore for FileSessionStore {
    fn load_session(&self) -> Result<Option<PersistedSession>, ClientError> {
        Ok(self.read()?.session)
    }

    fn save_session(&self, session: &PersistedSession) -> Result<(), ClientError> {
        self.update(|state| state.session = Some(session.clone()))
    }

    fn clear_session(&self) -> Result<(), ClientError> {
        self.update(|state| state.session = None)
    }

    fn load_marker(&self) -> Result<Option<LogoutMarker>, ClientError> {
        Ok(self.read()?.logout_marker)
    }

    fn save_marker(&self, marker: &LogoutMarker) -> Result<(), ClientError> {
        self.update(|state| state.logout_marker = Some(*marker))
    }
}
