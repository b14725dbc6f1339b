//! Security-scoped resource access
//!
//! Sandboxed hosts hand out files that must be explicitly opened for access
//! before reading and released afterwards. [`ScopedAccess`] brackets that
//! pair: access ends when the guard drops, on the error path too.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{Result, SongxError};

/// Host hook granting and revoking access to user-picked files
pub trait SecurityScope: Send + Sync {
    /// Begin access; `false` means the host refused
    fn start_accessing(&self, path: &Path) -> bool;

    /// End access started by a successful `start_accessing`
    fn stop_accessing(&self, path: &Path);
}

/// Scope for hosts without a sandbox: every path is accessible
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsandboxed;

impl SecurityScope for Unsandboxed {
    fn start_accessing(&self, _path: &Path) -> bool {
        true
    }

    fn stop_accessing(&self, _path: &Path) {}
}

/// RAII guard for one granted access
pub struct ScopedAccess {
    scope: Arc<dyn SecurityScope>,
    path: PathBuf,
}

impl ScopedAccess {
    /// Start accessing `path`, failing with `AccessDenied` if refused
    pub fn begin(scope: Arc<dyn SecurityScope>, path: &Path) -> Result<Self> {
        if !scope.start_accessing(path) {
            warn!("Security-scoped access denied for {:?}", path);
            return Err(SongxError::AccessDenied {
                path: path.to_path_buf(),
            });
        }
        debug!("Started security-scoped access to {:?}", path);
        Ok(Self {
            scope,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedAccess {
    fn drop(&mut self) {
        self.scope.stop_accessing(&self.path);
        debug!("Stopped security-scoped access to {:?}", self.path);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records every start/stop call
    #[derive(Default)]
    pub(crate) struct RecordingScope {
        pub allow: bool,
        pub log: Mutex<Vec<String>>,
    }

    impl RecordingScope {
        pub fn allowing() -> Self {
            Self {
                allow: true,
                log: Mutex::new(Vec::new()),
            }
        }
    }

    impl SecurityScope for RecordingScope {
        fn start_accessing(&self, _path: &Path) -> bool {
            self.log.lock().push("start".to_string());
            self.allow
        }

        fn stop_accessing(&self, _path: &Path) {
            self.log.lock().push("stop".to_string());
        }
    }

    #[test]
    fn test_guard_stops_on_drop() {
        let scope = Arc::new(RecordingScope::allowing());
        {
            let guard = ScopedAccess::begin(scope.clone(), Path::new("song.m4a")).unwrap();
            assert_eq!(guard.path(), Path::new("song.m4a"));
        }
        assert_eq!(*scope.log.lock(), vec!["start", "stop"]);
    }

    #[test]
    fn test_denied_access_never_stops() {
        let scope = Arc::new(RecordingScope::default());
        let result = ScopedAccess::begin(scope.clone(), Path::new("song.m4a"));
        assert!(matches!(result, Err(SongxError::AccessDenied { .. })));
        assert_eq!(*scope.log.lock(), vec!["start"]);
    }

    #[test]
    fn test_unsandboxed_always_allows() {
        let guard = ScopedAccess::begin(Arc::new(Unsandboxed), Path::new("/any/file.wav"));
        assert!(guard.is_ok());
    }
}
