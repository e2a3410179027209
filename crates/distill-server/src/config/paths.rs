// crates/distill-server/src/config/paths.rs
// On-disk layout under ~/.distill, carried as a context value so tests
// can point everything at a temp directory instead of the real home.

use std::path::{Path, PathBuf};

/// Resolved base directory for all distill state.
///
/// Layout:
/// - `<root>/config.json`               configuration
/// - `<root>/sessions/<id>.db`          per-session database
/// - `<root>/buffers/<id>.jsonl`        per-session tool-call buffer
#[derive(Debug, Clone)]
pub struct DistillPaths {
    root: PathBuf,
}

impl DistillPaths {
    /// Resolve the base directory: `DISTILL_HOME` override first,
    /// then `~/.distill`.
    pub fn resolve() -> Self {
        if let Ok(dir) = std::env::var("DISTILL_HOME")
            && !dir.trim().is_empty()
        {
            return Self {
                root: PathBuf::from(dir),
            };
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: home.join(".distill"),
        }
    }

    /// Use an explicit root (tests, hermetic setups).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn buffers_dir(&self) -> PathBuf {
        self.root.join("buffers")
    }

    /// Database file for a session id (sanitized before use as a filename).
    pub fn session_db_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir()
            .join(format!("{}.db", sanitize_session_id(session_id)))
    }

    /// Buffer file for a session id.
    pub fn buffer_path(&self, session_id: &str) -> PathBuf {
        self.buffers_dir()
            .join(format!("{}.jsonl", sanitize_session_id(session_id)))
    }
}

/// Replace every non-alphanumeric character with `_` so arbitrary host
/// session ids are safe as filenames.
pub fn sanitize_session_id(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Project-local enable gate.
///
/// A `.nodistill` file in the hook's cwd disables the system for that
/// project; a `.distill` file force-enables it over a global
/// `enabled = false`. With neither marker, the global flag decides.
pub fn project_enabled(cwd: Option<&str>, global_enabled: bool) -> bool {
    let Some(cwd) = cwd.filter(|c| !c.is_empty()) else {
        return global_enabled;
    };
    let dir = Path::new(cwd);
    if dir.join(".nodistill").exists() {
        return false;
    }
    if dir.join(".distill").exists() {
        return true;
    }
    global_enabled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_non_alphanumerics() {
        assert_eq!(sanitize_session_id("sess-ab.12/x"), "sess_ab_12_x");
        assert_eq!(sanitize_session_id("plain123"), "plain123");
    }

    #[test]
    fn db_path_uses_sanitized_id() {
        let paths = DistillPaths::with_root("/tmp/d");
        assert_eq!(
            paths.session_db_path("a-b"),
            PathBuf::from("/tmp/d/sessions/a_b.db")
        );
        assert_eq!(
            paths.buffer_path("a-b"),
            PathBuf::from("/tmp/d/buffers/a_b.jsonl")
        );
    }

    #[test]
    fn nodistill_marker_disables() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".nodistill"), "").unwrap();
        assert!(!project_enabled(tmp.path().to_str(), true));
    }

    #[test]
    fn distill_marker_overrides_global_off() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".distill"), "").unwrap();
        assert!(project_enabled(tmp.path().to_str(), false));
    }

    #[test]
    fn no_marker_falls_back_to_global() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(project_enabled(tmp.path().to_str(), true));
        assert!(!project_enabled(tmp.path().to_str(), false));
        assert!(project_enabled(None, true));
    }
}
