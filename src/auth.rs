use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SecretsFile {
    token: Option<String>,
    updated_at: Option<i64>,
}

/// Where the Discord token comes from: an explicit flag, `SCRUBBER_TOKEN`, or
/// the secrets file written by `scrubber auth login`, in that order.
pub struct AuthStore {
    path: PathBuf,
}

impl AuthStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn resolve_token(&self, explicit: Option<&str>) -> Result<Option<String>, AuthError> {
        let from_env = env::var("SCRUBBER_TOKEN").ok();
        self.resolve_token_with(explicit, from_env.as_deref())
    }

    fn resolve_token_with(&self, explicit: Option<&str>, from_env: Option<&str>) -> Result<Option<String>, AuthError> {
        let given = [explicit, from_env]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|token| !token.is_empty());
        match given {
            Some(token) => Ok(Some(token.to_string())),
            None => self.load_token(),
        }
    }

    pub fn load_token(&self) -> Result<Option<String>, AuthError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err)),
        };

        let secrets: SecretsFile = serde_json::from_str(&contents)?;
        Ok(secrets.token.filter(|token| !token.trim().is_empty()))
    }

    pub fn store_token(&self, token: &str) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }

        let secrets = SecretsFile {
            token: Some(token.trim().to_string()),
            updated_at: Some(chrono::Utc::now().timestamp()),
        };
        let payload = serde_json::to_string_pretty(&secrets)?;
        fs::write(&self.path, payload)?;
        set_file_permissions(&self.path, 0o600)?;
        Ok(())
    }

    pub fn clear_token(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err)),
        }
    }
}

fn ensure_dir(path: &Path) -> Result<(), io::Error> {
    fs::create_dir_all(path)?;
    set_dir_permissions(path, 0o700)?;
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path, mode: u32) -> Result<(), io::Error> {
    use std::os::unix::fs::PermissionsExt;
    let perm = fs::Permissions::from_mode(mode);
    fs::set_permissions(path, perm)
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path, _mode: u32) -> Result<(), io::Error> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_token_round_trips_and_clears() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AuthStore::new(dir.path().join("nested").join("secrets.json"));

        assert!(store.load_token().expect("load").is_none());
        store.store_token("  abc.def  ").expect("store");
        assert_eq!(store.load_token().expect("load").as_deref(), Some("abc.def"));

        store.clear_token().expect("clear");
        store.clear_token().expect("clear twice");
        assert!(store.load_token().expect("load").is_none());
    }

    #[test]
    fn flag_beats_env_beats_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AuthStore::new(dir.path().join("secrets.json"));
        store.store_token("from-file").expect("store");

        let token = store.resolve_token_with(Some("from-flag"), Some("from-env")).expect("resolve");
        assert_eq!(token.as_deref(), Some("from-flag"));
        let token = store.resolve_token_with(Some("   "), Some(" from-env ")).expect("resolve");
        assert_eq!(token.as_deref(), Some("from-env"));
        let token = store.resolve_token_with(None, Some("")).expect("resolve");
        assert_eq!(token.as_deref(), Some("from-file"));
    }

    #[test]
    fn nothing_configured_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AuthStore::new(dir.path().join("missing.json"));
        assert!(store.resolve_token_with(None, None).expect("resolve").is_none());
    }
}
