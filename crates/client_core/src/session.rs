use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::warn;

/// Holder of the opaque session token handed out by the auth endpoints.
///
/// The store is injected into the client rather than read from ambient
/// global state, so tests and embedders control exactly where credentials
/// live. Implementations must be infallible: a broken backing store
/// degrades to "no token", it never aborts a request.
pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str);
    fn clear_token(&self);

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    fn set_token(&self, token: &str) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(token.to_string());
        }
    }

    fn clear_token(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
    }
}

/// Token store persisted to a single file so separate CLI invocations share
/// one session. The file holds the bare token, nothing else.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cached: Mutex<Option<String>>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = read_token_file(&path);
        Self {
            path,
            cached: Mutex::new(cached),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_token_file(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let token = raw.trim();
            if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            }
        }
        Err(_) => None,
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        self.cached.lock().ok().and_then(|guard| guard.clone())
    }

    fn set_token(&self, token: &str) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(token.to_string());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = fs::create_dir_all(parent) {
                    warn!("failed to create token directory {}: {err}", parent.display());
                }
            }
        }
        if let Err(err) = fs::write(&self.path, token) {
            warn!("failed to persist session token to {}: {err}", self.path.display());
        }
    }

    fn clear_token(&self) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!("failed to remove session token {}: {err}", self.path.display());
            }
        }
    }
}
