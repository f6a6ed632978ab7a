// Auth form validation and session persistence between runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, Session};

pub const MIN_PASSWORD_LEN: usize = 6;

pub const SIGN_IN_OK: &str = "¡Inicio de sesión exitoso!";
pub const SIGN_UP_OK: &str = "¡Registro exitoso! Revisa tu email para confirmar tu cuenta.";
pub const RESET_SENT: &str = "Se ha enviado un enlace de recuperación a tu email";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Por favor ingresa tu email")]
    MissingEmail,

    #[error("Por favor ingresa tu contraseña")]
    MissingPassword,

    #[error("Las contraseñas no coinciden")]
    PasswordMismatch,

    #[error("La contraseña debe tener al menos 6 caracteres")]
    PasswordTooShort,
}

pub fn validate_sign_in(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() {
        return Err(AuthError::MissingEmail);
    }
    if password.is_empty() {
        return Err(AuthError::MissingPassword);
    }
    Ok(())
}

/// Matching passwords are checked before length, so a short mismatched pair
/// reports the mismatch.
pub fn validate_sign_up(email: &str, password: &str, confirm: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() {
        return Err(AuthError::MissingEmail);
    }
    if password != confirm {
        return Err(AuthError::PasswordMismatch);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::PasswordTooShort);
    }
    Ok(())
}

pub fn validate_reset(email: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() {
        return Err(AuthError::MissingEmail);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------------

/// JSON file holding the last session for one backend.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    /// `<data dir>/session-<backend>.json` in the platform data directory.
    pub fn default_location(backend_name: &str) -> Option<Self> {
        let dirs = ProjectDirs::from("cl", "finanzas", "finanzas")?;
        Some(Self::new(
            dirs.data_dir().join(format!("session-{backend_name}.json")),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is no session; an unreadable one is discarded.
    pub fn load(&self) -> anyhow::Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        match serde_json::from_str(&text) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %self.path.display(), "discarding corrupt session file: {e}");
                self.clear()?;
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &Session) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(session).context("serializing session")?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    pub fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}

/// Install the stored session on `backend`, refreshing it first when it has
/// expired. Returns the active session, or `None` when the user must sign in.
pub async fn restore_session(
    backend: &dyn Backend,
    store: &SessionStore,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Session>> {
    let Some(stored) = store.load()? else {
        return Ok(None);
    };

    let session = if stored.is_expired(now) {
        match backend.refresh_session(&stored.refresh_token).await {
            Ok(fresh) => {
                store.save(&fresh)?;
                fresh
            }
            Err(BackendError::SessionExpired) | Err(BackendError::InvalidCredentials) => {
                info!("stored session could not be refreshed; sign-in required");
                store.clear()?;
                backend.set_session(None);
                return Ok(None);
            }
            Err(e) => return Err(e).context("refreshing stored session"),
        }
    } else {
        stored
    };

    backend.set_session(Some(session.clone()));
    info!(user_id = %session.user.id, backend = backend.name(), "session restored");
    Ok(Some(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalBackend, SignUpOutcome};
    use chrono::Duration;

    fn temp_store(name: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(format!("finanzas_auth_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        SessionStore::new(dir.join("nested").join("session.json"))
    }

    #[test]
    fn sign_up_rules() {
        assert_eq!(validate_sign_up("", "123456", "123456"), Err(AuthError::MissingEmail));
        assert_eq!(validate_sign_up("a@b.cl", "abc", "abd"), Err(AuthError::PasswordMismatch));
        assert_eq!(validate_sign_up("a@b.cl", "abc", "abc"), Err(AuthError::PasswordTooShort));
        assert_eq!(validate_sign_up("a@b.cl", "ñandú1", "ñandú1"), Ok(()));
        assert_eq!(
            AuthError::PasswordTooShort.to_string(),
            "La contraseña debe tener al menos 6 caracteres"
        );
    }

    #[test]
    fn reset_and_sign_in_need_email() {
        assert_eq!(validate_reset("  "), Err(AuthError::MissingEmail));
        assert_eq!(AuthError::MissingEmail.to_string(), "Por favor ingresa tu email");
        assert_eq!(validate_sign_in("a@b.cl", ""), Err(AuthError::MissingPassword));
        assert!(validate_sign_in("a@b.cl", "x").is_ok());
    }

    #[test]
    fn store_roundtrip_and_clear() {
        let store = temp_store("roundtrip");
        assert!(store.load().unwrap().is_none());

        let session = Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: None,
            user: finanzas_core::model::User {
                id: "u-1".into(),
                email: None,
            },
        };
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_discarded() {
        let store = temp_store("corrupt");
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn restore_refreshes_expired_session() {
        let backend = LocalBackend::open_in_memory().unwrap();
        let SignUpOutcome::SignedIn(mut session) =
            backend.sign_up("ana@example.com", "secreto").await.unwrap()
        else {
            panic!("expected session");
        };
        backend.set_session(None);

        let store = temp_store("restore");
        session.expires_at = Some(Utc::now() - Duration::hours(2));
        store.save(&session).unwrap();

        let restored = restore_session(&backend, &store, Utc::now())
            .await
            .unwrap()
            .expect("refreshed session");
        assert_ne!(restored.access_token, session.access_token);
        assert_eq!(restored.user.id, session.user.id);
        assert_eq!(backend.current_session(), Some(restored.clone()));
        assert_eq!(store.load().unwrap(), Some(restored));
    }

    #[tokio::test]
    async fn restore_with_revoked_refresh_token_signs_out() {
        let backend = LocalBackend::open_in_memory().unwrap();
        let store = temp_store("revoked");
        store
            .save(&Session {
                access_token: "stale".into(),
                refresh_token: "unknown".into(),
                expires_at: Some(Utc::now() - Duration::hours(1)),
                user: finanzas_core::model::User {
                    id: "ghost".into(),
                    email: None,
                },
            })
            .unwrap();

        assert!(restore_session(&backend, &store, Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(!store.path().exists());
        assert!(backend.current_session().is_none());
    }
}
