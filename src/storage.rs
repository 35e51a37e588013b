//! Session credential storage.
//!
//! The bearer token goes to the OS credential store (Windows Credential
//! Manager, macOS Keychain, Secret Service on Linux) through `keyring`. When
//! the platform store is unavailable the token falls back to the `session`
//! category of `local_settings`. Role and email are not secret and always
//! live in `local_settings`.

use keyring::Entry;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::db::{self, DbState};

const SERVICE_NAME: &str = "catering-desk";
pub const SESSION_CATEGORY: &str = "session";

const KEY_TOKEN: &str = "token";
const KEY_ROLE: &str = "role";
const KEY_EMAIL: &str = "email";

// ---------------------------------------------------------------------------
// Keyring helpers
// ---------------------------------------------------------------------------

/// Read one entry from the OS keyring. `None` when absent or unreadable.
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())
}

/// Delete a keyring entry. Missing entries are not an error.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// What the login endpoint returned, as persisted between runs.
#[derive(Clone)]
pub struct StoredSession {
    pub token: Zeroizing<String>,
    pub role: String,
    pub email: String,
}

impl std::fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSession")
            .field("role", &self.role)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Session persistence over the keyring with a local-store fallback.
pub struct SessionStore<'a> {
    db: &'a DbState,
    use_keyring: bool,
}

impl<'a> SessionStore<'a> {
    pub fn new(db: &'a DbState) -> Self {
        Self {
            db,
            use_keyring: true,
        }
    }

    /// Store everything in `local_settings`, bypassing the OS keyring.
    pub fn local_only(db: &'a DbState) -> Self {
        Self {
            db,
            use_keyring: false,
        }
    }

    fn local_get(&self, key: &str) -> Option<String> {
        let conn = self.db.conn.lock().ok()?;
        db::get_setting(&conn, SESSION_CATEGORY, key).filter(|v| !v.is_empty())
    }

    fn local_set(&self, key: &str, value: &str) -> Result<(), String> {
        let conn = self.db.conn.lock().map_err(|e| e.to_string())?;
        db::set_setting(&conn, SESSION_CATEGORY, key, value)
    }

    pub fn save(&self, session: &StoredSession) -> Result<(), String> {
        let mut in_keyring = false;
        if self.use_keyring {
            match set_credential(KEY_TOKEN, session.token.as_str()) {
                Ok(()) => in_keyring = true,
                Err(e) => warn!(error = %e, "keyring unavailable, storing token locally"),
            }
        }
        if in_keyring {
            // Drop any stale fallback copy.
            let conn = self.db.conn.lock().map_err(|e| e.to_string())?;
            db::delete_setting(&conn, SESSION_CATEGORY, KEY_TOKEN)?;
        } else {
            self.local_set(KEY_TOKEN, session.token.as_str())?;
        }
        self.local_set(KEY_ROLE, &session.role)?;
        self.local_set(KEY_EMAIL, &session.email)?;
        info!(email = %session.email, role = %session.role, in_keyring, "session stored");
        Ok(())
    }

    pub fn load(&self) -> Option<StoredSession> {
        let token = self
            .use_keyring
            .then(|| get_credential(KEY_TOKEN))
            .flatten()
            .or_else(|| self.local_get(KEY_TOKEN))?;
        Some(StoredSession {
            token: Zeroizing::new(token),
            role: self.local_get(KEY_ROLE).unwrap_or_default(),
            email: self.local_get(KEY_EMAIL).unwrap_or_default(),
        })
    }

    pub fn clear(&self) -> Result<(), String> {
        if self.use_keyring {
            if let Err(e) = delete_credential(KEY_TOKEN) {
                warn!(error = %e, "keyring: failed to delete token");
            }
        }
        let conn = self.db.conn.lock().map_err(|e| e.to_string())?;
        db::delete_all_settings(&conn, SESSION_CATEGORY)?;
        info!("session cleared");
        Ok(())
    }
}
