//! Logged-in session and role gating.
//!
//! A `Session` is built once at startup from whatever the store holds and is
//! passed explicitly to every command. Tokens that are JWTs carrying an `exp`
//! claim in the past are treated as logged out.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::storage::{SessionStore, StoredSession};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Unknown role strings map to the least privileged role.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

#[derive(Clone)]
pub struct Session {
    token: Zeroizing<String>,
    pub role: Role,
    pub email: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(token: &str, role: Role, email: &str) -> Self {
        Self {
            token: Zeroizing::new(token.to_string()),
            role,
            email: email.to_string(),
        }
    }

    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    /// Expiry from the token's JWT `exp` claim, if it has one.
    pub fn expires_at(&self) -> Option<i64> {
        jwt_expiry(self.token())
    }

    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now_secs)
    }

    fn to_stored(&self) -> StoredSession {
        StoredSession {
            token: self.token.clone(),
            role: self.role.as_str().to_string(),
            email: self.email.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode the `exp` claim of a JWT without verifying it.
pub fn jwt_expiry(token: &str) -> Option<i64> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp").and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
    })
}

/// Fail unless a session exists with at least `required` privileges.
pub fn require_role(session: Option<&Session>, required: Role) -> Result<&Session, ApiError> {
    let session = session.ok_or(ApiError::NotLoggedIn)?;
    if required == Role::Admin && session.role != Role::Admin {
        return Err(ApiError::Forbidden {
            required: required.as_str().to_string(),
            actual: session.role.as_str().to_string(),
        });
    }
    Ok(session)
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Restore the stored session, discarding it when the token has expired.
pub fn restore(store: &SessionStore<'_>) -> Option<Session> {
    let stored = store.load()?;
    let session = Session {
        token: stored.token,
        role: Role::parse(&stored.role),
        email: stored.email,
    };
    if session.is_expired_at(Utc::now().timestamp()) {
        warn!(email = %session.email, "stored session has expired, please log in again");
        if let Err(e) = store.clear() {
            warn!(error = %e, "failed to clear expired session");
        }
        return None;
    }
    Some(session)
}

/// Log in against the API and persist the result.
pub async fn login(
    client: &ApiClient,
    store: &SessionStore<'_>,
    email: &str,
    password: &str,
) -> Result<Session, crate::error::DeskError> {
    let resp = client.login(email, password).await?;
    let session = Session::new(&resp.token, Role::parse(&resp.user.role), &resp.user.email);
    store
        .save(&session.to_stored())
        .map_err(crate::error::DeskError::Storage)?;
    Ok(session)
}

pub fn logout(store: &SessionStore<'_>) -> Result<(), String> {
    store.clear()?;
    info!("logged out");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_server::{serve, Canned};

    fn jwt_with(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[test]
    fn decodes_exp_claim() {
        let token = jwt_with(r#"{"sub":1,"exp":1700000000}"#);
        assert_eq!(jwt_expiry(&token), Some(1_700_000_000));
        assert_eq!(jwt_expiry("opaque-token"), None);
        assert_eq!(jwt_expiry(&jwt_with(r#"{"sub":1}"#)), None);
    }

    #[test]
    fn expired_session_is_discarded_on_restore() {
        let db = crate::db::init_in_memory().expect("db");
        let store = SessionStore::local_only(&db);
        let expired = Session::new(&jwt_with(r#"{"exp":1000}"#), Role::Admin, "a@example.com");
        store.save(&expired.to_stored()).expect("save");
        assert!(restore(&store).is_none());
        assert!(store.load().is_none());

        let fresh = Session::new(&jwt_with(r#"{"exp":32503680000}"#), Role::User, "u@example.com");
        store.save(&fresh.to_stored()).expect("save");
        let restored = restore(&store).expect("session");
        assert_eq!(restored.role, Role::User);
        assert_eq!(restored.email, "u@example.com");
    }

    #[test]
    fn role_gating() {
        let admin = Session::new("t", Role::Admin, "a@example.com");
        let user = Session::new("t", Role::User, "u@example.com");
        assert!(require_role(Some(&admin), Role::Admin).is_ok());
        assert!(require_role(Some(&user), Role::User).is_ok());
        assert!(matches!(
            require_role(Some(&user), Role::Admin),
            Err(ApiError::Forbidden { .. })
        ));
        assert!(matches!(
            require_role(None, Role::User),
            Err(ApiError::NotLoggedIn)
        ));
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
        assert_eq!(Role::parse("manager"), Role::User);
    }

    #[tokio::test]
    async fn login_stores_token_role_and_email() {
        let (base, handle) = serve(vec![Canned {
            status: 200,
            body: r#"{"token":"abc","user":{"role":"admin","email":"chef@example.com"}}"#.into(),
        }])
        .await;
        let db = crate::db::init_in_memory().expect("db");
        let store = SessionStore::local_only(&db);
        let client = ApiClient::new(&base, crate::api::DEFAULT_TIMEOUT).expect("client");

        let session = login(&client, &store, "chef@example.com", "pw").await.expect("login");
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.token(), "abc");

        let requests = handle.await.expect("server");
        assert!(requests[0].starts_with("POST /api/auth/login"));
        let stored = store.load().expect("stored");
        assert_eq!(stored.token.as_str(), "abc");

        logout(&store).expect("logout");
        assert!(store.load().is_none());
    }

    #[tokio::test]
    async fn bad_credentials_surface_server_message() {
        let (base, handle) = serve(vec![Canned {
            status: 401,
            body: r#"{"error":"Invalid credentials"}"#.into(),
        }])
        .await;
        let db = crate::db::init_in_memory().expect("db");
        let store = SessionStore::local_only(&db);
        let client = ApiClient::new(&base, crate::api::DEFAULT_TIMEOUT).expect("client");
        let err = login(&client, &store, "x@example.com", "bad").await.expect_err("fails");
        assert_eq!(err.to_string(), "Invalid credentials");
        assert!(store.load().is_none());
        handle.await.expect("server");
    }
}
