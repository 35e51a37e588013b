//! Everything a command needs, built once at startup and passed explicitly.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ApiClient;
use crate::config::AppConfig;
use crate::db::{self, DbState};
use crate::error::ApiError;
use crate::grouping::GroupCache;
use crate::session::{self, Role, Session};
use crate::slips::SlipOptions;
use crate::storage::SessionStore;

pub struct AppContext {
    pub config: AppConfig,
    pub db: DbState,
    pub session: Option<Session>,
    pub cancel: CancellationToken,
    /// Keep the session token out of the OS keyring.
    local_session_only: bool,
}

impl AppContext {
    /// Open the local store under `data_dir`, resolve configuration and
    /// restore any stored session.
    pub fn open(data_dir: PathBuf, api_base_override: Option<String>) -> Result<Self, String> {
        let db = db::init(&data_dir)?;
        Ok(Self::with_store(data_dir, db, api_base_override, false))
    }

    /// Build around an existing store. `local_session_only` keeps the token in
    /// `local_settings` instead of the OS keyring.
    pub fn with_store(
        data_dir: PathBuf,
        db: DbState,
        api_base_override: Option<String>,
        local_session_only: bool,
    ) -> Self {
        let mut config = AppConfig::load(data_dir, &db);
        if let Some(base) = api_base_override.filter(|b| !b.trim().is_empty()) {
            config.api_base = base;
            config.api_base_from_cli = true;
        }
        let mut ctx = Self {
            config,
            db,
            session: None,
            cancel: CancellationToken::new(),
            local_session_only,
        };
        ctx.session = session::restore(&ctx.session_store());
        debug!(
            api_base = %ctx.config.api_base,
            logged_in = ctx.session.is_some(),
            "context ready"
        );
        ctx
    }

    pub fn session_store(&self) -> SessionStore<'_> {
        if self.local_session_only {
            SessionStore::local_only(&self.db)
        } else {
            SessionStore::new(&self.db)
        }
    }

    pub fn group_cache(&self) -> GroupCache<'_> {
        GroupCache::new(&self.db)
    }

    pub fn slip_options(&self) -> SlipOptions {
        SlipOptions {
            show_warnings: self.config.slip_warnings,
            ..SlipOptions::default()
        }
    }

    /// Client without credentials, for login.
    pub fn anonymous_client(&self) -> Result<ApiClient, ApiError> {
        ApiClient::new(&self.config.api_base, self.config.timeout)
    }

    /// Authenticated client, failing unless the session has `required`.
    pub fn client_for(&self, required: Role) -> Result<ApiClient, ApiError> {
        let session = session::require_role(self.session.as_ref(), required)?;
        Ok(self.anonymous_client()?.with_token(session.token()))
    }
}
