use diesel::PgConnection;

use crate::core::config::AppConfig;
use crate::core::error::EservicesError;
use crate::core::rate_limit::RateLimitState;
use crate::core::shared::utils::DbPool;
use crate::email::Mailer;
use crate::security::csrf::CsrfManager;
use crate::security::session::SessionKeys;

pub struct AppState {
    pub conn: DbPool,
    pub config: AppConfig,
    pub keys: SessionKeys,
    pub csrf: CsrfManager,
    pub mailer: Mailer,
    pub rate_limits: RateLimitState,
}

impl AppState {
    pub fn new(config: AppConfig, conn: DbPool) -> Self {
        let keys = SessionKeys::new(
            &config.security.secret_key,
            config.security.session_hours,
            config.security.secure_cookies,
        );
        let csrf = CsrfManager::new(config.security.secret_key.as_bytes());
        let mailer = Mailer::new(&config.email);
        let rate_limits = RateLimitState::new(config.rate_limit.enabled);

        Self {
            conn,
            config,
            keys,
            csrf,
            mailer,
            rate_limits,
        }
    }

    /// Runs blocking diesel work on the blocking pool with a pooled connection.
    pub async fn db<F, T>(&self, f: F) -> Result<T, EservicesError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, EservicesError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("conn", &"DbPool")
            .field("config", &self.config.server)
            .field("mailer", &self.mailer)
            .field("rate_limits", &self.rate_limits)
            .finish_non_exhaustive()
    }
}
