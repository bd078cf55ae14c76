use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore, cookie::SameSite};

use crate::{
    error::{AppError, AppResult},
    models::{Notices, Page, User, UserId},
    repository::RepositoryState,
};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "wanderlust.sid";

/// Sessions expire after seven days without activity.
const SESSION_EXPIRY_DAYS: i64 = 7;

/// Where a successful login lands when no return target was remembered.
pub const DEFAULT_LANDING: &str = "/listings";

mod keys {
    pub const PRINCIPAL: &str = "principal";
    pub const NOTICES: &str = "notices";
    pub const RETURN_TO: &str = "return_to";
}

/// LoginState
///
/// Where a session stands in the redirect-after-login flow.
///
/// `Unauthenticated` becomes `PendingRedirect` when the Identity Gate turns a request away and
/// remembers its path; either becomes `Authenticated` on a successful credential check, which
/// consumes the remembered path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Unauthenticated,
    PendingRedirect(String),
    Authenticated(UserId),
}

/// SessionContext
///
/// Per-request handle on the session state the gate chain reads and writes: the principal,
/// the one-shot notice list and the read-once return target. It is passed explicitly to every
/// gate instead of being reached through ambient state.
#[derive(Clone, Debug)]
pub struct SessionContext {
    session: Session,
}

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    // --- Principal ---

    pub async fn principal(&self) -> AppResult<Option<UserId>> {
        Ok(self.session.get::<UserId>(keys::PRINCIPAL).await?)
    }

    /// Resolves the principal to a user record. A principal whose user no longer exists is
    /// treated as anonymous.
    pub async fn current_user(&self, repo: &RepositoryState) -> AppResult<Option<User>> {
        match self.principal().await? {
            Some(id) => Ok(repo.get_user(id).await?),
            None => Ok(None),
        }
    }

    pub async fn login_state(&self) -> AppResult<LoginState> {
        if let Some(id) = self.principal().await? {
            return Ok(LoginState::Authenticated(id));
        }
        Ok(match self.session.get::<String>(keys::RETURN_TO).await? {
            Some(path) => LoginState::PendingRedirect(path),
            None => LoginState::Unauthenticated,
        })
    }

    /// log_in
    ///
    /// Binds the session to `user`, rotating the session id first. Consumes the remembered
    /// return target and returns where the client should be sent next.
    pub async fn log_in(&self, user: &User) -> AppResult<String> {
        let target = self
            .take_return_to()
            .await?
            .unwrap_or_else(|| DEFAULT_LANDING.to_string());
        self.session.cycle_id().await?;
        self.session.insert(keys::PRINCIPAL, user.id).await?;
        tracing::info!(user_id = %user.id, %target, "user logged in");
        Ok(target)
    }

    pub async fn log_out(&self) -> AppResult<()> {
        if let Some(id) = self.session.remove::<UserId>(keys::PRINCIPAL).await? {
            tracing::info!(user_id = %id, "user logged out");
        }
        self.session.cycle_id().await?;
        Ok(())
    }

    // --- Return target ---

    pub async fn remember_return_to(&self, path: &str) -> AppResult<()> {
        self.session.insert(keys::RETURN_TO, path).await?;
        Ok(())
    }

    pub async fn take_return_to(&self) -> AppResult<Option<String>> {
        Ok(self.session.remove::<String>(keys::RETURN_TO).await?)
    }

    // --- Notices ---

    pub async fn flash_success(&self, message: impl Into<String>) -> AppResult<()> {
        let mut notices = self.pending_notices().await?;
        notices.success.push(message.into());
        self.session.insert(keys::NOTICES, notices).await?;
        Ok(())
    }

    pub async fn flash_error(&self, message: impl Into<String>) -> AppResult<()> {
        let mut notices = self.pending_notices().await?;
        notices.error.push(message.into());
        self.session.insert(keys::NOTICES, notices).await?;
        Ok(())
    }

    /// Removes and returns every queued notice. Each notice is delivered once.
    pub async fn take_notices(&self) -> AppResult<Notices> {
        Ok(self
            .session
            .remove::<Notices>(keys::NOTICES)
            .await?
            .unwrap_or_default())
    }

    /// Builds a page view model, consuming the queued notices.
    pub async fn page<T>(&self, repo: &RepositoryState, data: T) -> AppResult<Page<T>> {
        let notices = self.take_notices().await?;
        let current_user = self.current_user(repo).await?;
        Ok(Page::new(notices, current_user, data))
    }

    async fn pending_notices(&self) -> AppResult<Notices> {
        Ok(self
            .session
            .get::<Notices>(keys::NOTICES)
            .await?
            .unwrap_or_default())
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(Self::new)
            .ok_or_else(|| AppError::Internal("session layer is not installed".to_string()))
    }
}

/// session_layer
///
/// Session middleware shared by production (Postgres store) and tests (memory store):
/// HttpOnly, `SameSite=Lax`, seven days of inactivity, `Secure` when serving over HTTPS.
pub fn session_layer<Store>(store: Store, secure: bool) -> SessionManagerLayer<Store>
where
    Store: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::days(SESSION_EXPIRY_DAYS),
        ))
        .with_secure(secure)
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
