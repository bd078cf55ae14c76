use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::sync::LazyLock;
use thiserror::Error;

use crate::{
    error::{AppError, RepositoryError},
    gates::Halt,
    models::{Credentials, NewUser, User, UserId},
    repository::RepositoryState,
    session::SessionContext,
};

pub const LOGIN_REQUIRED: &str = "You must be logged in to do that.";

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request. Handlers compare `id` against listing
/// owners and review authors; nothing else about the user is trusted for authorization.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub username: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

/// AuthUser Extractor Implementation (Identity Gate)
///
/// Resolves the session principal to an existing user. The principal is only trusted if the
/// user row still exists, so a deleted account behaves like an anonymous session.
///
/// Rejection: remembers the requested path (with its query) for replay after login, queues
/// `You must be logged in to do that.` and redirects to `/login`.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
{
    type Rejection = Halt;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let ctx = SessionContext::from_request_parts(parts, state).await?;

        if let Some(user) = ctx.current_user(&repo).await? {
            return Ok(user.into());
        }

        let requested = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| parts.uri.path());
        tracing::debug!(path = %requested, "identity gate: no principal, redirecting to login");

        ctx.remember_return_to(requested).await?;
        ctx.flash_error(LOGIN_REQUIRED).await?;
        Err(Halt::to("/login"))
    }
}

// --- Credentials ---

/// AuthError
///
/// Outcomes of signup and login. The first four are shown to the user as notices; the rest
/// are faults.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No username was given")]
    MissingUsername,

    #[error("No password was given")]
    MissingPassword,

    #[error("A user with the given username is already registered")]
    UserExists,

    #[error("Password or username is incorrect")]
    IncorrectCredentials,

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl AuthError {
    /// Whether the message is meant for the user rather than the logs.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AuthError::MissingUsername
                | AuthError::MissingPassword
                | AuthError::UserExists
                | AuthError::IncorrectCredentials
        )
    }
}

impl From<RepositoryError> for AuthError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(_) => AuthError::UserExists,
            other => AuthError::Repository(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Repository(e) => AppError::Repository(e),
            AuthError::Hash(e) => AppError::Internal(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

/// Hashes a password with Argon2id and a fresh random salt (PHC string format).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Verifies a password against a stored PHC hash. An unparsable hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

static ABSENT_USER_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("wanderlust: no such user").unwrap_or_default());

/// An Argon2id hash with the same cost as real ones, checked in place of a missing user's.
/// No submitted password is expected to match it.
pub fn absent_user_hash() -> &'static str {
    ABSENT_USER_HASH.as_str()
}

/// register
///
/// Creates an account. Usernames are unique; the store's unique constraint is the arbiter.
pub async fn register(repo: &RepositoryState, credentials: Credentials) -> Result<User, AuthError> {
    let username = credentials.username.trim();
    if username.is_empty() {
        return Err(AuthError::MissingUsername);
    }
    if credentials.password.is_empty() {
        return Err(AuthError::MissingPassword);
    }

    let password_hash = hash_password(&credentials.password)?;
    let user = repo
        .create_user(NewUser {
            username: username.to_string(),
            email: credentials.email.trim().to_string(),
            password_hash,
        })
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// authenticate
///
/// Checks a username/password pair. Unknown users and wrong passwords fail identically.
pub async fn authenticate(
    repo: &RepositoryState,
    username: &str,
    password: &str,
) -> Result<User, AuthError> {
    if username.trim().is_empty() {
        return Err(AuthError::MissingUsername);
    }
    if password.is_empty() {
        return Err(AuthError::MissingPassword);
    }

    // Unknown users still cost one Argon2 verify, so both failures take as long.
    let record = repo.find_user_by_username(username.trim()).await?;
    let stored_hash = record
        .as_ref()
        .map_or(absent_user_hash(), |record| record.password_hash.as_str());
    let verified = verify_password(password, stored_hash);

    match record {
        Some(record) if verified => Ok(record.user),
        _ => {
            tracing::info!(%username, "login rejected");
            Err(AuthError::IncorrectCredentials)
        }
    }
}
