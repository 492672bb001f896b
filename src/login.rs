use crate::app::AppState;
use crate::db::Database;
use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// User data structure representing a registered survey owner
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Username (unique identifier for the user)
    pub username: String,

    /// Email address
    pub email: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,
}

/// Credential data for login and registration
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,

    /// Email address (ignored for login, required for registration)
    #[serde(default)]
    pub email: String,

    /// Password in plaintext (only transmitted, never stored)
    pub password: String,
}

/// Messages shown on the login and signup pages.
#[derive(Debug, Default, Deserialize)]
pub struct PageMessages {
    pub error: Option<String>,
    pub registered: Option<bool>,
}

/// Authenticated user, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated user
    pub user_id: String,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

/// Active sessions of this server process.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    lifetime: Duration,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            lifetime,
        }
    }

    /// Create a session for `username` and return its id.
    pub fn create(&self, username: &str) -> String {
        let session_id = Uuid::new_v4().to_string();
        let session = Session {
            user_id: username.to_string(),
            expires_at: SystemTime::now() + self.lifetime,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, s| s.expires_at > SystemTime::now());
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// The username for a live session, `None` if unknown or expired.
    pub fn validate(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.user_id.clone())
    }

    pub fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
    }
}

/// Register a new user
///
/// The password is hashed before storage.
///
/// # Errors
/// * `InvalidInput` if a field is empty, the username has characters other
///   than letters, digits, `-` and `_`, or the username or email is taken
pub fn register_user(db: &Database, username: &str, email: &str, password: &str) -> Result<()> {
    let username = username.trim();
    let email = email.trim();
    if username.is_empty() || password.is_empty() || email.is_empty() {
        return Err(AppError::InvalidInput(
            "Username, email and password cannot be empty".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::InvalidInput(
            "Username may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }

    let conn = db.connect()?;
    let username_taken: Option<String> = conn
        .query_row(
            "SELECT username FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    if username_taken.is_some() {
        return Err(AppError::InvalidInput("Username already exists".to_string()));
    }

    let email_taken: Option<String> = conn
        .query_row(
            "SELECT username FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )
        .optional()?;
    if email_taken.is_some() {
        return Err(AppError::InvalidInput(
            "Email address is already registered".to_string(),
        ));
    }

    let password_hash = hash_password(password)?;
    conn.execute(
        "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
        params![username, email, password_hash],
    )?;

    log::info!("Registered user {}", username);
    Ok(())
}

pub fn find_user(db: &Database, username: &str) -> Result<Option<User>> {
    let user = db
        .connect()?
        .query_row(
            "SELECT username, email, password_hash FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok(User {
                    username: row.get(0)?,
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Verify user credentials
///
/// # Returns
/// * `Result<bool>` - True if credentials are valid, false if invalid
pub fn verify_user(db: &Database, username: &str, password: &str) -> Result<bool> {
    match find_user(db, username.trim())? {
        Some(user) => verify_password(password, &user.password_hash),
        None => Ok(false),
    }
}

/// Hash a password using Argon2id with a random salt.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a plaintext password against a stored Argon2 hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn auth_page(
    state: &AppState,
    name: &str,
    title: &str,
    error: Option<String>,
    notice: Option<&str>,
) -> Html<String> {
    let body = state
        .renderer
        .render(
            name,
            &serde_json::json!({ "title": title, "error": error, "notice": notice }),
        )
        .unwrap_or_else(|e| state.renderer.error_page("Error", &e.to_string()));
    Html(body)
}

/// Serve the login page
pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    Query(messages): Query<PageMessages>,
) -> Html<String> {
    let notice = messages
        .registered
        .unwrap_or(false)
        .then_some("Account created, please log in.");
    auth_page(&state, "login", "Log in", messages.error, notice)
}

/// Serve the signup page
pub async fn serve_signup_page(
    State(state): State<Arc<AppState>>,
    Query(messages): Query<PageMessages>,
) -> Html<String> {
    auth_page(&state, "signup", "Sign up", messages.error, None)
}

/// Handle user login requests
///
/// Validates credentials and creates a session if valid.
///
/// # Returns
/// * `Response` - Redirect to the dashboard if successful, the login page with
///   an error otherwise
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    match verify_user(&state.db, &credentials.username, &credentials.password) {
        Ok(true) => {
            let session_id = state.sessions.create(credentials.username.trim());
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true);
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Ok(false) => (
            StatusCode::UNAUTHORIZED,
            auth_page(
                &state,
                "login",
                "Log in",
                Some("Invalid username or password".to_string()),
                None,
            ),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handle user registration
///
/// # Returns
/// * `Redirect` - To the login page on success, back to the signup page with
///   the reason otherwise
pub async fn handle_signup(
    State(state): State<Arc<AppState>>,
    Form(credentials): Form<UserCredentials>,
) -> Redirect {
    match register_user(
        &state.db,
        &credentials.username,
        &credentials.email,
        &credentials.password,
    ) {
        Ok(()) => Redirect::to("/login?registered=true"),
        Err(AppError::InvalidInput(reason)) => {
            Redirect::to(&format!("/signup?error={}", urlencoding::encode(&reason)))
        }
        Err(e) => {
            log::error!("Signup failed: {}", e);
            Redirect::to("/signup?error=Server+error")
        }
    }
}

/// Handle user logout
///
/// Drops the session and clears the cookie.
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login"))
}

/// Authentication middleware
///
/// Lets the request through with a [`CurrentUser`] extension when the session
/// cookie is valid, otherwise redirects to the login page.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        if let Some(username) = state.sessions.validate(session_cookie.value()) {
            request.extensions_mut().insert(CurrentUser(username));
            return next.run(request).await;
        }
    }

    Redirect::to("/login").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_verify() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.sqlite")).unwrap();

        register_user(&db, "ann", "ann@example.com", "hunter2").unwrap();
        assert!(verify_user(&db, "ann", "hunter2").unwrap());
        assert!(!verify_user(&db, "ann", "wrong").unwrap());
        assert!(!verify_user(&db, "nobody", "hunter2").unwrap());

        let stored = find_user(&db, "ann").unwrap().unwrap();
        assert_ne!(stored.password_hash, "hunter2");
    }

    #[test]
    fn duplicate_and_invalid_registrations_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.sqlite")).unwrap();
        register_user(&db, "ann", "ann@example.com", "pw").unwrap();

        for (user, email, pw) in [
            ("ann", "other@example.com", "pw"),
            ("bob", "ann@example.com", "pw"),
            ("", "x@example.com", "pw"),
            ("bad name", "y@example.com", "pw"),
        ] {
            assert!(matches!(
                register_user(&db, user, email, pw),
                Err(AppError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn corrupt_stored_hash_is_an_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.sqlite")).unwrap();
        db.connect()
            .unwrap()
            .execute(
                "INSERT INTO users (username, email, password_hash) VALUES ('ann', 'a@x.com', 'garbage')",
                [],
            )
            .unwrap();

        let err = verify_user(&db, "ann", "hunter2").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn sessions_expire_and_can_be_removed() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create("ann");
        assert_eq!(store.validate(&id).as_deref(), Some("ann"));
        store.remove(&id);
        assert!(store.validate(&id).is_none());

        let expired = SessionStore::new(Duration::ZERO);
        let id = expired.create("ann");
        assert!(expired.validate(&id).is_none());
        assert!(store.validate("not-a-session").is_none());
    }
}
