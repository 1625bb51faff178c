use cookie::Cookie;
use hyper::{header, HeaderMap};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{SessionStore, UserRecord};

/// Session cookie name
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// Where the logged-in guard sends anonymous clients
pub const LOGIN_PATH: &str = "/login";

/// Landing page for authenticated users
pub const USER_PAGE_PATH: &str = "/users/user-page";

/// Pre-handler check attached to each route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Always passes
    None,
    /// Passes only with an authenticated session
    LoggedIn,
    /// Passes only without an authenticated session
    LoggedOut,
}

impl Guard {
    /// Returns the redirect target when the guard rejects the request
    pub fn evaluate(self, session: &RequestSession) -> Option<&'static str> {
        match (self, session.is_authenticated()) {
            (Guard::LoggedIn, false) => Some(LOGIN_PATH),
            (Guard::LoggedOut, true) => Some(USER_PAGE_PATH),
            _ => None,
        }
    }
}

/// Session state resolved for one request
#[derive(Debug, Clone, Default)]
pub struct RequestSession {
    /// Value of the session cookie, if the client sent one
    pub session_id: Option<String>,
    pub current_user: Option<UserRecord>,
}

impl RequestSession {
    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }
}

/// Outcome of running a guard
#[derive(Debug)]
pub enum Access {
    Pass(RequestSession),
    Redirect(&'static str),
}

/// Session-cookie authentication shared by all routes
#[derive(Clone)]
pub struct SessionAuth {
    session_store: Arc<dyn SessionStore>,
    cookie_max_age: Duration,
    cookie_secure: bool,
}

impl SessionAuth {
    pub fn new(session_store: Arc<dyn SessionStore>, cookie_max_age: Duration, cookie_secure: bool) -> Self {
        Self {
            session_store,
            cookie_max_age,
            cookie_secure,
        }
    }

    /// Extracts session ID from cookie header
    pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|pair| Cookie::parse(pair.trim()).ok())
            .find(|cookie| cookie.name() == SESSION_COOKIE_NAME && !cookie.value().is_empty())
            .map(|cookie| cookie.value().to_string())
    }

    /// Resolves the request's session. Store failures read as anonymous.
    #[tracing::instrument(skip_all, fields(authenticated))]
    pub async fn load(&self, headers: &HeaderMap) -> RequestSession {
        let session_id = match Self::extract_session_id(headers) {
            Some(id) => id,
            None => return RequestSession::default(),
        };

        let current_user = match self.session_store.get(&session_id).await {
            Ok(Some(data)) => data.current_user,
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load session, treating request as anonymous");
                None
            }
        };
        tracing::Span::current().record("authenticated", current_user.is_some());

        RequestSession {
            session_id: Some(session_id),
            current_user,
        }
    }

    /// Loads the session and applies the guard
    pub async fn check(&self, guard: Guard, headers: &HeaderMap) -> Access {
        let session = self.load(headers).await;
        match guard.evaluate(&session) {
            Some(location) => {
                tracing::debug!(?guard, location, "Guard redirected request");
                Access::Redirect(location)
            }
            None => Access::Pass(session),
        }
    }

    /// Creates a session cookie
    pub fn create_session_cookie(&self, session_id: &str) -> String {
        let max_age = i64::try_from(self.cookie_max_age.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((SESSION_COOKIE_NAME, session_id))
            .path("/")
            .max_age(cookie::time::Duration::seconds(max_age))
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(cookie::SameSite::Strict)
            .build()
            .to_string()
    }

    /// Creates a cookie that clears the session (for logout)
    pub fn clear_session_cookie(&self) -> String {
        Cookie::build((SESSION_COOKIE_NAME, ""))
            .path("/")
            .max_age(cookie::time::Duration::ZERO)
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(cookie::SameSite::Strict)
            .build()
            .to_string()
    }
}
