use bytes::Bytes;
use hyper::body::Body;
use hyper::{Request, StatusCode};
use std::sync::Arc;

use crate::auth::session::generate_session_id;
use crate::auth::{CredentialHasher, SessionData, SessionStore, UserStore};
use crate::metrics::{LoginOutcome, SharedMetrics};

use super::middleware::{RequestSession, SessionAuth, USER_PAGE_PATH};
use super::responses::{self, HttpResponse};
use super::{form, templates};

pub const MISSING_FIELDS_MESSAGE: &str = "Sorry, you forgot to fill all the fields. Try again";
pub const UNKNOWN_USERNAME_MESSAGE: &str = "Username is not registered";
pub const INCORRECT_PASSWORD_MESSAGE: &str = "Incorrect password";

/// Handles GET /login - displays login form
pub async fn handle_login_page() -> anyhow::Result<HttpResponse> {
    Ok(responses::html_response(
        StatusCode::OK,
        templates::login_page(None, None),
    ))
}

/// Handles POST /login - checks credentials and starts a session
///
/// Unknown usernames and wrong passwords get different messages, so the
/// form reveals which accounts exist.
#[tracing::instrument(skip_all, fields(username, success))]
pub async fn handle_login_submit<B>(
    req: Request<B>,
    session: RequestSession,
    user_store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    session_store: Arc<dyn SessionStore>,
    session_auth: Arc<SessionAuth>,
    metrics: SharedMetrics,
) -> anyhow::Result<HttpResponse>
where
    B: Body<Data = Bytes>,
    B::Error: Into<form::BoxError>,
{
    let form = form::read_form(req).await?;

    let (username, password) = match (form.required("username"), form.required("password")) {
        (Some(username), Some(password)) => (username, password),
        _ => {
            metrics.record_login_attempt(LoginOutcome::MissingFields);
            return Ok(rerender(MISSING_FIELDS_MESSAGE, form.get("username")));
        }
    };
    tracing::Span::current().record("username", &tracing::field::display(username));

    let user = match user_store.find_by_username(username).await? {
        Some(user) => user,
        None => {
            tracing::Span::current().record("success", false);
            metrics.record_login_attempt(LoginOutcome::UnknownUser);
            tracing::warn!(username = %username, "Login failed: username not registered");
            return Ok(rerender(UNKNOWN_USERNAME_MESSAGE, Some(username)));
        }
    };

    if !hasher.verify(password, &user.password_hash).await? {
        tracing::Span::current().record("success", false);
        metrics.record_login_attempt(LoginOutcome::WrongPassword);
        tracing::warn!(username = %username, "Login failed: incorrect password");
        return Ok(rerender(INCORRECT_PASSWORD_MESSAGE, Some(username)));
    }

    // A fresh ID on every login; the old session, if any, is dropped
    if let Some(old_session_id) = session.session_id.as_deref() {
        session_store.destroy(old_session_id).await?;
    }
    let session_id = generate_session_id();
    session_store
        .set(&session_id, SessionData::authenticated(user))
        .await?;

    tracing::Span::current().record("success", true);
    metrics.record_login_attempt(LoginOutcome::Success);
    tracing::info!(username = %username, "User logged in successfully");

    Ok(responses::with_cookie(
        responses::redirect(USER_PAGE_PATH),
        session_auth.create_session_cookie(&session_id),
    ))
}

/// Handles POST /logout - destroys session and redirects home
#[tracing::instrument(skip_all, fields(session_id))]
pub async fn handle_logout(
    session: RequestSession,
    session_store: Arc<dyn SessionStore>,
    session_auth: Arc<SessionAuth>,
    metrics: SharedMetrics,
) -> anyhow::Result<HttpResponse> {
    if let Some(session_id) = session.session_id.as_deref() {
        tracing::Span::current().record("session_id", &tracing::field::display(session_id));
        if session_store.destroy(session_id).await? {
            metrics.record_logout();
            tracing::info!(session_id = %session_id, "Session destroyed");
        }
    }

    Ok(responses::with_cookie(
        responses::redirect("/"),
        session_auth.clear_session_cookie(),
    ))
}

fn rerender(error: &str, username: Option<&str>) -> HttpResponse {
    responses::html_response(StatusCode::OK, templates::login_page(Some(error), username))
}
