use bytes::Bytes;
use hyper::body::Body;
use hyper::{Request, StatusCode};
use std::sync::Arc;

use crate::auth::password::{is_strong_password, WEAK_PASSWORD_MESSAGE};
use crate::auth::{CredentialHasher, StoreError, UserRecord, UserStore};
use crate::metrics::{SharedMetrics, SignupOutcome};

use super::middleware::USER_PAGE_PATH;
use super::responses::{self, HttpResponse};
use super::{form, templates};

pub const MISSING_FIELDS_MESSAGE: &str = "All fields are mandatory!";
pub const DUPLICATE_USERNAME_MESSAGE: &str =
    "Username already registered. Please try using another username.";

/// Handles GET /signup - displays the signup form
pub async fn handle_signup_page() -> anyhow::Result<HttpResponse> {
    Ok(responses::html_response(
        StatusCode::OK,
        templates::signup_page(None, None),
    ))
}

/// Handles POST /signup - validates the form and creates the user
///
/// Form problems and store conflicts re-render the form; store outages and
/// hashing failures are returned as errors for the generic error page.
#[tracing::instrument(skip_all, fields(username))]
pub async fn handle_signup_submit<B>(
    req: Request<B>,
    user_store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
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
            metrics.record_signup(SignupOutcome::MissingFields);
            return Ok(rerender(
                StatusCode::OK,
                MISSING_FIELDS_MESSAGE,
                form.get("username"),
            ));
        }
    };
    tracing::Span::current().record("username", &tracing::field::display(username));

    if !is_strong_password(password) {
        metrics.record_signup(SignupOutcome::WeakPassword);
        tracing::debug!("Signup rejected: weak password");
        return Ok(rerender(
            StatusCode::INTERNAL_SERVER_ERROR,
            WEAK_PASSWORD_MESSAGE,
            Some(username),
        ));
    }

    let password_hash = hasher.hash(password).await?;
    let user = UserRecord::new(username.to_string(), password_hash);

    match user_store.create_user(user).await {
        Ok(()) => {
            metrics.record_signup(SignupOutcome::Created);
            tracing::info!(username = %username, "User signed up");
            Ok(responses::redirect(USER_PAGE_PATH))
        }
        Err(StoreError::Validation(message)) => {
            metrics.record_signup(SignupOutcome::Invalid);
            tracing::debug!(reason = %message, "Signup rejected by store validation");
            Ok(rerender(
                StatusCode::INTERNAL_SERVER_ERROR,
                &message,
                Some(username),
            ))
        }
        Err(StoreError::Duplicate(_)) => {
            metrics.record_signup(SignupOutcome::Duplicate);
            tracing::debug!("Signup rejected: username taken");
            Ok(rerender(
                StatusCode::INTERNAL_SERVER_ERROR,
                DUPLICATE_USERNAME_MESSAGE,
                Some(username),
            ))
        }
        Err(e) => Err(anyhow::Error::new(e).context("failed to create user")),
    }
}

fn rerender(status: StatusCode, error: &str, username: Option<&str>) -> HttpResponse {
    responses::html_response(status, templates::signup_page(Some(error), username))
}
