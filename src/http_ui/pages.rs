use hyper::StatusCode;

use super::middleware::RequestSession;
use super::responses::{self, HttpResponse};
use super::templates;

/// Handles GET / - public home page
pub async fn handle_home(session: RequestSession) -> anyhow::Result<HttpResponse> {
    Ok(responses::html_response(
        StatusCode::OK,
        templates::home_page(session.current_user.as_ref()),
    ))
}

/// Handles GET /users/user-page - landing page with the session's user
pub async fn handle_user_page(session: RequestSession) -> anyhow::Result<HttpResponse> {
    // Only reachable through the logged-in guard
    let user = session
        .current_user
        .ok_or_else(|| anyhow::anyhow!("user page reached without an authenticated session"))?;

    Ok(responses::html_response(
        StatusCode::OK,
        templates::user_page(&user),
    ))
}

/// Handles GET /users/main
pub async fn handle_main_page(session: RequestSession) -> anyhow::Result<HttpResponse> {
    Ok(responses::html_response(
        StatusCode::OK,
        templates::main_page(session.current_user.as_ref()),
    ))
}

/// Handles GET /users/private
pub async fn handle_private_page(session: RequestSession) -> anyhow::Result<HttpResponse> {
    Ok(responses::html_response(
        StatusCode::OK,
        templates::private_page(session.current_user.as_ref()),
    ))
}

/// Handles GET /health
pub async fn handle_health() -> anyhow::Result<HttpResponse> {
    let health = serde_json::json!({
        "status": "healthy",
    });
    Ok(responses::json_response(StatusCode::OK, &health))
}
