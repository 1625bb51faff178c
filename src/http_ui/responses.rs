use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::warn;

use super::templates;

pub type HttpResponse = Response<Full<Bytes>>;

fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

pub fn json_response<T: Serialize>(status: StatusCode, data: &T) -> HttpResponse {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    response(status, "application/json", json)
}

pub fn html_response(status: StatusCode, html: String) -> HttpResponse {
    response(status, "text/html; charset=utf-8", html)
}

/// 302 to a fixed location
pub fn redirect(location: &'static str) -> HttpResponse {
    let mut resp = response(StatusCode::FOUND, "text/plain", "Redirecting");
    resp.headers_mut()
        .insert(header::LOCATION, HeaderValue::from_static(location));
    resp
}

/// Attaches a Set-Cookie header to a response
pub fn with_cookie(mut resp: HttpResponse, cookie: String) -> HttpResponse {
    match HeaderValue::try_from(cookie) {
        Ok(value) => {
            resp.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "Dropping malformed Set-Cookie value"),
    }
    resp
}

pub fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    html_response(status, templates::error_page(status, message))
}

pub fn not_found() -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

pub fn method_not_allowed() -> HttpResponse {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// Terminal handler for errors the route handlers forward instead of rendering
pub fn internal_error(error: &anyhow::Error) -> HttpResponse {
    tracing::error!(error = %format!("{:#}", error), "Request failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Something went wrong on our side. Please try again later.",
    )
}
