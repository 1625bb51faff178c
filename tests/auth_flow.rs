use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use hyper::{Method, Request, Response, StatusCode};

use session_auth::auth::password::WEAK_PASSWORD_MESSAGE;
use session_auth::auth::{
    BcryptHasher, MemorySessionStore, MemoryUserStore, SessionData, SessionError, SessionStore,
    StoreError, UserRecord, UserStore,
};
use session_auth::http_ui::{
    DUPLICATE_USERNAME_MESSAGE, INCORRECT_PASSWORD_MESSAGE, LOGIN_MISSING_FIELDS_MESSAGE,
    LOGIN_PATH, SESSION_COOKIE_NAME, SIGNUP_MISSING_FIELDS_MESSAGE, UNKNOWN_USERNAME_MESSAGE,
    USER_PAGE_PATH,
};
use session_auth::metrics::SharedMetrics;
use session_auth::{AuthService, CookieConfig};

const STRONG_PASSWORD: &str = "Secret1";

struct Harness {
    service: AuthService,
    users: Arc<MemoryUserStore>,
    sessions: Arc<MemorySessionStore>,
}

fn cookie_config() -> CookieConfig {
    CookieConfig {
        max_age: Duration::from_secs(3600),
        secure: false,
    }
}

fn harness() -> Harness {
    let users = Arc::new(MemoryUserStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let service = AuthService::new(
        users.clone(),
        Arc::new(BcryptHasher::new(4)),
        sessions.clone(),
        cookie_config(),
        SharedMetrics::new(),
    );
    Harness {
        service,
        users,
        sessions,
    }
}

fn form_body(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn post(path: &str, fields: &[(&str, &str)], cookie: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder
        .body(Full::new(Bytes::from(form_body(fields))))
        .unwrap()
}

fn get(path: &str, cookie: Option<&str>) -> Request<Full<Bytes>> {
    let mut builder = Request::builder().method(Method::GET).uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

async fn send(service: &AuthService, req: Request<Full<Bytes>>) -> Response<Full<Bytes>> {
    service.handle_request(req).await.unwrap()
}

async fn body_text(resp: Response<Full<Bytes>>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(resp: &Response<Full<Bytes>>) -> &str {
    resp.headers().get(LOCATION).unwrap().to_str().unwrap()
}

/// Returns the `name=value` pair of the session cookie set by the response
fn session_cookie(resp: &Response<Full<Bytes>>) -> String {
    let header = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    let pair = header.split(';').next().unwrap().trim().to_string();
    assert!(pair.starts_with(&format!("{}=", SESSION_COOKIE_NAME)));
    pair
}

fn session_id_of(cookie: &str) -> &str {
    cookie.split_once('=').unwrap().1
}

async fn signup(h: &Harness, username: &str, password: &str) -> Response<Full<Bytes>> {
    send(
        &h.service,
        post("/signup", &[("username", username), ("password", password)], None),
    )
    .await
}

async fn login(h: &Harness, username: &str, password: &str) -> Response<Full<Bytes>> {
    send(
        &h.service,
        post("/login", &[("username", username), ("password", password)], None),
    )
    .await
}

/// Signs up and logs in, returning the session cookie pair
async fn logged_in(h: &Harness, username: &str) -> String {
    signup(h, username, STRONG_PASSWORD).await;
    let resp = login(h, username, STRONG_PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    session_cookie(&resp)
}

#[tokio::test]
async fn signup_with_missing_fields_rerenders_form() {
    let h = harness();

    for fields in [
        vec![("username", "alice")],
        vec![("password", STRONG_PASSWORD)],
        vec![("username", ""), ("password", STRONG_PASSWORD)],
    ] {
        let resp = send(&h.service, post("/signup", &fields, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains(SIGNUP_MISSING_FIELDS_MESSAGE));
    }

    assert_eq!(h.users.count_users().await.unwrap(), 0);
}

#[tokio::test]
async fn signup_with_weak_password_is_rejected() {
    let h = harness();

    for weak in ["short", "alllowercase1", "ALLUPPER1", "NoDigitsHere", "Ab1"] {
        let resp = signup(&h, "alice", weak).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR, "{weak}");
        let body = body_text(resp).await;
        assert!(body.contains(WEAK_PASSWORD_MESSAGE));
        // Username is kept in the form
        assert!(body.contains("value=\"alice\""));
    }

    assert!(h.users.find_by_username("alice").await.unwrap().is_none());
}

#[tokio::test]
async fn signup_creates_user_with_hashed_password() {
    let h = harness();

    let resp = signup(&h, "alice", STRONG_PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), USER_PAGE_PATH);
    // Signup does not start a session
    assert!(resp.headers().get(SET_COOKIE).is_none());

    let user = h.users.find_by_username("alice").await.unwrap().unwrap();
    assert_ne!(user.password_hash, STRONG_PASSWORD);
    assert!(bcrypt::verify(STRONG_PASSWORD, &user.password_hash).unwrap());
}

#[tokio::test]
async fn signup_with_taken_username_fails() {
    let h = harness();
    signup(&h, "alice", STRONG_PASSWORD).await;

    let resp = signup(&h, "alice", "Another2").await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(resp).await.contains(DUPLICATE_USERNAME_MESSAGE));

    // The original password still works
    let user = h.users.find_by_username("alice").await.unwrap().unwrap();
    assert!(bcrypt::verify(STRONG_PASSWORD, &user.password_hash).unwrap());
    assert_eq!(h.users.count_users().await.unwrap(), 1);
}

#[tokio::test]
async fn signup_with_invalid_username_reports_validation_error() {
    let h = harness();
    let long_name = "a".repeat(65);

    let resp = signup(&h, &long_name, STRONG_PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(resp).await.contains("User validation failed: username"));
}

#[tokio::test]
async fn login_success_sets_session_cookie() {
    let h = harness();
    signup(&h, "alice", STRONG_PASSWORD).await;

    let resp = login(&h, "alice", STRONG_PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), USER_PAGE_PATH);

    let set_cookie = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Path=/"));

    let cookie = session_cookie(&resp);
    let data = h.sessions.get(session_id_of(&cookie)).await.unwrap().unwrap();
    assert_eq!(data.current_user.unwrap().username, "alice");

    let page = send(&h.service, get(USER_PAGE_PATH, Some(&cookie))).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(body_text(page).await.contains("alice"));
}

#[tokio::test]
async fn login_with_wrong_password_rerenders_form() {
    let h = harness();
    signup(&h, "alice", STRONG_PASSWORD).await;

    let resp = login(&h, "alice", "Wrong123").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get(SET_COOKIE).is_none());
    assert!(body_text(resp).await.contains(INCORRECT_PASSWORD_MESSAGE));
    assert_eq!(h.sessions.active_session_count(), 0);
}

#[tokio::test]
async fn login_with_unknown_username_rerenders_form() {
    let h = harness();

    let resp = login(&h, "nobody", STRONG_PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains(UNKNOWN_USERNAME_MESSAGE));
    assert_eq!(h.sessions.active_session_count(), 0);
}

#[tokio::test]
async fn login_with_missing_fields_rerenders_form() {
    let h = harness();

    let resp = send(&h.service, post("/login", &[("username", "alice")], None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains(LOGIN_MISSING_FIELDS_MESSAGE));
}

#[tokio::test]
async fn login_replaces_previous_session() {
    let h = harness();
    let first = logged_in(&h, "alice").await;

    let resp = send(
        &h.service,
        post(
            "/login",
            &[("username", "alice"), ("password", STRONG_PASSWORD)],
            Some(&first),
        ),
    )
    .await;
    let second = session_cookie(&resp);

    assert_ne!(first, second);
    assert!(h.sessions.get(session_id_of(&first)).await.unwrap().is_none());
    assert!(h.sessions.get(session_id_of(&second)).await.unwrap().is_some());
}

#[tokio::test]
async fn gated_pages_redirect_anonymous_clients() {
    let h = harness();

    for path in ["/users/main", "/users/private", USER_PAGE_PATH] {
        let resp = send(&h.service, get(path, None)).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{path}");
        assert_eq!(location(&resp), LOGIN_PATH);
    }

    // An unknown session id is as good as none
    let resp = send(
        &h.service,
        get("/users/main", Some("session_id=deadbeef")),
    )
    .await;
    assert_eq!(location(&resp), LOGIN_PATH);
}

#[tokio::test]
async fn gated_pages_render_for_logged_in_clients() {
    let h = harness();
    let cookie = logged_in(&h, "alice").await;

    for path in ["/users/main", "/users/private"] {
        let resp = send(&h.service, get(path, Some(&cookie))).await;
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
    }
}

#[tokio::test]
async fn signup_and_login_pages_redirect_logged_in_clients() {
    let h = harness();
    let cookie = logged_in(&h, "alice").await;

    for path in ["/signup", "/login"] {
        let resp = send(&h.service, get(path, Some(&cookie))).await;
        assert_eq!(resp.status(), StatusCode::FOUND, "{path}");
        assert_eq!(location(&resp), USER_PAGE_PATH);
    }

    let anonymous = send(&h.service, get("/login", None)).await;
    assert_eq!(anonymous.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_is_gated_like_the_login_form() {
    let h = harness();
    let cookie = logged_in(&h, "alice").await;

    // An authenticated client is bounced before the session is touched
    let resp = send(&h.service, post("/logout", &[], Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), USER_PAGE_PATH);
    assert!(h.sessions.get(session_id_of(&cookie)).await.unwrap().is_some());
}

#[tokio::test]
async fn logout_clears_cookie_for_anonymous_clients() {
    let h = harness();

    let resp = send(&h.service, post("/logout", &[], None)).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(location(&resp), "/");
    let set_cookie = resp.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("session_id=;"));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn logout_destroys_expired_session() {
    let users = Arc::new(MemoryUserStore::new());
    let sessions = Arc::new(MemorySessionStore::with_lifetime(Duration::from_millis(50)));
    let service = AuthService::new(
        users.clone(),
        Arc::new(BcryptHasher::new(4)),
        sessions.clone(),
        cookie_config(),
        SharedMetrics::new(),
    );
    sessions
        .set(
            "stale",
            SessionData::authenticated(UserRecord::new("alice".into(), "hash".into())),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    let resp = send(&service, post("/logout", &[], Some("session_id=stale"))).await;
    assert_eq!(location(&resp), "/");
    assert_eq!(sessions.total_session_count(), 0);
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let h = harness();

    let resp = send(&h.service, get("/nope", None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&h.service, get("/logout", None)).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = send(&h.service, get("/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("healthy"));
}

struct BrokenUserStore;

#[async_trait]
impl UserStore for BrokenUserStore {
    async fn create_user(&self, _user: UserRecord) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    async fn find_by_username(&self, _username: &str) -> Result<Option<UserRecord>, StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }

    async fn count_users(&self) -> Result<usize, StoreError> {
        Err(StoreError::Backend("disk on fire".to_string()))
    }
}

struct BrokenSessionStore;

#[async_trait]
impl SessionStore for BrokenSessionStore {
    async fn get(&self, _session_id: &str) -> Result<Option<SessionData>, SessionError> {
        Err(SessionError::Backend("unreachable".to_string()))
    }

    async fn set(&self, _session_id: &str, _data: SessionData) -> Result<(), SessionError> {
        Err(SessionError::Backend("unreachable".to_string()))
    }

    async fn destroy(&self, _session_id: &str) -> Result<bool, SessionError> {
        Err(SessionError::Backend("unreachable".to_string()))
    }
}

#[tokio::test]
async fn user_store_failures_produce_error_page() {
    let service = AuthService::new(
        Arc::new(BrokenUserStore),
        Arc::new(BcryptHasher::new(4)),
        Arc::new(MemorySessionStore::new()),
        cookie_config(),
        SharedMetrics::new(),
    );

    let resp = send(
        &service,
        post("/signup", &[("username", "alice"), ("password", STRONG_PASSWORD)], None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body_text(resp).await.contains(DUPLICATE_USERNAME_MESSAGE));

    let resp = send(
        &service,
        post("/login", &[("username", "alice"), ("password", STRONG_PASSWORD)], None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn session_store_failures() {
    let users = Arc::new(MemoryUserStore::new());
    let password_hash = bcrypt::hash(STRONG_PASSWORD, 4).unwrap();
    users
        .create_user(UserRecord::new("alice".to_string(), password_hash))
        .await
        .unwrap();

    let service = AuthService::new(
        users,
        Arc::new(BcryptHasher::new(4)),
        Arc::new(BrokenSessionStore),
        cookie_config(),
        SharedMetrics::new(),
    );

    // Unreadable sessions count as anonymous
    let resp = send(&service, get("/users/main", Some("session_id=abc"))).await;
    assert_eq!(location(&resp), LOGIN_PATH);

    // A session that cannot be stored fails the login
    let resp = send(
        &service,
        post("/login", &[("username", "alice"), ("password", STRONG_PASSWORD)], None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn session_destroy_failures_produce_error_page() {
    let users = Arc::new(MemoryUserStore::new());
    let password_hash = bcrypt::hash(STRONG_PASSWORD, 4).unwrap();
    users
        .create_user(UserRecord::new("alice".to_string(), password_hash))
        .await
        .unwrap();

    let service = AuthService::new(
        users,
        Arc::new(BcryptHasher::new(4)),
        Arc::new(BrokenSessionStore),
        cookie_config(),
        SharedMetrics::new(),
    );

    let resp = send(&service, post("/logout", &[], Some("session_id=abc"))).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().get(SET_COOKIE).is_none());

    // Dropping the previous session fails before a new one is issued
    let resp = send(
        &service,
        post(
            "/login",
            &[("username", "alice"), ("password", STRONG_PASSWORD)],
            Some("session_id=abc"),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn login_with_unbounded_session_lifetime() {
    let lifetime = Duration::from_secs(u64::MAX);
    let users = Arc::new(MemoryUserStore::new());
    let sessions = Arc::new(MemorySessionStore::with_lifetime(lifetime));
    let service = AuthService::new(
        users.clone(),
        Arc::new(BcryptHasher::new(4)),
        sessions.clone(),
        CookieConfig {
            max_age: lifetime,
            secure: false,
        },
        SharedMetrics::new(),
    );

    send(
        &service,
        post("/signup", &[("username", "alice"), ("password", STRONG_PASSWORD)], None),
    )
    .await;
    let resp = send(
        &service,
        post("/login", &[("username", "alice"), ("password", STRONG_PASSWORD)], None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let cookie = session_cookie(&resp);
    let page = send(&service, get("/users/main", Some(&cookie))).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(sessions.active_session_count(), 1);
}

#[tokio::test]
async fn oversized_form_produces_error_page() {
    let h = harness();
    let padding = "a".repeat(64 * 1024);

    let resp = send(
        &h.service,
        post(
            "/signup",
            &[("username", "alice"), ("password", STRONG_PASSWORD), ("pad", &padding)],
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.users.count_users().await.unwrap(), 0);
}
