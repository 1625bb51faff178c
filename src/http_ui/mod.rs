mod form;
mod login;
mod middleware;
mod pages;
mod responses;
mod signup;
mod templates;

pub use login::{
    INCORRECT_PASSWORD_MESSAGE, MISSING_FIELDS_MESSAGE as LOGIN_MISSING_FIELDS_MESSAGE,
    UNKNOWN_USERNAME_MESSAGE,
};
pub use middleware::{
    Access, Guard, RequestSession, SessionAuth, LOGIN_PATH, SESSION_COOKIE_NAME, USER_PAGE_PATH,
};
pub use responses::HttpResponse;
pub use signup::{
    DUPLICATE_USERNAME_MESSAGE, MISSING_FIELDS_MESSAGE as SIGNUP_MISSING_FIELDS_MESSAGE,
};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::body::Body;
use hyper::{Method, Request};

use crate::auth::{CredentialHasher, SessionStore, UserStore};
use crate::metrics::SharedMetrics;

/// Every route the service answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Health,
    SignupPage,
    SignupSubmit,
    LoginPage,
    LoginSubmit,
    Logout,
    UserPage,
    MainPage,
    PrivatePage,
}

/// Why a request did not resolve to a [`Route`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMiss {
    NotFound,
    MethodNotAllowed,
}

impl Route {
    /// Matches method and path. A single trailing slash is ignored.
    pub fn resolve(method: &Method, path: &str) -> Result<Route, RouteMiss> {
        let path = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed,
            _ => path,
        };

        let route = match (method, path) {
            (&Method::GET, "/") => Route::Home,
            (&Method::GET, "/health") => Route::Health,
            (&Method::GET, "/signup") => Route::SignupPage,
            (&Method::POST, "/signup") => Route::SignupSubmit,
            (&Method::GET, "/login") => Route::LoginPage,
            (&Method::POST, "/login") => Route::LoginSubmit,
            (&Method::POST, "/logout") => Route::Logout,
            (&Method::GET, "/users/user-page") => Route::UserPage,
            (&Method::GET, "/users/main") => Route::MainPage,
            (&Method::GET, "/users/private") => Route::PrivatePage,
            (
                _,
                "/" | "/health" | "/signup" | "/login" | "/logout" | "/users/user-page"
                | "/users/main" | "/users/private",
            ) => return Err(RouteMiss::MethodNotAllowed),
            _ => return Err(RouteMiss::NotFound),
        };
        Ok(route)
    }

    /// Guard evaluated before the handler runs
    pub fn guard(self) -> Guard {
        match self {
            Route::SignupPage | Route::LoginPage => Guard::LoggedOut,
            // Gated like the login form: an authenticated client is
            // redirected before the session can be destroyed.
            Route::Logout => Guard::LoggedOut,
            Route::UserPage | Route::MainPage | Route::PrivatePage => Guard::LoggedIn,
            Route::Home | Route::Health | Route::SignupSubmit | Route::LoginSubmit => Guard::None,
        }
    }
}

/// Cookie settings for the session cookie
#[derive(Debug, Clone, Copy)]
pub struct CookieConfig {
    pub max_age: Duration,
    pub secure: bool,
}

/// HTTP service implementing signup, login, logout and the gated pages
#[derive(Clone)]
pub struct AuthService {
    user_store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
    session_store: Arc<dyn SessionStore>,
    session_auth: Arc<SessionAuth>,
    metrics: SharedMetrics,
}

impl AuthService {
    pub fn new(
        user_store: Arc<dyn UserStore>,
        hasher: Arc<dyn CredentialHasher>,
        session_store: Arc<dyn SessionStore>,
        cookie: CookieConfig,
        metrics: SharedMetrics,
    ) -> Self {
        let session_auth = Arc::new(SessionAuth::new(
            session_store.clone(),
            cookie.max_age,
            cookie.secure,
        ));

        Self {
            user_store,
            hasher,
            session_store,
            session_auth,
            metrics,
        }
    }

    /// Main request handler
    pub async fn handle_request<B>(
        &self,
        req: Request<B>,
    ) -> Result<HttpResponse, std::convert::Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<form::BoxError>,
    {
        Ok(self.route_request(req).await)
    }

    #[tracing::instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
    async fn route_request<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<form::BoxError>,
    {
        let route = match Route::resolve(req.method(), req.uri().path()) {
            Ok(route) => route,
            Err(RouteMiss::NotFound) => return responses::not_found(),
            Err(RouteMiss::MethodNotAllowed) => return responses::method_not_allowed(),
        };

        let session = match self.session_auth.check(route.guard(), req.headers()).await {
            Access::Pass(session) => session,
            Access::Redirect(location) => return responses::redirect(location),
        };

        let result = match route {
            Route::Home => pages::handle_home(session).await,
            Route::Health => pages::handle_health().await,
            Route::SignupPage => signup::handle_signup_page().await,
            Route::SignupSubmit => {
                signup::handle_signup_submit(
                    req,
                    self.user_store.clone(),
                    self.hasher.clone(),
                    self.metrics.clone(),
                )
                .await
            }
            Route::LoginPage => login::handle_login_page().await,
            Route::LoginSubmit => {
                login::handle_login_submit(
                    req,
                    session,
                    self.user_store.clone(),
                    self.hasher.clone(),
                    self.session_store.clone(),
                    self.session_auth.clone(),
                    self.metrics.clone(),
                )
                .await
            }
            Route::Logout => {
                login::handle_logout(
                    session,
                    self.session_store.clone(),
                    self.session_auth.clone(),
                    self.metrics.clone(),
                )
                .await
            }
            Route::UserPage => pages::handle_user_page(session).await,
            Route::MainPage => pages::handle_main_page(session).await,
            Route::PrivatePage => pages::handle_private_page(session).await,
        };

        result.unwrap_or_else(|e| responses::internal_error(&e))
    }
}
