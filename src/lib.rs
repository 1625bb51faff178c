pub mod auth;
pub mod http_ui;
pub mod inspect;
pub mod metrics;

pub use http_ui::{AuthService, CookieConfig};
