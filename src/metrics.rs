use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, register_int_gauge};
use prometheus::{IntCounter, IntCounterVec, IntGauge};

lazy_static! {
    static ref SIGNUPS: IntCounterVec = register_int_counter_vec!(
        "session_auth_signups_total",
        "Signup attempts by outcome",
        &["outcome"]
    )
    .expect("signup counter can be registered");
    static ref LOGINS: IntCounterVec = register_int_counter_vec!(
        "session_auth_logins_total",
        "Login attempts by outcome",
        &["outcome"]
    )
    .expect("login counter can be registered");
    static ref LOGOUTS: IntCounter =
        register_int_counter!("session_auth_logouts_total", "Sessions destroyed via logout")
            .expect("logout counter can be registered");
    static ref ACTIVE_SESSIONS: IntGauge = register_int_gauge!(
        "session_auth_active_sessions",
        "Number of unexpired server-side sessions"
    )
    .expect("session gauge can be registered");
}

/// Outcome label for signup attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    Created,
    MissingFields,
    WeakPassword,
    Invalid,
    Duplicate,
}

impl SignupOutcome {
    fn label(self) -> &'static str {
        match self {
            SignupOutcome::Created => "created",
            SignupOutcome::MissingFields => "missing_fields",
            SignupOutcome::WeakPassword => "weak_password",
            SignupOutcome::Invalid => "invalid",
            SignupOutcome::Duplicate => "duplicate",
        }
    }
}

/// Outcome label for login attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    MissingFields,
    UnknownUser,
    WrongPassword,
}

impl LoginOutcome {
    fn label(self) -> &'static str {
        match self {
            LoginOutcome::Success => "success",
            LoginOutcome::MissingFields => "missing_fields",
            LoginOutcome::UnknownUser => "unknown_user",
            LoginOutcome::WrongPassword => "wrong_password",
        }
    }
}

/// Handle to the process-wide prometheus collectors
#[derive(Debug, Clone, Default)]
pub struct SharedMetrics;

impl SharedMetrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_signup(&self, outcome: SignupOutcome) {
        SIGNUPS.with_label_values(&[outcome.label()]).inc();
    }

    pub fn record_login_attempt(&self, outcome: LoginOutcome) {
        LOGINS.with_label_values(&[outcome.label()]).inc();
    }

    pub fn record_logout(&self) {
        LOGOUTS.inc();
    }

    /// Logouts recorded since process start
    pub fn logout_count(&self) -> u64 {
        LOGOUTS.get()
    }

    pub fn set_active_sessions(&self, count: usize) {
        ACTIVE_SESSIONS.set(count as i64);
    }
}
