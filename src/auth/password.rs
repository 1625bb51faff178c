use async_trait::async_trait;
use tokio::task::JoinError;

/// Bcrypt cost used for new password hashes
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Cost range bcrypt accepts
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// Minimum password length accepted at signup
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Shown when a signup password fails [`is_strong_password`]
pub const WEAK_PASSWORD_MESSAGE: &str = "Password needs to have at least 6 characters and must contain at least one number, one lowercase and one uppercase letter.";

/// Checks signup password strength: at least [`MIN_PASSWORD_LENGTH`]
/// characters with an ASCII digit, lowercase and uppercase letter.
///
/// All conditions must hold within a single line of the input, and length is
/// counted in UTF-16 code units, which is how browsers measure form input.
pub fn is_strong_password(password: &str) -> bool {
    password.split(is_line_terminator).any(|line| {
        line.encode_utf16().count() >= MIN_PASSWORD_LENGTH
            && line.chars().any(|c| c.is_ascii_digit())
            && line.chars().any(|c| c.is_ascii_lowercase())
            && line.chars().any(|c| c.is_ascii_uppercase())
    })
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Errors from hashing or verifying a password
#[derive(Debug)]
pub enum HashError {
    Bcrypt(bcrypt::BcryptError),
    /// The blocking hash task panicked or was cancelled
    Task(JoinError),
}

impl std::fmt::Display for HashError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashError::Bcrypt(e) => write!(f, "Password hashing error: {}", e),
            HashError::Task(e) => write!(f, "Password hashing task failed: {}", e),
        }
    }
}

impl std::error::Error for HashError {}

/// Salted one-way password hashing
#[async_trait]
pub trait CredentialHasher: Send + Sync {
    /// Hashes a plaintext password with a fresh salt
    async fn hash(&self, password: &str) -> Result<String, HashError>;

    /// Compares a plaintext password with a stored hash in constant time
    async fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError>;
}

/// Bcrypt hasher. Both operations run on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn is_valid_cost(cost: u32) -> bool {
        (MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost)
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

#[async_trait]
impl CredentialHasher for BcryptHasher {
    async fn hash(&self, password: &str) -> Result<String, HashError> {
        let password = password.to_owned();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(HashError::Task)?
            .map_err(HashError::Bcrypt)
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, HashError> {
        let password = password.to_owned();
        let hash = hash.to_owned();

        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(HashError::Task)?
            .map_err(HashError::Bcrypt)
    }
}
