use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use tracing::debug;

const USERS_PARTITION: &str = "users";

/// Longest username the store accepts
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Errors surfaced by a [`UserStore`]
#[derive(Debug)]
pub enum StoreError {
    /// Record failed schema validation; the message is meant for the user
    Validation(String),
    /// Uniqueness conflict on the username
    Duplicate(String),
    /// Anything else coming out of the storage backend
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Validation(message) => write!(f, "{}", message),
            StoreError::Duplicate(username) => {
                write!(f, "User with username '{}' already exists", username)
            }
            StoreError::Backend(message) => write!(f, "User store error: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<fjall::Error> for StoreError {
    fn from(e: fjall::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// User record stored in the database
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct UserRecord {
    /// Unique login name
    pub username: String,
    /// Bcrypt password hash
    pub password_hash: String,
    /// Account creation timestamp (seconds since UNIX epoch)
    pub created_at: i64,
}

impl UserRecord {
    /// Creates a new user record from an already hashed password
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            username,
            password_hash,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Checks the record against the user schema
    pub fn validate(&self) -> Result<(), StoreError> {
        let reason = if self.username.trim().is_empty() {
            Some(("username", "Path `username` is required.".to_string()))
        } else if self.username.chars().count() > MAX_USERNAME_LENGTH {
            Some((
                "username",
                format!("Username must be at most {} characters.", MAX_USERNAME_LENGTH),
            ))
        } else if self.username.chars().any(char::is_control) {
            Some((
                "username",
                "Username must not contain control characters.".to_string(),
            ))
        } else if self.password_hash.is_empty() {
            Some(("password", "Path `password` is required.".to_string()))
        } else {
            None
        };

        match reason {
            Some((field, reason)) => Err(StoreError::Validation(format!(
                "User validation failed: {}: {}",
                field, reason
            ))),
            None => Ok(()),
        }
    }

    /// Serializes the user record to bytes
    pub fn to_vec(&self) -> Result<Vec<u8>, StoreError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Backend(format!("Failed to serialize UserRecord: {}", e)))
    }

    /// Deserializes a user record from bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, StoreError> {
        let (user, _len) = bincode::decode_from_slice(data, bincode::config::standard())
            .map_err(|e| StoreError::Backend(format!("Failed to deserialize UserRecord: {}", e)))?;
        Ok(user)
    }
}

/// Persistence for user records, keyed by username
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Validates and inserts a new user. Fails with [`StoreError::Duplicate`]
    /// if the username is taken.
    async fn create_user(&self, user: UserRecord) -> Result<(), StoreError>;

    /// Looks a user up by username
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Counts the number of users
    async fn count_users(&self) -> Result<usize, StoreError>;
}

/// User store backed by a fjall keyspace on disk
pub struct FjallUserStore {
    keyspace: Keyspace,
    users: PartitionHandle,
    // Serializes the exists-check and the insert in create_user
    write_lock: Mutex<()>,
}

impl FjallUserStore {
    /// Opens (or creates) the user database under `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let keyspace = Config::new(path).open()?;
        let users = keyspace.open_partition(USERS_PARTITION, PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            users,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the disk space used by the keyspace
    pub fn disk_space(&self) -> u64 {
        self.keyspace.disk_space()
    }
}

#[async_trait]
impl UserStore for FjallUserStore {
    async fn create_user(&self, user: UserRecord) -> Result<(), StoreError> {
        debug!("Creating user: {}", user.username);
        user.validate()?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Backend("user write lock poisoned".to_string()))?;

        if self.users.contains_key(user.username.as_bytes())? {
            return Err(StoreError::Duplicate(user.username));
        }

        self.users.insert(user.username.as_bytes(), user.to_vec()?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;

        debug!("User created successfully: {}", user.username);
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        match self.users.get(username.as_bytes())? {
            Some(data) => Ok(Some(UserRecord::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    async fn count_users(&self) -> Result<usize, StoreError> {
        Ok(self.users.len()?)
    }
}

/// Volatile user store, used with `--in-memory` and in tests
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, user: UserRecord) -> Result<(), StoreError> {
        user.validate()?;

        let mut users = self
            .users
            .write()
            .map_err(|_| StoreError::Backend("user map lock poisoned".to_string()))?;

        if users.contains_key(&user.username) {
            return Err(StoreError::Duplicate(user.username));
        }

        debug!("Creating user: {}", user.username);
        users.insert(user.username.clone(), user);
        Ok(())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Backend("user map lock poisoned".to_string()))?;
        Ok(users.get(username).cloned())
    }

    async fn count_users(&self) -> Result<usize, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Backend("user map lock poisoned".to_string()))?;
        Ok(users.len())
    }
}
