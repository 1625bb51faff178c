pub mod password;
pub mod session;
pub mod user_store;

pub use password::{BcryptHasher, CredentialHasher, HashError};
pub use session::{MemorySessionStore, SessionData, SessionError, SessionStore};
pub use user_store::{FjallUserStore, MemoryUserStore, StoreError, UserRecord, UserStore};
