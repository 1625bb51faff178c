use anyhow::{Context, Result};
use std::path::Path;

use crate::auth::{FjallUserStore, UserStore};

fn open_store(data_dir: &Path) -> Result<FjallUserStore> {
    FjallUserStore::open(data_dir)
        .with_context(|| format!("failed to open user database at {}", data_dir.display()))
}

/// Number of registered users in the database under `data_dir`
pub async fn num_users(data_dir: &Path) -> Result<usize> {
    let store = open_store(data_dir)?;
    Ok(store.count_users().await?)
}

/// Disk space used by the database under `data_dir`
pub fn disk_space(data_dir: &Path) -> Result<u64> {
    Ok(open_store(data_dir)?.disk_space())
}
