//! Record storage adapters
//!
//! Only the in-process store ships with the workspace. A network store would
//! implement the same [`EntityStore`] port.

pub mod memory;

use std::sync::Arc;

use rpcshield_core::EntityStore;
use rpcshield_domain::{Result, RpcShieldError, StorageConfig};

pub use memory::InMemoryEntityStore;

/// Scheme served by [`InMemoryEntityStore`].
pub const MEMORY_SCHEME: &str = "memory";

/// Open the store named by `config.uri`.
///
/// # Errors
/// Returns `RpcShieldError::Config` for schemes this build cannot serve.
pub fn connect(config: &StorageConfig) -> Result<Arc<dyn EntityStore>> {
    config.validate()?;
    let scheme = config.uri.split("://").next().unwrap_or_default();
    match scheme {
        MEMORY_SCHEME => Ok(Arc::new(InMemoryEntityStore::new())),
        other => Err(RpcShieldError::Config(format!("unsupported storage scheme: {other:?}"))),
    }
}
