pub mod inspect;
pub mod store;

use anyhow::{Context, Result};
use slotstore_core::StoreConfig;
use slotstore_core::store::GraphStores;
use std::path::Path;

/// Open the database in `dir`, run `f`, and close every store whatever `f` returned
///
/// Dropping the stores without closing them would leave their id files sticky.
pub fn with_stores<T>(
    dir: &Path,
    config: &StoreConfig,
    f: impl FnOnce(&GraphStores) -> Result<T>,
) -> Result<T> {
    let stores = GraphStores::open(dir, config)
        .with_context(|| format!("Failed to open database in {}", dir.display()))?;
    let result = f(&stores);
    let closed = stores
        .close()
        .with_context(|| format!("Failed to close database in {}", dir.display()));
    let value = result?;
    closed?;
    Ok(value)
}
