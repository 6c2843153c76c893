//! All stores of one database directory
//!
//! ```text
//! <dir>/graphstore.db                  container, descriptor only
//!       nodestore.db
//!       relationshipstore.db
//!       relationshiptypestore.db (.names)
//!       propertystore.db (.strings, .arrays)
//! ```
//!
//! Every file carries its own `.id` companion, except the container.

use crate::config::StoreConfig;
use crate::id_allocator::RebuildReport;
use crate::store::node::NodeStore;
use crate::store::property::PropertyStore;
use crate::store::record_store::{RecordStore, StoreFormat, StoreStats};
use crate::store::relationship::RelationshipStore;
use crate::store::relationship_type::RelationshipTypeStore;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Descriptor of the container file
pub const GRAPH_STORE_DESCRIPTOR: &str = "GraphStore v1.0";

/// Container file name
pub const GRAPH_STORE_FILE: &str = "graphstore.db";
/// Node store file name
pub const NODE_STORE_FILE: &str = "nodestore.db";
/// Relationship store file name
pub const RELATIONSHIP_STORE_FILE: &str = "relationshipstore.db";
/// Relationship type store file name
pub const RELATIONSHIP_TYPE_STORE_FILE: &str = "relationshiptypestore.db";
/// Property store file name
pub const PROPERTY_STORE_FILE: &str = "propertystore.db";

/// The record stores of one database directory
#[derive(Debug)]
pub struct GraphStores {
    dir: PathBuf,
    container: RecordStore,
    nodes: NodeStore,
    relationships: RelationshipStore,
    relationship_types: RelationshipTypeStore,
    properties: PropertyStore,
}

impl GraphStores {
    fn container_format() -> StoreFormat {
        StoreFormat::new(GRAPH_STORE_DESCRIPTOR, 0)
    }

    /// Create every store file in `dir`, creating the directory if needed
    ///
    /// Fails with [`Error::AlreadyExists`] if `dir` already holds a database.
    pub fn create(dir: &Path, config: &StoreConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(dir)?;
        RecordStore::create(&dir.join(GRAPH_STORE_FILE), &Self::container_format())?;
        NodeStore::create(&dir.join(NODE_STORE_FILE))?;
        RelationshipStore::create(&dir.join(RELATIONSHIP_STORE_FILE))?;
        RelationshipTypeStore::create(
            &dir.join(RELATIONSHIP_TYPE_STORE_FILE),
            config.type_name_block_size,
        )?;
        PropertyStore::create(
            &dir.join(PROPERTY_STORE_FILE),
            config.string_block_size,
            config.array_block_size,
        )?;
        info!("Created graph stores in {}", dir.display());
        Ok(())
    }

    /// Open every store of `dir`
    ///
    /// Stores that come up not ok are reported with a warning; call
    /// [`make_stores_ok`](Self::make_stores_ok) before using them.
    pub fn open(dir: &Path, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let container_path = dir.join(GRAPH_STORE_FILE);
        if !container_path.exists() {
            return Err(Error::storage(format!(
                "{} is not a graph store directory",
                dir.display()
            )));
        }
        let stores = Self {
            dir: dir.to_path_buf(),
            container: RecordStore::open(&container_path, Self::container_format(), config)?,
            nodes: NodeStore::open(&dir.join(NODE_STORE_FILE), config)?,
            relationships: RelationshipStore::open(&dir.join(RELATIONSHIP_STORE_FILE), config)?,
            relationship_types: RelationshipTypeStore::open(
                &dir.join(RELATIONSHIP_TYPE_STORE_FILE),
                config,
            )?,
            properties: PropertyStore::open(&dir.join(PROPERTY_STORE_FILE), config)?,
        };

        let not_ok = stores.not_ok_stores();
        if not_ok.is_empty() {
            info!("Opened graph stores in {}", dir.display());
        } else {
            warn!(
                "Opened graph stores in {} with stores needing repair: {:?}",
                dir.display(),
                not_ok
            );
        }
        Ok(stores)
    }

    /// Database directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Container store
    pub fn container(&self) -> &RecordStore {
        &self.container
    }

    /// Node store
    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    /// Relationship store
    pub fn relationships(&self) -> &RelationshipStore {
        &self.relationships
    }

    /// Relationship type store
    pub fn relationship_types(&self) -> &RelationshipTypeStore {
        &self.relationship_types
    }

    /// Property store
    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Every underlying record store, container first
    pub fn all_stores(&self) -> Vec<&RecordStore> {
        let mut stores = vec![
            &self.container,
            self.nodes.store(),
            self.relationships.store(),
        ];
        stores.extend(self.relationship_types.stores());
        stores.extend(self.properties.stores());
        stores
    }

    /// Names of the stores that need repair
    pub fn not_ok_stores(&self) -> Vec<String> {
        self.all_stores()
            .into_iter()
            .filter(|s| !s.is_store_ok())
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Rebuild every store that is not ok; returns one report per rebuilt store
    pub fn make_stores_ok(&self) -> Result<Vec<(String, RebuildReport)>> {
        let mut reports = Vec::new();
        for store in self.all_stores() {
            if let Some(report) = store.make_store_ok()? {
                reports.push((store.name().to_string(), report));
            }
        }
        Ok(reports)
    }

    /// Fail with [`Error::StoreNotValid`] naming the first store that is not ok
    pub fn validate(&self) -> Result<()> {
        self.all_stores().iter().try_for_each(|s| s.validate())
    }

    /// Flush every store
    pub fn flush(&self, tx: u64) -> Result<()> {
        self.all_stores().iter().try_for_each(|s| s.flush(tx))
    }

    /// Statistics for every store
    pub fn stats(&self) -> Result<Vec<StoreStats>> {
        self.all_stores().iter().map(|s| s.stats()).collect()
    }

    /// Close every store, the container last
    ///
    /// Every store is closed even when one fails; the first error is returned.
    pub fn close(&self) -> Result<()> {
        let results = [
            self.nodes.close(),
            self.relationships.close(),
            self.relationship_types.close(),
            self.properties.close(),
            self.container.close(),
        ];
        let mut first = None;
        for result in results {
            if let Err(e) = result {
                warn!("Closing graph stores in {}: {}", self.dir.display(), e);
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
