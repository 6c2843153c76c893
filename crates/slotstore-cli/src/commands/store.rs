use super::with_stores;
use anyhow::{Context, Result, bail};
use slotstore_core::StoreConfig;
use slotstore_core::store::GraphStores;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Create the store files of a new database directory
pub fn create(dir: &Path, config: &StoreConfig, out: &mut dyn Write) -> Result<()> {
    GraphStores::create(dir, config)
        .with_context(|| format!("Failed to create database in {}", dir.display()))?;
    writeln!(out, "Created database in {}", dir.display())?;
    Ok(())
}

/// Open every store and report the ones that need a rebuild
///
/// Without `repair`, stores that are not ok make the command fail so
/// scripts can react to the exit code.
pub fn check(dir: &Path, config: &StoreConfig, repair: bool, out: &mut dyn Write) -> Result<()> {
    with_stores(dir, config, |stores| {
        let not_ok = stores.not_ok_stores();
        if not_ok.is_empty() {
            writeln!(out, "All stores ok")?;
            return Ok(());
        }

        for name in &not_ok {
            writeln!(out, "Not ok: {}", name)?;
        }
        if !repair {
            bail!("{} store(s) need repair, rerun with --repair", not_ok.len());
        }

        let reports = stores.make_stores_ok().context("Repair failed")?;
        for (name, report) in &reports {
            writeln!(
                out,
                "Repaired {}: high id {}, {} free ids, {} slots scanned",
                name, report.high_id, report.defragged, report.scanned
            )?;
        }
        stores.validate()?;
        info!("Repaired {} stores in {}", reports.len(), dir.display());
        Ok(())
    })
}
