use super::with_stores;
use anyhow::{Context, Result};
use slotstore_core::{OwnerToken, StoreConfig};
use std::io::Write;
use std::path::Path;

fn or_dash(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// One line per store: ids, file size and window pool counters
pub fn stats(dir: &Path, config: &StoreConfig, out: &mut dyn Write) -> Result<()> {
    let stats = with_stores(dir, config, |stores| Ok(stores.stats()?))?;

    writeln!(
        out,
        "{:<36} {:>6} {:>10} {:>8} {:>12} {:>4} {:>10} {:>10} {:>8}",
        "STORE", "SLOT", "HIGH ID", "FREE", "FILE SIZE", "OK", "HITS", "MISSES", "BRICKS"
    )?;
    for s in &stats {
        let (hits, misses, bricks) = match &s.windows {
            Some(w) => (
                w.hits.to_string(),
                w.misses.to_string(),
                format!("{}/{}", w.mapped_bricks, w.brick_count),
            ),
            None => ("-".into(), "-".into(), "-".into()),
        };
        writeln!(
            out,
            "{:<36} {:>6} {:>10} {:>8} {:>12} {:>4} {:>10} {:>10} {:>8}",
            s.name,
            s.record_size,
            or_dash(s.high_id),
            or_dash(s.free_ids),
            s.file_size,
            if s.store_ok { "yes" } else { "no" },
            hits,
            misses,
            bricks
        )?;
    }
    Ok(())
}

/// Relationship type ids and names
pub fn types(dir: &Path, config: &StoreConfig, out: &mut dyn Write) -> Result<()> {
    let types = with_stores(dir, config, |stores| {
        let relationship_types = stores.relationship_types();
        for store in relationship_types.stores() {
            store.validate().with_context(|| {
                format!("{} needs repair, run `check --repair` first", store.name())
            })?;
        }
        Ok(relationship_types.all_types(OwnerToken::new())?)
    })?;

    for (id, name) in &types {
        writeln!(out, "{:>6}  {}", id, name)?;
    }
    writeln!(out, "{} relationship type(s)", types.len())?;
    Ok(())
}

/// The configuration the other commands run with, as TOML
pub fn config(config: &StoreConfig, out: &mut dyn Write) -> Result<()> {
    write!(out, "{}", config.to_toml_string()?)?;
    Ok(())
}
