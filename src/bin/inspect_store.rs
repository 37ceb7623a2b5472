use anyhow::{Context, Result};
use catalog_pipeline::config::PipelineConfig;
use catalog_pipeline::storage::RelationStore;
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let store = RelationStore::open(&config.paths.store_dir)
        .with_context(|| format!("Failed to open store at {}", config.paths.store_dir.display()))?;

    println!("=== RELATION STORE: {} ===\n", store.root().display());

    let names = store.relation_names()?;
    if names.is_empty() {
        println!("(no relations stored yet)");
        return Ok(());
    }

    for name in &names {
        let df = store.read(name)?;
        println!("{:<20} {:>8} rows", name, df.height());
        let columns: Vec<String> = df
            .get_columns()
            .iter()
            .map(|c| format!("{}: {}", c.name(), c.dtype()))
            .collect();
        println!("    {}", columns.join(", "));
    }

    println!("\n{} relations", names.len());
    Ok(())
}
