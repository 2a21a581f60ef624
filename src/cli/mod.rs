mod catalog;
mod content;

pub use catalog::run_catalog;
pub use content::{run_delete_workspace, run_tree};

use crate::config::StoreConfig;
use crate::store::SqliteStore;

/// Open the store named by the config, checking the database exists
pub fn init_store(config: &StoreConfig) -> anyhow::Result<SqliteStore> {
    let db_path = config.db_path();

    if !db_path.exists() {
        anyhow::bail!(
            "Database not found at {}. Run 'folio init' first.",
            db_path.display()
        );
    }

    SqliteStore::new(&db_path).map_err(Into::into)
}

fn parse_id(raw: &str, what: &str) -> anyhow::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw.trim()).map_err(|e| anyhow::anyhow!("Invalid {what} id '{raw}': {e}"))
}
