use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File the binary looks for in the working directory when no `--config`
/// is given.
pub const CONFIG_FILE: &str = "folio.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding the database.
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`.
    pub database: String,
}

impl StoreConfig {
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.database)
    }

    /// Reads a TOML config file. Missing keys fall back to the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Loads `path` when given, else `folio.toml` if present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        if config.database.trim().is_empty() {
            return Err(Error::Config("database file name is empty".to_string()));
        }
        Ok(config)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database: "folio.db".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.db_path(), PathBuf::from("./data/folio.db"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = StoreConfig::from_toml("data_dir = \"/var/lib/folio\"").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/folio"));
        assert_eq!(config.database, "folio.db");
    }

    #[test]
    fn test_rejects_unknown_keys_and_empty_name() {
        assert!(matches!(
            StoreConfig::from_toml("port = 8080"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml("database = \"  \""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("folio.toml");
        std::fs::write(&path, "database = \"content.db\"\n").unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.database, "content.db");

        let missing = StoreConfig::load(temp.path().join("nope.toml"));
        assert!(matches!(missing, Err(Error::Io(_))));

        let explicit = StoreConfig::discover(Some(&path)).unwrap();
        assert_eq!(explicit, config);
    }
}
