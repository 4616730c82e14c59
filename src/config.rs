use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::catalog::{CatalogError, TransitCatalog};

/// Overrides `catalog.path` when set.
pub const CATALOG_ENV: &str = "FARE_LEDGER_CATALOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FareConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub init: InitConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
}

/// Which seed groups `init_ledger` writes.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    #[serde(default = "enabled")]
    pub seed_assets: bool,
    #[serde(default = "enabled")]
    pub seed_customers: bool,
}

fn enabled() -> bool {
    true
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            seed_assets: true,
            seed_customers: true,
        }
    }
}

impl FareConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Catalog path after applying the [`CATALOG_ENV`] override.
    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.catalog_path_with(std::env::var_os(CATALOG_ENV))
    }

    /// Catalog path given the raw value of [`CATALOG_ENV`]. An empty value
    /// counts as unset.
    pub fn catalog_path_with(&self, env: Option<OsString>) -> Option<PathBuf> {
        match env {
            Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
            _ => self.catalog.path.clone(),
        }
    }

    /// Loads the configured catalog, or the built-in one when no path is set.
    pub fn transit_catalog(&self) -> Result<TransitCatalog, ConfigError> {
        self.transit_catalog_with(std::env::var_os(CATALOG_ENV))
    }

    pub fn transit_catalog_with(
        &self,
        env: Option<OsString>,
    ) -> Result<TransitCatalog, ConfigError> {
        match self.catalog_path_with(env) {
            Some(path) => Ok(TransitCatalog::load(path)?),
            None => {
                tracing::info!("no transit catalog configured, using built-in list");
                Ok(TransitCatalog::builtin()?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = FareConfig::parse("").unwrap();
        assert!(config.catalog.path.is_none());
        assert_eq!(config.init, InitConfig::default());
    }

    #[test]
    fn parses_catalog_and_seed_sections() {
        let config = FareConfig::parse(
            r#"
            [catalog]
            path = "/etc/fare/transits.json"

            [init]
            seed_assets = false
            "#,
        )
        .unwrap();
        assert_eq!(
            config.catalog.path.as_deref(),
            Some(Path::new("/etc/fare/transits.json"))
        );
        assert!(!config.init.seed_assets);
        assert!(config.init.seed_customers);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(FareConfig::parse("[catalog]\nurl = \"x\"\n").is_err());
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[init\nseed_assets = ").unwrap();
        let err = FareConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn catalog_is_loaded_from_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("transits.json");
        std::fs::write(&catalog_path, br#"[{"ID": "OCT"}]"#).unwrap();
        let config_path = dir.path().join("fare.toml");
        std::fs::write(
            &config_path,
            format!("[catalog]\npath = {:?}\n", catalog_path.display().to_string()),
        )
        .unwrap();

        let config = FareConfig::load(&config_path).unwrap();
        let catalog = config.transit_catalog_with(None).unwrap();
        assert!(catalog.is_valid("OCT"));
        assert!(!catalog.is_valid("TTC"));
    }

    #[test]
    fn missing_catalog_path_falls_back_to_builtin() {
        let config = FareConfig::default();
        assert!(config.transit_catalog_with(None).unwrap().is_valid("TTC"));
    }

    #[test]
    fn env_override_wins_over_configured_path() {
        let config = FareConfig::parse("[catalog]\npath = \"/etc/fare/transits.json\"\n").unwrap();
        assert_eq!(
            config.catalog_path_with(Some("/srv/transits.json".into())),
            Some(PathBuf::from("/srv/transits.json"))
        );
        assert_eq!(
            config.catalog_path_with(Some(OsString::new())),
            Some(PathBuf::from("/etc/fare/transits.json"))
        );
        assert_eq!(
            config.catalog_path_with(None),
            Some(PathBuf::from("/etc/fare/transits.json"))
        );
        assert_eq!(FareConfig::default().catalog_path_with(None), None);
    }

    #[test]
    fn env_override_selects_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let override_path = dir.path().join("override.json");
        std::fs::write(&override_path, br#"[{"ID": "OCT"}, {"ID": "STM"}]"#).unwrap();

        // configured path does not exist; the override must be the one read
        let config = FareConfig::parse("[catalog]\npath = \"/nonexistent/transits.json\"\n").unwrap();
        let catalog = config
            .transit_catalog_with(Some(override_path.into_os_string()))
            .unwrap();
        assert!(catalog.is_valid("STM"));
        assert!(!catalog.is_valid("TTC"));

        assert!(matches!(
            config.transit_catalog_with(None),
            Err(ConfigError::Catalog(CatalogError::Read { .. }))
        ));
    }
}
