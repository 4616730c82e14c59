use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::records::TransitId;

const BUILTIN_CATALOG: &str = include_str!("../../data/transits.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read transit catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse transit catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One operator in the catalog. Only `ID` is interpreted; anything else the
/// operator file carries is kept as-is.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TransitEntry {
    #[serde(rename = "ID")]
    pub id: TransitId,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Read-only list of transit systems a customer may be enrolled with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitCatalog {
    entries: Vec<TransitEntry>,
}

impl TransitCatalog {
    pub fn new(entries: Vec<TransitEntry>) -> Self {
        Self { entries }
    }

    /// Catalog containing only the given ids.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TransitId>,
    {
        Self::new(
            ids.into_iter()
                .map(|id| TransitEntry {
                    id: id.into(),
                    extra: Map::new(),
                })
                .collect(),
        )
    }

    /// The operator list compiled into the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG.as_bytes())
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CatalogError> {
        let entries: Vec<TransitEntry> = serde_json::from_slice(bytes)?;
        Ok(Self::new(entries))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json(&bytes)?;
        tracing::info!(
            path = %path.display(),
            entries = catalog.len(),
            "loaded transit catalog"
        );
        Ok(catalog)
    }

    pub fn is_valid(&self, transit_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == transit_id)
    }

    pub fn get(&self, transit_id: &str) -> Option<&TransitEntry> {
        self.entries.iter().find(|entry| entry.id == transit_id)
    }

    pub fn entries(&self) -> &[TransitEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
