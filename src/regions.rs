//! # Regions
//!
//! The fixed list of first-level divisions the dashboard monitors. The list is loaded once at
//! startup, either from the built-in table or from a JSON file named by `UMBRAL_REGIONS_FILE`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// A monitored region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    /// Stable code used in API output (ISO 3166-2)
    #[schema(example = "VE-A")]
    pub code: String,
    /// Human-readable name
    #[schema(example = "Distrito Capital")]
    pub display_name: String,
    /// Identifier the upstream statistics API uses for this region
    #[schema(example = "VE-A")]
    pub external_code: String,
}

impl Region {
    pub fn new(code: &str, display_name: &str, external_code: &str) -> Self {
        Self {
            code: code.to_string(),
            display_name: display_name.to_string(),
            external_code: external_code.to_string(),
        }
    }

    /// Label used in per-region error messages.
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name, self.code)
    }
}

#[derive(Debug, Error)]
pub enum RegionsError {
    #[error("failed to read regions file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse regions file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("region list is empty")]
    Empty,
    #[error("duplicate region code '{0}'")]
    DuplicateCode(String),
}

const VENEZUELA_STATES: &[(&str, &str)] = &[
    ("VE-A", "Distrito Capital"),
    ("VE-B", "Anzoátegui"),
    ("VE-C", "Apure"),
    ("VE-D", "Aragua"),
    ("VE-E", "Barinas"),
    ("VE-F", "Bolívar"),
    ("VE-G", "Carabobo"),
    ("VE-H", "Cojedes"),
    ("VE-I", "Falcón"),
    ("VE-J", "Guárico"),
    ("VE-K", "Lara"),
    ("VE-L", "Mérida"),
    ("VE-M", "Miranda"),
    ("VE-N", "Monagas"),
    ("VE-O", "Nueva Esparta"),
    ("VE-P", "Portuguesa"),
    ("VE-R", "Sucre"),
    ("VE-S", "Táchira"),
    ("VE-T", "Trujillo"),
    ("VE-U", "Yaracuy"),
    ("VE-V", "Zulia"),
    ("VE-W", "Dependencias Federales"),
    ("VE-X", "La Guaira"),
    ("VE-Y", "Delta Amacuro"),
    ("VE-Z", "Amazonas"),
];

/// The built-in region table.
pub fn default_regions() -> Vec<Region> {
    VENEZUELA_STATES
        .iter()
        .map(|(code, name)| Region::new(code, name, code))
        .collect()
}

/// Load the region table, preferring `path` when given.
pub fn load_regions(path: Option<&Path>) -> Result<Vec<Region>, RegionsError> {
    let regions = match path {
        Some(path) => {
            let display = path.display().to_string();
            let raw = std::fs::read_to_string(path).map_err(|source| RegionsError::Io {
                path: display.clone(),
                source,
            })?;
            serde_json::from_str::<Vec<Region>>(&raw).map_err(|source| RegionsError::Parse {
                path: display,
                source,
            })?
        }
        None => default_regions(),
    };

    validate_regions(&regions)?;
    Ok(regions)
}

fn validate_regions(regions: &[Region]) -> Result<(), RegionsError> {
    if regions.is_empty() {
        return Err(RegionsError::Empty);
    }

    let mut seen = HashSet::new();
    for region in regions {
        if !seen.insert(region.code.as_str()) {
            return Err(RegionsError::DuplicateCode(region.code.clone()));
        }
    }

    Ok(())
}
