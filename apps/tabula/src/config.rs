//! # Application Configuration
//!
//! The table served by the binary is described in a TOML file:
//!
//! ```toml
//! [table]
//! page_size = 10
//! default_ordering = [{ field = "id", ascending = false }]
//!
//! [[table.fields]]
//! path = "id"
//!
//! [[table.fields]]
//! path = "email"
//! searchable = true
//! match_mode = "contains"
//! ```
//!
//! HTTP security settings come from the environment (`TABULA_API_KEY`,
//! `TABULA_RATE_LIMIT`, `TABULA_CORS_ORIGINS`), see [`crate::api`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use tabula_core::{FieldConfig, TableConfig, TabulaError};

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub table: TableConfig,
}

impl Default for AppConfig {
    /// A table with only the id column.
    fn default() -> Self {
        Self {
            table: TableConfig::new(vec![FieldConfig::new("id")]),
        }
    }
}

impl AppConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `TabulaError::InvalidConfig` on syntax or validation errors.
    pub fn from_toml(text: &str) -> Result<Self, TabulaError> {
        let config: Self =
            toml::from_str(text).map_err(|e| TabulaError::InvalidConfig(e.to_string()))?;
        config.table.validate()?;
        Ok(config)
    }

    /// Load the configuration file, falling back to the default table when
    /// the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, TabulaError> {
        if !path.exists() {
            tracing::info!(
                "No configuration at {}, serving the id column only",
                path.display()
            );
            return Ok(Self::default());
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| TabulaError::IoError(format!("Cannot read config metadata: {}", e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TabulaError::InvalidConfig(format!(
                "Config size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| TabulaError::IoError(format!("Read config: {}", e)))?;
        let config = Self::from_toml(&text)?;
        tracing::info!(
            fields = config.table.fields.len(),
            "Loaded table configuration from {}",
            path.display()
        );
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================
