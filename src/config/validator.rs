use std::collections::HashSet;

use thiserror::Error;

use super::parser::Config;
use crate::db::SpatialRefSys;

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Upper bound of the `spatial_ref_sys_srid_check` constraint.
pub const MAX_SRID: i32 = 998_999;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {var}: {message}")]
    InvalidEnv { var: &'static str, message: String },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_none() && self.database.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database.name cannot be empty (set POSTGIS_DB_NAME)".to_string(),
            ));
        }

        let raster = &self.postgis.raster;
        let has_settings = raster.enable_outdb_rasters.is_some()
            || raster.gdal_enabled_drivers.is_some()
            || raster.gdal_vsi_options.is_some();
        if has_settings && self.database.database_name().is_none() {
            return Err(ConfigError::InvalidConfig(
                "postgis.raster settings need a database name in the url path".to_string(),
            ));
        }

        if self.database.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "database.port must be between 1 and 65535".to_string(),
            ));
        }

        if self.database.max_connections == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        if self.postgis.extensions.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "postgis.extensions cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.postgis.extensions {
            if !is_valid_identifier(name) {
                return Err(ConfigError::InvalidConfig(format!(
                    "postgis.extensions: '{name}' is not a valid extension name"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "postgis.extensions: '{name}' is listed more than once"
                )));
            }
        }

        if let Some(schema) = &self.postgis.schema {
            if schema.is_empty() || schema.len() > MAX_IDENTIFIER_LEN {
                return Err(ConfigError::InvalidConfig(format!(
                    "postgis.schema: '{schema}' is not a valid schema name"
                )));
            }
        }

        for srs in &self.postgis.spatial_ref_sys {
            validate_spatial_ref_sys(srs)?;
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "logging.format must be one of pretty, compact, json (got '{other}')"
                )));
            }
        }

        Ok(())
    }
}

fn validate_spatial_ref_sys(srs: &SpatialRefSys) -> Result<(), ConfigError> {
    if srs.srid <= 0 || srs.srid > MAX_SRID {
        return Err(ConfigError::InvalidConfig(format!(
            "postgis.spatial_ref_sys: srid must be between 1 and {MAX_SRID} (got {})",
            srs.srid
        )));
    }
    if srs.auth_name.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(format!(
            "postgis.spatial_ref_sys: srid {} has an empty auth_name",
            srs.srid
        )));
    }
    Ok(())
}

/// A letter or underscore followed by letters, digits, underscores or
/// dashes (`uuid-ossp`). Names are always quoted when sent to the server.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    name.len() <= MAX_IDENTIFIER_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
