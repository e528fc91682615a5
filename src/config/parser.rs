use std::path::Path;

use percent_encoding::percent_decode_str;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use url::Url;

use super::ConfigError;
use crate::db::SpatialRefSys;

pub const DEFAULT_CONFIG_FILE: &str = "postgis-setup.yaml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub postgis: PostgisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, alias = "dbname")]
    pub name: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,
    /// Full connection URL. Takes precedence over the individual fields.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: String::new(),
            user: default_user(),
            password: None,
            url: None,
            max_connections: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> Result<String, ConfigError> {
        if let Some(ref url) = self.url {
            return Ok(url.clone());
        }

        let mut url = Url::parse("postgres://localhost/")
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        url.set_host(Some(&self.host))
            .map_err(|e| ConfigError::InvalidConfig(format!("database.host: {e}")))?;
        url.set_port(Some(self.port))
            .map_err(|_| ConfigError::InvalidConfig("database.port cannot be set".to_string()))?;
        url.set_username(&self.user)
            .map_err(|_| ConfigError::InvalidConfig("database.user cannot be set".to_string()))?;
        if let Some(ref password) = self.password {
            url.set_password(Some(password.expose_secret()))
                .map_err(|_| {
                    ConfigError::InvalidConfig("database.password cannot be set".to_string())
                })?;
        }
        url.path_segments_mut()
            .map_err(|_| ConfigError::InvalidConfig("database url has no path".to_string()))?
            .push(&self.name);
        url.query_pairs_mut()
            .append_pair("connect_timeout", &self.connect_timeout.to_string());

        Ok(url.into())
    }

    /// Connection URL with the password masked, safe to log.
    pub fn redacted_url(&self) -> String {
        match self.connection_string() {
            Ok(raw) => match Url::parse(&raw) {
                Ok(mut url) => {
                    if url.password().is_some() {
                        let _ = url.set_password(Some("***"));
                    }
                    url.into()
                }
                Err(_) => "<unparseable database url>".to_string(),
            },
            Err(_) => "<invalid database config>".to_string(),
        }
    }

    /// Database the connection targets, or `None` when libpq would pick its
    /// default (a url without a path). The url path wins over `name`.
    pub fn database_name(&self) -> Option<String> {
        let name = match self.url {
            Some(ref raw) => {
                let url = Url::parse(raw).ok()?;
                let path = url.path().trim_start_matches('/');
                percent_decode_str(path).decode_utf8().ok()?.into_owned()
            }
            None => self.name.clone(),
        };
        (!name.trim().is_empty()).then_some(name)
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections.unwrap_or(2)
    }
}

#[derive(Debug, Deserialize)]
pub struct PostgisConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default = "default_if_not_exists")]
    pub if_not_exists: bool,
    /// Also install extensions the requested ones depend on.
    #[serde(default)]
    pub cascade: bool,
    #[serde(default)]
    pub full_version: bool,
    #[serde(default)]
    pub raster: RasterConfig,
    #[serde(default)]
    pub register_egm2008_height: bool,
    #[serde(default)]
    pub spatial_ref_sys: Vec<SpatialRefSys>,
}

impl Default for PostgisConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            schema: None,
            if_not_exists: default_if_not_exists(),
            cascade: false,
            full_version: false,
            raster: RasterConfig::default(),
            register_egm2008_height: false,
            spatial_ref_sys: Vec::new(),
        }
    }
}

/// Database-level GUCs read by `postgis_raster`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RasterConfig {
    #[serde(default)]
    pub enable_outdb_rasters: Option<bool>,
    #[serde(default)]
    pub gdal_enabled_drivers: Option<String>,
    #[serde(default)]
    pub gdal_vsi_options: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Reads `path`, or `postgis-setup.yaml` when present, then applies
    /// environment overrides. Callers validate after layering
    /// their own overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Environment names follow the `POSTGIS_DB_*` convention.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Some(value) = lookup("POSTGIS_DB_HOST") {
            self.database.host = value;
        }
        if let Some(value) = lookup("POSTGIS_DB_PORT") {
            self.database.port = value.trim().parse().map_err(|e| ConfigError::InvalidEnv {
                var: "POSTGIS_DB_PORT",
                message: format!("'{value}': {e}"),
            })?;
        }
        if let Some(value) = lookup("POSTGIS_DB_NAME") {
            self.database.name = value;
        }
        if let Some(value) = lookup("POSTGIS_DB_USER") {
            self.database.user = value;
        }
        if let Some(value) = lookup("POSTGIS_DB_PASS") {
            self.database.password = Some(SecretString::from(value));
        }
        if let Some(value) = lookup("POSTGIS_DB_SCHEMA") {
            self.postgis.schema = (!value.is_empty()).then_some(value);
        }
        Ok(())
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(SecretString::from))
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_extensions() -> Vec<String> {
    vec!["postgis".to_string()]
}

fn default_if_not_exists() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
