use std::fmt;

use serde::Serialize;

use crate::db::{
    DatabaseSetting, ExtensionAction, ExtensionOutcome, PostgisVersion, SettingValue,
};

#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub database: String,
    pub extensions: Vec<ExtensionOutcome>,
    pub settings: Vec<DatabaseSetting>,
    pub registered_srids: Vec<i32>,
    pub existing_srids: Vec<i32>,
    pub postgis: PostgisVersion,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionStatus {
    pub name: String,
    pub available: bool,
    pub default_version: Option<String>,
    pub installed_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub database: String,
    pub extensions: Vec<ExtensionStatus>,
}

impl fmt::Display for SetupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "database: {}", self.database)?;
        for extension in &self.extensions {
            let action = match extension.action {
                ExtensionAction::Created => "created",
                ExtensionAction::AlreadyInstalled => "already installed",
            };
            writeln!(
                f,
                "extension {}: {} ({})",
                extension.name,
                action,
                extension.version.as_deref().unwrap_or("unknown version")
            )?;
        }
        for setting in &self.settings {
            let value = match &setting.value {
                SettingValue::Bool(value) => value.to_string(),
                SettingValue::Text(value) => value.clone(),
            };
            writeln!(f, "setting {} = {}", setting.key, value)?;
        }
        for srid in &self.registered_srids {
            writeln!(f, "srid {srid}: registered")?;
        }
        for srid in &self.existing_srids {
            writeln!(f, "srid {srid}: already present")?;
        }
        write!(f, "{}", self.postgis)
    }
}

impl fmt::Display for PostgisVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "postgis_version: {}", self.version)?;
        if let Some(ref full) = self.full {
            write!(f, "\npostgis_full_version: {full}")?;
        }
        Ok(())
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "database: {}", self.database)?;
        for extension in &self.extensions {
            let state = match (&extension.installed_version, extension.available) {
                (Some(version), _) => format!("installed {version}"),
                (None, true) => format!(
                    "available {}",
                    extension.default_version.as_deref().unwrap_or("")
                )
                .trim_end()
                .to_string(),
                (None, false) => "not available".to_string(),
            };
            write!(f, "\nextension {}: {}", extension.name, state)?;
        }
        Ok(())
    }
}

/// Renders `value` as pretty JSON when `json` is set, `Display` otherwise.
pub fn render<T>(value: &T, json: bool) -> Result<String, serde_json::Error>
where
    T: Serialize + fmt::Display,
{
    if json {
        serde_json::to_string_pretty(value)
    } else {
        Ok(value.to_string())
    }
}
