use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRequest {
    pub name: String,
    pub schema: Option<String>,
}

/// One row of `pg_available_extensions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionState {
    pub name: String,
    pub default_version: Option<String>,
    pub installed_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionAction {
    Created,
    AlreadyInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionOutcome {
    pub name: String,
    pub action: ExtensionAction,
    pub version: Option<String>,
}

/// A database-level parameter set with `ALTER DATABASE ... SET`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSetting {
    pub key: String,
    pub value: SettingValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
}

impl DatabaseSetting {
    pub fn bool(key: &str, value: bool) -> Self {
        Self {
            key: key.to_string(),
            value: SettingValue::Bool(value),
        }
    }

    pub fn text(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: SettingValue::Text(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialRefSys {
    pub srid: i32,
    #[serde(default = "default_auth_name")]
    pub auth_name: String,
    pub auth_srid: i32,
    #[serde(default)]
    pub proj4text: String,
    #[serde(default)]
    pub srtext: String,
}

impl SpatialRefSys {
    /// EPSG:3855, EGM2008 orthometric height. Not shipped with every PostGIS
    /// build but needed for vertical transforms against the EGM2008 geoid.
    pub fn egm2008_height() -> Self {
        Self {
            srid: 3855,
            auth_name: "EPSG".to_string(),
            auth_srid: 3855,
            proj4text: "+vunits=m +no_defs +type=crs".to_string(),
            srtext: concat!(
                r#"VERT_CS["EGM2008 height","#,
                r#"VERT_DATUM["EGM2008 geoid",2005,AUTHORITY["EPSG","1027"]],"#,
                r#"UNIT["metre",1,AUTHORITY["EPSG","9001"]],"#,
                r#"AXIS["Gravity-related height",UP],"#,
                r#"AUTHORITY["EPSG","3855"]]"#,
            )
            .to_string(),
        }
    }
}

fn default_auth_name() -> String {
    "EPSG".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgisVersion {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
}
