use super::models::{DatabaseSetting, ExtensionRequest, SettingValue, SpatialRefSys};

pub const CURRENT_DATABASE_SQL: &str = "SELECT current_database()::text AS current_database";
pub const EXTENSION_STATE_SQL: &str =
    "SELECT name::text AS name, default_version, installed_version \
     FROM pg_available_extensions WHERE name = $1::name";

/// Double-quotes an identifier, doubling any embedded quote.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quotes a string literal. Assumes `standard_conforming_strings`
/// (the server default since 9.1), so backslashes pass through untouched.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `SELECT postgis_version()` (or `postgis_full_version()`), qualified with
/// `schema` when the extension was created outside the search path.
pub fn postgis_version_sql(schema: Option<&str>, full: bool) -> String {
    let function = if full {
        "postgis_full_version"
    } else {
        "postgis_version"
    };
    match schema {
        Some(schema) => format!("SELECT {}.{function}()", quote_ident(schema)),
        None => format!("SELECT {function}()"),
    }
}

/// A DDL/DML statement sent while enabling PostGIS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateExtension {
        request: ExtensionRequest,
        if_not_exists: bool,
        cascade: bool,
    },
    SetDatabaseOption {
        database: String,
        setting: DatabaseSetting,
    },
    RegisterSpatialRefSys {
        schema: Option<String>,
        srs: SpatialRefSys,
    },
}

impl Statement {
    pub fn sql(&self) -> String {
        match self {
            Statement::CreateExtension {
                request,
                if_not_exists,
                cascade,
            } => {
                let mut sql = String::from("CREATE EXTENSION ");
                if *if_not_exists {
                    sql.push_str("IF NOT EXISTS ");
                }
                sql.push_str(&quote_ident(&request.name));
                if let Some(ref schema) = request.schema {
                    sql.push_str(" SCHEMA ");
                    sql.push_str(&quote_ident(schema));
                }
                if *cascade {
                    sql.push_str(" CASCADE");
                }
                sql.push(';');
                sql
            }
            Statement::SetDatabaseOption { database, setting } => {
                let value = match &setting.value {
                    SettingValue::Bool(value) => value.to_string(),
                    SettingValue::Text(value) => quote_literal(value),
                };
                format!(
                    "ALTER DATABASE {} SET {} = {};",
                    quote_ident(database),
                    setting.key,
                    value
                )
            }
            Statement::RegisterSpatialRefSys { schema, srs } => {
                let table = match schema {
                    Some(schema) => format!("{}.spatial_ref_sys", quote_ident(schema)),
                    None => "spatial_ref_sys".to_string(),
                };
                format!(
                    "INSERT INTO {table} (srid, auth_name, auth_srid, proj4text, srtext) \
                     VALUES ({}, {}, {}, {}, {}) ON CONFLICT (srid) DO NOTHING;",
                    srs.srid,
                    quote_literal(&srs.auth_name),
                    srs.auth_srid,
                    quote_literal(&srs.proj4text),
                    quote_literal(&srs.srtext),
                )
            }
        }
    }

    /// The object a failure of this statement is reported against.
    pub fn subject(&self) -> String {
        match self {
            Statement::CreateExtension { request, .. } => request.name.clone(),
            Statement::SetDatabaseOption { database, setting } => {
                format!("database {database} ({})", setting.key)
            }
            Statement::RegisterSpatialRefSys { srs, .. } => {
                format!("spatial_ref_sys srid {}", srs.srid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("postgis", "\"postgis\"" ; "plain")]
    #[test_case("a\"b", "\"a\"\"b\"" ; "embedded quote")]
    #[test_case("uuid-ossp", "\"uuid-ossp\"" ; "dash")]
    fn quote_ident_cases(input: &str, expected: &str) {
        assert_eq!(quote_ident(input), expected);
    }

    #[test_case("ENABLE_ALL", "'ENABLE_ALL'" ; "plain")]
    #[test_case("it's", "'it''s'" ; "embedded quote")]
    #[test_case("", "''" ; "empty")]
    fn quote_literal_cases(input: &str, expected: &str) {
        assert_eq!(quote_literal(input), expected);
    }

    fn postgis(schema: Option<&str>) -> ExtensionRequest {
        ExtensionRequest {
            name: "postgis".to_string(),
            schema: schema.map(str::to_string),
        }
    }

    #[test_case(None, false, "SELECT postgis_version()" ; "unqualified")]
    #[test_case(None, true, "SELECT postgis_full_version()" ; "unqualified full")]
    #[test_case(Some("gis"), false, "SELECT \"gis\".postgis_version()" ; "schema")]
    #[test_case(Some("gis"), true, "SELECT \"gis\".postgis_full_version()" ; "schema full")]
    fn version_query_follows_extension_schema(schema: Option<&str>, full: bool, expected: &str) {
        assert_eq!(postgis_version_sql(schema, full), expected);
    }

    #[test]
    fn create_extension_if_not_exists() {
        let statement = Statement::CreateExtension {
            request: postgis(None),
            if_not_exists: true,
            cascade: false,
        };
        assert_eq!(statement.sql(), "CREATE EXTENSION IF NOT EXISTS \"postgis\";");
        assert_eq!(statement.subject(), "postgis");
    }

    #[test]
    fn create_extension_plain_with_schema_and_cascade() {
        let statement = Statement::CreateExtension {
            request: postgis(Some("gis")),
            if_not_exists: false,
            cascade: true,
        };
        assert_eq!(
            statement.sql(),
            "CREATE EXTENSION \"postgis\" SCHEMA \"gis\" CASCADE;"
        );
    }

    #[test]
    fn alter_database_renders_bool_and_text() {
        let outdb = Statement::SetDatabaseOption {
            database: "survey".to_string(),
            setting: DatabaseSetting::bool("postgis.enable_outdb_rasters", true),
        };
        assert_eq!(
            outdb.sql(),
            "ALTER DATABASE \"survey\" SET postgis.enable_outdb_rasters = true;"
        );

        let drivers = Statement::SetDatabaseOption {
            database: "survey".to_string(),
            setting: DatabaseSetting::text("postgis.gdal_enabled_drivers", "ENABLE_ALL"),
        };
        assert_eq!(
            drivers.sql(),
            "ALTER DATABASE \"survey\" SET postgis.gdal_enabled_drivers = 'ENABLE_ALL';"
        );
    }

    #[test]
    fn spatial_ref_sys_insert_is_idempotent_and_escaped() {
        let statement = Statement::RegisterSpatialRefSys {
            schema: None,
            srs: SpatialRefSys {
                srid: 900_001,
                auth_name: "LOCAL".to_string(),
                auth_srid: 1,
                proj4text: "+proj=longlat".to_string(),
                srtext: "GEOGCS[\"it's\"]".to_string(),
            },
        };
        let sql = statement.sql();
        assert!(sql.starts_with("INSERT INTO spatial_ref_sys (srid, auth_name, auth_srid"));
        assert!(sql.contains("VALUES (900001, 'LOCAL', 1, '+proj=longlat', 'GEOGCS[\"it''s\"]')"));
        assert!(sql.ends_with("ON CONFLICT (srid) DO NOTHING;"));
    }

    #[test]
    fn spatial_ref_sys_is_schema_qualified() {
        let statement = Statement::RegisterSpatialRefSys {
            schema: Some("gis".to_string()),
            srs: SpatialRefSys::egm2008_height(),
        };
        assert!(statement.sql().starts_with("INSERT INTO \"gis\".spatial_ref_sys "));
        assert!(statement.sql().contains("VERT_CS[\"EGM2008 height\""));
    }
}
