//! Enabling and verifying PostGIS against a [`PostgisStore`].
//!
//! All pre-flight checks (availability, existing installs) run before the
//! first DDL statement, and every DDL statement runs in one transaction.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::db::sql;
use crate::db::{
    DatabaseError, DatabaseSetting, ExtensionAction, ExtensionOutcome, ExtensionRequest,
    PostgisStore, PostgisVersion, SpatialRefSys, Statement,
};
use crate::report::{ExtensionStatus, SetupReport, StatusReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOptions {
    /// Configured target. `enable` uses the connection's own database.
    pub database: Option<String>,
    pub extensions: Vec<ExtensionRequest>,
    pub if_not_exists: bool,
    pub cascade: bool,
    pub settings: Vec<DatabaseSetting>,
    pub schema: Option<String>,
    pub spatial_ref_sys: Vec<SpatialRefSys>,
    pub full_version: bool,
}

impl SetupOptions {
    pub fn from_config(config: &Config) -> Self {
        let postgis = &config.postgis;

        let extensions = postgis
            .extensions
            .iter()
            .map(|name| ExtensionRequest {
                name: name.clone(),
                schema: postgis.schema.clone(),
            })
            .collect();

        let mut settings = Vec::new();
        if let Some(enabled) = postgis.raster.enable_outdb_rasters {
            settings.push(DatabaseSetting::bool("postgis.enable_outdb_rasters", enabled));
        }
        if let Some(ref drivers) = postgis.raster.gdal_enabled_drivers {
            settings.push(DatabaseSetting::text("postgis.gdal_enabled_drivers", drivers));
        }
        if let Some(ref options) = postgis.raster.gdal_vsi_options {
            settings.push(DatabaseSetting::text("postgis.gdal_vsi_options", options));
        }

        let mut spatial_ref_sys: Vec<SpatialRefSys> = Vec::new();
        let configured = postgis
            .register_egm2008_height
            .then(SpatialRefSys::egm2008_height)
            .into_iter()
            .chain(postgis.spatial_ref_sys.iter().cloned());
        for srs in configured {
            if spatial_ref_sys.iter().any(|existing| existing.srid == srs.srid) {
                warn!(srid = srs.srid, "spatial_ref_sys entry listed twice, keeping the first");
                continue;
            }
            spatial_ref_sys.push(srs);
        }

        Self {
            database: config.database.database_name(),
            extensions,
            if_not_exists: postgis.if_not_exists,
            cascade: postgis.cascade,
            settings,
            schema: postgis.schema.clone(),
            spatial_ref_sys,
            full_version: postgis.full_version,
        }
    }

    /// Every DDL/DML statement `enable` sends to `database`, in order.
    pub fn statements(&self, database: &str) -> Vec<Statement> {
        let mut statements = Vec::new();

        statements.extend(self.extensions.iter().map(|request| {
            Statement::CreateExtension {
                request: request.clone(),
                if_not_exists: self.if_not_exists,
                cascade: self.cascade,
            }
        }));

        statements.extend(self.settings.iter().map(|setting| {
            Statement::SetDatabaseOption {
                database: database.to_string(),
                setting: setting.clone(),
            }
        }));

        statements.extend(self.spatial_ref_sys.iter().map(|srs| {
            Statement::RegisterSpatialRefSys {
                schema: self.schema.clone(),
                srs: srs.clone(),
            }
        }));

        statements
    }

    /// The SQL `enable` would run, including the closing version check.
    /// Settings require a configured database name (see `Config::validate`).
    pub fn plan(&self) -> Vec<String> {
        let database = self.database.as_deref().unwrap_or_default();
        let mut plan: Vec<String> = self
            .statements(database)
            .iter()
            .map(Statement::sql)
            .collect();
        let schema = self.schema.as_deref();
        plan.push(format!("{};", sql::postgis_version_sql(schema, false)));
        if self.full_version {
            plan.push(format!("{};", sql::postgis_version_sql(schema, true)));
        }
        plan
    }
}

pub struct Provisioner {
    store: Arc<dyn PostgisStore>,
    options: SetupOptions,
}

impl Provisioner {
    pub fn new(store: Arc<dyn PostgisStore>, options: SetupOptions) -> Self {
        Self { store, options }
    }

    pub async fn enable(&self) -> Result<SetupReport, DatabaseError> {
        let mut outcomes = Vec::with_capacity(self.options.extensions.len());

        for request in &self.options.extensions {
            let state = self
                .store
                .extension_state(&request.name)
                .await?
                .ok_or_else(|| DatabaseError::ExtensionUnavailable(request.name.clone()))?;

            match state.installed_version {
                Some(version) if self.options.if_not_exists => {
                    info!(extension = %request.name, %version, "extension already installed");
                    outcomes.push(ExtensionOutcome {
                        name: request.name.clone(),
                        action: ExtensionAction::AlreadyInstalled,
                        version: Some(version),
                    });
                }
                Some(_) => return Err(DatabaseError::AlreadyInstalled(request.name.clone())),
                None => {
                    outcomes.push(ExtensionOutcome {
                        name: request.name.clone(),
                        action: ExtensionAction::Created,
                        version: state.default_version,
                    });
                }
            }
        }

        let database = self.store.current_database().await?;
        if let Some(ref configured) = self.options.database {
            if *configured != database {
                warn!(%configured, connected = %database, "using the connected database");
            }
        }

        let statements = self.options.statements(&database);
        info!(count = statements.len(), %database, "applying statements");
        let affected = self.store.apply(&statements).await?;

        for outcome in outcomes
            .iter_mut()
            .filter(|outcome| outcome.action == ExtensionAction::Created)
        {
            if let Some(state) = self.store.extension_state(&outcome.name).await? {
                if state.installed_version.is_some() {
                    outcome.version = state.installed_version;
                }
            }
            info!(extension = %outcome.name, version = ?outcome.version, "extension created");
        }

        let mut registered_srids = Vec::new();
        let mut existing_srids = Vec::new();
        for (statement, rows) in statements.iter().zip(affected.iter()) {
            if let Statement::RegisterSpatialRefSys { srs, .. } = statement {
                if *rows > 0 {
                    info!(srid = srs.srid, "spatial reference system registered");
                    registered_srids.push(srs.srid);
                } else {
                    info!(srid = srs.srid, "spatial reference system already present");
                    existing_srids.push(srs.srid);
                }
            }
        }

        let postgis = self.verify().await?;

        Ok(SetupReport {
            database,
            extensions: outcomes,
            settings: self.options.settings.clone(),
            registered_srids,
            existing_srids,
            postgis,
        })
    }

    pub async fn verify(&self) -> Result<PostgisVersion, DatabaseError> {
        let version = self
            .store
            .postgis_version(self.options.schema.as_deref(), self.options.full_version)
            .await?;
        info!(version = %version.version, "postgis is available");
        Ok(version)
    }

    pub async fn status(&self) -> Result<StatusReport, DatabaseError> {
        let mut extensions = Vec::with_capacity(self.options.extensions.len());
        for request in &self.options.extensions {
            let status = match self.store.extension_state(&request.name).await? {
                Some(state) => ExtensionStatus {
                    name: state.name,
                    available: true,
                    default_version: state.default_version,
                    installed_version: state.installed_version,
                },
                None => ExtensionStatus {
                    name: request.name.clone(),
                    available: false,
                    default_version: None,
                    installed_version: None,
                },
            };
            extensions.push(status);
        }

        Ok(StatusReport {
            database: self.store.current_database().await?,
            extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::db::models::ExtensionState;

    #[derive(Default)]
    struct FakeStore {
        states: Mutex<HashMap<String, ExtensionState>>,
        applied: Mutex<Vec<Statement>>,
        existing_srids: Vec<i32>,
        apply_error: Option<String>,
        version: Option<String>,
        /// Schema holding the PostGIS functions; `None` means on the search path.
        schema: Option<String>,
        database: Option<String>,
    }

    impl FakeStore {
        fn with_extension(self, name: &str, installed: Option<&str>) -> Self {
            self.states.lock().unwrap().insert(
                name.to_string(),
                ExtensionState {
                    name: name.to_string(),
                    default_version: Some("3.4.2".to_string()),
                    installed_version: installed.map(str::to_string),
                },
            );
            self
        }

        fn applied(&self) -> Vec<Statement> {
            self.applied.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PostgisStore for FakeStore {
        async fn extension_state(
            &self,
            name: &str,
        ) -> Result<Option<ExtensionState>, DatabaseError> {
            Ok(self.states.lock().unwrap().get(name).cloned())
        }

        async fn apply(&self, statements: &[Statement]) -> Result<Vec<usize>, DatabaseError> {
            if let Some(ref message) = self.apply_error {
                let subject = statements.first().map(Statement::subject).unwrap_or_default();
                return Err(DatabaseError::classify(&subject, message));
            }
            let mut states = self.states.lock().unwrap();
            let mut affected = Vec::new();
            for statement in statements {
                match statement {
                    Statement::CreateExtension { request, .. } => {
                        if let Some(state) = states.get_mut(&request.name) {
                            if state.installed_version.is_none() {
                                state.installed_version = state.default_version.clone();
                            }
                        }
                        affected.push(0);
                    }
                    Statement::SetDatabaseOption { .. } => affected.push(0),
                    Statement::RegisterSpatialRefSys { srs, .. } => {
                        affected.push(usize::from(!self.existing_srids.contains(&srs.srid)));
                    }
                }
            }
            self.applied.lock().unwrap().extend_from_slice(statements);
            Ok(affected)
        }

        async fn current_database(&self) -> Result<String, DatabaseError> {
            Ok(self.database.clone().unwrap_or_else(|| "survey".to_string()))
        }

        async fn postgis_version(
            &self,
            schema: Option<&str>,
            full: bool,
        ) -> Result<PostgisVersion, DatabaseError> {
            match self.version {
                Some(ref version) if schema == self.schema.as_deref() => Ok(PostgisVersion {
                    version: version.clone(),
                    full: full.then(|| format!("POSTGIS=\"{version}\"")),
                }),
                    _ => Err(DatabaseError::classify(
                    "postgis",
                    "function postgis_version() does not exist",
                )),
            }
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.database.name = "survey".to_string();
        config
    }

    fn provisioner(store: FakeStore, config: &Config) -> (Arc<FakeStore>, Provisioner) {
        let store = Arc::new(store);
        let provisioner = Provisioner::new(store.clone(), SetupOptions::from_config(config));
        (store, provisioner)
    }

    fn version() -> Option<String> {
        Some("3.4 USE_GEOS=1 USE_PROJ=1 USE_STATS=1".to_string())
    }

    #[test]
    fn default_plan_matches_the_documented_commands() {
        let options = SetupOptions::from_config(&config());
        assert_eq!(
            options.plan(),
            vec![
                "CREATE EXTENSION IF NOT EXISTS \"postgis\";".to_string(),
                "SELECT postgis_version();".to_string(),
            ]
        );
    }

    #[test]
    fn plan_orders_extensions_settings_then_srids() {
        let mut config = config();
        config.postgis.extensions = vec!["postgis".to_string(), "postgis_raster".to_string()];
        config.postgis.raster.enable_outdb_rasters = Some(true);
        config.postgis.raster.gdal_enabled_drivers = Some("ENABLE_ALL".to_string());
        config.postgis.raster.gdal_vsi_options =
            Some("CPL_VSIL_CURL_ALLOWED_EXTENSIONS=.tif".to_string());
        config.postgis.register_egm2008_height = true;
        config.postgis.full_version = true;

        let plan = SetupOptions::from_config(&config).plan();

        assert_eq!(plan.len(), 8);
        assert_eq!(plan[0], "CREATE EXTENSION IF NOT EXISTS \"postgis\";");
        assert_eq!(plan[1], "CREATE EXTENSION IF NOT EXISTS \"postgis_raster\";");
        assert_eq!(
            plan[2],
            "ALTER DATABASE \"survey\" SET postgis.enable_outdb_rasters = true;"
        );
        assert_eq!(
            plan[3],
            "ALTER DATABASE \"survey\" SET postgis.gdal_enabled_drivers = 'ENABLE_ALL';"
        );
        assert_eq!(
            plan[4],
            "ALTER DATABASE \"survey\" SET postgis.gdal_vsi_options = 'CPL_VSIL_CURL_ALLOWED_EXTENSIONS=.tif';"
        );
        assert!(plan[5].starts_with("INSERT INTO spatial_ref_sys"));
        assert_eq!(plan[6], "SELECT postgis_version();");
        assert_eq!(plan[7], "SELECT postgis_full_version();");
    }

    #[test]
    fn plan_qualifies_version_check_with_schema() {
        let mut config = config();
        config.postgis.schema = Some("gis".to_string());
        config.postgis.full_version = true;

        assert_eq!(
            SetupOptions::from_config(&config).plan(),
            vec![
                "CREATE EXTENSION IF NOT EXISTS \"postgis\" SCHEMA \"gis\";".to_string(),
                "SELECT \"gis\".postgis_version();".to_string(),
                "SELECT \"gis\".postgis_full_version();".to_string(),
            ]
        );
    }

    #[test]
    fn plan_uses_decoded_url_database() {
        let mut config = config();
        config.database.url = Some("postgres://u@h:1/my%20db".to_string());
        config.postgis.raster.enable_outdb_rasters = Some(true);

        let plan = SetupOptions::from_config(&config).plan();
        assert_eq!(
            plan[1],
            "ALTER DATABASE \"my db\" SET postgis.enable_outdb_rasters = true;"
        );
    }

    #[test]
    fn duplicate_srids_are_registered_once() {
        let mut config = config();
        config.postgis.register_egm2008_height = true;
        config.postgis.spatial_ref_sys.push(SpatialRefSys::egm2008_height());

        let options = SetupOptions::from_config(&config);
        assert_eq!(options.spatial_ref_sys.len(), 1);
    }

    #[tokio::test]
    async fn enable_creates_missing_extension_and_reports_version() {
        let store = FakeStore {
            version: version(),
            ..Default::default()
        }
        .with_extension("postgis", None);
        let (store, provisioner) = provisioner(store, &config());

        let report = provisioner.enable().await.expect("enable");

        assert_eq!(report.database, "survey");
        assert_eq!(
            report.extensions,
            vec![ExtensionOutcome {
                name: "postgis".to_string(),
                action: ExtensionAction::Created,
                version: Some("3.4.2".to_string()),
            }]
        );
        assert_eq!(report.postgis.version, version().unwrap());
        assert_eq!(store.applied().len(), 1);
    }

    #[tokio::test]
    async fn enable_is_idempotent_when_already_installed() {
        let store = FakeStore {
            version: version(),
            ..Default::default()
        }
        .with_extension("postgis", Some("3.3.0"));
        let (store, provisioner) = provisioner(store, &config());

        let report = provisioner.enable().await.expect("enable");

        assert_eq!(report.extensions[0].action, ExtensionAction::AlreadyInstalled);
        assert_eq!(report.extensions[0].version.as_deref(), Some("3.3.0"));
        assert_eq!(store.applied().len(), 1);
    }

    #[tokio::test]
    async fn plain_create_fails_when_already_installed() {
        let mut config = config();
        config.postgis.if_not_exists = false;
        let store = FakeStore {
            version: version(),
            ..Default::default()
        }
        .with_extension("postgis", Some("3.3.0"));
        let (store, provisioner) = provisioner(store, &config);

        let err = provisioner.enable().await.unwrap_err();

        assert!(matches!(err, DatabaseError::AlreadyInstalled(ref name) if name == "postgis"));
        assert!(store.applied().is_empty());
    }

    #[tokio::test]
    async fn unavailable_extension_fails_before_any_ddl() {
        let mut config = config();
        config.postgis.extensions = vec!["postgis".to_string(), "postgis_raster".to_string()];
        let store = FakeStore {
            version: version(),
            ..Default::default()
        }
        .with_extension("postgis", None);
        let (store, provisioner) = provisioner(store, &config);

        let err = provisioner.enable().await.unwrap_err();

        assert!(
            matches!(err, DatabaseError::ExtensionUnavailable(ref name) if name == "postgis_raster")
        );
        assert!(store.applied().is_empty());
    }

    #[tokio::test]
    async fn permission_errors_surface_from_apply() {
        let store = FakeStore {
            version: version(),
            apply_error: Some("permission denied to create extension \"postgis\"".to_string()),
            ..Default::default()
        }
        .with_extension("postgis", None);
        let (_, provisioner) = provisioner(store, &config());

        let err = provisioner.enable().await.unwrap_err();

        assert!(matches!(
            err,
            DatabaseError::PermissionDenied { ref subject, .. } if subject == "postgis"
        ));
    }

    #[tokio::test]
    async fn enable_reports_registered_and_existing_srids() {
        let mut config = config();
        config.postgis.register_egm2008_height = true;
        config.postgis.spatial_ref_sys.push(SpatialRefSys {
            srid: 900_001,
            auth_name: "LOCAL".to_string(),
            auth_srid: 1,
            proj4text: "+proj=longlat +datum=WGS84".to_string(),
            srtext: String::new(),
        });
        let store = FakeStore {
            version: version(),
            existing_srids: vec![3855],
            ..Default::default()
        }
        .with_extension("postgis", Some("3.4.2"));
        let (_, provisioner) = provisioner(store, &config);

        let report = provisioner.enable().await.expect("enable");

        assert_eq!(report.registered_srids, vec![900_001]);
        assert_eq!(report.existing_srids, vec![3855]);
    }

    #[tokio::test]
    async fn enable_verifies_extension_created_in_schema() {
        let mut config = config();
        config.postgis.schema = Some("gis".to_string());
        let store = FakeStore {
            version: version(),
            schema: Some("gis".to_string()),
            ..Default::default()
        }
        .with_extension("postgis", None);
        let (_, provisioner) = provisioner(store, &config);

        let report = provisioner.enable().await.expect("enable");

        assert_eq!(report.postgis.version, version().unwrap());
    }

    #[tokio::test]
    async fn settings_target_the_connected_database() {
        let mut config = config();
        config.postgis.raster.enable_outdb_rasters = Some(true);
        let store = FakeStore {
            version: version(),
            database: Some("postgres".to_string()),
            ..Default::default()
        }
        .with_extension("postgis", None);
        let (store, provisioner) = provisioner(store, &config);

        let report = provisioner.enable().await.expect("enable");

        assert_eq!(report.database, "postgres");
        assert!(store.applied().iter().any(|statement| matches!(
            statement,
            Statement::SetDatabaseOption { database, .. } if database == "postgres"
        )));
    }

    #[tokio::test]
    async fn verify_reports_missing_postgis() {
        let (_, provisioner) = provisioner(FakeStore::default(), &config());

        let err = provisioner.verify().await.unwrap_err();

        assert!(matches!(err, DatabaseError::NotInstalled(_)));
    }

    #[tokio::test]
    async fn verify_includes_full_version_when_requested() {
        let mut config = config();
        config.postgis.full_version = true;
        let store = FakeStore {
            version: version(),
            ..Default::default()
        };
        let (_, provisioner) = provisioner(store, &config);

        let version = provisioner.verify().await.expect("verify");

        assert!(version.full.is_some());
    }

    #[tokio::test]
    async fn status_lists_every_configured_extension() {
        let mut config = config();
        config.postgis.extensions = vec!["postgis".to_string(), "postgis_raster".to_string()];
        let store = FakeStore::default().with_extension("postgis", Some("3.4.2"));
        let (_, provisioner) = provisioner(store, &config);

        let status = provisioner.status().await.expect("status");

        assert_eq!(status.extensions.len(), 2);
        assert!(status.extensions[0].available);
        assert_eq!(status.extensions[0].installed_version.as_deref(), Some("3.4.2"));
        assert!(!status.extensions[1].available);
    }
}
