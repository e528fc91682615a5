pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{
    DatabaseSetting, ExtensionAction, ExtensionOutcome, ExtensionRequest, PostgisVersion,
    SettingValue, SpatialRefSys,
};
pub use self::sql::Statement;
pub use self::stores::PostgisStore;

pub mod error;
pub mod manager;
pub mod models;
pub mod postgres;
pub mod sql;
pub mod stores;
