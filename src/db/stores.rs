use async_trait::async_trait;

use super::DatabaseError;
use super::models::{ExtensionState, PostgisVersion};
use super::sql::Statement;

#[async_trait]
pub trait PostgisStore: Send + Sync {
    /// `None` when the server has no control file for `name`.
    async fn extension_state(&self, name: &str) -> Result<Option<ExtensionState>, DatabaseError>;

    /// Runs every statement in one transaction and returns the affected row
    /// count of each.
    async fn apply(&self, statements: &[Statement]) -> Result<Vec<usize>, DatabaseError>;

    /// Name of the database the pool is connected to.
    async fn current_database(&self) -> Result<String, DatabaseError>;

    /// `schema` is where the extension was created, if not on the search path.
    async fn postgis_version(
        &self,
        schema: Option<&str>,
        full: bool,
    ) -> Result<PostgisVersion, DatabaseError>;
}
