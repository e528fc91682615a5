use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use tracing::debug;

use crate::db::manager::Pool;

use super::{
    DatabaseError,
    models::{ExtensionState, PostgisVersion},
    sql::{self, Statement},
};

#[derive(Debug, QueryableByName)]
struct DbExtensionState {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = Nullable<Text>)]
    default_version: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    installed_version: Option<String>,
}

impl From<DbExtensionState> for ExtensionState {
    fn from(value: DbExtensionState) -> Self {
        Self {
            name: value.name,
            default_version: value.default_version,
            installed_version: value.installed_version,
        }
    }
}

#[derive(Debug, QueryableByName)]
struct DbCurrentDatabase {
    #[diesel(sql_type = Text)]
    current_database: String,
}

#[derive(Debug, QueryableByName)]
struct DbVersion {
    #[diesel(sql_type = Text)]
    postgis_version: String,
}

#[derive(Debug, QueryableByName)]
struct DbFullVersion {
    #[diesel(sql_type = Text)]
    postgis_full_version: String,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

fn query_version(
    conn: &mut PgConnection,
    schema: Option<&str>,
    full: bool,
) -> Result<PostgisVersion, DatabaseError> {
    let text = sql::postgis_version_sql(schema, false);
    debug!(statement = %text, "executing");
    let version = diesel::sql_query(text)
        .get_result::<DbVersion>(conn)
        .map(|row| row.postgis_version)
        .map_err(|e| DatabaseError::from_diesel("postgis", e))?;

    let full = if full {
        let text = sql::postgis_version_sql(schema, true);
        debug!(statement = %text, "executing");
        let row = diesel::sql_query(text)
            .get_result::<DbFullVersion>(conn)
            .map_err(|e| DatabaseError::from_diesel("postgis", e))?;
        Some(row.postgis_full_version)
    } else {
        None
    };

    Ok(PostgisVersion { version, full })
}

pub struct PostgresPostgisStore {
    pool: Pool,
}

impl PostgresPostgisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::PostgisStore for PostgresPostgisStore {
    async fn extension_state(&self, name: &str) -> Result<Option<ExtensionState>, DatabaseError> {
        let pool = self.pool.clone();
        let name = name.to_string();
        with_connection(pool, move |conn| {
            debug!(statement = sql::EXTENSION_STATE_SQL, extension = %name, "executing");
            diesel::sql_query(sql::EXTENSION_STATE_SQL)
                .bind::<Text, _>(name.as_str())
                .get_result::<DbExtensionState>(conn)
                .optional()
                .map(|value| value.map(Into::into))
                .map_err(|e| DatabaseError::from_diesel(&name, e))
        })
        .await
    }

    async fn apply(&self, statements: &[Statement]) -> Result<Vec<usize>, DatabaseError> {
        let pool = self.pool.clone();
        let statements = statements.to_vec();
        with_connection(pool, move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| {
                let mut affected = Vec::with_capacity(statements.len());
                for statement in &statements {
                    let text = statement.sql();
                    debug!(statement = %text, "executing");
                    let rows = diesel::sql_query(text)
                        .execute(conn)
                        .map_err(|e| DatabaseError::from_diesel(&statement.subject(), e))?;
                    affected.push(rows);
                }
                Ok(affected)
            })
        })
        .await
    }

    async fn current_database(&self) -> Result<String, DatabaseError> {
        let pool = self.pool.clone();
        with_connection(pool, |conn| {
            debug!(statement = sql::CURRENT_DATABASE_SQL, "executing");
            diesel::sql_query(sql::CURRENT_DATABASE_SQL)
                .get_result::<DbCurrentDatabase>(conn)
                .map(|row| row.current_database)
                .map_err(|e| DatabaseError::from_diesel("current_database", e))
        })
        .await
    }

    async fn postgis_version(
        &self,
        schema: Option<&str>,
        full: bool,
    ) -> Result<PostgisVersion, DatabaseError> {
        let pool = self.pool.clone();
        let schema = schema.map(str::to_string);
        with_connection(pool, move |conn| query_version(conn, schema.as_deref(), full)).await
    }
}
