use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Connection(String),
    #[error("permission denied for {subject}: {message}")]
    PermissionDenied { subject: String, message: String },
    #[error("extension \"{0}\" is not available on the server; install the matching PostGIS package")]
    ExtensionUnavailable(String),
    #[error("extension \"{0}\" is already installed")]
    AlreadyInstalled(String),
    #[error("PostGIS is not installed in this database: {0}")]
    NotInstalled(String),
    #[error("database query error: {0}")]
    Query(String),
}

impl DatabaseError {
    /// Maps a server error message onto the failure kinds an operator can act on.
    pub fn classify(subject: &str, message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("permission denied")
            || lower.contains("must be owner")
            || lower.contains("must be superuser")
        {
            return Self::PermissionDenied {
                subject: subject.to_string(),
                message: message.to_string(),
            };
        }

        if lower.contains("is not available")
            || lower.contains("could not open extension control file")
        {
            return Self::ExtensionUnavailable(subject.to_string());
        }

        if lower.starts_with("function ")
            && lower.contains("postgis_")
            && lower.contains("does not exist")
        {
            return Self::NotInstalled(message.to_string());
        }

        if lower.contains("already exists") {
            return Self::AlreadyInstalled(subject.to_string());
        }

        Self::Query(message.to_string())
    }

    pub fn from_diesel(subject: &str, error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::DatabaseError(_, info) => {
                Self::classify(subject, info.message())
            }
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<diesel::result::Error> for DatabaseError {
    fn from(error: diesel::result::Error) -> Self {
        Self::Query(error.to_string())
    }
}
