//! Error types for the controller's core reconciliation pipeline

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum HubbleRbacError {
    /// The desired model violates an invariant: a dangling reference, an
    /// excluded user/database appearing in the desired model, a user with
    /// zero or more than one group, or mismatched database ownership.
    #[error("validation error: {0}")]
    Validation(String),

    /// A cluster could not be queried while building the current-state model.
    /// Fatal: aborts reconciliation before any mutation is attempted.
    #[error("failed to introspect cluster {cluster_id}: {message}")]
    Introspection { cluster_id: String, message: String },

    /// One or more DAG tasks failed during execution. Non-fatal per task
    /// (the task becomes `Failed` and downstream tasks are `Skipped`), but
    /// the overall reconciliation returns this once the DAG run completes.
    #[error("{failed} task(s) failed during reconciliation")]
    TasksFailed { failed: usize },

    /// The IAM or Google applier returned an error. Surfaced as-is.
    #[error("downstream applier failed: {0}")]
    DownstreamApplier(String),

    /// The SQL connection could not be established or was dropped mid-call.
    #[error("connection error: {0}")]
    Connection(String),

    /// A SQL statement failed for a reason other than "not found"/"already exists".
    #[error("query failed: {0}")]
    Query(String),

    /// Dropping a user failed because it still owns a database (SQLSTATE
    /// 55006). The source logs and continues rather than treating this as
    /// fatal, since it happens whenever a `dbt_developer` role still owns
    /// its dev database; an operator has to drop it by hand.
    #[error("{username} is still in use, most likely because it owns a database: {message}")]
    ObjectInUse { username: String, message: String },

    /// A lookup (user, group, schema, database) that was expected to exist did not.
    #[error("not found: {0}")]
    NotFound(String),
}

impl HubbleRbacError {
    pub fn is_validation(&self) -> bool {
        matches!(self, HubbleRbacError::Validation(_))
    }

    pub fn is_introspection(&self) -> bool {
        matches!(self, HubbleRbacError::Introspection { .. })
    }

    pub fn is_tasks_failed(&self) -> bool {
        matches!(self, HubbleRbacError::TasksFailed { .. })
    }

    pub fn is_object_in_use(&self) -> bool {
        matches!(self, HubbleRbacError::ObjectInUse { .. })
    }
}

impl From<sqlx::Error> for HubbleRbacError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => HubbleRbacError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                HubbleRbacError::Connection(err.to_string())
            }
            sqlx::Error::Database(database_error) if database_error.code().as_deref() == Some("55006") => {
                HubbleRbacError::ObjectInUse {
                    username: String::new(),
                    message: database_error.message().to_string(),
                }
            }
            _ => HubbleRbacError::Query(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, HubbleRbacError>;
