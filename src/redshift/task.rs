//! Task records and their dependency edges: the nodes of the reconciliation DAG.
//!
//! The source encodes task payloads as `interface{}` with a runtime
//! downcast guarded by a private `Equals` method. Here the payload is a
//! closed sum type, [`TaskPayload`], with an exhaustive `PartialEq` derived
//! over each variant's identifying fields: equality is structural, never
//! pointer identity, matching spec §3.5.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Database, Group, User};

/// The kind of mutation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    CreateUser,
    DropUser,
    CreateGroup,
    DropGroup,
    CreateSchema,
    CreateExternalSchema,
    CreateDatabase,
    GrantAccess,
    RevokeAccess,
    AddToGroup,
    RemoveFromGroup,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CreateUser => "CreateUser",
            TaskType::DropUser => "DropUser",
            TaskType::CreateGroup => "CreateGroup",
            TaskType::DropGroup => "DropGroup",
            TaskType::CreateSchema => "CreateSchema",
            TaskType::CreateExternalSchema => "CreateExternalSchema",
            TaskType::CreateDatabase => "CreateDatabase",
            TaskType::GrantAccess => "GrantAccess",
            TaskType::RevokeAccess => "RevokeAccess",
            TaskType::AddToGroup => "AddToGroup",
            TaskType::RemoveFromGroup => "RemoveFromGroup",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed | TaskState::Skipped)
    }
}

/// A tagged union with one variant per task category. Two payloads are
/// equal iff the identifying tuple matches, regardless of which other
/// fields (e.g. a group's full grant list) happen to differ between two
/// otherwise-identical declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskPayload {
    User {
        cluster_id: String,
        user: User,
    },
    Group {
        cluster_id: String,
        group: Group,
    },
    Database {
        cluster_id: String,
        database_name: String,
        owner: Option<String>,
    },
    Schema {
        cluster_id: String,
        database_name: String,
        schema_name: String,
    },
    ExternalSchema {
        cluster_id: String,
        database_name: String,
        schema_name: String,
        glue_database_name: String,
    },
    Grants {
        cluster_id: String,
        database_name: String,
        group_name: String,
        schema_name: String,
    },
    Membership {
        cluster_id: String,
        username: String,
        group_name: String,
    },
}

impl PartialEq for TaskPayload {
    fn eq(&self, other: &Self) -> bool {
        use TaskPayload::*;
        match (self, other) {
            (User { cluster_id: c1, user: u1 }, User { cluster_id: c2, user: u2 }) => {
                c1 == c2 && u1.name == u2.name
            }
            (Group { cluster_id: c1, group: g1 }, Group { cluster_id: c2, group: g2 }) => {
                c1 == c2 && g1.name == g2.name
            }
            (
                Database { cluster_id: c1, database_name: d1, .. },
                Database { cluster_id: c2, database_name: d2, .. },
            ) => c1 == c2 && d1 == d2,
            (
                Schema { cluster_id: c1, database_name: d1, schema_name: s1 },
                Schema { cluster_id: c2, database_name: d2, schema_name: s2 },
            ) => c1 == c2 && d1 == d2 && s1 == s2,
            (
                ExternalSchema { cluster_id: c1, database_name: d1, schema_name: s1, .. },
                ExternalSchema { cluster_id: c2, database_name: d2, schema_name: s2, .. },
            ) => c1 == c2 && d1 == d2 && s1 == s2,
            (
                Grants { cluster_id: c1, database_name: d1, group_name: g1, schema_name: s1 },
                Grants { cluster_id: c2, database_name: d2, group_name: g2, schema_name: s2 },
            ) => c1 == c2 && d1 == d2 && g1 == g2 && s1 == s2,
            (
                Membership { cluster_id: c1, username: u1, group_name: g1 },
                Membership { cluster_id: c2, username: u2, group_name: g2 },
            ) => c1 == c2 && u1 == u2 && g1 == g2,
            _ => false,
        }
    }
}

impl TaskPayload {
    pub fn database(cluster_id: &str, database: &Database) -> Self {
        TaskPayload::Database {
            cluster_id: cluster_id.to_string(),
            database_name: database.name.clone(),
            owner: database.owner.clone(),
        }
    }

    pub fn schema(database: &Database, schema_name: &str) -> Self {
        TaskPayload::Schema {
            cluster_id: database.cluster_id.clone(),
            database_name: database.name.clone(),
            schema_name: schema_name.to_string(),
        }
    }

    pub fn external_schema(database: &Database, schema_name: &str, glue_database_name: &str) -> Self {
        TaskPayload::ExternalSchema {
            cluster_id: database.cluster_id.clone(),
            database_name: database.name.clone(),
            schema_name: schema_name.to_string(),
            glue_database_name: glue_database_name.to_string(),
        }
    }

    pub fn grants(database: &Database, group_name: &str, schema_name: &str) -> Self {
        TaskPayload::Grants {
            cluster_id: database.cluster_id.clone(),
            database_name: database.name.clone(),
            group_name: group_name.to_string(),
            schema_name: schema_name.to_string(),
        }
    }

    pub fn membership(cluster_id: &str, username: &str, group_name: &str) -> Self {
        TaskPayload::Membership {
            cluster_id: cluster_id.to_string(),
            username: username.to_string(),
            group_name: group_name.to_string(),
        }
    }
}

/// A node in the reconciliation DAG: an atomic mutation, never mutated after
/// construction except for `state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub identifier: String,
    pub task_type: TaskType,
    pub payload: TaskPayload,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub up_stream: Vec<usize>,
    #[serde(skip)]
    pub down_stream: Vec<usize>,
}

impl Task {
    pub fn new(identifier: impl Into<String>, task_type: TaskType, payload: TaskPayload, now: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.into(),
            task_type,
            payload,
            state: TaskState::Pending,
            created_at: now,
            up_stream: Vec::new(),
            down_stream: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }
}
