//! Executes a [`Dag`] against a [`TaskRunner`], sequentially, respecting
//! dependency order. Grounded on the source's `task_runner.go` (the
//! `TaskRunner` interface and `TaskPrinter` dry-run implementation) and
//! `dag_runner.go` (`SequentialDagRunner`). The source leaves parallel
//! execution as a `// TODO`; this port keeps that scope as-is.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::{HubbleRbacError, Result};

use super::dag::Dag;
use super::model::{Database, Group, User};
use super::task::{Task, TaskState, TaskType};

/// One method per [`TaskType`], each performing exactly the mutation its
/// name describes against a real (or fake) Redshift cluster.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn create_user(&self, cluster_id: &str, user: &User) -> Result<()>;
    async fn drop_user(&self, cluster_id: &str, user: &User) -> Result<()>;
    async fn create_group(&self, cluster_id: &str, group: &Group) -> Result<()>;
    async fn drop_group(&self, cluster_id: &str, group: &Group) -> Result<()>;
    async fn create_database(&self, cluster_id: &str, database_name: &str, owner: Option<&str>) -> Result<()>;
    async fn create_schema(&self, database: &Database, schema_name: &str) -> Result<()>;
    async fn create_external_schema(
        &self,
        database: &Database,
        schema_name: &str,
        glue_database_name: &str,
    ) -> Result<()>;
    async fn grant_access(&self, database: &Database, group_name: &str, schema_name: &str) -> Result<()>;
    async fn revoke_access(&self, database: &Database, group_name: &str, schema_name: &str) -> Result<()>;
    async fn add_to_group(&self, cluster_id: &str, username: &str, group_name: &str) -> Result<()>;
    async fn remove_from_group(&self, cluster_id: &str, username: &str, group_name: &str) -> Result<()>;
}

/// Dispatches a single task to the matching [`TaskRunner`] method. The
/// payload variant is guaranteed to match `task.task_type` by construction
/// (the reconciler only ever pairs them one way), so a mismatch here is a
/// programmer error rather than a recoverable condition.
pub async fn execute_task(runner: &dyn TaskRunner, task: &Task, databases: &[Database]) -> Result<()> {
    use super::task::TaskPayload::*;

    match (&task.task_type, &task.payload) {
        (TaskType::CreateUser, User { cluster_id, user }) => runner.create_user(cluster_id, user).await,
        (TaskType::DropUser, User { cluster_id, user }) => runner.drop_user(cluster_id, user).await,
        (TaskType::CreateGroup, Group { cluster_id, group }) => runner.create_group(cluster_id, group).await,
        (TaskType::DropGroup, Group { cluster_id, group }) => runner.drop_group(cluster_id, group).await,
        (TaskType::CreateDatabase, Database { cluster_id, database_name, owner }) => {
            runner.create_database(cluster_id, database_name, owner.as_deref()).await
        }
        (TaskType::CreateSchema, Schema { cluster_id, database_name, schema_name }) => {
            let database = find_database(databases, cluster_id, database_name)?;
            runner.create_schema(database, schema_name).await
        }
        (
            TaskType::CreateExternalSchema,
            ExternalSchema { cluster_id, database_name, schema_name, glue_database_name },
        ) => {
            let database = find_database(databases, cluster_id, database_name)?;
            runner.create_external_schema(database, schema_name, glue_database_name).await
        }
        (TaskType::GrantAccess, Grants { cluster_id, database_name, group_name, schema_name }) => {
            let database = find_database(databases, cluster_id, database_name)?;
            runner.grant_access(database, group_name, schema_name).await
        }
        (TaskType::RevokeAccess, Grants { cluster_id, database_name, group_name, schema_name }) => {
            let database = find_database(databases, cluster_id, database_name)?;
            runner.revoke_access(database, group_name, schema_name).await
        }
        (TaskType::AddToGroup, Membership { cluster_id, username, group_name }) => {
            runner.add_to_group(cluster_id, username, group_name).await
        }
        (TaskType::RemoveFromGroup, Membership { cluster_id, username, group_name }) => {
            runner.remove_from_group(cluster_id, username, group_name).await
        }
        _ => Err(HubbleRbacError::Validation(format!(
            "task '{}' of type {} carries a payload of the wrong shape",
            task.identifier, task.task_type
        ))),
    }
}

fn find_database<'a>(databases: &'a [Database], cluster_id: &str, name: &str) -> Result<&'a Database> {
    databases
        .iter()
        .find(|d| d.cluster_id == cluster_id && d.name == name)
        .ok_or_else(|| HubbleRbacError::NotFound(format!("database {}/{}", cluster_id, name)))
}

/// A [`TaskRunner`] that only logs what it would do. Used for `--dry-run`.
#[derive(Debug, Default)]
pub struct PrintingTaskRunner;

#[async_trait]
impl TaskRunner for PrintingTaskRunner {
    async fn create_user(&self, cluster_id: &str, user: &User) -> Result<()> {
        info!(cluster_id, username = %user.name, "would CreateUser");
        Ok(())
    }
    async fn drop_user(&self, cluster_id: &str, user: &User) -> Result<()> {
        info!(cluster_id, username = %user.name, "would DropUser");
        Ok(())
    }
    async fn create_group(&self, cluster_id: &str, group: &Group) -> Result<()> {
        info!(cluster_id, group_name = %group.name, "would CreateGroup");
        Ok(())
    }
    async fn drop_group(&self, cluster_id: &str, group: &Group) -> Result<()> {
        info!(cluster_id, group_name = %group.name, "would DropGroup");
        Ok(())
    }
    async fn create_database(&self, cluster_id: &str, database_name: &str, owner: Option<&str>) -> Result<()> {
        info!(cluster_id, database_name, ?owner, "would CreateDatabase");
        Ok(())
    }
    async fn create_schema(&self, database: &Database, schema_name: &str) -> Result<()> {
        info!(database = %database.identifier(), schema_name, "would CreateSchema");
        Ok(())
    }
    async fn create_external_schema(
        &self,
        database: &Database,
        schema_name: &str,
        glue_database_name: &str,
    ) -> Result<()> {
        info!(database = %database.identifier(), schema_name, glue_database_name, "would CreateExternalSchema");
        Ok(())
    }
    async fn grant_access(&self, database: &Database, group_name: &str, schema_name: &str) -> Result<()> {
        info!(database = %database.identifier(), group_name, schema_name, "would GrantAccess");
        Ok(())
    }
    async fn revoke_access(&self, database: &Database, group_name: &str, schema_name: &str) -> Result<()> {
        info!(database = %database.identifier(), group_name, schema_name, "would RevokeAccess");
        Ok(())
    }
    async fn add_to_group(&self, cluster_id: &str, username: &str, group_name: &str) -> Result<()> {
        info!(cluster_id, username, group_name, "would AddToGroup");
        Ok(())
    }
    async fn remove_from_group(&self, cluster_id: &str, username: &str, group_name: &str) -> Result<()> {
        info!(cluster_id, username, group_name, "would RemoveFromGroup");
        Ok(())
    }
}

/// Walks a [`Dag`] to completion: repeatedly executes every task whose
/// upstream dependencies have all settled, skipping any task with a failed
/// or skipped upstream, until nothing is left pending.
pub struct DagRunner<R: TaskRunner> {
    task_runner: R,
}

impl<R: TaskRunner> DagRunner<R> {
    pub fn new(task_runner: R) -> Self {
        Self { task_runner }
    }

    /// Runs `dag` to completion against `databases` (needed to resolve
    /// schema/grant tasks back to their owning [`Database`]). Returns
    /// [`HubbleRbacError::TasksFailed`] if any task ended in the `Failed`
    /// state; the dag itself records the full per-task outcome regardless.
    pub async fn run(&self, dag: &mut Dag, databases: &[Database]) -> Result<()> {
        while dag.pending_exists() {
            for index in dag.get_waiting() {
                if dag.cannot_run_index(index) {
                    warn!(task = %dag.task(index).identifier, "skipping task: upstream did not succeed");
                    dag.task_mut(index).state = TaskState::Skipped;
                    continue;
                }

                dag.task_mut(index).state = TaskState::Running;
                let result = execute_task(&self.task_runner, dag.task(index), databases).await;
                match result {
                    Ok(()) => dag.task_mut(index).state = TaskState::Success,
                    Err(err) => {
                        error!(task = %dag.task(index).identifier, %err, "task failed");
                        dag.task_mut(index).state = TaskState::Failed;
                    }
                }
            }
        }

        let failed = dag.get_failed().len();
        if failed > 0 {
            return Err(HubbleRbacError::TasksFailed { failed });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redshift::task::{Task, TaskPayload};
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        fail: Vec<String>,
    }

    #[async_trait]
    impl TaskRunner for RecordingRunner {
        async fn create_user(&self, _cluster_id: &str, user: &User) -> Result<()> {
            self.record(&format!("create_user:{}", user.name))
        }
        async fn drop_user(&self, _cluster_id: &str, user: &User) -> Result<()> {
            self.record(&format!("drop_user:{}", user.name))
        }
        async fn create_group(&self, _cluster_id: &str, group: &Group) -> Result<()> {
            self.record(&format!("create_group:{}", group.name))
        }
        async fn drop_group(&self, _cluster_id: &str, group: &Group) -> Result<()> {
            self.record(&format!("drop_group:{}", group.name))
        }
        async fn create_database(&self, _cluster_id: &str, database_name: &str, _owner: Option<&str>) -> Result<()> {
            self.record(&format!("create_database:{}", database_name))
        }
        async fn create_schema(&self, _database: &Database, schema_name: &str) -> Result<()> {
            self.record(&format!("create_schema:{}", schema_name))
        }
        async fn create_external_schema(&self, _database: &Database, schema_name: &str, _glue: &str) -> Result<()> {
            self.record(&format!("create_external_schema:{}", schema_name))
        }
        async fn grant_access(&self, _database: &Database, group_name: &str, schema_name: &str) -> Result<()> {
            self.record(&format!("grant:{}:{}", group_name, schema_name))
        }
        async fn revoke_access(&self, _database: &Database, group_name: &str, schema_name: &str) -> Result<()> {
            self.record(&format!("revoke:{}:{}", group_name, schema_name))
        }
        async fn add_to_group(&self, _cluster_id: &str, username: &str, group_name: &str) -> Result<()> {
            self.record(&format!("add:{}:{}", username, group_name))
        }
        async fn remove_from_group(&self, _cluster_id: &str, username: &str, group_name: &str) -> Result<()> {
            self.record(&format!("remove:{}:{}", username, group_name))
        }
    }

    impl RecordingRunner {
        fn record(&self, call: &str) -> Result<()> {
            self.calls.lock().unwrap().push(call.to_string());
            if self.fail.iter().any(|f| f == call) {
                Err(HubbleRbacError::Query("simulated failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn task(identifier: &str, ty: TaskType, payload: TaskPayload) -> Task {
        Task::new(identifier, ty, payload, Utc::now())
    }

    #[tokio::test]
    async fn runs_dependent_tasks_in_order() {
        let group = task(
            "g",
            TaskType::CreateGroup,
            TaskPayload::Group { cluster_id: "hubble".to_string(), group: Group { name: "bi_analyst".to_string() } },
        );
        let mut add = task(
            "a",
            TaskType::AddToGroup,
            TaskPayload::membership("hubble", "jwr", "bi_analyst"),
        );
        add.up_stream.push(0);

        let mut dag = Dag::new(vec![group, add]);
        let runner = DagRunner::new(RecordingRunner::default());
        runner.run(&mut dag, &[]).await.unwrap();

        let calls = runner.task_runner.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), ["create_group:bi_analyst", "add:jwr:bi_analyst"]);
    }

    #[tokio::test]
    async fn failed_upstream_skips_downstream_and_reports_failure() {
        let mut failing = RecordingRunner::default();
        failing.fail.push("create_group:bi_analyst".to_string());

        let group = task(
            "g",
            TaskType::CreateGroup,
            TaskPayload::Group { cluster_id: "hubble".to_string(), group: Group { name: "bi_analyst".to_string() } },
        );
        let mut add = task(
            "a",
            TaskType::AddToGroup,
            TaskPayload::membership("hubble", "jwr", "bi_analyst"),
        );
        add.up_stream.push(0);

        let mut dag = Dag::new(vec![group, add]);
        let runner = DagRunner::new(failing);
        let result = runner.run(&mut dag, &[]).await;

        assert!(result.is_err());
        assert_eq!(dag.task(1).state, TaskState::Skipped);
    }
}
