//! The production [`TaskRunner`](super::runner::TaskRunner): executes each
//! task against a real cluster via a [`ClientPool`]. Grounded on the
//! source's `task_runner.go` (`TaskRunnerImpl`), including its two
//! deliberate special cases: dropping a user that still owns a database is
//! logged and swallowed rather than failing the task, and a freshly
//! created owned database needs its `public` schema's ownership
//! transferred by hand because Redshift doesn't do it automatically.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;

use super::model::{Database, Group, User};
use super::pool::ClientPool;
use super::runner::TaskRunner as TaskRunnerTrait;

/// Executes tasks against real Redshift clusters, reached through `pool`.
pub struct ClusterTaskRunner {
    pool: Arc<ClientPool>,
    aws_account_id: String,
}

impl ClusterTaskRunner {
    pub fn new(pool: Arc<ClientPool>, aws_account_id: String) -> Self {
        Self { pool, aws_account_id }
    }
}

#[async_trait]
impl TaskRunnerTrait for ClusterTaskRunner {
    async fn create_user(&self, cluster_id: &str, user: &User) -> Result<()> {
        info!(cluster_id, username = %user.name, "CreateUser");
        self.pool.cluster_client(cluster_id).await?.create_user(&user.name).await
    }

    async fn drop_user(&self, cluster_id: &str, user: &User) -> Result<()> {
        info!(cluster_id, username = %user.name, "DropUser");
        let result = self.pool.cluster_client(cluster_id).await?.delete_user(&user.name).await;
        match result {
            Err(err) if err.is_object_in_use() => {
                warn!(
                    cluster_id,
                    username = %user.name,
                    "unable to delete user because it still owns a database; this happens for dbt_developer roles and needs a manual drop"
                );
                Ok(())
            }
            other => other,
        }
    }

    async fn create_group(&self, cluster_id: &str, group: &Group) -> Result<()> {
        info!(cluster_id, group_name = %group.name, "CreateGroup");
        self.pool.cluster_client(cluster_id).await?.create_group(&group.name).await
    }

    async fn drop_group(&self, cluster_id: &str, group: &Group) -> Result<()> {
        info!(cluster_id, group_name = %group.name, "DropGroup");
        self.pool.cluster_client(cluster_id).await?.delete_group(&group.name).await
    }

    async fn create_database(&self, cluster_id: &str, database_name: &str, owner: Option<&str>) -> Result<()> {
        info!(cluster_id, database_name, ?owner, "CreateDatabase");
        self.pool
            .cluster_client(cluster_id)
            .await?
            .create_database(database_name, owner)
            .await?;

        if let Some(owner) = owner {
            self.pool
                .database_client(cluster_id, database_name)
                .await?
                .set_schema_owner(owner, "public")
                .await?;
        }
        Ok(())
    }

    async fn create_schema(&self, database: &Database, schema_name: &str) -> Result<()> {
        info!(database = %database.identifier(), schema_name, "CreateSchema");
        self.pool
            .database_client(&database.cluster_id, &database.name)
            .await?
            .create_schema(schema_name)
            .await
    }

    async fn create_external_schema(&self, database: &Database, schema_name: &str, glue_database_name: &str) -> Result<()> {
        info!(database = %database.identifier(), schema_name, glue_database_name, "CreateExternalSchema");
        self.pool
            .database_client(&database.cluster_id, &database.name)
            .await?
            .create_external_schema(schema_name, glue_database_name, &self.aws_account_id)
            .await
    }

    async fn grant_access(&self, database: &Database, group_name: &str, schema_name: &str) -> Result<()> {
        info!(database = %database.identifier(), group_name, schema_name, "GrantAccess");
        self.pool
            .database_client(&database.cluster_id, &database.name)
            .await?
            .grant(group_name, schema_name)
            .await
    }

    async fn revoke_access(&self, database: &Database, group_name: &str, schema_name: &str) -> Result<()> {
        info!(database = %database.identifier(), group_name, schema_name, "RevokeAccess");
        self.pool
            .database_client(&database.cluster_id, &database.name)
            .await?
            .revoke(group_name, schema_name)
            .await
    }

    async fn add_to_group(&self, cluster_id: &str, username: &str, group_name: &str) -> Result<()> {
        info!(cluster_id, username, group_name, "AddToGroup");
        self.pool
            .cluster_client(cluster_id)
            .await?
            .add_user_to_group(username, group_name)
            .await
    }

    async fn remove_from_group(&self, cluster_id: &str, username: &str, group_name: &str) -> Result<()> {
        info!(cluster_id, username, group_name, "RemoveFromGroup");
        self.pool
            .cluster_client(cluster_id)
            .await?
            .remove_user_from_group(username, group_name)
            .await
    }
}
