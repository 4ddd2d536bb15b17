//! The top-level orchestration entry point: resolve, validate, introspect,
//! reconcile, run, then push IAM and Google state. Grounded on the
//! source's `internal/infrastructure/service/applier.go`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use typed_builder::TypedBuilder;

use crate::error::{HubbleRbacError, Result};
use crate::exclusions::Excluder;
use crate::hubble;
use crate::iam;
use crate::google;
use crate::redshift;
use crate::resolver;

/// `iamApplier.apply(iamModel) → error`. Opaque to the core per spec §6:
/// the controller never speaks the AWS IAM API directly.
#[async_trait]
pub trait IamApplier: Send + Sync {
    async fn apply(&self, model: &iam::Model) -> Result<()>;
}

/// `googleApplier.apply(googleModel) → error`. Opaque to the core per spec §6.
#[async_trait]
pub trait GoogleApplier: Send + Sync {
    async fn apply(&self, model: &google::Model) -> Result<()>;
}

/// Delegates to either a dry-run printer or a real cluster task runner,
/// so [`Applier`] can hold one concrete [`redshift::DagRunner`] type
/// regardless of `dry_run`.
enum RedshiftTaskRunner {
    Printing(redshift::PrintingTaskRunner),
    Real(redshift::task_runner::ClusterTaskRunner),
}

#[async_trait]
impl redshift::TaskRunner for RedshiftTaskRunner {
    async fn create_user(&self, cluster_id: &str, user: &redshift::User) -> Result<()> {
        match self {
            Self::Printing(r) => r.create_user(cluster_id, user).await,
            Self::Real(r) => r.create_user(cluster_id, user).await,
        }
    }
    async fn drop_user(&self, cluster_id: &str, user: &redshift::User) -> Result<()> {
        match self {
            Self::Printing(r) => r.drop_user(cluster_id, user).await,
            Self::Real(r) => r.drop_user(cluster_id, user).await,
        }
    }
    async fn create_group(&self, cluster_id: &str, group: &redshift::Group) -> Result<()> {
        match self {
            Self::Printing(r) => r.create_group(cluster_id, group).await,
            Self::Real(r) => r.create_group(cluster_id, group).await,
        }
    }
    async fn drop_group(&self, cluster_id: &str, group: &redshift::Group) -> Result<()> {
        match self {
            Self::Printing(r) => r.drop_group(cluster_id, group).await,
            Self::Real(r) => r.drop_group(cluster_id, group).await,
        }
    }
    async fn create_database(&self, cluster_id: &str, database_name: &str, owner: Option<&str>) -> Result<()> {
        match self {
            Self::Printing(r) => r.create_database(cluster_id, database_name, owner).await,
            Self::Real(r) => r.create_database(cluster_id, database_name, owner).await,
        }
    }
    async fn create_schema(&self, database: &redshift::Database, schema_name: &str) -> Result<()> {
        match self {
            Self::Printing(r) => r.create_schema(database, schema_name).await,
            Self::Real(r) => r.create_schema(database, schema_name).await,
        }
    }
    async fn create_external_schema(
        &self,
        database: &redshift::Database,
        schema_name: &str,
        glue_database_name: &str,
    ) -> Result<()> {
        match self {
            Self::Printing(r) => r.create_external_schema(database, schema_name, glue_database_name).await,
            Self::Real(r) => r.create_external_schema(database, schema_name, glue_database_name).await,
        }
    }
    async fn grant_access(&self, database: &redshift::Database, group_name: &str, schema_name: &str) -> Result<()> {
        match self {
            Self::Printing(r) => r.grant_access(database, group_name, schema_name).await,
            Self::Real(r) => r.grant_access(database, group_name, schema_name).await,
        }
    }
    async fn revoke_access(&self, database: &redshift::Database, group_name: &str, schema_name: &str) -> Result<()> {
        match self {
            Self::Printing(r) => r.revoke_access(database, group_name, schema_name).await,
            Self::Real(r) => r.revoke_access(database, group_name, schema_name).await,
        }
    }
    async fn add_to_group(&self, cluster_id: &str, username: &str, group_name: &str) -> Result<()> {
        match self {
            Self::Printing(r) => r.add_to_group(cluster_id, username, group_name).await,
            Self::Real(r) => r.add_to_group(cluster_id, username, group_name).await,
        }
    }
    async fn remove_from_group(&self, cluster_id: &str, username: &str, group_name: &str) -> Result<()> {
        match self {
            Self::Printing(r) => r.remove_from_group(cluster_id, username, group_name).await,
            Self::Real(r) => r.remove_from_group(cluster_id, username, group_name).await,
        }
    }
}

/// Wires every stage of one reconciliation run together.
#[derive(TypedBuilder)]
pub struct Applier<E: Excluder + Send + Sync + 'static> {
    client_group: Arc<dyn redshift::pool::ClientGroup>,
    exclusions: Arc<E>,
    #[builder(default)]
    external_schemas: redshift::introspect::ExternalSchemaMap,
    #[builder(default)]
    reconciler_config: redshift::ReconcilerConfig,
    #[builder(setter(into))]
    aws_account_id: String,
    iam_applier: Arc<dyn IamApplier>,
    google_applier: Arc<dyn GoogleApplier>,
}

impl<E: Excluder + Send + Sync + 'static> Applier<E> {
    /// Runs one full reconciliation: resolve, validate, introspect,
    /// reconcile, execute the DAG, then (unless `dry_run`) push IAM and
    /// Google state. Redshift first, then IAM, then Google: users must
    /// exist in Redshift before IAM policies referencing their database
    /// usernames are useful, and Google SAML attributes must only be
    /// updated once the IAM roles they point to exist.
    pub async fn apply(&self, model: &hubble::Model, dry_run: bool) -> Result<()> {
        info!("received hubble model");

        let resolved = resolver::resolve(model);
        resolved.redshift.validate(self.exclusions.as_ref())?;

        let pool = Arc::new(redshift::pool::ClientPool::new(self.client_group.clone()));
        let result = self.apply_with_pool(&resolved, pool.clone(), dry_run).await;
        pool.close().await;
        result
    }

    async fn apply_with_pool(
        &self,
        resolved: &resolver::ResolvedModel,
        pool: Arc<redshift::pool::ClientPool>,
        dry_run: bool,
    ) -> Result<()> {
        let introspector = redshift::introspect::Introspector::new(
            pool.clone(),
            self.exclusions.clone(),
            self.external_schemas.clone(),
        );

        info!("introspecting current state");
        let current = introspector.resolve(&resolved.redshift.cluster_ids()).await?;

        info!("reconciling");
        let mut dag = redshift::reconcile(&current, &resolved.redshift, &self.reconciler_config)?;

        let task_runner = if dry_run {
            RedshiftTaskRunner::Printing(redshift::PrintingTaskRunner)
        } else {
            RedshiftTaskRunner::Real(redshift::task_runner::ClusterTaskRunner::new(
                pool.clone(),
                self.aws_account_id.clone(),
            ))
        };

        info!("applying redshift model");
        // Tasks can reference a database that only exists in current state
        // (e.g. revoking a group's grants on a database the desired model
        // no longer declares), so both current and desired databases must
        // be resolvable here.
        let all_databases: Vec<redshift::Database> = current
            .clusters
            .iter()
            .chain(resolved.redshift.clusters.iter())
            .flat_map(|c| c.databases.clone())
            .collect();
        let runner = redshift::DagRunner::new(task_runner);
        let run_result = runner.run(&mut dag, &all_databases).await;

        let failed = dag.get_failed().len();
        if failed > 0 {
            return Err(HubbleRbacError::TasksFailed { failed });
        }
        run_result?;

        if !dry_run {
            info!("applying IAM model");
            self.iam_applier.apply(&resolved.iam).await?;

            info!("applying Google model");
            self.google_applier.apply(&resolved.google).await?;
        }

        info!("all changes have been applied");
        Ok(())
    }
}
