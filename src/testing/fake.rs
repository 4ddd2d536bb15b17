//! An in-memory stand-in for a fleet of Redshift clusters: implements
//! [`RedshiftClient`] and [`ClientGroup`] entirely over `HashMap`s guarded by
//! a `Mutex`, so tests can drive the full `introspect -> reconcile -> run`
//! pipeline without a network round-trip. Grounded on the teacher's
//! `src/testing/server.rs` (same role: a fake backend consumers of this
//! crate plug into their own tests), but an in-process fake instead of a
//! wiremock HTTP server, since the Redshift boundary here is a SQL client
//! trait, not a REST API.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{HubbleRbacError, Result};
use crate::redshift::client::{ClusterCapabilities, RedshiftClient, Row};
use crate::redshift::model::Database;
use crate::redshift::pool::ClientGroup;

#[derive(Debug, Default)]
struct DatabaseState {
    owner: Option<String>,
    schemas: HashSet<String>,
    external_schemas: HashMap<String, String>,
    schema_owners: HashMap<String, String>,
    grants: HashMap<String, HashSet<String>>,
}

#[derive(Debug, Default)]
struct ClusterState {
    users: HashSet<String>,
    groups: HashSet<String>,
    memberships: HashMap<String, HashSet<String>>,
    databases: HashMap<String, DatabaseState>,
}

/// Identifies one fake SQL call for the purpose of injecting a failure, e.g.
/// `("create_schema", "hubble-unstable/prod/bi")`.
pub type FailurePoint = (&'static str, String);

#[derive(Default)]
struct State {
    clusters: HashMap<String, ClusterState>,
    failures: HashSet<FailurePoint>,
}

/// A fleet of fake clusters shared by every [`FakeRedshiftClient`] handed
/// out for it. Clone and hand `Arc`s of the same group to both the
/// introspector and the task runner to observe one consistent world.
#[derive(Clone, Default)]
pub struct FakeClientGroup {
    state: std::sync::Arc<Mutex<State>>,
}

impl FakeClientGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a cluster with an existing group, membership, database, owner
    /// and set of per-database group grants, mirroring the current state an
    /// introspector would observe. Call before running a reconciliation that
    /// should diff against non-empty current state.
    pub fn seed_group(&self, cluster_id: &str, group: &str) {
        self.with_cluster(cluster_id, |c| {
            c.groups.insert(group.to_string());
        });
    }

    pub fn seed_membership(&self, cluster_id: &str, username: &str, group: &str) {
        self.with_cluster(cluster_id, |c| {
            c.users.insert(username.to_string());
            c.groups.insert(group.to_string());
            c.memberships.entry(username.to_string()).or_default().insert(group.to_string());
        });
    }

    pub fn seed_database(&self, cluster_id: &str, name: &str, owner: Option<&str>) {
        self.with_cluster(cluster_id, |c| {
            let entry = c.databases.entry(name.to_string()).or_default();
            entry.owner = owner.map(|o| o.to_string());
        });
    }

    pub fn seed_grant(&self, cluster_id: &str, database: &str, group: &str, schema: &str) {
        self.with_cluster(cluster_id, |c| {
            let db = c.databases.entry(database.to_string()).or_default();
            db.schemas.insert(schema.to_string());
            db.grants.entry(group.to_string()).or_default().insert(schema.to_string());
        });
    }

    /// Makes the next (and every subsequent) call matching `operation` and
    /// `key` fail with [`HubbleRbacError::Query`]. Used to exercise failure
    /// isolation: a single failing task must not stop independent subgraphs.
    pub fn fail(&self, operation: &'static str, key: impl Into<String>) {
        self.state.lock().unwrap().failures.insert((operation, key.into()));
    }

    fn with_cluster<T>(&self, cluster_id: &str, f: impl FnOnce(&mut ClusterState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        let cluster = state.clusters.entry(cluster_id.to_string()).or_default();
        f(cluster)
    }

    fn client(&self, cluster_id: &str, database_name: Option<&str>) -> FakeRedshiftClient {
        self.with_cluster(cluster_id, |_| {});
        FakeRedshiftClient {
            state: self.state.clone(),
            cluster_id: cluster_id.to_string(),
            database_name: database_name.map(|d| d.to_string()),
        }
    }
}

#[async_trait]
impl ClientGroup for FakeClientGroup {
    async fn for_database(&self, database: &Database) -> Result<std::sync::Arc<dyn RedshiftClient>> {
        self.database(&database.cluster_id, &database.name).await
    }

    async fn master_database(&self, cluster_identifier: &str) -> Result<std::sync::Arc<dyn RedshiftClient>> {
        Ok(std::sync::Arc::new(self.client(cluster_identifier, None)))
    }

    async fn database(&self, cluster_identifier: &str, database_name: &str) -> Result<std::sync::Arc<dyn RedshiftClient>> {
        Ok(std::sync::Arc::new(self.client(cluster_identifier, Some(database_name))))
    }
}

/// A [`RedshiftClient`] backed by shared [`FakeClientGroup`] state. One
/// instance speaks for either a cluster's master database (`database_name ==
/// None`, used for user/group/database-level operations) or a single
/// database (used for schema and grant operations), mirroring the
/// production `PgRedshiftClient`'s connection-per-(cluster, database) shape.
pub struct FakeRedshiftClient {
    state: std::sync::Arc<Mutex<State>>,
    cluster_id: String,
    database_name: Option<String>,
}

impl FakeRedshiftClient {
    fn fail_if_configured(&self, operation: &'static str, key: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.failures.contains(&(operation, key.to_string())) {
            return Err(HubbleRbacError::Query(format!("{operation} configured to fail for {key}")));
        }
        Ok(())
    }

    fn database_key(&self) -> Result<String> {
        self.database_name
            .clone()
            .ok_or_else(|| HubbleRbacError::Validation("operation requires a database-scoped client".to_string()))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ClusterState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        let cluster = state.clusters.entry(self.cluster_id.clone()).or_default();
        f(cluster)
    }

    fn with_database<T>(&self, f: impl FnOnce(&mut DatabaseState) -> Result<T>) -> Result<T> {
        let database_name = self.database_key()?;
        let mut state = self.state.lock().unwrap();
        let cluster = state.clusters.entry(self.cluster_id.clone()).or_default();
        let database = cluster.databases.entry(database_name).or_default();
        f(database)
    }
}

#[async_trait]
impl RedshiftClient for FakeRedshiftClient {
    async fn owners(&self) -> Result<Vec<Row>> {
        Ok(self.with_state(|c| {
            c.databases
                .iter()
                .filter_map(|(name, state)| {
                    state.owner.as_ref().map(|owner| Row { cells: vec![name.clone(), owner.clone()] })
                })
                .collect()
        }))
    }

    async fn groups(&self) -> Result<Vec<String>> {
        Ok(self.with_state(|c| c.groups.iter().cloned().collect()))
    }

    async fn users_and_groups(&self) -> Result<Vec<Row>> {
        Ok(self.with_state(|c| {
            c.memberships
                .iter()
                .flat_map(|(user, groups)| groups.iter().map(move |group| Row { cells: vec![user.clone(), group.clone()] }))
                .collect()
        }))
    }

    async fn databases(&self) -> Result<Vec<String>> {
        Ok(self.with_state(|c| c.databases.keys().cloned().collect()))
    }

    async fn grants(&self, group_name: &str) -> Result<Vec<String>> {
        self.with_database(|db| Ok(db.grants.get(group_name).cloned().unwrap_or_default().into_iter().collect()))
    }

    async fn create_user(&self, username: &str) -> Result<()> {
        self.fail_if_configured("create_user", username)?;
        self.with_state(|c| {
            c.users.insert(username.to_string());
        });
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        self.fail_if_configured("delete_user", username)?;
        let still_owns_database = self.with_state(|c| {
            let owns = c.databases.values().any(|db| db.owner.as_deref() == Some(username));
            if !owns {
                c.users.remove(username);
                c.memberships.remove(username);
            }
            owns
        });
        if still_owns_database {
            return Err(HubbleRbacError::ObjectInUse {
                username: username.to_string(),
                message: "user owns a database".to_string(),
            });
        }
        Ok(())
    }

    async fn create_group(&self, group_name: &str) -> Result<()> {
        self.fail_if_configured("create_group", group_name)?;
        self.with_state(|c| {
            c.groups.insert(group_name.to_string());
        });
        Ok(())
    }

    async fn delete_group(&self, group_name: &str) -> Result<()> {
        self.fail_if_configured("delete_group", group_name)?;
        self.with_state(|c| {
            c.groups.remove(group_name);
            for database in c.databases.values_mut() {
                database.grants.remove(group_name);
            }
        });
        Ok(())
    }

    async fn create_schema(&self, schema_name: &str) -> Result<()> {
        let key = format!("{}/{}/{}", self.cluster_id, self.database_name.as_deref().unwrap_or(""), schema_name);
        self.fail_if_configured("create_schema", &key)?;
        self.with_database(|db| {
            db.schemas.insert(schema_name.to_string());
            Ok(())
        })
    }

    async fn create_external_schema(&self, schema_name: &str, glue_database_name: &str, _aws_account_id: &str) -> Result<()> {
        let key = format!("{}/{}/{}", self.cluster_id, self.database_name.as_deref().unwrap_or(""), schema_name);
        self.fail_if_configured("create_external_schema", &key)?;
        self.with_database(|db| {
            db.external_schemas.insert(schema_name.to_string(), glue_database_name.to_string());
            Ok(())
        })
    }

    async fn create_database(&self, database_name: &str, owner: Option<&str>) -> Result<()> {
        self.fail_if_configured("create_database", database_name)?;
        self.with_state(|c| {
            let entry = c.databases.entry(database_name.to_string()).or_default();
            entry.owner = owner.map(|o| o.to_string());
        });
        Ok(())
    }

    async fn set_schema_owner(&self, owner: &str, schema_name: &str) -> Result<()> {
        self.with_database(|db| {
            db.schema_owners.insert(schema_name.to_string(), owner.to_string());
            Ok(())
        })
    }

    async fn grant(&self, group_name: &str, schema_name: &str) -> Result<()> {
        let key = format!(
            "{}/{}/{}->{}",
            self.cluster_id,
            self.database_name.as_deref().unwrap_or(""),
            group_name,
            schema_name
        );
        self.fail_if_configured("grant", &key)?;
        self.with_database(|db| {
            db.grants.entry(group_name.to_string()).or_default().insert(schema_name.to_string());
            Ok(())
        })
    }

    async fn revoke(&self, group_name: &str, schema_name: &str) -> Result<()> {
        self.with_database(|db| {
            if let Some(granted) = db.grants.get_mut(group_name) {
                granted.remove(schema_name);
            }
            Ok(())
        })
    }

    async fn add_user_to_group(&self, username: &str, group_name: &str) -> Result<()> {
        self.fail_if_configured("add_user_to_group", &format!("{username}->{group_name}"))?;
        self.with_state(|c| {
            c.memberships.entry(username.to_string()).or_default().insert(group_name.to_string());
        });
        Ok(())
    }

    async fn remove_user_from_group(&self, username: &str, group_name: &str) -> Result<()> {
        self.with_state(|c| {
            if let Some(groups) = c.memberships.get_mut(username) {
                groups.remove(group_name);
            }
        });
        Ok(())
    }
}

/// Always-supported capabilities, used only to satisfy call sites that
/// expect a [`ClusterCapabilities`] alongside a fake client; the fake itself
/// doesn't gate behaviour on it.
pub const FAKE_CAPABILITIES: ClusterCapabilities = ClusterCapabilities { external_schemas_supported: true };

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redshift::pool::ClientGroup;

    #[tokio::test]
    async fn create_and_list_users_round_trips() {
        let group = FakeClientGroup::new();
        let client = group.master_database("hubble").await.unwrap();
        client.create_user("jwr_bi_analyst").await.unwrap();
        client.create_group("bi_analyst").await.unwrap();
        client.add_user_to_group("jwr_bi_analyst", "bi_analyst").await.unwrap();

        let rows = client.users_and_groups().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells, vec!["jwr_bi_analyst".to_string(), "bi_analyst".to_string()]);
    }

    #[tokio::test]
    async fn drop_user_owning_database_reports_object_in_use() {
        let group = FakeClientGroup::new();
        let client = group.master_database("hubble").await.unwrap();
        client.create_database("nra", Some("nra_dbt_developer")).await.unwrap();

        let result = client.delete_user("nra_dbt_developer").await;
        assert!(matches!(result, Err(HubbleRbacError::ObjectInUse { .. })));
    }

    #[tokio::test]
    async fn configured_failure_is_returned_once_set() {
        let group = FakeClientGroup::new();
        group.fail("create_group", "bi_analyst");
        let client = group.master_database("hubble").await.unwrap();

        assert!(client.create_group("bi_analyst").await.is_err());
        assert!(client.create_group("core").await.is_ok());
    }
}
