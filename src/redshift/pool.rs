//! Connection-sharing wrappers around [`RedshiftClient`]: one client group
//! per set of credentials, one pool per reconciliation run that caches
//! already-dialled connections by cluster/database. Grounded on the
//! source's `client_group.go` and `client_pool.go`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

use super::client::{ClusterCapabilities, PgRedshiftClient, RedshiftClient};
use super::model::Database;

/// Per-cluster connection parameters shared across every database on it.
#[derive(Debug, Clone)]
pub struct ClusterCredentials {
    pub username: String,
    pub password: String,
    pub master_database: String,
    /// `{}` is replaced with the cluster identifier to produce the host.
    pub host_template: String,
    pub port: u16,
    pub external_schemas_supported: bool,
}

impl ClusterCredentials {
    fn host_for(&self, cluster_identifier: &str) -> String {
        self.host_template.replace("{}", cluster_identifier)
    }

    fn capabilities(&self) -> ClusterCapabilities {
        ClusterCapabilities {
            external_schemas_supported: self.external_schemas_supported,
        }
    }
}

/// Dials connections on demand. Implementations decide how a cluster
/// identifier maps to a reachable host; [`SharedCredentialsClientGroup`] is
/// the only production implementation, `src/testing` provides a fake.
#[async_trait]
pub trait ClientGroup: Send + Sync {
    async fn for_database(&self, database: &Database) -> Result<Arc<dyn RedshiftClient>>;
    async fn master_database(&self, cluster_identifier: &str) -> Result<Arc<dyn RedshiftClient>>;
    async fn database(&self, cluster_identifier: &str, database_name: &str) -> Result<Arc<dyn RedshiftClient>>;
}

/// One set of credentials shared across every cluster; the host is derived
/// from a `{}`-templated DNS pattern, e.g. `{}.abc123.eu-west-1.redshift.amazonaws.com`.
pub struct SharedCredentialsClientGroup {
    credentials: ClusterCredentials,
}

impl SharedCredentialsClientGroup {
    pub fn new(credentials: ClusterCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl ClientGroup for SharedCredentialsClientGroup {
    async fn for_database(&self, database: &Database) -> Result<Arc<dyn RedshiftClient>> {
        self.database(&database.cluster_id, &database.name).await
    }

    async fn master_database(&self, cluster_identifier: &str) -> Result<Arc<dyn RedshiftClient>> {
        let client = PgRedshiftClient::connect(
            &self.credentials.username,
            &self.credentials.password,
            &self.credentials.host_for(cluster_identifier),
            self.credentials.port,
            &self.credentials.master_database,
            self.credentials.capabilities(),
        )
        .await?;
        Ok(Arc::new(client))
    }

    async fn database(&self, cluster_identifier: &str, database_name: &str) -> Result<Arc<dyn RedshiftClient>> {
        let client = PgRedshiftClient::connect(
            &self.credentials.username,
            &self.credentials.password,
            &self.credentials.host_for(cluster_identifier),
            self.credentials.port,
            database_name,
            self.credentials.capabilities(),
        )
        .await?;
        Ok(Arc::new(client))
    }
}

/// Caches one connection per cluster master database and one per
/// (cluster, database) pair for the lifetime of a single reconciliation run.
pub struct ClientPool {
    client_group: Arc<dyn ClientGroup>,
    master_clients: Mutex<HashMap<String, Arc<dyn RedshiftClient>>>,
    database_clients: Mutex<HashMap<String, Arc<dyn RedshiftClient>>>,
}

impl ClientPool {
    pub fn new(client_group: Arc<dyn ClientGroup>) -> Self {
        Self {
            client_group,
            master_clients: Mutex::new(HashMap::new()),
            database_clients: Mutex::new(HashMap::new()),
        }
    }

    pub async fn cluster_client(&self, cluster_identifier: &str) -> Result<Arc<dyn RedshiftClient>> {
        let mut cache = self.master_clients.lock().await;
        if let Some(client) = cache.get(cluster_identifier) {
            return Ok(client.clone());
        }
        let client = self.client_group.master_database(cluster_identifier).await?;
        cache.insert(cluster_identifier.to_string(), client.clone());
        Ok(client)
    }

    pub async fn database_client(&self, cluster_identifier: &str, database_name: &str) -> Result<Arc<dyn RedshiftClient>> {
        let key = format!("{}.{}", cluster_identifier, database_name);
        let mut cache = self.database_clients.lock().await;
        if let Some(client) = cache.get(&key) {
            return Ok(client.clone());
        }
        let client = self.client_group.database(cluster_identifier, database_name).await?;
        cache.insert(key, client.clone());
        Ok(client)
    }

    /// Closes every connection this pool has dialled and drops them from
    /// the cache. `sqlx` pools don't drain on drop, so a caller that wants
    /// graceful shutdown (as opposed to letting the process exit) must
    /// await this once the reconciliation run that owns the pool is done.
    pub async fn close(&self) {
        let mut master = self.master_clients.lock().await;
        for client in master.values() {
            client.close().await;
        }
        master.clear();

        let mut databases = self.database_clients.lock().await;
        for client in databases.values() {
            client.close().await;
        }
        databases.clear();
    }
}
