//! Shared scaffolding for the integration tests in this directory: recording
//! IAM/Google appliers and the `Applier`/introspection helpers every
//! scenario test builds on. Mirrors the role of the teacher's `tests/common/`
//! module.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use hubble_rbac_controller::redshift::pool::{ClientGroup, ClientPool};
use hubble_rbac_controller::redshift::{self, ReconcilerConfig};
use hubble_rbac_controller::testing::fake::FakeClientGroup;
use hubble_rbac_controller::{applier::GoogleApplier, applier::IamApplier, google, iam};
use hubble_rbac_controller::{Applier, Exclusions};

#[derive(Default)]
pub struct RecordingIamApplier {
    pub applied: Mutex<Vec<iam::Model>>,
}

#[async_trait]
impl IamApplier for RecordingIamApplier {
    async fn apply(&self, model: &iam::Model) -> hubble_rbac_controller::Result<()> {
        self.applied.lock().unwrap().push(model.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingGoogleApplier {
    pub applied: Mutex<Vec<google::Model>>,
}

#[async_trait]
impl GoogleApplier for RecordingGoogleApplier {
    async fn apply(&self, model: &google::Model) -> hubble_rbac_controller::Result<()> {
        self.applied.lock().unwrap().push(model.clone());
        Ok(())
    }
}

pub fn applier(
    client_group: FakeClientGroup,
    exclusions: Exclusions,
    iam_applier: Arc<RecordingIamApplier>,
    google_applier: Arc<RecordingGoogleApplier>,
) -> Applier<Exclusions> {
    Applier::builder()
        .client_group(Arc::new(client_group) as Arc<dyn ClientGroup>)
        .exclusions(Arc::new(exclusions))
        .reconciler_config(ReconcilerConfig::default())
        .aws_account_id("123456789012")
        .iam_applier(iam_applier as Arc<dyn IamApplier>)
        .google_applier(google_applier as Arc<dyn GoogleApplier>)
        .build()
}

pub async fn introspect(backend: &FakeClientGroup, cluster_ids: &[String]) -> redshift::Model {
    let pool = Arc::new(ClientPool::new(Arc::new(backend.clone()) as Arc<dyn ClientGroup>));
    let exclusions = Arc::new(Exclusions::default());
    let introspector = redshift::introspect::Introspector::new(pool, exclusions, Default::default());
    introspector.resolve(cluster_ids).await.expect("introspection succeeds against the fake backend")
}
