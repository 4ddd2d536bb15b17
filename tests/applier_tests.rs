//! Integration test for the top-level `Applier` orchestration (spec.md §8
//! scenario F): `dry_run` must run the Redshift phase read-only and skip
//! both downstream appliers entirely.

#![cfg(feature = "test-support")]

mod common;

use std::sync::Arc;

use hubble_rbac_controller::testing::{fake::FakeClientGroup, fixtures};
use hubble_rbac_controller::Exclusions;

use common::{applier, introspect, RecordingGoogleApplier, RecordingIamApplier};

#[tokio::test]
async fn scenario_f_dry_run_performs_no_mutation_and_skips_downstream_appliers() {
    let model = fixtures::bi_analyst_model("jwr", "jwr@lunar.app");
    let backend = FakeClientGroup::new();
    let iam_applier = Arc::new(RecordingIamApplier::default());
    let google_applier = Arc::new(RecordingGoogleApplier::default());
    let app = applier(backend.clone(), Exclusions::default(), iam_applier.clone(), google_applier.clone());

    app.apply(&model, true).await.expect("dry run succeeds");

    let current = introspect(&backend, &["hubble-unstable".to_string()]).await;
    assert!(current.clusters.is_empty() || current.lookup_cluster("hubble-unstable").unwrap().groups.is_empty());
    assert!(iam_applier.applied.lock().unwrap().is_empty());
    assert!(google_applier.applied.lock().unwrap().is_empty());
}
