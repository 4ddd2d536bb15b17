//! Integration test for `redshift::DagRunner` (spec.md §8 scenario E): a
//! failure in one schema's task must not block an independent schema's
//! tasks, and must still suppress the downstream IAM/Google appliers.

#![cfg(feature = "test-support")]

mod common;

use std::sync::Arc;

use hubble_rbac_controller::testing::{fake::FakeClientGroup, fixtures};
use hubble_rbac_controller::Exclusions;

use common::{applier, introspect, RecordingGoogleApplier, RecordingIamApplier};

#[tokio::test]
async fn scenario_e_failure_isolation_between_independent_schemas() {
    let model = fixtures::bi_analyst_model("jwr", "jwr@lunar.app");
    let backend = FakeClientGroup::new();
    backend.fail("create_schema", "hubble-unstable/prod/bi");

    let iam_applier = Arc::new(RecordingIamApplier::default());
    let google_applier = Arc::new(RecordingGoogleApplier::default());
    let app = applier(backend.clone(), Exclusions::default(), iam_applier.clone(), google_applier.clone());

    let result = app.apply(&model, false).await;
    assert!(result.is_err(), "overall apply reports the failed task");

    let current = introspect(&backend, &["hubble-unstable".to_string()]).await;
    let database = current.lookup_cluster("hubble-unstable").unwrap().lookup_database("prod").unwrap();
    let group = database.lookup_group("bi_analyst").unwrap();
    assert!(group.granted().contains(&"core".to_string()), "independent schema still succeeds");
    assert!(!group.granted().contains(&"bi".to_string()), "failed schema's grant never lands");

    // Redshift mutations happen before IAM/Google, but a failed Redshift
    // phase must still suppress both downstream appliers.
    assert!(iam_applier.applied.lock().unwrap().is_empty());
    assert!(google_applier.applied.lock().unwrap().is_empty());
}
