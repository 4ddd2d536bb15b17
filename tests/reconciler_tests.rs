//! Integration tests for `redshift::reconcile`, driven end to end through
//! `Applier::apply` against the in-memory fake backend. Covers spec.md §8
//! scenarios A, B and C plus the idempotence guarantee.

#![cfg(feature = "test-support")]

mod common;

use std::sync::Arc;

use hubble_rbac_controller::redshift::{self, ReconcilerConfig};
use hubble_rbac_controller::testing::{fake::FakeClientGroup, fixtures};
use hubble_rbac_controller::{resolve, Exclusions};

use common::{applier, introspect, RecordingGoogleApplier, RecordingIamApplier};

#[tokio::test]
async fn scenario_a_bi_analyst_gains_access_to_prod() {
    let model = fixtures::bi_analyst_model("jwr", "jwr@lunar.app");
    let backend = FakeClientGroup::new();

    let iam_applier = Arc::new(RecordingIamApplier::default());
    let google_applier = Arc::new(RecordingGoogleApplier::default());
    let app = applier(backend.clone(), Exclusions::default(), iam_applier.clone(), google_applier.clone());

    app.apply(&model, false).await.expect("apply succeeds");

    let iam_applied = iam_applier.applied.lock().unwrap();
    let iam_model = iam_applied.last().expect("iam applier invoked");
    let role = iam_model.lookup_role("bi_analyst").expect("role present");
    let policy = role.login_policies.iter().find(|p| p.email == "jwr@lunar.app").unwrap();
    assert_eq!(policy.database_username, "jwr_bi_analyst");
    assert!(policy.databases.iter().any(|d| d.cluster_id == "hubble-unstable" && d.name == "prod"));

    let google_applied = google_applier.applied.lock().unwrap();
    let google_model = google_applied.last().expect("google applier invoked");
    let user = google_model.lookup_user("jwr@lunar.app").expect("user present");
    assert!(user.roles.contains("bi_analyst"));

    // Re-introspect the fake backend to confirm Redshift mutations landed.
    let current = introspect(&backend, &["hubble-unstable".to_string()]).await;
    let cluster = current.lookup_cluster("hubble-unstable").unwrap();
    assert!(cluster.lookup_group("bi_analyst").is_some());
    let user = cluster.lookup_user("jwr_bi_analyst").unwrap();
    assert_eq!(user.role().unwrap(), "bi_analyst");

    let database = cluster.lookup_database("prod").unwrap();
    let group = database.lookup_group("bi_analyst").unwrap();
    assert_eq!(group.granted(), vec!["public".to_string(), "bi".to_string(), "core".to_string()]);
}

#[tokio::test]
async fn scenario_b_developer_database_gets_an_owner_and_external_schema() {
    let model = fixtures::dbt_developer_model("nra", "nra@lunar.app");
    let backend = FakeClientGroup::new();
    let iam_applier = Arc::new(RecordingIamApplier::default());
    let google_applier = Arc::new(RecordingGoogleApplier::default());
    let app = applier(backend.clone(), Exclusions::default(), iam_applier.clone(), google_applier.clone());

    app.apply(&model, false).await.expect("apply succeeds");

    let current = introspect(&backend, &["hubble".to_string()]).await;
    let cluster = current.lookup_cluster("hubble").unwrap();
    let database = cluster.lookup_database("nra").unwrap();
    assert_eq!(database.owner.as_deref(), Some("nra_dbt_developer"));

    let group = database.lookup_group("dbt_developer").unwrap();
    assert!(group.granted().contains(&"public".to_string()));
    assert!(group.granted().contains(&"lwgoevents".to_string()));

    let iam_applied = iam_applier.applied.lock().unwrap();
    let role = iam_applied.last().unwrap().lookup_role("dbt_developer").unwrap();
    let policy = role.login_policies.iter().find(|p| p.email == "nra@lunar.app").unwrap();
    assert!(policy.databases.iter().any(|d| d.cluster_id == "hubble" && d.name == "nra"));
}

#[tokio::test]
async fn scenario_c_role_removal_drops_group_after_revokes_and_membership() {
    let model = fixtures::bi_analyst_model("jwr", "jwr@lunar.app");
    let backend = FakeClientGroup::new();
    let iam_applier = Arc::new(RecordingIamApplier::default());
    let google_applier = Arc::new(RecordingGoogleApplier::default());
    let app = applier(backend.clone(), Exclusions::default(), iam_applier.clone(), google_applier.clone());
    app.apply(&model, false).await.expect("initial apply succeeds");

    let reduced = fixtures::without_role(&model, "jwr", "bi_analyst");
    app.apply(&reduced, false).await.expect("second apply succeeds");

    let current = introspect(&backend, &["hubble-unstable".to_string()]).await;
    let cluster = current.lookup_cluster("hubble-unstable").unwrap();
    assert!(cluster.lookup_group("bi_analyst").is_none(), "group should have been dropped");
    assert!(cluster.lookup_user("jwr_bi_analyst").is_none(), "user should have been dropped");
}

#[tokio::test]
async fn idempotent_apply_produces_an_empty_dag_on_the_second_pass() {
    let model = fixtures::bi_analyst_model("jwr", "jwr@lunar.app");
    let backend = FakeClientGroup::new();
    let iam_applier = Arc::new(RecordingIamApplier::default());
    let google_applier = Arc::new(RecordingGoogleApplier::default());
    let app = applier(backend.clone(), Exclusions::default(), iam_applier, google_applier);
    app.apply(&model, false).await.expect("first apply succeeds");

    let resolved = resolve(&model);
    let current = introspect(&backend, &resolved.redshift.cluster_ids()).await;
    let dag = redshift::reconcile(&current, &resolved.redshift, &ReconcilerConfig::default()).unwrap();
    assert_eq!(dag.num_tasks(), 0, "nothing left to reconcile once current matches desired");
}
