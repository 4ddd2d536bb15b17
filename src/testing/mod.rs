//! Testing utilities for consumers of `hubble-rbac-controller`.
//!
//! - [`fake`]: an in-memory [`fake::FakeClientGroup`] implementing the same
//!   `ClientGroup`/`RedshiftClient` traits the production pool uses, so a
//!   test can exercise `introspect -> reconcile -> run` without a database.
//! - [`fixtures`]: pre-built [`crate::hubble::Model`] values for the
//!   end-to-end scenarios in spec.md §8.
//!
//! # Feature flag
//!
//! This module is only available when the `test-support` feature is
//! enabled, matching the teacher's own `test-support`-gated testing module:
//!
//! ```toml
//! [dev-dependencies]
//! hubble-rbac-controller = { version = "0.1", features = ["test-support"] }
//! ```
//!
//! # Quick start
//!
//! ```
//! use hubble_rbac_controller::testing::fixtures;
//!
//! let model = fixtures::bi_analyst_model("jwr", "jwr@lunar.app");
//! let resolved = hubble_rbac_controller::resolve(&model);
//! assert!(resolved.redshift.lookup_cluster("hubble-unstable").is_some());
//! ```
//!
//! See [`fake::FakeClientGroup`] for driving a full `introspect -> reconcile
//! -> run` pass against in-memory state instead of a real cluster.

pub mod fake;
pub mod fixtures;

pub use fake::{FailurePoint, FakeClientGroup, FakeRedshiftClient};
