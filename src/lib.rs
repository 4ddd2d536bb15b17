//! Hubble RBAC controller
//!
//! A declarative reconciler that keeps a fleet of Redshift-family SQL
//! clusters, an AWS IAM role set, and a Google Workspace directory in sync
//! with a single declarative [`hubble::Model`]: which users hold which
//! business roles, and which databases and data-lake catalogs each role
//! grants.
//!
//! # Pipeline
//!
//! ```text
//! hubble::Model
//!     -> resolver::resolve         (pure: one desired model per backend)
//!     -> redshift::Model::validate  (exclusions, single-group, dangling refs)
//!     -> redshift::introspect       (concurrent per-cluster current state)
//!     -> redshift::reconcile        (current, desired) -> Dag
//!     -> redshift::DagRunner        (sequential, dependency-ordered execution)
//!     -> IamApplier, GoogleApplier  (skipped entirely on a dry run)
//! ```
//!
//! [`applier::Applier`] wires the whole pipeline together; the stages are
//! independently usable when only part of the pipeline is needed (tests,
//! a `--dry-run` CLI, or a different scheduling harness around the DAG).
//!
//! # Quick Start
//!
//! Add to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! hubble-rbac-controller = "0.1.0"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use hubble_rbac_controller::{applier::Applier, exclusions::Exclusions, redshift};
//!
//! # async fn example(
//! #     client_group: Arc<dyn redshift::pool::ClientGroup>,
//! #     iam_applier: Arc<dyn hubble_rbac_controller::applier::IamApplier>,
//! #     google_applier: Arc<dyn hubble_rbac_controller::applier::GoogleApplier>,
//! #     model: hubble_rbac_controller::hubble::Model,
//! # ) -> hubble_rbac_controller::error::Result<()> {
//! let exclusions = Arc::new(Exclusions::new(vec!["admin".to_string()], vec![]));
//! let applier = Applier::builder()
//!     .client_group(client_group)
//!     .exclusions(exclusions)
//!     .aws_account_id("123456789012")
//!     .iam_applier(iam_applier)
//!     .google_applier(google_applier)
//!     .build();
//!
//! applier.apply(&model, false).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - **Domain model**: [`hubble`], the validated input the whole pipeline consumes.
//! - **Target models**: [`redshift`], [`iam`], [`google`], per-backend desired/current state.
//! - **Translation**: [`resolver`], pure `hubble::Model -> (redshift, iam, google)`.
//! - **Orchestration**: [`applier`], the top-level `apply(model, dry_run)` entry point.
//! - **Guardrails**: [`exclusions`], protected users/databases never touched by the controller.
//! - **Errors**: [`error`], the crate-wide `HubbleRbacError` and `Result` alias.

pub mod applier;
pub mod error;
pub mod exclusions;
pub mod google;
pub mod hubble;
pub mod iam;
pub mod redshift;
pub mod resolver;

#[cfg(feature = "test-support")]
pub mod testing;

pub use applier::{Applier, GoogleApplier, IamApplier};
pub use error::{HubbleRbacError, Result};
pub use exclusions::{Excluder, Exclusions};
pub use resolver::{resolve, ResolvedModel};
