//! The Redshift side of the controller: target model, task DAG,
//! reconciler, runner, and the SQL-speaking infrastructure beneath them.

pub mod client;
pub mod dag;
pub mod introspect;
pub mod model;
pub mod pool;
pub mod reconciler;
pub mod runner;
pub mod task;
pub mod task_runner;

pub use dag::Dag;
pub use introspect::default_external_schemas;
pub use model::{Cluster, Database, DatabaseGroup, DatabaseUser, ExternalSchema, Group, Model, Schema, User};
pub use reconciler::{reconcile, ReconcilerConfig};
pub use runner::{DagRunner, PrintingTaskRunner, TaskRunner};
pub use task::{Task, TaskPayload, TaskState, TaskType};
