//! The reconciler: diffs a current and a desired [`Model`] and emits a
//! dependency-ordered [`Dag`] of mutation tasks. Never talks to any backend.
//!
//! Grounded line-for-line on the source's `reconciler.go` /
//! `reconciler_tasks.go`, translated from pointer-identity task lookup to
//! structural `(TaskType, TaskPayload)` lookup over an index arena (see
//! [`super::dag`]). The one behavioural change from the source, per
//! DESIGN NOTES §9, is that a mismatched-ownership `panic` in the source's
//! `updateDatabase` becomes a returned [`HubbleRbacError::Validation`] here.

use chrono::Utc;
use typed_builder::TypedBuilder;

use crate::error::{HubbleRbacError, Result};

use super::dag::Dag;
use super::model::{Cluster, Database, DatabaseGroup, Group, Model, User};
use super::task::{Task, TaskPayload, TaskType};

/// Tunables for the reconciler's behaviour.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ReconcilerConfig {
    /// If `false`, `RevokeAccess` tasks on the `public` schema are suppressed.
    #[builder(default = true)]
    pub revoke_access_to_public_schema: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            revoke_access_to_public_schema: true,
        }
    }
}

struct Reconciler<'a> {
    config: &'a ReconcilerConfig,
    tasks: Vec<Task>,
}

/// Diffs `current` against `desired` and returns the DAG of tasks needed to
/// transform the former into the latter, respecting both SQL-engine
/// ordering constraints and the non-destructiveness rule (no `DropDatabase`
/// or schema-drop task type exists in this DAG model at all).
pub fn reconcile(current: &Model, desired: &Model, config: &ReconcilerConfig) -> Result<Dag> {
    let mut r = Reconciler { config, tasks: Vec::new() };

    for current_cluster in &current.clusters {
        match desired.lookup_cluster(&current_cluster.identifier) {
            None => r.drop_cluster(current_cluster)?,
            Some(desired_cluster) => r.update_cluster(current_cluster, desired_cluster)?,
        }
    }

    for desired_cluster in &desired.clusters {
        match current.lookup_cluster(&desired_cluster.identifier) {
            None => r.add_cluster(desired_cluster)?,
            Some(current_cluster) => r.update_cluster(current_cluster, desired_cluster)?,
        }
    }

    Ok(Dag::new(r.tasks))
}

impl<'a> Reconciler<'a> {
    fn add(&mut self, task_type: TaskType, identifier: String, payload: TaskPayload) -> usize {
        if let Some(index) = self
            .tasks
            .iter()
            .position(|t| t.task_type == task_type && t.payload == payload)
        {
            return index;
        }
        self.tasks.push(Task::new(identifier, task_type, payload, Utc::now()));
        self.tasks.len() - 1
    }

    fn depends_on(&mut self, task: usize, dependency: usize) {
        if task == dependency {
            return;
        }
        if !self.tasks[task].up_stream.contains(&dependency) {
            self.tasks[task].up_stream.push(dependency);
        }
        if !self.tasks[dependency].down_stream.contains(&task) {
            self.tasks[dependency].down_stream.push(task);
        }
    }

    fn lookup_add_to_group_tasks(&self, cluster_id: &str, group_name: &str) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                t.task_type == TaskType::AddToGroup
                    && matches!(&t.payload, TaskPayload::Membership { cluster_id: c, group_name: g, .. } if c == cluster_id && g == group_name)
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn lookup_remove_from_group_tasks(&self, cluster_id: &str, group_name: &str) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                t.task_type == TaskType::RemoveFromGroup
                    && matches!(&t.payload, TaskPayload::Membership { cluster_id: c, group_name: g, .. } if c == cluster_id && g == group_name)
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn lookup_create_group_task(&self, cluster_id: &str, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| {
            t.task_type == TaskType::CreateGroup
                && matches!(&t.payload, TaskPayload::Group { cluster_id: c, group } if c == cluster_id && group.name == name)
        })
    }

    fn lookup_drop_group_task(&self, cluster_id: &str, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| {
            t.task_type == TaskType::DropGroup
                && matches!(&t.payload, TaskPayload::Group { cluster_id: c, group } if c == cluster_id && group.name == name)
        })
    }

    fn lookup_create_database_task(&self, cluster_id: &str, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| {
            t.task_type == TaskType::CreateDatabase
                && matches!(&t.payload, TaskPayload::Database { cluster_id: c, database_name: d, .. } if c == cluster_id && d == name)
        })
    }

    fn add_cluster(&mut self, cluster: &Cluster) -> Result<()> {
        for group in &cluster.groups {
            self.create_group(&cluster.identifier, group);
        }
        for user in &cluster.users {
            self.create_user(&cluster.identifier, user)?;
        }
        for database in &cluster.databases {
            self.add_database(database)?;
        }
        Ok(())
    }

    fn drop_cluster(&mut self, cluster: &Cluster) -> Result<()> {
        for user in &cluster.users {
            self.drop_user(&cluster.identifier, user);
        }
        for group in &cluster.groups {
            self.drop_group(&cluster.identifier, group);
        }
        for database in &cluster.databases {
            self.drop_database(database);
        }
        Ok(())
    }

    fn update_cluster(&mut self, current: &Cluster, desired: &Cluster) -> Result<()> {
        for current_user in &current.users {
            match desired.lookup_user(&current_user.name) {
                None => self.drop_user(&current.identifier, current_user),
                Some(desired_user) => self.update_user(&current.identifier, current_user, desired_user)?,
            }
        }

        for current_group in &current.groups {
            if desired.lookup_group(&current_group.name).is_none() {
                self.drop_group(&current.identifier, current_group);
            }
        }

        for current_database in &current.databases {
            match desired.lookup_database(&current_database.name) {
                None => self.drop_database(current_database),
                Some(desired_database) => self.update_database(current_database, desired_database)?,
            }
        }

        for desired_group in &desired.groups {
            if current.lookup_group(&desired_group.name).is_none() {
                self.create_group(&current.identifier, desired_group);
            }
        }

        for desired_user in &desired.users {
            match current.lookup_user(&desired_user.name) {
                None => self.create_user(&current.identifier, desired_user)?,
                Some(current_user) => self.update_user(&current.identifier, current_user, desired_user)?,
            }
        }

        for desired_database in &desired.databases {
            match current.lookup_database(&desired_database.name) {
                None => self.add_database(desired_database)?,
                Some(current_database) => self.update_database(current_database, desired_database)?,
            }
        }

        Ok(())
    }

    fn create_user(&mut self, cluster_id: &str, user: &User) -> Result<()> {
        let role_name = user.role()?.to_string();

        let create_user_task = self.add(
            TaskType::CreateUser,
            user.name.clone(),
            TaskPayload::User { cluster_id: cluster_id.to_string(), user: user.clone() },
        );
        let add_to_group_task = self.add(
            TaskType::AddToGroup,
            format!("{}->{}", user.name, role_name),
            TaskPayload::membership(cluster_id, &user.name, &role_name),
        );
        self.depends_on(add_to_group_task, create_user_task);

        if let Some(create_group_task) = self.lookup_create_group_task(cluster_id, &role_name) {
            self.depends_on(add_to_group_task, create_group_task);
        }
        Ok(())
    }

    fn drop_user(&mut self, cluster_id: &str, user: &User) {
        let drop_user_task = self.add(
            TaskType::DropUser,
            user.name.clone(),
            TaskPayload::User { cluster_id: cluster_id.to_string(), user: user.clone() },
        );

        for group_name in &user.member_of {
            let remove_task = self.add(
                TaskType::RemoveFromGroup,
                format!("{}->{}", user.name, group_name),
                TaskPayload::membership(cluster_id, &user.name, group_name),
            );
            self.depends_on(drop_user_task, remove_task);
        }
    }

    fn update_user(&mut self, cluster_id: &str, current: &User, desired: &User) -> Result<()> {
        let desired_role = desired.role()?.to_string();

        for group_name in &current.member_of {
            if group_name != &desired_role {
                let remove_task = self.add(
                    TaskType::RemoveFromGroup,
                    format!("{}->{}", current.name, group_name),
                    TaskPayload::membership(cluster_id, &current.name, group_name),
                );
                if let Some(drop_group_task) = self.lookup_drop_group_task(cluster_id, group_name) {
                    self.depends_on(drop_group_task, remove_task);
                }
            }
        }

        if !current.is_member_of(&desired_role) {
            let add_task = self.add(
                TaskType::AddToGroup,
                format!("{}->{}", desired.name, desired_role),
                TaskPayload::membership(cluster_id, &desired.name, &desired_role),
            );
            if let Some(create_group_task) = self.lookup_create_group_task(cluster_id, &desired_role) {
                self.depends_on(add_task, create_group_task);
            }
        }
        Ok(())
    }

    fn create_group(&mut self, cluster_id: &str, group: &Group) -> usize {
        let create_group_task = self.add(
            TaskType::CreateGroup,
            group.name.clone(),
            TaskPayload::Group { cluster_id: cluster_id.to_string(), group: group.clone() },
        );
        for add_to_group_task in self.lookup_add_to_group_tasks(cluster_id, &group.name) {
            self.depends_on(add_to_group_task, create_group_task);
        }
        create_group_task
    }

    fn drop_group(&mut self, cluster_id: &str, group: &Group) -> usize {
        let drop_group_task = self.add(
            TaskType::DropGroup,
            group.name.clone(),
            TaskPayload::Group { cluster_id: cluster_id.to_string(), group: group.clone() },
        );
        for remove_task in self.lookup_remove_from_group_tasks(cluster_id, &group.name) {
            self.depends_on(drop_group_task, remove_task);
        }
        drop_group_task
    }

    fn add_database(&mut self, database: &Database) -> Result<()> {
        self.add(
            TaskType::CreateDatabase,
            database.name.clone(),
            TaskPayload::database(&database.cluster_id, database),
        );

        for group in &database.groups {
            self.add_database_group(database, group);
        }
        Ok(())
    }

    fn drop_database(&mut self, database: &Database) {
        for group in &database.groups {
            self.drop_database_group(database, group);
        }
    }

    fn update_database(&mut self, current: &Database, desired: &Database) -> Result<()> {
        if current.owner != desired.owner {
            return Err(HubbleRbacError::Validation(format!(
                "database {} has mismatched owners between current ({:?}) and desired ({:?}) state",
                current.identifier(),
                current.owner,
                desired.owner
            )));
        }

        for current_group in &current.groups {
            match desired.lookup_group(&current_group.name) {
                None => self.drop_database_group(current, current_group),
                Some(desired_group) => self.update_database_group(current, current_group, desired_group),
            }
        }

        for desired_group in &desired.groups {
            match current.lookup_group(&desired_group.name) {
                None => self.add_database_group(desired, desired_group),
                Some(current_group) => self.update_database_group(current, current_group, desired_group),
            }
        }

        Ok(())
    }

    fn add_database_group(&mut self, database: &Database, group: &DatabaseGroup) {
        let create_database_task = self.lookup_create_database_task(&database.cluster_id, &database.name);
        let create_group_task = self.lookup_create_group_task(&database.cluster_id, &group.name);

        for schema in &group.granted_schemas {
            let grant_task = self.add(
                TaskType::GrantAccess,
                format!("{}->{}", group.name, schema.name),
                TaskPayload::grants(database, &group.name, &schema.name),
            );
            let create_schema_task = self.add(
                TaskType::CreateSchema,
                schema.name.clone(),
                TaskPayload::schema(database, &schema.name),
            );
            if let Some(t) = create_database_task {
                self.depends_on(grant_task, t);
                self.depends_on(create_schema_task, t);
            }
            self.depends_on(grant_task, create_schema_task);
            if let Some(t) = create_group_task {
                self.depends_on(grant_task, t);
            }
        }

        for schema in &group.granted_external_schemas {
            let grant_task = self.add(
                TaskType::GrantAccess,
                format!("{}->{}", group.name, schema.name),
                TaskPayload::grants(database, &group.name, &schema.name),
            );
            let create_schema_task = self.add(
                TaskType::CreateExternalSchema,
                schema.name.clone(),
                TaskPayload::external_schema(database, &schema.name, &schema.glue_database_name),
            );
            if let Some(t) = create_database_task {
                self.depends_on(grant_task, t);
                self.depends_on(create_schema_task, t);
            }
            self.depends_on(grant_task, create_schema_task);
            if let Some(t) = create_group_task {
                self.depends_on(grant_task, t);
            }
        }
    }

    fn should_revoke(&self, schema_name: &str) -> bool {
        self.config.revoke_access_to_public_schema || schema_name != "public"
    }

    fn drop_database_group(&mut self, database: &Database, group: &DatabaseGroup) {
        let drop_group_task = self.lookup_drop_group_task(&database.cluster_id, &group.name);

        for schema in &group.granted_schemas {
            if self.should_revoke(&schema.name) {
                let revoke_task = self.add(
                    TaskType::RevokeAccess,
                    format!("{}->{}", group.name, schema.name),
                    TaskPayload::grants(database, &group.name, &schema.name),
                );
                if let Some(t) = drop_group_task {
                    self.depends_on(t, revoke_task);
                }
            }
        }

        for schema in &group.granted_external_schemas {
            let revoke_task = self.add(
                TaskType::RevokeAccess,
                format!("{}->{}", group.name, schema.name),
                TaskPayload::grants(database, &group.name, &schema.name),
            );
            if let Some(t) = drop_group_task {
                self.depends_on(t, revoke_task);
            }
        }
    }

    fn update_database_group(&mut self, database: &Database, current: &DatabaseGroup, desired: &DatabaseGroup) {
        let drop_group_task = self.lookup_drop_group_task(&database.cluster_id, &current.name);
        let create_group_task = self.lookup_create_group_task(&database.cluster_id, &desired.name);

        for schema in &current.granted_schemas {
            if desired.lookup_granted_schema(&schema.name).is_none() && self.should_revoke(&schema.name) {
                let revoke_task = self.add(
                    TaskType::RevokeAccess,
                    format!("{}->{}", current.name, schema.name),
                    TaskPayload::grants(database, &current.name, &schema.name),
                );
                if let Some(t) = drop_group_task {
                    self.depends_on(t, revoke_task);
                }
            }
        }

        for schema in &current.granted_external_schemas {
            if desired.lookup_granted_external_schema(&schema.name).is_none() {
                let revoke_task = self.add(
                    TaskType::RevokeAccess,
                    format!("{}->{}", current.name, schema.name),
                    TaskPayload::grants(database, &current.name, &schema.name),
                );
                if let Some(t) = drop_group_task {
                    self.depends_on(t, revoke_task);
                }
            }
        }

        for schema in &desired.granted_schemas {
            if current.lookup_granted_schema(&schema.name).is_none() {
                let grant_task = self.add(
                    TaskType::GrantAccess,
                    format!("{}->{}", desired.name, schema.name),
                    TaskPayload::grants(database, &desired.name, &schema.name),
                );
                let create_schema_task = self.add(
                    TaskType::CreateSchema,
                    schema.name.clone(),
                    TaskPayload::schema(database, &schema.name),
                );
                self.depends_on(grant_task, create_schema_task);
                if let Some(t) = create_group_task {
                    self.depends_on(grant_task, t);
                }
            }
        }

        for schema in &desired.granted_external_schemas {
            if current.lookup_granted_external_schema(&schema.name).is_none() {
                let grant_task = self.add(
                    TaskType::GrantAccess,
                    format!("{}->{}", desired.name, schema.name),
                    TaskPayload::grants(database, &desired.name, &schema.name),
                );
                let create_schema_task = self.add(
                    TaskType::CreateExternalSchema,
                    schema.name.clone(),
                    TaskPayload::external_schema(database, &schema.name, &schema.glue_database_name),
                );
                self.depends_on(grant_task, create_schema_task);
                if let Some(t) = create_group_task {
                    self.depends_on(grant_task, t);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redshift::task::TaskType;

    fn empty() -> Model {
        Model::default()
    }

    #[test]
    fn scenario_a_bi_analyst_gains_access_to_prod() {
        let mut desired = empty();
        {
            let cluster = desired.declare_cluster("hubble-unstable");
            cluster.declare_group("bi_analyst");
            cluster.declare_user("jwr_bi_analyst", "bi_analyst");
            let db = cluster.declare_database("prod");
            let group = db.declare_group("bi_analyst");
            group.grant_schema("public");
            group.grant_schema("bi");
            group.grant_schema("core");
            db.declare_user("jwr_bi_analyst");
        }
        let mut current = empty();
        current.declare_cluster("hubble-unstable");

        let config = ReconcilerConfig::default();
        let dag = reconcile(&current, &desired, &config).unwrap();

        let types: Vec<TaskType> = dag.tasks().iter().map(|t| t.task_type).collect();
        assert!(types.contains(&TaskType::CreateGroup));
        assert!(types.contains(&TaskType::CreateUser));
        assert!(types.contains(&TaskType::AddToGroup));
        assert_eq!(types.iter().filter(|t| **t == TaskType::CreateSchema).count(), 3);
        assert_eq!(types.iter().filter(|t| **t == TaskType::GrantAccess).count(), 3);
    }

    #[test]
    fn idempotent_when_current_equals_desired() {
        let mut model = empty();
        {
            let cluster = model.declare_cluster("hubble-unstable");
            cluster.declare_group("bi_analyst");
            cluster.declare_user("jwr_bi_analyst", "bi_analyst");
            let db = cluster.declare_database("prod");
            let group = db.declare_group("bi_analyst");
            group.grant_schema("public");
            db.declare_user("jwr_bi_analyst");
        }

        let config = ReconcilerConfig::default();
        let dag = reconcile(&model, &model, &config).unwrap();
        assert_eq!(dag.num_tasks(), 0);
    }

    #[test]
    fn scenario_c_role_removal_drops_group_after_revokes_and_membership() {
        let mut current = empty();
        {
            let cluster = current.declare_cluster("hubble-unstable");
            cluster.declare_group("bi_analyst");
            cluster.declare_user("jwr_bi_analyst", "bi_analyst");
            let db = cluster.declare_database("prod");
            let group = db.declare_group("bi_analyst");
            group.grant_schema("public");
            group.grant_schema("bi");
            group.grant_schema("core");
            db.declare_user("jwr_bi_analyst");
        }
        let mut desired = empty();
        {
            let cluster = desired.declare_cluster("hubble-unstable");
            let db = cluster.declare_database("prod");
            let _ = db;
        }

        let config = ReconcilerConfig::builder().revoke_access_to_public_schema(true).build();
        let dag = reconcile(&current, &desired, &config).unwrap();

        let drop_group = dag
            .tasks()
            .iter()
            .position(|t| t.task_type == TaskType::DropGroup)
            .expect("drop group task");
        let revokes: Vec<usize> = dag
            .tasks()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.task_type == TaskType::RevokeAccess)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(revokes.len(), 3);
        for revoke in &revokes {
            assert!(dag.task(drop_group).up_stream.contains(revoke));
        }

        let remove_from_group = dag
            .tasks()
            .iter()
            .position(|t| t.task_type == TaskType::RemoveFromGroup)
            .expect("remove from group task");
        assert!(dag.task(drop_group).up_stream.contains(&remove_from_group));

        let drop_user = dag
            .tasks()
            .iter()
            .position(|t| t.task_type == TaskType::DropUser)
            .expect("drop user task");
        assert!(dag.task(drop_user).up_stream.contains(&remove_from_group));
    }

    #[test]
    fn public_schema_revoke_suppressed_when_configured() {
        let mut current = empty();
        {
            let cluster = current.declare_cluster("hubble");
            cluster.declare_group("bi_analyst");
            let db = cluster.declare_database("prod");
            let group = db.declare_group("bi_analyst");
            group.grant_schema("public");
        }
        let desired = empty();

        let config = ReconcilerConfig::builder().revoke_access_to_public_schema(false).build();
        let dag = reconcile(&current, &desired, &config).unwrap();

        assert!(!dag.tasks().iter().any(|t| t.task_type == TaskType::RevokeAccess));
    }

    #[test]
    fn never_emits_a_database_or_schema_drop_task() {
        let mut current = empty();
        {
            let cluster = current.declare_cluster("hubble");
            let db = cluster.declare_database("prod");
            db.declare_group("bi_analyst");
        }
        let desired = empty();

        let config = ReconcilerConfig::default();
        let dag = reconcile(&current, &desired, &config).unwrap();

        for t in dag.tasks() {
            assert_ne!(t.task_type.as_str(), "DropDatabase");
            assert_ne!(t.task_type.as_str(), "DropSchema");
        }
    }

    #[test]
    fn dropping_a_whole_cluster_still_orders_revoke_before_drop_group() {
        // Regression test: drop_cluster used to process databases (which
        // creates RevokeAccess tasks) before groups, so the RevokeAccess ->
        // DropGroup edge never got wired when an entire cluster disappears
        // from the desired model, unlike the equivalent update_cluster path.
        let mut current = empty();
        {
            let cluster = current.declare_cluster("hubble");
            cluster.declare_group("bi_analyst");
            cluster.declare_user("jwr_bi_analyst", "bi_analyst");
            let db = cluster.declare_database("prod");
            let group = db.declare_group("bi_analyst");
            group.grant_schema("public");
            db.declare_user("jwr_bi_analyst");
        }
        let desired = empty();

        let config = ReconcilerConfig::builder().revoke_access_to_public_schema(true).build();
        let dag = reconcile(&current, &desired, &config).unwrap();

        let drop_group = dag
            .tasks()
            .iter()
            .position(|t| t.task_type == TaskType::DropGroup)
            .expect("drop group task");
        let revoke = dag
            .tasks()
            .iter()
            .position(|t| t.task_type == TaskType::RevokeAccess)
            .expect("revoke task");
        assert!(dag.task(drop_group).up_stream.contains(&revoke));
    }

    #[test]
    fn mismatched_ownership_is_a_validation_error_not_a_panic() {
        let mut current = empty();
        current
            .declare_cluster("hubble")
            .declare_database_with_owner("nra", Some("nra_dbt_developer"));

        let mut desired = empty();
        desired.declare_cluster("hubble").declare_database("nra");

        let config = ReconcilerConfig::default();
        let result = reconcile(&current, &desired, &config);
        assert!(result.is_err());
    }
}
