//! The Redshift target model: a desired- or current-state tree of clusters,
//! cluster-scoped users/groups, and per-database users/groups/grants.
//!
//! Cross-references carry only a `(cluster_id, name)` or
//! `(cluster_id, db_name, name)` key, never a borrowed pointer. Every
//! `declare_*` method is idempotent, returning the existing entity if one
//! with the same key already exists. All names are lower-cased at
//! declaration.

use serde::{Deserialize, Serialize};

use crate::error::{HubbleRbacError, Result};

/// A namespace within a database grouping tables. `public` cannot be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
}

/// A schema that forwards queries to an external data-lake (Glue) catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSchema {
    pub name: String,
    pub glue_database_name: String,
}

/// A cluster-scoped login principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub member_of: Vec<String>,
}

impl User {
    /// Returns the sole group this user belongs to, or a validation error if
    /// the user is in zero or more than one group.
    pub fn role(&self) -> Result<&str> {
        match self.member_of.as_slice() {
            [only] => Ok(only.as_str()),
            _ => Err(HubbleRbacError::Validation(format!(
                "user '{}' must be part of 1 and only 1 group, found {}",
                self.name,
                self.member_of.len()
            ))),
        }
    }

    pub fn is_member_of(&self, group_name: &str) -> bool {
        self.member_of.iter().any(|g| g == group_name)
    }
}

/// A cluster-scoped principal that collects grants; users become members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
}

/// A cluster user projected into a database so privileges can attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseUser {
    pub name: String,
}

/// The same group name as at cluster scope, carrying per-database grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseGroup {
    pub name: String,
    pub granted_schemas: Vec<Schema>,
    pub granted_external_schemas: Vec<ExternalSchema>,
}

impl DatabaseGroup {
    fn new(name: String) -> Self {
        Self {
            name,
            granted_schemas: Vec::new(),
            granted_external_schemas: Vec::new(),
        }
    }

    pub fn lookup_granted_schema(&self, name: &str) -> Option<&Schema> {
        self.granted_schemas.iter().find(|s| s.name == name)
    }

    pub fn lookup_granted_external_schema(&self, name: &str) -> Option<&ExternalSchema> {
        self.granted_external_schemas
            .iter()
            .find(|s| s.name == name)
    }

    /// Grants `schema` to this group. A no-op if already granted.
    pub fn grant_schema(&mut self, name: &str) {
        if self.lookup_granted_schema(name).is_none() {
            self.granted_schemas.push(Schema {
                name: name.to_lowercase(),
            });
        }
    }

    /// Grants an external schema to this group. A no-op if already granted.
    pub fn grant_external_schema(&mut self, name: &str, glue_database_name: &str) {
        if self.lookup_granted_external_schema(name).is_none() {
            self.granted_external_schemas.push(ExternalSchema {
                name: name.to_lowercase(),
                glue_database_name: glue_database_name.to_string(),
            });
        }
    }

    /// All granted schema and external-schema names, lower-cased.
    pub fn granted(&self) -> Vec<String> {
        self.granted_schemas
            .iter()
            .map(|s| s.name.clone())
            .chain(self.granted_external_schemas.iter().map(|s| s.name.clone()))
            .collect()
    }
}

/// A named database on a cluster. `owner` is set when the database is a
/// developer database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub cluster_id: String,
    pub name: String,
    pub owner: Option<String>,
    pub users: Vec<DatabaseUser>,
    pub groups: Vec<DatabaseGroup>,
}

impl Database {
    fn new(cluster_id: String, name: String, owner: Option<String>) -> Self {
        Self {
            cluster_id,
            name,
            owner,
            users: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn identifier(&self) -> String {
        format!("{}/{}", self.cluster_id, self.name)
    }

    pub fn lookup_group(&self, name: &str) -> Option<&DatabaseGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn lookup_group_mut(&mut self, name: &str) -> Option<&mut DatabaseGroup> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    /// Returns the existing database-scoped group, or declares a new one.
    pub fn declare_group(&mut self, name: &str) -> &mut DatabaseGroup {
        let name = name.to_lowercase();
        if self.lookup_group(&name).is_none() {
            self.groups.push(DatabaseGroup::new(name.clone()));
        }
        self.lookup_group_mut(&name).unwrap()
    }

    pub fn lookup_user(&self, name: &str) -> Option<&DatabaseUser> {
        self.users.iter().find(|u| u.name == name)
    }

    /// Returns the existing database user, or declares one. Every declared
    /// `DatabaseUser.name` must correspond to a cluster `User.name` on the
    /// enclosing cluster, enforced by callers (the resolver and
    /// introspector both declare the cluster user first).
    pub fn declare_user(&mut self, name: &str) -> &DatabaseUser {
        let name = name.to_lowercase();
        if self.lookup_user(&name).is_none() {
            self.users.push(DatabaseUser { name: name.clone() });
        }
        self.lookup_user(&name).unwrap()
    }
}

/// An isolated SQL warehouse instance identified by a string id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub identifier: String,
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub databases: Vec<Database>,
}

impl Cluster {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            identifier,
            users: Vec::new(),
            groups: Vec::new(),
            databases: Vec::new(),
        }
    }

    pub fn lookup_group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Returns the existing cluster-scoped group, or declares a new one.
    pub fn declare_group(&mut self, name: &str) -> &Group {
        let name = name.to_lowercase();
        if self.lookup_group(&name).is_none() {
            self.groups.push(Group { name: name.clone() });
        }
        self.lookup_group(&name).unwrap()
    }

    pub fn lookup_user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name)
    }

    fn lookup_user_mut(&mut self, name: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.name == name)
    }

    /// Declares `name` as a member of `group_name`, creating the user record
    /// if it doesn't exist yet and adding the group to its membership set
    /// (deduplicated) otherwise.
    pub fn declare_user(&mut self, name: &str, group_name: &str) -> &User {
        let name = name.to_lowercase();
        let group_name = group_name.to_lowercase();
        if self.lookup_user(&name).is_none() {
            self.users.push(User {
                name: name.clone(),
                member_of: vec![group_name.clone()],
            });
        } else {
            let user = self.lookup_user_mut(&name).unwrap();
            if !user.is_member_of(&group_name) {
                user.member_of.push(group_name.clone());
            }
        }
        self.lookup_user(&name).unwrap()
    }

    pub fn lookup_database(&self, name: &str) -> Option<&Database> {
        self.databases.iter().find(|d| d.name == name)
    }

    fn lookup_database_mut(&mut self, name: &str) -> Option<&mut Database> {
        self.databases.iter_mut().find(|d| d.name == name)
    }

    /// Returns the existing database, or declares a new, ownerless one.
    pub fn declare_database(&mut self, name: &str) -> &mut Database {
        self.declare_database_with_owner(name, None)
    }

    /// Returns the existing database, or declares a new one with the given owner.
    pub fn declare_database_with_owner(
        &mut self,
        name: &str,
        owner: Option<&str>,
    ) -> &mut Database {
        let name = name.to_lowercase();
        if self.lookup_database(&name).is_none() {
            self.databases.push(Database::new(
                self.identifier.clone(),
                name.clone(),
                owner.map(|o| o.to_lowercase()),
            ));
        }
        self.lookup_database_mut(&name).unwrap()
    }
}

/// The desired- or current-state container for a set of clusters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub clusters: Vec<Cluster>,
}

impl Model {
    pub fn cluster_ids(&self) -> Vec<String> {
        self.clusters.iter().map(|c| c.identifier.clone()).collect()
    }

    pub fn lookup_cluster(&self, identifier: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.identifier == identifier)
    }

    fn lookup_cluster_mut(&mut self, identifier: &str) -> Option<&mut Cluster> {
        self.clusters.iter_mut().find(|c| c.identifier == identifier)
    }

    /// Returns the existing cluster, or declares a new, empty one.
    pub fn declare_cluster(&mut self, identifier: &str) -> &mut Cluster {
        if self.lookup_cluster(identifier).is_none() {
            self.clusters.push(Cluster::new(identifier.to_string()));
        }
        self.lookup_cluster_mut(identifier).unwrap()
    }

    /// Convenience: declares the cluster, then the database on it, in one call.
    pub fn declare_database(&mut self, cluster_id: &str, name: &str) -> &mut Database {
        self.declare_cluster(cluster_id).declare_database(name)
    }

    /// Convenience: declares the cluster, then an owned database on it.
    pub fn declare_database_with_owner(
        &mut self,
        cluster_id: &str,
        name: &str,
        owner: &str,
    ) -> &mut Database {
        self.declare_cluster(cluster_id)
            .declare_database_with_owner(name, Some(owner))
    }

    /// Validates this model before it is diffed against current state: every
    /// database user must correspond to a declared cluster user, every
    /// cluster user must resolve to exactly one group, and no excluded
    /// user or database may appear.
    pub fn validate(&self, exclusions: &dyn crate::exclusions::Excluder) -> Result<()> {
        for cluster in &self.clusters {
            for user in &cluster.users {
                if exclusions.is_user_excluded(&user.name) {
                    return Err(HubbleRbacError::Validation(format!(
                        "excluded user '{}' appears in the desired model for cluster '{}'",
                        user.name, cluster.identifier
                    )));
                }
                user.role()?;
            }

            for database in &cluster.databases {
                if exclusions.is_database_excluded(&database.name) {
                    return Err(HubbleRbacError::Validation(format!(
                        "excluded database '{}' appears in the desired model for cluster '{}'",
                        database.name, cluster.identifier
                    )));
                }

                for database_user in &database.users {
                    if cluster.lookup_user(&database_user.name).is_none() {
                        return Err(HubbleRbacError::Validation(format!(
                            "database user '{}' on {} has no corresponding cluster user",
                            database_user.name,
                            database.identifier()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaring_the_same_database_twice_is_a_no_op() {
        let mut model = Model::default();
        model.declare_database("hubble-unstable", "prod");
        model.declare_database("hubble-unstable", "PROD");

        assert_eq!(model.lookup_cluster("hubble-unstable").unwrap().databases.len(), 1);
    }

    #[test]
    fn user_with_one_group_resolves_role() {
        let mut cluster = Cluster::new("hubble-unstable".to_string());
        cluster.declare_user("jwr_bi_analyst", "bi_analyst");
        let user = cluster.lookup_user("jwr_bi_analyst").unwrap();
        assert_eq!(user.role().unwrap(), "bi_analyst");
    }

    #[test]
    fn user_with_two_groups_fails_validation() {
        let mut cluster = Cluster::new("hubble-unstable".to_string());
        cluster.declare_user("jwr_bi_analyst", "bi_analyst");
        cluster.declare_user("jwr_bi_analyst", "dbt_developer");
        let user = cluster.lookup_user("jwr_bi_analyst").unwrap();
        assert!(user.role().is_err());
    }

    #[test]
    fn validate_rejects_excluded_user() {
        use crate::exclusions::Exclusions;

        let mut model = Model::default();
        model.declare_cluster("hubble").declare_user("admin", "superuser");
        let exclusions = Exclusions::new(vec!["admin".to_string()], vec![]);

        assert!(model.validate(&exclusions).is_err());
    }

    #[test]
    fn validate_rejects_database_user_without_cluster_user() {
        let mut model = Model::default();
        model.declare_database("hubble", "prod").declare_user("ghost");
        let exclusions = crate::exclusions::Exclusions::default();

        assert!(model.validate(&exclusions).is_err());
    }

    #[test]
    fn names_are_lowercased_on_declaration() {
        let mut model = Model::default();
        let db = model.declare_database("Hubble-Unstable", "PROD");
        assert_eq!(db.name, "prod");
        db.declare_group("BI_Analyst");
        assert!(db.lookup_group("bi_analyst").is_some());
    }
}
