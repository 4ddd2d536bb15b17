//! The Hubble domain model: users, roles, databases and the grants between
//! them. This is the input the [`crate::resolver`] translates into the
//! Redshift, IAM and Google target models.
//!
//! ## Overview
//! - A user is assigned to zero or more roles.
//! - A role grants databases, per-developer databases, external (Glue)
//!   databases and ACL schema names, plus externally managed IAM policies.
//! - [`ModelBuilder`] is the only way to construct a [`Model`]: it validates
//!   that every reference resolves to a declared member before handing back
//!   a value, so a `Model` in hand is always internally consistent.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{HubbleRbacError, Result};

/// A named database on an identified cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub cluster_id: String,
    pub name: String,
}

/// A template for a per-developer database; the actual database name equals
/// the owning user's username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevDatabase {
    pub cluster_id: String,
}

/// A reference to an external (data-lake) catalog. `short_name` becomes the
/// Redshift external schema name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlueDatabase {
    pub short_name: String,
    pub name: String,
}

/// An externally managed IAM policy to attach to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReference {
    pub arn: String,
}

/// A schema name granted to a role's group.
pub type DataSet = String;

/// A business-level bundle of grants and policies. Materialises as a
/// Redshift group and an AWS IAM role of the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub granted_databases: Vec<Database>,
    pub granted_dev_databases: Vec<DevDatabase>,
    pub granted_glue_databases: Vec<GlueDatabase>,
    pub acl: Vec<DataSet>,
    pub policies: Vec<PolicyReference>,
}

/// A local identity federated through Google SSO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub assigned_to: Vec<Role>,
}

/// The validated Hubble model: the input to the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub databases: Vec<Database>,
    pub dev_databases: Vec<DevDatabase>,
    pub users: Vec<User>,
    pub roles: Vec<Role>,
    pub policies: Vec<PolicyReference>,
}

/// Builds a [`Model`] incrementally and validates all cross references
/// before handing one back. Mirrors the source's `hubble.Model.AddUser` /
/// `AddRole` / `AddDatabase` family, but collects everything up front and
/// validates in one pass rather than trusting each call site.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    databases: Vec<Database>,
    dev_databases: Vec<DevDatabase>,
    users: Vec<User>,
    roles: Vec<Role>,
    policies: Vec<PolicyReference>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(mut self, database: Database) -> Self {
        self.databases.push(database);
        self
    }

    pub fn dev_database(mut self, dev_database: DevDatabase) -> Self {
        self.dev_databases.push(dev_database);
        self
    }

    pub fn policy(mut self, policy: PolicyReference) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    /// Validates every `Role.granted*` and `User.assigned_to` reference
    /// resolves to a declared member, and returns the assembled model.
    pub fn build(self) -> Result<Model> {
        let known_databases: HashSet<(&str, &str)> = self
            .databases
            .iter()
            .map(|d| (d.cluster_id.as_str(), d.name.as_str()))
            .collect();
        let known_dev_databases: HashSet<&str> = self
            .dev_databases
            .iter()
            .map(|d| d.cluster_id.as_str())
            .collect();
        let known_roles: HashSet<&str> = self.roles.iter().map(|r| r.name.as_str()).collect();

        for role in &self.roles {
            for db in &role.granted_databases {
                if !known_databases.contains(&(db.cluster_id.as_str(), db.name.as_str())) {
                    return Err(HubbleRbacError::Validation(format!(
                        "role '{}' grants undeclared database {}/{}",
                        role.name, db.cluster_id, db.name
                    )));
                }
            }
            for dev_db in &role.granted_dev_databases {
                if !known_dev_databases.contains(dev_db.cluster_id.as_str()) {
                    return Err(HubbleRbacError::Validation(format!(
                        "role '{}' grants undeclared dev database cluster {}",
                        role.name, dev_db.cluster_id
                    )));
                }
            }
        }

        for user in &self.users {
            for role in &user.assigned_to {
                if !known_roles.contains(role.name.as_str()) {
                    return Err(HubbleRbacError::Validation(format!(
                        "user '{}' assigned to undeclared role '{}'",
                        user.username, role.name
                    )));
                }
            }
        }

        Ok(Model {
            databases: self.databases,
            dev_databases: self.dev_databases,
            users: self.users,
            roles: self.roles,
            policies: self.policies,
        })
    }
}
