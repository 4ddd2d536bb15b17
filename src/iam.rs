//! The IAM target model: one per (role, user) database login policy, and
//! the externally managed policies attached to each AWS role.
//!
//! Declarations are idempotent, matching [`crate::redshift::model`]'s
//! declare/lookup pairs: re-declaring the same role, login policy or
//! database collapses to the existing record.

use serde::{Deserialize, Serialize};

/// A cluster/database pair a login policy authorises access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub cluster_id: String,
    pub name: String,
}

/// Authorises a SAML-federated email to obtain cluster credentials as a
/// specific database username, over a growing set of databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseLoginPolicy {
    pub email: String,
    pub database_username: String,
    pub databases: Vec<Database>,
}

impl DatabaseLoginPolicy {
    fn new(email: String, database_username: String) -> Self {
        Self {
            email,
            database_username,
            databases: Vec::new(),
        }
    }

    /// Adds `(cluster_id, name)` to this policy's database set. A no-op if
    /// already present.
    pub fn allow(&mut self, cluster_id: impl Into<String>, name: impl Into<String>) {
        let cluster_id = cluster_id.into();
        let name = name.into();
        if !self
            .databases
            .iter()
            .any(|d| d.cluster_id == cluster_id && d.name == name)
        {
            self.databases.push(Database { cluster_id, name });
        }
    }
}

/// An AWS role carrying externally managed policies and the database login
/// policies of every user who may assume it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsRole {
    pub name: String,
    pub login_policies: Vec<DatabaseLoginPolicy>,
    pub policies: Vec<crate::hubble::PolicyReference>,
}

impl AwsRole {
    fn lookup_login_policy(&self, email: &str) -> Option<&DatabaseLoginPolicy> {
        self.login_policies.iter().find(|p| p.email == email)
    }

    fn lookup_login_policy_mut(&mut self, email: &str) -> Option<&mut DatabaseLoginPolicy> {
        self.login_policies.iter_mut().find(|p| p.email == email)
    }

    /// Returns the existing login policy for `email`, or declares one with
    /// `database_username` if none exists yet.
    pub fn declare_login_policy(
        &mut self,
        email: impl Into<String>,
        database_username: impl Into<String>,
    ) -> &mut DatabaseLoginPolicy {
        let email = email.into();
        if self.lookup_login_policy(&email).is_none() {
            self.login_policies
                .push(DatabaseLoginPolicy::new(email.clone(), database_username.into()));
        }
        self.lookup_login_policy_mut(&email).unwrap()
    }

    /// Adds `arn` to this role's externally managed policies if not already present.
    pub fn grant_policy(&mut self, arn: &str) {
        if !self.policies.iter().any(|p| p.arn == arn) {
            self.policies.push(crate::hubble::PolicyReference {
                arn: arn.to_string(),
            });
        }
    }
}

/// The complete set of AWS roles the resolver produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub roles: Vec<AwsRole>,
}

impl Model {
    pub fn lookup_role(&self, name: &str) -> Option<&AwsRole> {
        self.roles.iter().find(|r| r.name == name)
    }

    fn lookup_role_mut(&mut self, name: &str) -> Option<&mut AwsRole> {
        self.roles.iter_mut().find(|r| r.name == name)
    }

    /// Returns the existing role, or declares a new, empty one.
    pub fn declare_role(&mut self, name: &str) -> &mut AwsRole {
        if self.lookup_role(name).is_none() {
            self.roles.push(AwsRole {
                name: name.to_string(),
                ..Default::default()
            });
        }
        self.lookup_role_mut(name).unwrap()
    }
}
