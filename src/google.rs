//! The Google target model: every SSO identity and the set of AWS roles it
//! may assume, ready to materialise as SAML attributes on the directory entry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A federated identity and the roles it may assume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub roles: BTreeSet<String>,
}

impl User {
    /// Adds `role` to this user's assumable set. A no-op if already present.
    pub fn assign(&mut self, role: impl Into<String>) {
        self.roles.insert(role.into());
    }
}

/// The complete set of Google users the resolver produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub users: Vec<User>,
}

impl Model {
    pub fn lookup_user(&self, email: &str) -> Option<&User> {
        self.users.iter().find(|u| u.email == email)
    }

    fn lookup_user_mut(&mut self, email: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.email == email)
    }

    /// Returns the existing user, or declares a new one with an empty role set.
    pub fn declare_user(&mut self, email: &str) -> &mut User {
        if self.lookup_user(email).is_none() {
            self.users.push(User {
                email: email.to_string(),
                roles: BTreeSet::new(),
            });
        }
        self.lookup_user_mut(email).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaring_the_same_user_twice_is_a_no_op() {
        let mut model = Model::default();
        model.declare_user("jwr@lunar.app").assign("bi_analyst");
        model.declare_user("jwr@lunar.app").assign("dbt_developer");

        assert_eq!(model.users.len(), 1);
        let user = model.lookup_user("jwr@lunar.app").unwrap();
        assert_eq!(user.roles.len(), 2);
    }
}
