//! Convenience constructors for the end-to-end scenarios in spec.md §8,
//! so integration tests can build a realistic [`hubble::Model`] in one call
//! instead of re-deriving the same `ModelBuilder` chain. Grounded on the
//! teacher's `src/testing/fixtures.rs` (same role, pre-built fixtures a
//! test can customise further), generalised from JSON response bodies to
//! domain-model values since there's no REST surface here.

use crate::hubble;

/// Scenario A: a bi-analyst gaining access to the `prod` database on
/// `hubble-unstable`, with `bi` and `core` ACL schemas.
pub fn bi_analyst_model(username: &str, email: &str) -> hubble::Model {
    let database = hubble::Database {
        cluster_id: "hubble-unstable".to_string(),
        name: "prod".to_string(),
    };
    let role = hubble::Role {
        name: "bi_analyst".to_string(),
        granted_databases: vec![database.clone()],
        granted_dev_databases: vec![],
        granted_glue_databases: vec![],
        acl: vec!["bi".to_string(), "core".to_string()],
        policies: vec![],
    };
    hubble::ModelBuilder::new()
        .database(database)
        .role(role.clone())
        .user(hubble::User {
            username: username.to_string(),
            email: email.to_string(),
            assigned_to: vec![role],
        })
        .build()
        .expect("bi_analyst fixture is internally consistent")
}

/// Scenario B: a developer database owner granted a Glue-backed external
/// schema, no ACL schemas (dev databases never carry them).
pub fn dbt_developer_model(username: &str, email: &str) -> hubble::Model {
    let dev_database = hubble::DevDatabase {
        cluster_id: "hubble".to_string(),
    };
    let role = hubble::Role {
        name: "dbt_developer".to_string(),
        granted_databases: vec![],
        granted_dev_databases: vec![dev_database.clone()],
        granted_glue_databases: vec![hubble::GlueDatabase {
            short_name: "lwgoevents".to_string(),
            name: "lw-go-events".to_string(),
        }],
        acl: vec![],
        policies: vec![],
    };
    hubble::ModelBuilder::new()
        .dev_database(dev_database)
        .role(role.clone())
        .user(hubble::User {
            username: username.to_string(),
            email: email.to_string(),
            assigned_to: vec![role],
        })
        .build()
        .expect("dbt_developer fixture is internally consistent")
}

/// Scenario A with the `bi_analyst` role stripped from the user, used as
/// the "desired" side of a role-removal reconciliation (scenario C).
pub fn without_role(model: &hubble::Model, username: &str, role_name: &str) -> hubble::Model {
    let databases = model.databases.clone();
    let dev_databases = model.dev_databases.clone();
    let policies = model.policies.clone();
    let roles: Vec<hubble::Role> = model.roles.iter().filter(|r| r.name != role_name).cloned().collect();
    let users: Vec<hubble::User> = model
        .users
        .iter()
        .map(|u| {
            let mut u = u.clone();
            if u.username == username {
                u.assigned_to.retain(|r| r.name != role_name);
            }
            u
        })
        .collect();

    let mut builder = hubble::ModelBuilder::new();
    for database in databases {
        builder = builder.database(database);
    }
    for dev_database in dev_databases {
        builder = builder.dev_database(dev_database);
    }
    for policy in policies {
        builder = builder.policy(policy);
    }
    for role in roles {
        builder = builder.role(role);
    }
    for user in users {
        builder = builder.user(user);
    }
    builder.build().expect("role removal keeps the model internally consistent")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bi_analyst_fixture_matches_scenario_a() {
        let model = bi_analyst_model("jwr", "jwr@lunar.app");
        assert_eq!(model.users.len(), 1);
        assert_eq!(model.roles[0].acl, vec!["bi".to_string(), "core".to_string()]);
    }

    #[test]
    fn without_role_strips_assignment_but_keeps_other_users() {
        let model = bi_analyst_model("jwr", "jwr@lunar.app");
        let stripped = without_role(&model, "jwr", "bi_analyst");
        assert!(stripped.users[0].assigned_to.is_empty());
        assert!(stripped.roles.is_empty());
    }
}
