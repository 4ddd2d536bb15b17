//! Translates the business-level [`hubble::Model`] into the three
//! infrastructure-shaped target models the appliers consume. Grounded on
//! the source's `internal/core/resolver/resolver.go`; pure and
//! deterministic, as spec.md §4.1 requires: same input always produces
//! byte-identical output, so it never needs to see current state.
//!
//! Resolves Open Question 1 (spec.md §9): ACL datasets are granted on a
//! role's named databases but never on a user's personal dev database,
//! since a dev database is the user's own sandbox, not a place to project
//! a role's shared schema grants.

use crate::google;
use crate::hubble;
use crate::iam;
use crate::redshift;

/// The three target models produced by one resolve pass.
#[derive(Debug, Clone, Default)]
pub struct ResolvedModel {
    pub redshift: redshift::Model,
    pub iam: iam::Model,
    pub google: google::Model,
}

/// Resolves `grant` into its Redshift, IAM and Google target models.
pub fn resolve(grant: &hubble::Model) -> ResolvedModel {
    let mut model = ResolvedModel::default();

    for user in &grant.users {
        let google_user = model.google.declare_user(&user.email);

        for role in &user.assigned_to {
            google_user.assign(&role.name);

            let iam_role = model.iam.declare_role(&role.name);
            let user_and_role_username = format!("{}_{}", user.username, role.name);
            let login_policy = iam_role.declare_login_policy(&user.email, &user_and_role_username);

            for database in &role.granted_databases {
                login_policy.allow(&database.cluster_id, &database.name);

                let cluster = model.redshift.declare_cluster(&database.cluster_id);
                cluster.declare_group(&role.name);
                cluster.declare_user(&user_and_role_username, &role.name);

                let target = cluster.declare_database(&database.name);
                let group = target.declare_group(&role.name);
                group.grant_schema("public");
                for schema in &role.acl {
                    group.grant_schema(schema);
                }
                for glue_database in &role.granted_glue_databases {
                    group.grant_external_schema(&glue_database.short_name, &glue_database.name);
                }
                target.declare_user(&user_and_role_username);
            }

            for dev_database in &role.granted_dev_databases {
                login_policy.allow(&dev_database.cluster_id, &user.username);

                let cluster = model.redshift.declare_cluster(&dev_database.cluster_id);
                cluster.declare_group(&role.name);
                cluster.declare_user(&user_and_role_username, &role.name);

                let target = cluster.declare_database_with_owner(&user.username, Some(&user_and_role_username));
                let group = target.declare_group(&role.name);
                group.grant_schema("public");
                for glue_database in &role.granted_glue_databases {
                    group.grant_external_schema(&glue_database.short_name, &glue_database.name);
                }
                target.declare_user(&user_and_role_username);
            }

            for policy in &role.policies {
                iam_role.grant_policy(&policy.arn);
            }
        }
    }

    model
}
