//! The low-level SQL surface spoken against a single Redshift database:
//! one [`RedshiftClient`] per (cluster, database) pair, backed by a
//! `sqlx::PgPool`. Grounded on the source's `client.go`, generalized from
//! its raw `database/sql` + string-formatted queries to parameterized
//! `sqlx` queries.

use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::Rng;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::error::Result;

/// One row of a two-column listing (e.g. `(username, owner)` or
/// `(username, group_name)`), mirroring the source's generic `Row` type.
#[derive(Debug, Clone)]
pub struct Row {
    pub cells: Vec<String>,
}

/// SQLSTATE for Postgres/Redshift "object in use", returned when dropping a
/// user that still owns a database.
pub const OBJECT_IN_USE_SQLSTATE: &str = "55006";

/// Everything the reconciliation pipeline needs from a single Redshift
/// database connection: both introspection queries (`owners`, `groups`, ...)
/// and mutating statements (`create_user`, `grant`, ...).
#[async_trait]
pub trait RedshiftClient: Send + Sync {
    async fn owners(&self) -> Result<Vec<Row>>;
    async fn groups(&self) -> Result<Vec<String>>;
    async fn users_and_groups(&self) -> Result<Vec<Row>>;
    async fn databases(&self) -> Result<Vec<String>>;
    async fn grants(&self, group_name: &str) -> Result<Vec<String>>;

    async fn create_user(&self, username: &str) -> Result<()>;
    async fn delete_user(&self, username: &str) -> Result<()>;
    async fn create_group(&self, group_name: &str) -> Result<()>;
    async fn delete_group(&self, group_name: &str) -> Result<()>;
    async fn create_schema(&self, schema_name: &str) -> Result<()>;
    async fn create_external_schema(&self, schema_name: &str, glue_database_name: &str, aws_account_id: &str) -> Result<()>;
    async fn create_database(&self, database_name: &str, owner: Option<&str>) -> Result<()>;
    async fn set_schema_owner(&self, owner: &str, schema_name: &str) -> Result<()>;
    async fn grant(&self, group_name: &str, schema_name: &str) -> Result<()>;
    async fn revoke(&self, group_name: &str, schema_name: &str) -> Result<()>;
    async fn add_user_to_group(&self, username: &str, group_name: &str) -> Result<()>;
    async fn remove_user_from_group(&self, username: &str, group_name: &str) -> Result<()>;

    /// Releases any connections this client holds. The default no-op suits
    /// in-memory fakes; [`PgRedshiftClient`] overrides it to drain its pool.
    async fn close(&self) {}
}

/// Whether the cluster's Redshift version supports `CREATE EXTERNAL SCHEMA`
/// against a Glue catalog. Clusters that don't fall back to a plain schema.
#[derive(Debug, Clone, Copy)]
pub struct ClusterCapabilities {
    pub external_schemas_supported: bool,
}

/// A [`RedshiftClient`] backed by a pooled Postgres-wire connection.
pub struct PgRedshiftClient {
    pool: PgPool,
    capabilities: ClusterCapabilities,
}

impl PgRedshiftClient {
    pub async fn connect(
        user: &str,
        password: &str,
        host: &str,
        port: u16,
        database: &str,
        capabilities: ClusterCapabilities,
    ) -> Result<Self> {
        let options = PgConnectOptions::new()
            .username(user)
            .password(password)
            .host(host)
            .port(port)
            .database(database)
            .ssl_mode(sqlx::postgres::PgSslMode::Disable);
        let pool = PgPoolOptions::new().max_connections(5).connect_with(options).await?;
        Ok(Self { pool, capabilities })
    }

    pub fn external_schemas_supported(&self) -> bool {
        self.capabilities.external_schemas_supported
    }

    /// Membership presence, read from `pg_group.grolist` the same way
    /// [`RedshiftClient::users_and_groups`] enumerates it.
    async fn is_group_member(&self, username: &str, group_name: &str) -> Result<bool> {
        let member: (i64,) = sqlx::query_as(
            "select count(*) from pg_group g \
             join pg_user u on u.usesysid = any(g.grolist) \
             where g.groname = $1 and u.usename = $2",
        )
        .bind(group_name)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(member.0 > 0)
    }
}

/// A password is generated but never used by anyone: Redshift requires one
/// at `CREATE USER` time even though the controller authenticates service
/// accounts via IAM, not password auth. Redshift's password policy demands
/// at least one lowercase letter, one uppercase letter and one digit, so
/// those three classes are seeded explicitly before padding out to length
/// with plain alphanumeric sampling, since an all-lowercase (or all-digit)
/// draw from `Alphanumeric` alone would otherwise occasionally fail
/// `CREATE USER`.
fn random_unused_password() -> String {
    let mut rng = rand::rng();
    let mut password: Vec<char> = vec![
        rng.random_range(b'a'..=b'z') as char,
        rng.random_range(b'A'..=b'Z') as char,
        rng.random_range(b'0'..=b'9') as char,
    ];
    password.extend(rng.sample_iter(&Alphanumeric).take(29).map(char::from));

    use rand::seq::SliceRandom;
    password.shuffle(&mut rng);
    password.into_iter().collect()
}

#[async_trait]
impl RedshiftClient for PgRedshiftClient {
    async fn owners(&self) -> Result<Vec<Row>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("select datname, pg_get_userbyid(datdba) from pg_database")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(db, owner)| Row { cells: vec![db, owner] }).collect())
    }

    async fn groups(&self) -> Result<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as("select groname from pg_group").fetch_all(&self.pool).await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    async fn users_and_groups(&self) -> Result<Vec<Row>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "select u.usename, g.groname from pg_user u \
             join pg_group g on u.usesysid = any(g.grolist)",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(user, group)| Row { cells: vec![user, group] }).collect())
    }

    async fn databases(&self) -> Result<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as("select datname from pg_database").fetch_all(&self.pool).await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    /// Schemas the group holds `USAGE` on, read by exploding each schema's
    /// ACL rather than `pg_default_acl` — default privileges are recorded
    /// against the role that *authored* them, which is never the group
    /// itself (groups don't own objects), so filtering `pg_default_acl` by
    /// the group's `grosysid` would always come back empty.
    async fn grants(&self, group_name: &str) -> Result<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as(
            "select n.nspname from pg_namespace n, \
             aclexplode(coalesce(n.nspacl, acldefault('n', n.nspowner))) a \
             join pg_group g on g.grosysid = a.grantee \
             where g.groname = $1 and a.privilege_type = 'USAGE'",
        )
        .bind(group_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    async fn create_user(&self, username: &str) -> Result<()> {
        let exists: (i64,) = sqlx::query_as("select count(*) from pg_user where usename = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        if exists.0 == 0 {
            let password = random_unused_password();
            let statement = format!("create user {} password '{}'", quote_identifier(username), password);
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        let exists: (i64,) = sqlx::query_as("select count(*) from pg_user where usename = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        if exists.0 > 0 {
            let statement = format!("drop user {}", quote_identifier(username));
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn create_group(&self, group_name: &str) -> Result<()> {
        let exists: (i64,) = sqlx::query_as("select count(*) from pg_group where groname = $1")
            .bind(group_name)
            .fetch_one(&self.pool)
            .await?;
        if exists.0 == 0 {
            let statement = format!("create group {}", quote_identifier(group_name));
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn delete_group(&self, group_name: &str) -> Result<()> {
        let exists: (i64,) = sqlx::query_as("select count(*) from pg_group where groname = $1")
            .bind(group_name)
            .fetch_one(&self.pool)
            .await?;
        if exists.0 == 0 {
            return Ok(());
        }

        // Defensive: the DAG should already have revoked every grant before
        // scheduling the drop, but a residual grant left on the group
        // blocks the drop itself, so clear it here too.
        for schema_name in self.grants(group_name).await? {
            self.revoke(group_name, &schema_name).await?;
        }

        let statement = format!("drop group {}", quote_identifier(group_name));
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_schema(&self, schema_name: &str) -> Result<()> {
        let statement = format!("create schema if not exists {}", quote_identifier(schema_name));
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_external_schema(&self, schema_name: &str, glue_database_name: &str, aws_account_id: &str) -> Result<()> {
        if !self.capabilities.external_schemas_supported {
            return self.create_schema(schema_name).await;
        }
        let statement = format!(
            "create external schema if not exists {} from data catalog database '{}' iam_role 'arn:aws:iam::{}:role/redshift-glue-access'",
            quote_identifier(schema_name),
            glue_database_name,
            aws_account_id
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_database(&self, database_name: &str, owner: Option<&str>) -> Result<()> {
        let statement = match owner {
            Some(owner) => format!(
                "create database {} owner {}",
                quote_identifier(database_name),
                quote_identifier(owner)
            ),
            None => format!("create database {}", quote_identifier(database_name)),
        };
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn set_schema_owner(&self, owner: &str, schema_name: &str) -> Result<()> {
        let statement = format!(
            "alter schema {} owner to {}",
            quote_identifier(schema_name),
            quote_identifier(owner)
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn grant(&self, group_name: &str, schema_name: &str) -> Result<()> {
        let schema = quote_identifier(schema_name);
        let group = quote_identifier(group_name);
        sqlx::query(&format!("grant usage on schema {} to group {}", schema, group))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!("grant select on all tables in schema {} to group {}", schema, group))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!(
            "alter default privileges in schema {} grant select on tables to group {}",
            schema, group
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke(&self, group_name: &str, schema_name: &str) -> Result<()> {
        let schema = quote_identifier(schema_name);
        let group = quote_identifier(group_name);
        sqlx::query(&format!(
            "alter default privileges in schema {} revoke select on tables from group {}",
            schema, group
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!("revoke select on all tables in schema {} from group {}", schema, group))
            .execute(&self.pool)
            .await?;
        sqlx::query(&format!("revoke usage on schema {} from group {}", schema, group))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_user_to_group(&self, username: &str, group_name: &str) -> Result<()> {
        if self.is_group_member(username, group_name).await? {
            return Ok(());
        }
        let statement = format!(
            "alter group {} add user {}",
            quote_identifier(group_name),
            quote_identifier(username)
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn remove_user_from_group(&self, username: &str, group_name: &str) -> Result<()> {
        if !self.is_group_member(username, group_name).await? {
            return Ok(());
        }
        let statement = format!(
            "alter group {} drop user {}",
            quote_identifier(group_name),
            quote_identifier(username)
        );
        sqlx::query(&statement).execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Redshift identifiers can't be bind-parameterized; this is the closest
/// approximation of escaping available without a full SQL AST.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_long_and_alphanumeric() {
        let password = random_unused_password();
        assert_eq!(password.len(), 32);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn password_satisfies_the_cluster_policy() {
        for _ in 0..100 {
            let password = random_unused_password();
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn identifiers_with_quotes_are_escaped() {
        assert_eq!(quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }
}
