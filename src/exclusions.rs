//! Protected-name filters consulted by the applier (validation) and the
//! introspector (omission from the current-state model).

/// Anything that needs to decide whether a user or database is off-limits
/// to the controller. Kept as a trait so tests can stub it independently of
/// the concrete [`Exclusions`] set.
pub trait Excluder {
    fn is_user_excluded(&self, username: &str) -> bool;
    fn is_database_excluded(&self, name: &str) -> bool;
}

/// Excluded users are never created or deleted by the controller and may
/// not appear in the desired model. Excluded databases may not be declared
/// in the desired model, and their grants are never managed.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    excluded_users: Vec<String>,
    excluded_databases: Vec<String>,
}

impl Exclusions {
    pub fn new(excluded_users: Vec<String>, excluded_databases: Vec<String>) -> Self {
        Self {
            excluded_users,
            excluded_databases,
        }
    }
}

impl Excluder for Exclusions {
    fn is_user_excluded(&self, username: &str) -> bool {
        self.excluded_users.iter().any(|u| u == username)
    }

    fn is_database_excluded(&self, name: &str) -> bool {
        self.excluded_databases.iter().any(|d| d == name)
    }
}
