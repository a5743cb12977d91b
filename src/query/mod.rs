mod loader;

pub use loader::QueryLoader;

use std::path::PathBuf;

/// One benchmark statement, identified by its file stem.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub id: String,
    pub sql: String,
    pub path: PathBuf,
}

impl Query {
    pub fn new(id: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sql: sql.into(),
            path: PathBuf::new(),
        }
    }
}
