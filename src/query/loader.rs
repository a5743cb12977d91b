use std::path::{Path, PathBuf};

use log::debug;

use crate::core::BenchError;

use super::Query;

const QUERY_EXTENSION: &str = "sql";

pub struct QueryLoader {
    queries_path: PathBuf,
}

impl QueryLoader {
    pub fn new(queries_path: impl Into<PathBuf>) -> Self {
        Self {
            queries_path: queries_path.into(),
        }
    }

    /// Reads every `*.sql` file directly under the queries directory, sorted by id.
    pub fn load_all(&self) -> Result<Vec<Query>, BenchError> {
        let entries = std::fs::read_dir(&self.queries_path).map_err(|e| {
            BenchError::IoError(format!(
                "reading query directory {}: {}",
                self.queries_path.display(),
                e
            ))
        })?;

        let mut queries = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| {
                    BenchError::IoError(format!(
                        "listing {}: {}",
                        self.queries_path.display(),
                        e
                    ))
                })?
                .path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(QUERY_EXTENSION)
            {
                continue;
            }
            queries.push(Self::load_query(&path)?);
        }

        queries.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(
            "loaded {} queries from {}",
            queries.len(),
            self.queries_path.display()
        );
        Ok(queries)
    }

    fn load_query(path: &Path) -> Result<Query, BenchError> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| BenchError::IoError(format!("invalid query file name: {}", path.display())))?
            .to_string();

        let sql = std::fs::read_to_string(path)
            .map_err(|e| BenchError::IoError(format!("loading query {}: {}", path.display(), e)))?;

        Ok(Query {
            id,
            sql,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_loads_sql_files_sorted_by_id() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("q10.sql"), "select 10").unwrap();
        std::fs::write(dir.path().join("q02.sql"), "select 2").unwrap();
        std::fs::write(dir.path().join("q01.sql"), "select 1").unwrap();

        let queries = QueryLoader::new(dir.path()).load_all().unwrap();
        let ids: Vec<_> = queries.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["q01", "q02", "q10"]);
        assert_eq!(queries[0].sql, "select 1");
        assert_eq!(queries[0].path, dir.path().join("q01.sql"));
    }

    #[test]
    fn test_ignores_other_files_and_subdirs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("q1.sql"), "select 1").unwrap();
        std::fs::write(dir.path().join("README.md"), "docs").unwrap();
        std::fs::write(dir.path().join("q2.sql.bak"), "select 2").unwrap();
        std::fs::create_dir(dir.path().join("nested.sql")).unwrap();

        let queries = QueryLoader::new(dir.path()).load_all().unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].id, "q1");
    }

    #[test]
    fn test_empty_dir_loads_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(QueryLoader::new(dir.path()).load_all().unwrap().is_empty());
    }

    #[test]
    fn test_missing_dir_errors() {
        let err = QueryLoader::new("/nonexistent/queries").load_all().unwrap_err();
        assert!(matches!(err, BenchError::IoError(_)));
    }
}
