//! Statements and the per-connection statement cache.

use std::num::NonZeroUsize;

use lru::LruCache;
use oradb_types::{BindArena, BindValue, Capabilities, OracleMetadata};

use crate::error::Result;

/// A SQL or PL/SQL statement with its bind variables.
///
/// The statement's [`BindArena`] is kept across executions so variables can
/// be reused when the statement comes back out of the cache.
#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    is_plsql: bool,
    arena: BindArena,
}

impl Statement {
    /// Prepare a statement for a connection with the given capabilities.
    pub fn new(sql: impl Into<String>, capabilities: Capabilities) -> Self {
        let sql = sql.into();
        let is_plsql = is_plsql(&sql);
        Self {
            sql,
            is_plsql,
            arena: BindArena::new(capabilities, is_plsql),
        }
    }

    /// The statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Whether the statement is an anonymous PL/SQL block or a CALL.
    #[must_use]
    pub fn is_plsql(&self) -> bool {
        self.is_plsql
    }

    /// Bind the values of one execution.
    pub fn bind(&mut self, values: Vec<BindValue>) -> Result<()> {
        self.arena.bind_row(values)?;
        Ok(())
    }

    /// Bind the rows of a batch execution.
    pub fn bind_batch(&mut self, rows: &[Vec<BindValue>]) -> Result<()> {
        self.arena.bind_rows(rows)?;
        Ok(())
    }

    /// Declare the type of a bind position.
    pub fn declare(&mut self, position: usize, metadata: OracleMetadata) {
        self.arena.declare(position, metadata);
    }

    /// The statement's variables.
    #[must_use]
    pub fn arena(&self) -> &BindArena {
        &self.arena
    }

    /// Mutable access to the statement's variables.
    pub fn arena_mut(&mut self) -> &mut BindArena {
        &mut self.arena
    }
}

/// Whether `sql` is PL/SQL rather than plain SQL.
fn is_plsql(sql: &str) -> bool {
    let keyword = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default();
    ["begin", "declare", "call"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

/// Least recently used cache of prepared statements, keyed by SQL text.
///
/// A capacity of zero disables caching.
#[derive(Debug)]
pub struct StatementCache {
    cache: Option<LruCache<String, Statement>>,
}

impl StatementCache {
    /// Create a cache holding up to `capacity` statements.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Take a cached statement for `sql`, or prepare a new one.
    pub fn prepare(&mut self, sql: &str, capabilities: Capabilities) -> Statement {
        match self.cache.as_mut().and_then(|cache| cache.pop(sql)) {
            Some(mut statement) => {
                tracing::trace!(sql = sql, "statement cache hit");
                statement.arena_mut().set_capabilities(capabilities);
                statement
            }
            None => Statement::new(sql, capabilities),
        }
    }

    /// Return a statement after execution so its variables can be reused.
    pub fn release(&mut self, mut statement: Statement) {
        if let Some(cache) = self.cache.as_mut() {
            statement.arena_mut().reset();
            if let Some((evicted, _)) = cache.push(statement.sql.clone(), statement) {
                tracing::trace!(sql = %evicted, "statement evicted from cache");
            }
        }
    }

    /// Number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    /// Whether the cache holds no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached statements.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.cap().get())
    }

    /// Drop every cached statement.
    pub fn clear(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oradb_types::DbType;

    #[test]
    fn test_plsql_detection() {
        assert!(is_plsql("begin null; end;"));
        assert!(is_plsql("  DECLARE x number; begin null; end;"));
        assert!(is_plsql("call my_proc(:1)"));
        assert!(!is_plsql("select * from dual"));
        assert!(!is_plsql("beginning_table"));
        assert!(!is_plsql(""));
    }

    #[test]
    fn test_statement_bind() {
        let mut stmt = Statement::new("insert into t values (:1, :2)", Capabilities::default());
        stmt.bind(vec![BindValue::from(1), BindValue::from("x")])
            .unwrap();
        assert_eq!(stmt.arena().len(), 2);
        assert_eq!(stmt.arena().variable(0).unwrap().dbtype(), DbType::Number);
    }

    #[test]
    fn test_cache_reuses_arena() {
        let caps = Capabilities::default();
        let mut cache = StatementCache::new(2);

        let mut stmt = cache.prepare("select :1 from dual", caps);
        stmt.bind(vec![BindValue::from("abc")]).unwrap();
        cache.release(stmt);
        assert_eq!(cache.len(), 1);

        let stmt = cache.prepare("select :1 from dual", caps);
        assert_eq!(stmt.arena().len(), 1);
        assert_eq!(stmt.arena().variable(0).unwrap().metadata().max_size, 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_evicts_lru() {
        let caps = Capabilities::default();
        let mut cache = StatementCache::new(2);
        for sql in ["select 1 from dual", "select 2 from dual", "select 3 from dual"] {
            let stmt = cache.prepare(sql, caps);
            cache.release(stmt);
        }
        assert_eq!(cache.len(), 2);

        // The oldest entry was evicted, so preparing it is a miss.
        let _ = cache.prepare("select 1 from dual", caps);
        assert_eq!(cache.len(), 2);
        let _ = cache.prepare("select 3 from dual", caps);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_disabled() {
        let mut cache = StatementCache::new(0);
        let stmt = cache.prepare("select 1 from dual", Capabilities::default());
        cache.release(stmt);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 0);
    }
}
