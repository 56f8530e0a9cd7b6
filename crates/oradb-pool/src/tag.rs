//! Session tags and session callbacks.
//!
//! A tag records the session state of a pooled connection as `name=value`
//! pairs, e.g. `NLS_DATE_FORMAT=ISO;TIME_ZONE=UTC`. Acquire requests name
//! the tag they want; when the pool hands out a connection whose tag
//! differs (or a brand-new one), the session callback runs first to bring
//! the session into the requested state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use oradb_client::{BoxError, Connection, Statement};
use oradb_types::BindValue;

use crate::error::PoolError;

/// Ordered set of `name=value` pairs describing session state.
///
/// Names are unique; setting an existing name replaces its value in place.
/// Equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct Tag {
    pairs: Vec<(String, String)>,
}

impl Tag {
    /// Create an empty tag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `name=value` pairs separated by `;`.
    ///
    /// Empty segments are ignored. Later pairs win over earlier ones with
    /// the same name.
    pub fn parse(s: &str) -> Result<Self, PoolError> {
        let mut tag = Self::new();
        for part in s.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| PoolError::configuration("tag", format!("invalid pair: {part}")))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(PoolError::configuration(
                    "tag",
                    format!("missing name in pair: {part}"),
                ));
            }
            tag.set(name, value.trim());
        }
        Ok(tag)
    }

    /// Set `name` to `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.pairs.push((name, value)),
        }
    }

    /// Builder form of [`Tag::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Remove `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(n, _)| n == name)?;
        Some(self.pairs.remove(index).1)
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the tag has no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.pairs.len() == other.pairs.len()
            && self
                .pairs
                .iter()
                .all(|(name, value)| other.get(name) == Some(value.as_str()))
    }
}

impl Eq for Tag {}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Tag {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What a session callback gets to work with.
pub struct SessionContext<'a> {
    /// The connection being handed out.
    pub connection: &'a mut dyn Connection,
    /// Tag the caller asked for; empty when none was requested.
    pub requested_tag: &'a Tag,
    /// The connection's current tag. Update it to record the new state.
    pub tag: &'a mut Tag,
    /// Whether the connection was opened for this request.
    pub fresh: bool,
}

/// Brings a session into the state a caller requested.
///
/// Runs inside `acquire`, before the connection is returned. An error fails
/// the acquire and returns the connection to the pool with its tag
/// unchanged.
#[async_trait]
pub trait SessionCallback: Send + Sync {
    /// Reconcile the session with `ctx.requested_tag`.
    async fn call(&self, ctx: SessionContext<'_>) -> Result<(), BoxError>;
}

/// A configured session callback.
#[derive(Clone)]
pub enum SessionCallbackKind {
    /// Application callback.
    Callback(Arc<dyn SessionCallback>),
    /// Server-side PL/SQL procedure called as `name(requested_tag, actual_tag)`.
    Procedure(String),
}

impl SessionCallbackKind {
    /// Wrap an application callback.
    pub fn callback(callback: impl SessionCallback + 'static) -> Self {
        Self::Callback(Arc::new(callback))
    }

    /// Reference a server-side procedure, e.g. `hr.pkg_session.fix_state`.
    pub fn procedure(name: &str) -> Result<Self, PoolError> {
        validate_procedure_name(name)?;
        Ok(Self::Procedure(name.to_string()))
    }

    pub(crate) async fn invoke(&self, ctx: SessionContext<'_>) -> Result<(), PoolError> {
        match self {
            Self::Callback(callback) => callback.call(ctx).await.map_err(PoolError::SessionCallback),
            Self::Procedure(name) => {
                let sql = format!("begin {name}(:1, :2); end;");
                let mut statement = Statement::new(sql, ctx.connection.capabilities());
                statement
                    .bind(vec![
                        BindValue::from(ctx.requested_tag.to_string()),
                        BindValue::from(ctx.tag.to_string()),
                    ])
                    .map_err(|e| PoolError::SessionCallback(Box::new(e)))?;
                ctx.connection
                    .execute(&mut statement)
                    .await
                    .map_err(|e| PoolError::SessionCallback(Box::new(e)))?;
                *ctx.tag = ctx.requested_tag.clone();
                Ok(())
            }
        }
    }
}

impl fmt::Debug for SessionCallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Callback(..)"),
            Self::Procedure(name) => f.debug_tuple("Procedure").field(name).finish(),
        }
    }
}

/// Validate a possibly schema- and package-qualified procedure name, so it
/// can be embedded in a PL/SQL block.
fn validate_procedure_name(name: &str) -> Result<(), PoolError> {
    use once_cell::sync::Lazy;
    use regex::Regex;

    #[allow(clippy::unwrap_used)]
    static PROCEDURE_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_$#]{0,127}(\.[A-Za-z][A-Za-z0-9_$#]{0,127}){0,2}$")
            .unwrap()
    });

    if name.is_empty() {
        return Err(PoolError::configuration(
            "session_callback",
            "procedure name cannot be empty",
        ));
    }

    if !PROCEDURE_RE.is_match(name) {
        return Err(PoolError::configuration(
            "session_callback",
            format!(
                "invalid procedure name '{name}': expected up to three dot-separated \
                 identifiers starting with a letter"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let tag = Tag::parse("a=1; b=2;;").unwrap();
        assert_eq!(tag.len(), 2);
        assert_eq!(tag.get("b"), Some("2"));
        assert_eq!(tag.to_string(), "a=1;b=2");
    }

    #[test]
    fn test_last_write_wins() {
        let tag = Tag::parse("a=1;b=2;a=3").unwrap();
        assert_eq!(tag.to_string(), "a=3;b=2");
    }

    #[test]
    fn test_order_insensitive_equality() {
        assert_eq!(Tag::parse("a=1;b=2").unwrap(), Tag::parse("b=2;a=1").unwrap());
        assert_ne!(Tag::parse("a=1;b=2").unwrap(), Tag::parse("a=1").unwrap());
        assert_ne!(Tag::parse("a=1").unwrap(), Tag::parse("a=1;b=2").unwrap());
        assert_ne!(Tag::parse("A=x").unwrap(), Tag::parse("A=X").unwrap());
        assert_eq!(Tag::new(), Tag::parse("").unwrap());
    }

    #[test]
    fn test_parse_errors() {
        assert!(Tag::parse("novalue").is_err());
        assert!(Tag::parse("=1").is_err());
    }

    #[test]
    fn test_set_and_remove() {
        let mut tag = Tag::new().with("x", "1");
        tag.set("x", "2");
        assert_eq!(tag.get("x"), Some("2"));
        assert_eq!(tag.remove("x"), Some("2".to_string()));
        assert!(tag.is_empty());
    }

    #[test]
    fn test_procedure_names() {
        assert!(SessionCallbackKind::procedure("fix_state").is_ok());
        assert!(SessionCallbackKind::procedure("hr.pkg_session.fix_state").is_ok());
        assert!(SessionCallbackKind::procedure("").is_err());
        assert!(SessionCallbackKind::procedure("a.b.c.d").is_err());
        assert!(SessionCallbackKind::procedure("x; drop table t").is_err());
        assert!(SessionCallbackKind::procedure("1abc").is_err());
    }
}
