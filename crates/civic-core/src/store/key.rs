use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Query identity a cached collection is stored under, e.g. `issues` or
/// `issues?user=a@x.com`.
///
/// Params are kept sorted so two keys built in a different order compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    scope: String,
    params: BTreeMap<String, String>,
}

impl QueryKey {
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add or overwrite a query parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scope)?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{name}={value}")?;
        }
        Ok(())
    }
}

impl From<&str> for QueryKey {
    fn from(scope: &str) -> Self {
        Self::new(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::QueryKey;

    #[test]
    fn params_are_order_insensitive() {
        let a = QueryKey::new("issues").with_param("user", "a@x.com").with_param("page", "2");
        let b = QueryKey::new("issues").with_param("page", "2").with_param("user", "a@x.com");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "issues?page=2&user=a@x.com");
    }

    #[test]
    fn bare_scope_renders_without_query() {
        let key = QueryKey::from("latest");
        assert_eq!(key.to_string(), "latest");
        assert_eq!(key.scope(), "latest");
        assert_eq!(key.param("user"), None);
    }
}
