//! Ordered query-string parameters

use crate::error::{HttpError, Result};

/// Query parameters in insertion order with unique keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParameters {
    entries: Vec<(String, Option<String>)>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, rejecting keys that are already present
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(HttpError::InvalidQueryParameter(
                "key cannot be empty".to_string(),
            ));
        }
        if self.contains_key(&key) {
            return Err(HttpError::DuplicateQueryParameter(key));
        }
        self.entries.push((key, value));
        Ok(())
    }

    /// Remove a parameter, returning its value if it was present
    pub fn remove(&mut self, key: &str) -> Option<Option<String>> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Remove any existing entry for `key` and add it again at the end
    pub fn replace(&mut self, key: impl Into<String>, value: Option<String>) -> Result<()> {
        let key = key.into();
        self.remove(&key);
        self.insert(key, value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Encode as `k=v&k2=v2`, skipping parameters without a value
    pub fn to_query_string(&self) -> String {
        self.entries
            .iter()
            .filter_map(|(key, value)| {
                value.as_ref().map(|value| {
                    format!(
                        "{}={}",
                        urlencoding::encode(key),
                        urlencoding::encode(value)
                    )
                })
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Merge the parameters onto `target`, keeping any existing query and fragment
    pub fn apply_to(&self, target: &str) -> String {
        let encoded = self.to_query_string();
        if encoded.is_empty() {
            return target.to_string();
        }

        let (base, fragment) = match target.find('#') {
            Some(index) => target.split_at(index),
            None => (target, ""),
        };
        let separator = if !base.contains('?') {
            "?"
        } else if base.ends_with('?') || base.ends_with('&') {
            ""
        } else {
            "&"
        };
        format!("{base}{separator}{encoded}{fragment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParameters {
        let mut query = QueryParameters::new();
        for (k, v) in pairs {
            query.insert(*k, Some(v.to_string())).unwrap();
        }
        query
    }

    #[test]
    fn test_apply_in_insertion_order() {
        let query = params(&[("a", "1"), ("b", "2")]);
        assert_eq!(query.apply_to("/items"), "/items?a=1&b=2");
    }

    #[test]
    fn test_empty_map_is_noop() {
        assert_eq!(QueryParameters::new().apply_to("/items"), "/items");
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut query = params(&[("a", "1")]);
        let result = query.insert("a", Some("2".to_string()));
        assert!(matches!(result, Err(HttpError::DuplicateQueryParameter(k)) if k == "a"));
        assert_eq!(query.get("a"), Some("1"));
    }

    #[test]
    fn test_reinsert_after_remove() {
        let mut query = params(&[("a", "1"), ("b", "2")]);
        assert_eq!(query.remove("a"), Some(Some("1".to_string())));
        query.insert("a", Some("3".to_string())).unwrap();
        assert_eq!(query.apply_to("/items"), "/items?b=2&a=3");
    }

    #[test]
    fn test_replace_is_last_write_wins() {
        let mut query = params(&[("page", "1")]);
        query.replace("page", Some("2".to_string())).unwrap();
        assert_eq!(query.len(), 1);
        assert_eq!(query.get("page"), Some("2"));
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut query = QueryParameters::new();
        assert!(matches!(
            query.insert("", Some("x".to_string())),
            Err(HttpError::InvalidQueryParameter(_))
        ));
    }

    #[test]
    fn test_values_are_percent_encoded() {
        let query = params(&[("q", "rust & go"), ("tag", "a/b")]);
        assert_eq!(query.apply_to("/search"), "/search?q=rust%20%26%20go&tag=a%2Fb");
    }

    #[test]
    fn test_existing_query_and_fragment_kept() {
        let query = params(&[("b", "2")]);
        assert_eq!(query.apply_to("/items?a=1#top"), "/items?a=1&b=2#top");
    }

    #[test]
    fn test_valueless_parameter_skipped() {
        let mut query = params(&[("a", "1")]);
        query.insert("flag", None).unwrap();
        assert_eq!(query.apply_to("/x"), "/x?a=1");
    }
}
