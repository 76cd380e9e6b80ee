//! Case-insensitive multi-value headers.

use std::collections::BTreeMap;

/// Read/write access to propagated headers.
///
/// Interceptors only see this contract, so the same interceptor works against
/// any carrier that implements it.
pub trait Header {
    /// First value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<&str>;
    /// Replaces all values of `key` with `value`.
    fn set(&mut self, key: &str, value: &str);
    /// Appends `value` to the values of `key`.
    fn add(&mut self, key: &str, value: &str);
    fn keys(&self) -> Vec<String>;
    fn values(&self, key: &str) -> Vec<String>;
}

/// Multi-value header map whose keys are stored lower-cased.
///
/// `Content-Type` and `content-type` address the same entry, so a carrier can
/// never hold two differently-cased copies of one header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCarrier {
    entries: BTreeMap<String, Vec<String>>,
}

impl HeaderCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a carrier from a wire header map, folding key case.
    ///
    /// Values of keys that only differ by case are merged in iteration order.
    pub fn from_map(map: BTreeMap<String, Vec<String>>) -> Self {
        let mut carrier = Self::new();
        for (key, values) in map {
            carrier
                .entries
                .entry(key.to_ascii_lowercase())
                .or_default()
                .extend(values);
        }
        carrier
    }

    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.entries.clone()
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<String>> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(&key.to_ascii_lowercase())
    }
}

impl Header for HeaderCarrier {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.to_ascii_lowercase(), vec![value.to_string()]);
    }

    fn add(&mut self, key: &str, value: &str) {
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn values(&self, key: &str) -> Vec<String> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut header = HeaderCarrier::new();
        header.set("Content-Type", "text/plain");
        assert_eq!(header.get("content-type"), Some("text/plain"));
        assert_eq!(header.get("CONTENT-TYPE"), Some("text/plain"));

        header.set("content-TYPE", "application/json");
        assert_eq!(header.len(), 1);
        assert_eq!(header.values("Content-Type"), vec!["application/json".to_string()]);
    }

    #[test]
    fn test_add_appends_and_get_returns_first() {
        let mut header = HeaderCarrier::new();
        header.add("X-Trace", "a");
        header.add("x-trace", "b");
        assert_eq!(header.get("x-trace"), Some("a"));
        assert_eq!(header.values("X-TRACE"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_missing_key() {
        let header = HeaderCarrier::new();
        assert_eq!(header.get("nope"), None);
        assert!(header.values("nope").is_empty());
        assert!(header.is_empty());
    }

    #[test]
    fn test_from_map_folds_case() {
        let mut map = BTreeMap::new();
        map.insert("X-Id".to_string(), vec!["1".to_string()]);
        map.insert("x-id".to_string(), vec!["2".to_string()]);
        map.insert("Accept".to_string(), vec!["*/*".to_string()]);

        let header = HeaderCarrier::from_map(map);
        assert_eq!(header.keys(), vec!["accept".to_string(), "x-id".to_string()]);
        assert_eq!(header.values("x-id").len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut header = HeaderCarrier::new();
        header.set("A", "1");
        assert_eq!(header.remove("a"), Some(vec!["1".to_string()]));
        assert!(header.is_empty());
    }
}
