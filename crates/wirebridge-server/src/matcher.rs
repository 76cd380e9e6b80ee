//! Per-operation interceptor selection.

use std::collections::HashMap;
use std::fmt;
use wirebridge_common::middleware::Middleware;

/// Maps operation names to the interceptors that wrap them.
///
/// Selectors ending in `*` match by prefix (the longest prefix wins), any
/// other selector matches one operation exactly. An exact match beats every
/// prefix. Interceptors added with [`use_all`](Self::use_all) run first for
/// every operation.
#[derive(Clone, Default)]
pub struct Matcher {
    defaults: Vec<Middleware>,
    exact: HashMap<String, Vec<Middleware>>,
    // kept sorted longest prefix first
    prefixes: Vec<(String, Vec<Middleware>)>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_all(&mut self, middleware: impl IntoIterator<Item = Middleware>) -> &mut Self {
        self.defaults.extend(middleware);
        self
    }

    pub fn add(
        &mut self,
        selector: &str,
        middleware: impl IntoIterator<Item = Middleware>,
    ) -> &mut Self {
        match selector.strip_suffix('*') {
            Some(prefix) => {
                match self.prefixes.iter_mut().find(|(p, _)| p == prefix) {
                    Some((_, existing)) => existing.extend(middleware),
                    None => {
                        self.prefixes
                            .push((prefix.to_string(), middleware.into_iter().collect()));
                        self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
                    }
                }
            }
            None => self
                .exact
                .entry(selector.to_string())
                .or_default()
                .extend(middleware),
        }
        self
    }

    /// Interceptors for `operation`, outermost first.
    pub fn matches(&self, operation: &str) -> Vec<Middleware> {
        let mut chain = self.defaults.clone();
        if let Some(exact) = self.exact.get(operation) {
            chain.extend(exact.iter().cloned());
        } else if let Some((_, matched)) = self
            .prefixes
            .iter()
            .find(|(prefix, _)| operation.starts_with(prefix.as_str()))
        {
            chain.extend(matched.iter().cloned());
        }
        chain
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.exact.is_empty() && self.prefixes.is_empty()
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("defaults", &self.defaults.len())
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field(
                "prefixes",
                &self.prefixes.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .finish()
    }
}
