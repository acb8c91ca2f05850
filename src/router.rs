//! Radix-tree path matcher.
//!
//! One tree for the whole app, keyed by path pattern. O(path-length)
//! lookup via [`matchit`]. Method selection happens after the match, so an
//! unknown method on a known path can be told apart from an unknown path.

use std::collections::HashMap;

use matchit::Router as MatchitRouter;

use crate::error::Error;

pub(crate) struct Router<T> {
    tree: MatchitRouter<T>,
}

impl<T> Router<T> {
    pub(crate) fn new() -> Self {
        Self { tree: MatchitRouter::new() }
    }

    /// Fails on malformed patterns and on patterns that collide with one
    /// already registered, including across services.
    pub(crate) fn insert(&mut self, pattern: &str, value: T) -> Result<(), Error> {
        self.tree.insert(pattern, value).map_err(|source| Error::InvalidRoute {
            path: pattern.to_owned(),
            source,
        })
    }

    /// Matches `path` and writes its parameters into `params`.
    ///
    /// `params` is the pooled context's map; filling it in place keeps its
    /// capacity across requests.
    pub(crate) fn lookup(&self, path: &str, params: &mut HashMap<String, String>) -> Option<&T> {
        let matched = self.tree.at(path).ok()?;
        params.extend(matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        Some(matched.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_fills_params() {
        let mut router = Router::new();
        router.insert("/students/{sid}", 1).unwrap();
        router.insert("/students", 2).unwrap();

        let mut params = HashMap::new();
        assert_eq!(router.lookup("/students/42", &mut params), Some(&1));
        assert_eq!(params.get("sid").map(String::as_str), Some("42"));

        params.clear();
        assert_eq!(router.lookup("/students", &mut params), Some(&2));
        assert!(params.is_empty());
        assert_eq!(router.lookup("/courses", &mut params), None);
    }

    #[test]
    fn conflicting_patterns_are_rejected() {
        let mut router = Router::new();
        router.insert("/a/{x}", ()).unwrap();
        let err = router.insert("/a/{y}", ()).unwrap_err();
        assert!(matches!(err, Error::InvalidRoute { ref path, .. } if path == "/a/{y}"));
    }
}
