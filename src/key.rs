use std::fmt::Display;

/// Namespace for cached content. Kept identical to the prefix the existing deployment writes.
pub const CONTENT_PREFIX: &str = "cached:";
/// Namespace for access counters.
pub const COUNT_PREFIX: &str = "count:";

/// Identifier of a fetchable resource, usually a URL.
///
/// The key is used verbatim; the two prefixes keep content and counters of different resources
/// apart in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey<'a>(&'a str);

impl<'a> ResourceKey<'a> {
    pub fn new(key: &'a str) -> Self {
        Self(key)
    }

    pub fn as_str(&self) -> &'a str {
        self.0
    }

    pub fn content_key(&self) -> String {
        format!("{CONTENT_PREFIX}{}", self.0)
    }

    pub fn count_key(&self) -> String {
        format!("{COUNT_PREFIX}{}", self.0)
    }
}

impl<'a> From<&'a str> for ResourceKey<'a> {
    fn from(key: &'a str) -> Self {
        Self::new(key)
    }
}

impl Display for ResourceKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[test]
fn test_store_keys_are_namespaced() {
    let key = ResourceKey::new("http://example.com");
    assert_eq!(key.content_key(), "cached:http://example.com");
    assert_eq!(key.count_key(), "count:http://example.com");
}

#[test]
fn test_store_keys_never_collide() {
    let keys = ["a", "b", "cached:a", "count:a", ""];
    let mut seen = std::collections::HashSet::new();
    for k in keys {
        let key = ResourceKey::new(k);
        assert!(seen.insert(key.content_key()), "duplicate content key for {k}");
        assert!(seen.insert(key.count_key()), "duplicate count key for {k}");
    }
}
