use regex::Regex;
use sha1_smol::Sha1;

/// Suffix of the companion entry holding a cached query's row count.
pub const ROW_COUNT_SUFFIX: &str = "_nrows";

/// Derives the cache key of a query: `<namespace>:q:<sha1 hex of the text>`.
///
/// Whitespace and case are significant; two spellings of the same statement
/// are two entries.
pub fn query_key(namespace: &str, query: &str) -> String {
    let mut hash = Sha1::new();
    hash.update(query.as_bytes());
    format!("{namespace}:q:{}", hash.digest())
}

/// Returns the key of the row count companion of `key`.
pub fn row_count_key(key: &str) -> String {
    format!("{key}{ROW_COUNT_SUFFIX}")
}

/// A key selector as accepted by [`crate::QueryCache::delete`].
#[derive(Clone, Debug)]
pub enum KeyPattern {
    /// `*`: every known key.
    All,
    /// A key without wildcard.
    Exact(String),
    /// A glob where `*` stands for any run of characters. Anchored at both
    /// ends.
    Glob(Regex),
}

impl KeyPattern {
    /// Parses a key or glob pattern.
    pub fn parse(pattern: &str) -> KeyPattern {
        if pattern == "*" {
            return KeyPattern::All;
        }
        if !pattern.contains('*') {
            return KeyPattern::Exact(pattern.to_string());
        }
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        KeyPattern::Glob(
            Regex::new(&format!("^{body}$")).expect("escaped glob always forms a valid pattern"),
        )
    }

    /// Returns true if `key` is selected by this pattern.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::Glob(regex) => regex.is_match(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_key_is_deterministic() {
        let a = query_key("qc", "SELECT * FROM app_product WHERE id=5");
        let b = query_key("qc", "SELECT * FROM app_product WHERE id=5");
        assert_eq!(a, b);
        assert!(a.starts_with("qc:q:"));
        assert_eq!(a.len(), "qc:q:".len() + 40);
    }

    #[test]
    fn test_distinct_queries_get_distinct_keys() {
        assert_ne!(
            query_key("qc", "SELECT * FROM app_product WHERE id=5"),
            query_key("qc", "SELECT * FROM app_product WHERE id=6")
        );
        assert_ne!(query_key("a", "SELECT 1"), query_key("b", "SELECT 1"));
    }

    #[test]
    fn test_row_count_key() {
        assert_eq!(row_count_key("qc:q:abc"), "qc:q:abc_nrows");
    }

    #[test]
    fn test_patterns() {
        assert!(KeyPattern::parse("*").matches("anything"));

        let exact = KeyPattern::parse("qc:q:abc");
        assert!(exact.matches("qc:q:abc"));
        assert!(!exact.matches("qc:q:abcd"));

        let glob = KeyPattern::parse("product_*_lang");
        assert!(glob.matches("product_12_lang"));
        assert!(glob.matches("product__lang"));
        assert!(!glob.matches("xproduct_12_lang"));
        assert!(!glob.matches("product_12_lang_x"));

        // regex metacharacters are literal
        let dotted = KeyPattern::parse("a.b*");
        assert!(dotted.matches("a.bc"));
        assert!(!dotted.matches("axbc"));
    }
}
