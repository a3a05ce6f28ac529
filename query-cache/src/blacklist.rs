/// Decides which statements must never have their results cached.
///
/// A statement is blacklisted when its text contains `<prefix><table>` for
/// any listed table, anywhere, including inside a longer identifier. Extra
/// misses from such overlaps are accepted; missing a churning table is not.
#[derive(Clone, Debug)]
pub struct Blacklist {
    needles: Vec<String>,
}

impl Blacklist {
    /// Builds a blacklist for `tables`, each prefixed with `prefix`.
    pub fn new<I, T>(prefix: &str, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Blacklist {
            needles: tables
                .into_iter()
                .map(|table| format!("{prefix}{}", table.as_ref()))
                .collect(),
        }
    }

    /// Returns true if the results of `query` must not be cached.
    pub fn is_blacklisted(&self, query: &str) -> bool {
        self.needles.iter().any(|needle| query.contains(needle.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BLACKLIST;

    fn blacklist() -> Blacklist {
        Blacklist::new("app_", DEFAULT_BLACKLIST)
    }

    #[test]
    fn test_listed_table_is_blacklisted() {
        assert!(blacklist().is_blacklisted("SELECT * FROM app_cart WHERE id_cart = 3"));
        assert!(blacklist().is_blacklisted("SELECT * FROM app_guest"));
    }

    #[test]
    fn test_mixed_statement_is_blacklisted() {
        assert!(blacklist().is_blacklisted(
            "SELECT * FROM app_product p JOIN app_cart_product cp ON p.id = cp.id_product"
        ));
    }

    #[test]
    fn test_substring_match() {
        // `app_customer_thread` is not listed but contains `app_customer`
        assert!(blacklist().is_blacklisted("SELECT * FROM app_customer_thread"));
    }

    #[test]
    fn test_unlisted_table_passes() {
        assert!(!blacklist().is_blacklisted("SELECT * FROM app_product WHERE id=5"));
        // without the prefix the name does not count
        assert!(!blacklist().is_blacklisted("SELECT cart FROM app_orders"));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert!(!blacklist().is_blacklisted("SELECT * FROM APP_CART"));
    }
}
