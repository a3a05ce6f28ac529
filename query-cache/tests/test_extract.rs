mod support;

use query_cache::{CacheConfig, TableExtractor};
use rstest::rstest;

use crate::support::*;

fn tables(query: &str) -> Option<Vec<String>> {
    TableExtractor::new("app_")
        .extract(query)
        .map(|tables| tables.into_iter().collect())
}

#[rstest]
#[case("SELECT * FROM app_orders", &["app_orders"])]
#[case("SELECT * FROM app_orders WHERE id_order = 4", &["app_orders"])]
#[case("select * from `app_orders` where 1", &["app_orders"])]
#[case("SELECT * FROM app_a, app_b WHERE app_a.id = app_b.id", &["app_a", "app_b"])]
#[case("SELECT * FROM `app_a`, `app_b`", &["app_a", "app_b"])]
#[case(
    "SELECT p.* FROM app_product p LEFT JOIN app_product_lang pl ON pl.id = p.id",
    &["app_product", "app_product_lang"]
)]
#[case("UPDATE app_stock SET quantity = 2", &["app_stock"])]
#[case("INSERT INTO app_log (message) VALUES ('x')", &["app_log"])]
#[case("DELETE FROM\napp_image\nWHERE id = 1", &["app_image"])]
#[case("SELECT * FROM APP_Config", &["APP_Config"])]
fn test_tables_are_found(#[case] query: &str, #[case] expected: &[&str]) {
    assert_eq!(tables(query).unwrap(), expected);
}

#[rstest]
#[case("SELECT 1")]
#[case("SHOW TABLES")]
#[case("SELECT * FROM orders")]
#[case("SELECT * FROM other_orders")]
#[case("")]
fn test_no_tables_found(#[case] query: &str) {
    assert_eq!(tables(query), None);
}

#[test]
fn test_tables_are_deduplicated() {
    let query = "SELECT * FROM app_a JOIN app_b ON 1 JOIN app_a x ON 1";
    assert_eq!(tables(query).unwrap(), vec!["app_a", "app_b"]);
}

#[test]
fn test_cache_uses_configured_prefix() {
    let cache = TestContext::with_config(CacheConfig::new().set_table_prefix("ps_")).cache();
    let found = cache.tables_of("SELECT * FROM ps_orders JOIN app_orders ON 1").unwrap();
    assert_eq!(found.as_slice(), ["ps_orders".to_string()]);
    assert!(cache.tables_of("SELECT * FROM app_orders").is_none());
}
