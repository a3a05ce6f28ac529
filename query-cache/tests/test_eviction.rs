mod support;

use query_cache::row_count_key;
use rand::seq::SliceRandom;

use crate::support::*;

#[test]
fn test_eviction_bound() {
    let ctx = TestContext::new();
    let mut cache = ctx.cache();

    // ids in random order, so the eviction order can only come from the
    // order of insertion
    let mut ids: Vec<usize> = (0..5001).collect();
    ids.shuffle(&mut rand::rng());
    let queries: Vec<String> = ids.iter().map(|id| select("app_product", *id)).collect();

    for query in &queries {
        assert!(cache.set_query(query, &[1]));
        assert!(cache.set_query_row_count(query, 1));
    }

    assert_eq!(cache.indexed_keys("app_product").len(), 4001);
    assert_eq!(ctx.server.hash_len("qc:table:app_product"), 4001);
    assert_eq!(cache.statistics().evicted, 1000);

    for query in &queries[..1000] {
        let key = cache.key_of(query);
        assert!(!ctx.server.contains_key(&key), "{query} was not evicted");
        assert!(!ctx.server.contains_key(&row_count_key(&key)));
    }
    for query in &queries[1000..] {
        let key = cache.key_of(query);
        assert!(ctx.server.contains_key(&key), "{query} was evicted");
        assert!(ctx.server.contains_key(&row_count_key(&key)));
    }
    assert_eq!(cache.get_query::<Vec<u32>>(&queries[999]), None);
    assert_eq!(cache.get_query::<Vec<u32>>(&queries[1000]), Some(vec![1]));
}

#[test]
fn test_eviction_is_per_table() {
    let ctx = TestContext::with_eviction(10, 4);
    let mut cache = ctx.cache();

    let other = select("app_category", 1);
    cache.set_query(&other, &[1]);
    for id in 0..11 {
        cache.set_query(&select("app_product", id), &[1]);
    }

    assert_eq!(cache.indexed_keys("app_product").len(), 7);
    assert_eq!(cache.indexed_keys("app_category"), vec![cache.key_of(&other)]);
    assert_eq!(cache.get_query::<Vec<u32>>(&other), Some(vec![1]));
}

#[test]
fn test_eviction_keeps_repeated_query() {
    let ctx = TestContext::with_eviction(3, 2);
    let mut cache = ctx.cache();
    let first = select("app_product", 0);
    for id in 0..3 {
        cache.set_query(&select("app_product", id), &[id]);
    }
    // already indexed: no trim pass, no new membership
    cache.set_query(&first, &[9]);
    assert_eq!(cache.indexed_keys("app_product").len(), 3);
    assert_eq!(cache.get_query::<Vec<usize>>(&first), Some(vec![9]));
}

#[test]
fn test_evicted_queries_leave_every_table() {
    let ctx = TestContext::with_eviction(2, 1);
    let mut cache = ctx.cache();
    let joined = "SELECT * FROM app_a JOIN app_b ON 1";
    cache.set_query(joined, &[1]);
    cache.set_query("SELECT * FROM app_a WHERE x = 1", &[2]);
    cache.set_query("SELECT * FROM app_a WHERE x = 2", &[3]);

    // evicted through app_a, gone from app_b too
    assert_eq!(cache.get_query::<Vec<u32>>(joined), None);
    assert_eq!(cache.indexed_keys("app_a").len(), 2);
    assert!(cache.indexed_keys("app_b").is_empty());
    assert_eq!(ctx.server.hash_len("qc:table:app_b"), 0);
}

#[test]
fn test_eviction_bound_is_shared_by_clients() {
    let ctx = TestContext::with_eviction(10, 4);
    let mut a = ctx.cache();
    let mut b = ctx.cache();

    for id in 0..10 {
        a.set_query(&select("app_t", id), &[id]);
    }
    for id in 10..20 {
        b.set_query(&select("app_t", id), &[id]);
        assert!(ctx.server.hash_len("qc:table:app_t") <= 10);
    }

    // b evicted what a had written first
    let evicted = b.statistics().evicted;
    assert!(evicted >= 10);
    for id in 0..4 {
        let key = a.key_of(&select("app_t", id));
        assert!(!ctx.server.contains_key(&key), "{key} was not evicted");
    }
    assert_eq!(a.get_query::<Vec<usize>>(&select("app_t", 0)), None);
    assert_eq!(b.get_query::<Vec<usize>>(&select("app_t", 19)), Some(vec![19]));
    assert_eq!(
        ctx.server.hash_len("qc:table:app_t"),
        b.indexed_keys("app_t").len()
    );
}
