mod common;

use common::memory_pool;
use lightorm::{new_uuid, next_prefixed_id};

#[tokio::test]
async fn prefixed_ids_count_up_per_prefix() {
    let pool = memory_pool().await;

    assert_eq!(next_prefixed_id(&pool, "INV").await.unwrap(), "INV-001");
    assert_eq!(next_prefixed_id(&pool, "INV").await.unwrap(), "INV-002");
    // Each prefix carries its own counter.
    assert_eq!(next_prefixed_id(&pool, "ORD").await.unwrap(), "ORD-001");
    assert_eq!(next_prefixed_id(&pool, "INV").await.unwrap(), "INV-003");
}

#[tokio::test]
async fn prefixed_ids_zero_pad_to_three_digits_and_keep_growing() {
    let pool = memory_pool().await;
    let mut last = String::new();
    for _ in 0..12 {
        last = next_prefixed_id(&pool, "T").await.unwrap();
    }
    assert_eq!(last, "T-012");
}

#[test]
fn uuids_are_canonical_and_unique() {
    let a = new_uuid();
    let b = new_uuid();
    assert_eq!(a.len(), 36);
    assert_ne!(a, b);
    assert!(uuid::Uuid::parse_str(&a).is_ok());
}
