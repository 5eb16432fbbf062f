use super::*;

#[tokio::test]
async fn set_and_get() {
    let store = MemoryStore::new();
    assert!(store.is_empty().await);

    store.set("k", b"value").await.expect("set should succeed");

    assert_eq!(
        store.get("k").await.expect("get should succeed"),
        Some(b"value".to_vec())
    );
    assert_eq!(store.get("other").await.expect("get should succeed"), None);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn overwrite_keeps_single_entry() {
    let store = MemoryStore::new();
    store.set("k", b"one").await.expect("set should succeed");
    store.set("k", b"two").await.expect("set should succeed");

    assert_eq!(
        store.get("k").await.expect("get should succeed"),
        Some(b"two".to_vec())
    );
    assert_eq!(store.len().await, 1);
}
