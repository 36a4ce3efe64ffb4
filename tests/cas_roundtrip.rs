use std::sync::Arc;

use casfs::cas::{Cas, CasOptions, GcOptions};
use casfs::object::ObjectType;
use casfs::storage::InMemoryBlobStorage;

fn cas() -> Cas {
    let backend = Arc::new(InMemoryBlobStorage::new());
    Cas::new(backend, CasOptions::default())
}

#[tokio::test]
async fn put_then_get_reproduces_content() {
    let cas = cas();
    let put = cas.put(ObjectType::Blob, b"what is up, doc?").await.unwrap();
    assert!(put.written);

    let object = cas.get(&put.hash).await.unwrap().expect("object present");
    assert_eq!(object.content, b"what is up, doc?");
    assert_eq!(object.object_type, ObjectType::Blob);
}

#[tokio::test]
async fn second_put_of_same_content_is_not_written_again() {
    let cas = cas();
    let first = cas.put(ObjectType::Blob, b"hello").await.unwrap();
    let second = cas.put(ObjectType::Blob, b"hello").await.unwrap();
    assert_eq!(first.hash, second.hash);
    assert!(first.written);
    assert!(!second.written);
}

#[tokio::test]
async fn has_reflects_presence_after_put_and_delete() {
    let cas = cas();
    let put = cas.put(ObjectType::Blob, b"gone soon").await.unwrap();
    assert!(cas.has(&put.hash).await.unwrap());

    cas.delete(&put.hash).await.unwrap();
    assert!(!cas.has(&put.hash).await.unwrap());
}

#[tokio::test]
async fn gc_reclaims_only_zero_refcount_objects() {
    let cas = cas();
    let kept = cas.put(ObjectType::Blob, b"kept").await.unwrap();
    let dropped = cas.put(ObjectType::Blob, b"dropped").await.unwrap();
    cas.delete(&dropped.hash).await.unwrap();

    let result = cas.gc(GcOptions { dry_run: false }, |_| {}).await.unwrap();
    assert!(result.deleted_hashes.contains(&dropped.hash));
    assert!(!result.deleted_hashes.contains(&kept.hash));
    assert!(cas.has(&kept.hash).await.unwrap());
    assert!(!cas.has(&dropped.hash).await.unwrap());
}

#[tokio::test]
async fn batch_put_dedups_within_the_batch() {
    let cas = cas();
    let results = cas
        .put_batch(
            vec![
                (ObjectType::Blob, b"a".to_vec()),
                (ObjectType::Blob, b"a".to_vec()),
                (ObjectType::Blob, b"b".to_vec()),
            ],
            |_, _| {},
        )
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect::<Vec<_>>();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].hash, results[1].hash);
    assert_ne!(results[0].hash, results[2].hash);
}
