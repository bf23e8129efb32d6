use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use retrovault::{ContentId, Error, FetchEvent, FetchOptions, Keypair, PublishOptions};
use retrovault_testnet::Testnet;

use super::utils::init_tracing;

fn publish_options(chunk_size: u32) -> PublishOptions {
    PublishOptions {
        chunk_size,
        ..Default::default()
    }
}

#[tokio::test]
async fn absent_manifest_returns_none() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let client = testnet.client().unwrap();

    let missing = ContentId::hash(b"never published");
    assert!(client
        .fetch(&missing, Default::default())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn repeated_fetches_are_byte_identical() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let client = testnet.client().unwrap();

    let blob: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let receipt = client
        .publish(blob.clone(), publish_options(256))
        .await
        .unwrap();

    let first = client
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    // The cache write-back is a background task; give it a moment so the
    // second fetch can hit the file space.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let second = client
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.bytes, blob);
    assert_eq!(first.bytes, second.bytes);
    // The second round was served out of the verified file cache.
    assert!(second.from_cache);
}

#[tokio::test]
async fn cache_is_transparent() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let cached = testnet.client().unwrap();
    let blob = b"cache should never change bytes".to_vec();
    let receipt = cached.publish(blob.clone(), publish_options(8)).await.unwrap();

    // Warm the cache, then fetch once more through it.
    let warm = cached
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    let hot = cached
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();

    // A cache-less client must see exactly the same bytes.
    let cold_client = testnet.client_for(Keypair::random()).unwrap();
    let cold = cold_client
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(warm.bytes, blob);
    assert_eq!(hot.bytes, blob);
    assert_eq!(cold.bytes, blob);
}

#[tokio::test]
async fn corrupt_cached_chunk_fails_verification_then_recovers() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let client = testnet.client().unwrap();

    let blob = b"integrity matters for cartridges".to_vec();
    let receipt = client.publish(blob.clone(), publish_options(8)).await.unwrap();
    let content_id = receipt.content_id;

    // Poison one cached chunk: flip a byte of chunk 1.
    let cache = client.cache().unwrap();
    cache.put_chunk(&content_id, 0, b"XXXXXXXX").unwrap();
    for index in 1..blob.len().div_ceil(8) as u32 {
        let start = index as usize * 8;
        let end = (start + 8).min(blob.len());
        cache.put_chunk(&content_id, index, &blob[start..end]).unwrap();
    }

    let error = client
        .fetch(&content_id, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Integrity { .. }));

    // The poisoned entries were invalidated, so the retry re-reads the
    // ledger and succeeds.
    assert!(cache.get_all_chunks(&content_id).unwrap().is_empty());
    let recovered = client
        .fetch(&content_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(recovered.bytes, blob);
}

#[tokio::test]
async fn partial_cache_hits_fetch_only_the_rest() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let publisher = testnet.client_for(Keypair::random()).unwrap();

    let blob: Vec<u8> = (0..64u8).collect();
    let receipt = publisher
        .publish(blob.clone(), publish_options(8))
        .await
        .unwrap();

    // A fresh cached client with some chunks pre-seeded.
    let reader = testnet.client().unwrap();
    let cache = reader.cache().unwrap();
    cache.put_chunk(&receipt.content_id, 0, &blob[0..8]).unwrap();
    cache.put_chunk(&receipt.content_id, 3, &blob[24..32]).unwrap();

    let fetched = reader
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.bytes, blob);
    assert!(!fetched.from_cache);
}

#[tokio::test]
async fn fetch_progress_events_arrive_in_phase_order() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let client = testnet.client().unwrap();

    let blob = vec![7u8; 100];
    let receipt = client.publish(blob, publish_options(16)).await.unwrap();

    let trace = Arc::new(AtomicU32::new(0));
    let observer_trace = trace.clone();
    let progress = Arc::new(move |event: FetchEvent| {
        let digit = match event {
            FetchEvent::Manifest => 1,
            FetchEvent::Chunks { .. } => 2,
            FetchEvent::Verifying => 3,
            FetchEvent::Complete => 4,
        };
        let previous = observer_trace.load(Ordering::SeqCst);
        assert!(digit >= previous, "phase {digit} after {previous}");
        observer_trace.store(digit, Ordering::SeqCst);
    });

    client
        .fetch(
            &receipt.content_id,
            FetchOptions {
                progress: Some(progress),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trace.load(Ordering::SeqCst), 4);
}
