use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use retrovault::{
    CancellationToken, CartridgeClient, ConflictError, ContentId, Error, Keypair, PublishEvent,
    PublishOptions, PublishOutcome,
};
use retrovault_common::accounts::{CartridgeChunk, CartridgeManifest};
use retrovault_common::address::{chunk_address, manifest_address};
use retrovault_common::constants::PAGE_CAP;
use retrovault_testnet::Testnet;

use super::utils::init_tracing;

fn options(chunk_size: u32) -> PublishOptions {
    PublishOptions {
        chunk_size,
        ..Default::default()
    }
}

#[tokio::test]
async fn tiny_blob_splits_and_reconstructs() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let client = testnet.client().unwrap();

    let receipt = client
        .publish(b"hello".to_vec(), options(4))
        .await
        .unwrap();

    assert_eq!(
        receipt.content_id.to_string(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(receipt.outcome, PublishOutcome::Published);

    // The ledger holds exactly the two expected chunk payloads.
    let node = testnet.node();
    let manifest = CartridgeManifest::decode(
        &node
            .account(&manifest_address(&receipt.content_id).0)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.chunk_count, 2);
    assert!(manifest.finalized);

    let chunk0 = CartridgeChunk::decode(
        &node.account(&chunk_address(&receipt.content_id, 0).0).unwrap(),
    )
    .unwrap();
    let chunk1 = CartridgeChunk::decode(
        &node.account(&chunk_address(&receipt.content_id, 1).0).unwrap(),
    )
    .unwrap();
    assert_eq!(chunk0.data, b"hell");
    assert_eq!(chunk1.data, b"o");

    let fetched = client
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.bytes, b"hello");
}

#[tokio::test]
async fn boundary_aligned_blob_has_only_full_chunks() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let client = testnet.client().unwrap();

    let blob = vec![0x5A; 384];
    let receipt = client.publish(blob.clone(), options(128)).await.unwrap();

    let node = testnet.node();
    for index in 0..3 {
        let chunk = CartridgeChunk::decode(
            &node
                .account(&chunk_address(&receipt.content_id, index).0)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(chunk.data.len(), 128);
    }

    let fetched = client
        .fetch(&receipt.content_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.bytes, blob);
}

#[tokio::test]
async fn empty_metadata_decodes_to_empty_slice() {
    init_tracing();
    let mut testnet = Testnet::start().await.unwrap();
    let client = testnet.client().unwrap();

    let receipt = client
        .publish(b"metadata-less".to_vec(), options(8))
        .await
        .unwrap();

    let (_, manifest) = client
        .manifest_info(&receipt.content_id)
        .await
        .unwrap()
        .unwrap();
    assert!(manifest.metadata.is_empty());
}

#[tokio::test]
async fn page_rollover_needs_a_new_page() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let publisher = Keypair::random();
    let client = testnet.client_for(publisher).unwrap();

    for n in 0..PAGE_CAP {
        client
            .publish(format!("cartridge number {n}").into_bytes(), options(16))
            .await
            .unwrap();
    }

    // One more than the page holds.
    let overflow = b"the seventeenth".to_vec();
    let error = client
        .publish(overflow.clone(), options(16))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        Error::Conflict(ConflictError::PageFull { page_index: 0 })
    ));

    // The admin adds page 1 and the same publish lands in it at entry 0.
    testnet.admin_client().unwrap().create_page(1).await.unwrap();
    let receipt = client.publish(overflow, options(16)).await.unwrap();

    let page1 = client.list_page(1, false).await.unwrap().unwrap();
    assert_eq!(page1.len(), 1);
    assert_eq!(page1[0].content_id, receipt.content_id);

    let root = client.catalog_root().await.unwrap().unwrap();
    assert_eq!(root.total_cartridges, PAGE_CAP as u64 + 1);
}

#[tokio::test]
async fn interrupted_publish_resumes_cleanly() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let publisher = Keypair::random();
    let client = testnet.client_for(publisher.clone()).unwrap();

    // 6 chunks at concurrency 1; cancel as soon as two chunks are written.
    let blob: Vec<u8> = (0..48u8).collect();
    let cancel = CancellationToken::new();
    let observer_cancel = cancel.clone();
    let progress = Arc::new(move |event: PublishEvent| {
        if let PublishEvent::Chunks { written, .. } = event {
            if written >= 2 {
                observer_cancel.cancel();
            }
        }
    });

    let error = client
        .publish(
            blob.clone(),
            PublishOptions {
                chunk_size: 8,
                concurrency: 1,
                progress: Some(progress),
                cancel: Some(cancel),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(error, Error::Cancelled));

    let content_id = ContentId::hash(&blob);
    let (_, open_manifest) = client.manifest_info(&content_id).await.unwrap().unwrap();
    assert!(!open_manifest.finalized);

    // Re-invoking publish with the same inputs completes from where it
    // stopped.
    let receipt = client.publish(blob.clone(), options(8)).await.unwrap();
    assert_eq!(receipt.content_id, content_id);
    assert_eq!(receipt.outcome, PublishOutcome::Published);

    let fetched = client
        .fetch(&content_id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.bytes, blob);
}

#[tokio::test]
async fn republish_conflicts_unless_skipped() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let client = testnet.client_for(Keypair::random()).unwrap();
    let blob = b"publish me twice".to_vec();

    client.publish(blob.clone(), options(8)).await.unwrap();

    let error = client.publish(blob.clone(), options(8)).await.unwrap_err();
    assert!(matches!(
        error,
        Error::Conflict(ConflictError::AlreadyFinalized { .. })
    ));

    let receipt = client
        .publish(
            blob,
            PublishOptions {
                chunk_size: 8,
                skip_if_exists: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.outcome, PublishOutcome::AlreadyExists);
    assert!(receipt.transactions.is_empty());
}

#[tokio::test]
async fn deny_listed_content_is_refused() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let blob = b"not welcome here".to_vec();
    let banned = ContentId::hash(&blob);

    let keypair = Keypair::random();
    testnet.fund(&retrovault::Address::from_bytes(
        keypair.public_key().to_bytes(),
    ));
    let client = CartridgeClient::builder()
        .url(testnet.url().clone())
        .keypair(keypair)
        .deny_list([banned])
        .build()
        .unwrap();

    let error = client.publish(blob, Default::default()).await.unwrap_err();
    assert!(matches!(error, Error::Refused { content_id } if content_id == banned));
}

#[tokio::test]
async fn progress_events_arrive_in_phase_order() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let client = testnet.client_for(Keypair::random()).unwrap();

    // Encode the phase sequence as digits and assert the order once done.
    let trace = Arc::new(AtomicU32::new(0));
    let observer_trace = trace.clone();
    let progress = Arc::new(move |event: PublishEvent| {
        let digit = match event {
            PublishEvent::Preparing => 1,
            PublishEvent::Manifest => 2,
            PublishEvent::Chunks { .. } => 3,
            PublishEvent::Finalizing => 4,
            PublishEvent::Complete { .. } => 5,
        };
        let previous = observer_trace.load(Ordering::SeqCst);
        assert!(digit >= previous, "phase {digit} after {previous}");
        observer_trace.store(digit, Ordering::SeqCst);
    });

    client
        .publish(
            b"watch my phases".to_vec(),
            PublishOptions {
                chunk_size: 4,
                progress: Some(progress),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(trace.load(Ordering::SeqCst), 5);
}
