use retrovault::{Error, Keypair, PublishOptions};
use retrovault_common::accounts::CatalogPage;
use retrovault_common::address::catalog_page_address;
use retrovault_common::constants::FLAG_RETIRED;
use retrovault_testnet::Testnet;

use super::utils::init_tracing;

#[tokio::test]
async fn bootstrap_from_nothing() {
    init_tracing();
    let testnet = Testnet::start_uninitialized().await.unwrap();
    let admin = testnet.admin_client().unwrap();

    assert!(admin.catalog_root().await.unwrap().is_none());

    admin.init_catalog().await.unwrap();
    let root = admin.catalog_root().await.unwrap().unwrap();
    assert_eq!(root.page_count, 0);
    assert_eq!(root.total_cartridges, 0);
    assert_eq!(
        root.admin.to_bytes(),
        testnet.admin().public_key().to_bytes()
    );

    // Initializing twice is refused.
    assert!(matches!(
        admin.init_catalog().await.unwrap_err(),
        Error::Conflict(_)
    ));

    admin.create_page(0).await.unwrap();
    let root = admin.catalog_root().await.unwrap().unwrap();
    assert_eq!(root.page_count, 1);
    assert_eq!(root.latest_page_index, 0);
}

#[tokio::test]
async fn listing_walks_pages_in_append_order() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let client = testnet.client_for(Keypair::random()).unwrap();

    let blobs: Vec<Vec<u8>> = (0..3)
        .map(|n| format!("ordered cartridge {n}").into_bytes())
        .collect();
    let mut ids = vec![];
    for blob in &blobs {
        ids.push(
            client
                .publish(
                    blob.clone(),
                    PublishOptions {
                        chunk_size: 16,
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
                .content_id,
        );
    }

    let entries = client.list_all(false).await.unwrap();
    assert_eq!(
        entries.iter().map(|e| e.content_id).collect::<Vec<_>>(),
        ids
    );
    // Entry integrity: the redundant digest matches the content id.
    for entry in &entries {
        assert_eq!(entry.sha256, entry.content_id.to_bytes());
    }
}

#[tokio::test]
async fn retired_entries_are_hidden_unless_requested() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let client = testnet.client_for(Keypair::random()).unwrap();

    let keep = client
        .publish(b"keep me listed".to_vec(), Default::default())
        .await
        .unwrap();
    let retire = client
        .publish(b"retire me".to_vec(), Default::default())
        .await
        .unwrap();

    // The administrative retire path is out of band; flip the flag right
    // on the ledger.
    let node = testnet.node();
    let (page_address, _) = catalog_page_address(0);
    let mut page = CatalogPage::decode(&node.account(&page_address).unwrap()).unwrap();
    for entry in &mut page.entries {
        if entry.content_id == retire.content_id {
            entry.flags |= FLAG_RETIRED;
        }
    }
    node.set_account(page_address, page.encode());

    let visible = client.list_page(0, false).await.unwrap().unwrap();
    assert_eq!(
        visible.iter().map(|e| e.content_id).collect::<Vec<_>>(),
        vec![keep.content_id]
    );

    let everything = client.list_page(0, true).await.unwrap().unwrap();
    assert_eq!(everything.len(), 2);
    assert!(everything
        .iter()
        .any(|e| e.content_id == retire.content_id && e.is_retired()));
}

#[tokio::test]
async fn admin_rotation_moves_page_authority() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let old_admin = testnet.admin_client().unwrap();

    let new_admin_keypair = Keypair::random();
    old_admin
        .update_admin(new_admin_keypair.public_key())
        .await
        .unwrap();

    // The old key lost page authority.
    assert!(matches!(
        old_admin.create_page(1).await.unwrap_err(),
        Error::Conflict(_)
    ));

    let new_admin = testnet.client_for(new_admin_keypair).unwrap();
    new_admin.create_page(1).await.unwrap();
    let root = new_admin.catalog_root().await.unwrap().unwrap();
    assert_eq!(root.page_count, 2);
}

#[tokio::test]
async fn balances_move_through_faucet_and_fees() {
    init_tracing();
    let testnet = Testnet::start().await.unwrap();
    let keypair = Keypair::random();
    let client = testnet.client_for(keypair.clone()).unwrap();

    let address = retrovault::Address::from_bytes(keypair.public_key().to_bytes());
    let before = client.rpc().get_balance(&address).await.unwrap();

    client.rpc().request_airdrop(&address, 12_345).await.unwrap();
    let after = client.rpc().get_balance(&address).await.unwrap();
    assert_eq!(after, before + 12_345);

    // Publishing costs fees.
    client
        .publish(b"fees are real".to_vec(), Default::default())
        .await
        .unwrap();
    assert!(client.rpc().get_balance(&address).await.unwrap() < after);
}
