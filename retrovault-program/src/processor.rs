//! Operation handlers. Validate first, then mutate.

use retrovault_common::accounts::{
    CartridgeChunk, CartridgeManifest, CatalogEntry, CatalogPage, CatalogRoot,
};
use retrovault_common::address::{
    catalog_page_address, catalog_root_address, chunk_address, manifest_address,
};
use retrovault_common::constants::{MAX_BLOB_SIZE, MAX_CHUNK_SIZE, METADATA_CAP};
use retrovault_common::{Address, ContentId, Operation, PublicKey};

use crate::error::ProgramError;
use crate::store::AccountStore;

/// Apply one operation on behalf of `signer` at ledger slot `slot`.
///
/// The runtime must hand in a staged store and commit only on `Ok`; the
/// handlers assume failures leave the ledger untouched.
pub fn apply(
    store: &mut dyn AccountStore,
    slot: u64,
    signer: &PublicKey,
    operation: &Operation,
) -> Result<(), ProgramError> {
    tracing::debug!(op = operation.name(), %signer, slot, "applying operation");

    match operation {
        Operation::InitializeCatalog => initialize_catalog(store, signer),
        Operation::CreateCatalogPage { page_index } => {
            create_catalog_page(store, signer, *page_index)
        }
        Operation::CreateManifest {
            content_id,
            blob_size,
            chunk_size,
            declared_sha256,
            metadata,
        } => create_manifest(
            store,
            slot,
            signer,
            content_id,
            *blob_size,
            *chunk_size,
            declared_sha256,
            metadata,
        ),
        Operation::WriteChunk {
            content_id,
            chunk_index,
            payload,
        } => write_chunk(store, signer, content_id, *chunk_index, payload),
        Operation::FinalizeCartridge {
            content_id,
            page_index,
        } => finalize_cartridge(store, slot, signer, content_id, *page_index),
        Operation::UpdateAdmin { new_admin } => update_admin(store, signer, new_admin),
    }
}

fn load_root(store: &dyn AccountStore) -> Result<(Address, CatalogRoot), ProgramError> {
    let (address, _) = catalog_root_address();
    let bytes = store.get(&address).ok_or(ProgramError::CatalogMissing)?;
    Ok((address, CatalogRoot::decode(&bytes)?))
}

fn load_manifest(
    store: &dyn AccountStore,
    content_id: &ContentId,
) -> Result<(Address, CartridgeManifest), ProgramError> {
    let (address, _) = manifest_address(content_id);
    let bytes = store.get(&address).ok_or(ProgramError::ManifestMissing)?;
    Ok((address, CartridgeManifest::decode(&bytes)?))
}

fn initialize_catalog(
    store: &mut dyn AccountStore,
    signer: &PublicKey,
) -> Result<(), ProgramError> {
    let (address, bump) = catalog_root_address();
    if store.get(&address).is_some() {
        return Err(ProgramError::CatalogExists);
    }

    let root = CatalogRoot {
        version: CatalogRoot::VERSION,
        admin: *signer,
        total_cartridges: 0,
        page_count: 0,
        latest_page_index: 0,
        bump,
    };
    store.put(address, root.encode());
    Ok(())
}

fn create_catalog_page(
    store: &mut dyn AccountStore,
    signer: &PublicKey,
    page_index: u32,
) -> Result<(), ProgramError> {
    let (root_address, mut root) = load_root(store)?;
    if root.admin != *signer {
        return Err(ProgramError::Unauthorized);
    }
    if page_index != root.page_count {
        return Err(ProgramError::PageIndexMismatch {
            expected: root.page_count,
            actual: page_index,
        });
    }

    let (page_address, bump) = catalog_page_address(page_index);
    let page = CatalogPage {
        page_index,
        bump,
        entries: vec![],
    };

    root.page_count = root.page_count.checked_add(1).ok_or(ProgramError::Overflow)?;
    root.latest_page_index = page_index;

    store.put(page_address, page.encode());
    store.put(root_address, root.encode());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn create_manifest(
    store: &mut dyn AccountStore,
    slot: u64,
    signer: &PublicKey,
    content_id: &ContentId,
    blob_size: u64,
    chunk_size: u32,
    declared_sha256: &[u8; 32],
    metadata: &[u8],
) -> Result<(), ProgramError> {
    if blob_size == 0 || blob_size > MAX_BLOB_SIZE {
        return Err(ProgramError::BlobSizeOutOfRange(blob_size));
    }
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(ProgramError::ChunkSizeOutOfRange(chunk_size));
    }
    if declared_sha256 != content_id.as_bytes() {
        return Err(ProgramError::CommitmentMismatch);
    }
    if metadata.len() > METADATA_CAP {
        return Err(ProgramError::MetadataTooLong(metadata.len()));
    }

    let (address, bump) = manifest_address(content_id);
    if store.get(&address).is_some() {
        return Err(ProgramError::ManifestExists);
    }

    let manifest = CartridgeManifest {
        content_id: *content_id,
        blob_size,
        chunk_size,
        chunk_count: CartridgeManifest::chunk_count_for(blob_size, chunk_size),
        sha256: *declared_sha256,
        finalized: false,
        created_slot: slot,
        publisher: *signer,
        metadata: metadata.to_vec(),
        bump,
    };
    store.put(address, manifest.encode());
    Ok(())
}

fn write_chunk(
    store: &mut dyn AccountStore,
    signer: &PublicKey,
    content_id: &ContentId,
    chunk_index: u32,
    payload: &[u8],
) -> Result<(), ProgramError> {
    let (_, manifest) = load_manifest(store, content_id)?;
    if manifest.finalized {
        return Err(ProgramError::ManifestFinalized);
    }
    if manifest.publisher != *signer {
        return Err(ProgramError::Unauthorized);
    }
    if chunk_index >= manifest.chunk_count {
        return Err(ProgramError::ChunkIndexOutOfRange {
            index: chunk_index,
            count: manifest.chunk_count,
        });
    }

    let expected = manifest.expected_data_len(chunk_index);
    if payload.len() != expected as usize {
        return Err(ProgramError::ChunkLengthMismatch {
            index: chunk_index,
            expected,
            actual: payload.len() as u32,
        });
    }

    let (address, bump) = chunk_address(content_id, chunk_index);
    if let Some(existing) = store.get(&address) {
        if CartridgeChunk::decode(&existing)?.written {
            return Err(ProgramError::ChunkAlreadyWritten(chunk_index));
        }
    }

    let chunk = CartridgeChunk {
        content_id: *content_id,
        chunk_index,
        data: payload.to_vec(),
        written: true,
        bump,
    };
    store.put(address, chunk.encode(manifest.chunk_size));
    Ok(())
}

fn finalize_cartridge(
    store: &mut dyn AccountStore,
    slot: u64,
    signer: &PublicKey,
    content_id: &ContentId,
    page_index: u32,
) -> Result<(), ProgramError> {
    let (manifest_addr, mut manifest) = load_manifest(store, content_id)?;
    if manifest.finalized {
        return Err(ProgramError::ManifestFinalized);
    }
    if manifest.publisher != *signer {
        return Err(ProgramError::Unauthorized);
    }

    let (root_address, mut root) = load_root(store)?;
    if root.page_count == 0 {
        return Err(ProgramError::PageMissing(page_index));
    }
    if page_index != root.latest_page_index {
        return Err(ProgramError::NotLatestPage {
            expected: root.latest_page_index,
            actual: page_index,
        });
    }

    let (page_address, _) = catalog_page_address(page_index);
    let page_bytes = store
        .get(&page_address)
        .ok_or(ProgramError::PageMissing(page_index))?;
    let mut page = CatalogPage::decode(&page_bytes)?;
    if !page.has_capacity() {
        return Err(ProgramError::PageFull(page_index));
    }

    // Every chunk must exist, be written, and carry the exact length the
    // geometry demands; together with the write-time checks this pins the
    // reconstruction to the declared commitment.
    for index in 0..manifest.chunk_count {
        let (address, _) = chunk_address(content_id, index);
        let bytes = store
            .get(&address)
            .ok_or(ProgramError::ChunkIncomplete(index))?;
        let chunk = CartridgeChunk::decode(&bytes)?;
        if !chunk.written {
            return Err(ProgramError::ChunkIncomplete(index));
        }
        let expected = manifest.expected_data_len(index);
        if chunk.data.len() != expected as usize {
            return Err(ProgramError::ChunkLengthMismatch {
                index,
                expected,
                actual: chunk.data.len() as u32,
            });
        }
    }

    manifest.finalized = true;
    page.entries.push(CatalogEntry {
        content_id: *content_id,
        manifest_address: manifest_addr,
        blob_size: manifest.blob_size,
        sha256: manifest.sha256,
        created_slot: slot,
        flags: 0,
    });
    root.total_cartridges = root
        .total_cartridges
        .checked_add(1)
        .ok_or(ProgramError::Overflow)?;

    store.put(manifest_addr, manifest.encode());
    store.put(page_address, page.encode());
    store.put(root_address, root.encode());
    Ok(())
}

fn update_admin(
    store: &mut dyn AccountStore,
    signer: &PublicKey,
    new_admin: &PublicKey,
) -> Result<(), ProgramError> {
    let (address, mut root) = load_root(store)?;
    if root.admin != *signer {
        return Err(ProgramError::Unauthorized);
    }
    root.admin = *new_admin;
    store.put(address, root.encode());
    Ok(())
}
