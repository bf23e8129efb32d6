//! Account storage seen by the program.

use std::collections::HashMap;

use retrovault_common::Address;

/// Byte-addressed account storage.
///
/// The program only ever reads whole accounts and writes whole accounts; the
/// runtime decides where the bytes live.
pub trait AccountStore {
    /// Read an account's bytes, or `None` if it does not exist.
    fn get(&self, address: &Address) -> Option<Vec<u8>>;

    /// Create or overwrite an account.
    fn put(&mut self, address: Address, data: Vec<u8>);
}

/// Plain in-memory store backing a node or a test.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    accounts: HashMap<Address, Vec<u8>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of existing accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store holds no accounts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountStore for MemoryStore {
    fn get(&self, address: &Address) -> Option<Vec<u8>> {
        self.accounts.get(address).cloned()
    }

    fn put(&mut self, address: Address, data: Vec<u8>) {
        self.accounts.insert(address, data);
    }
}

/// Staged writes over a base store.
///
/// An operation runs against an [`Overlay`]; on success the runtime commits
/// the staged writes into the base, on failure it drops them, which is what
/// makes operations atomic.
pub struct Overlay<'a, S: AccountStore> {
    base: &'a S,
    writes: HashMap<Address, Vec<u8>>,
}

impl<'a, S: AccountStore> Overlay<'a, S> {
    /// Stage over `base`.
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            writes: HashMap::new(),
        }
    }

    /// The staged writes, to be committed by the runtime.
    #[must_use]
    pub fn into_writes(self) -> HashMap<Address, Vec<u8>> {
        self.writes
    }
}

impl<S: AccountStore> AccountStore for Overlay<'_, S> {
    fn get(&self, address: &Address) -> Option<Vec<u8>> {
        self.writes
            .get(address)
            .cloned()
            .or_else(|| self.base.get(address))
    }

    fn put(&mut self, address: Address, data: Vec<u8>) {
        self.writes.insert(address, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_shadows_base_until_commit() {
        let mut base = MemoryStore::new();
        let a = Address::from_bytes([1; 32]);
        base.put(a, vec![1]);

        let mut overlay = Overlay::new(&base);
        assert_eq!(overlay.get(&a), Some(vec![1]));
        overlay.put(a, vec![2]);
        assert_eq!(overlay.get(&a), Some(vec![2]));
        assert_eq!(base.get(&a), Some(vec![1]));

        let writes = overlay.into_writes();
        assert_eq!(writes.get(&a), Some(&vec![2]));
    }
}
