use super::{EnumerationOrder, KeyValueStore, Keyspace, StoredValue, CURRENT_USER_VERSION};
use crate::error::{LiteCoreError, Result};
use std::collections::BTreeMap;

/// Pure in-memory [`KeyValueStore`], used by unit tests and as a fast
/// default when durability isn't required. Transactions are implemented as
/// a shadow copy that's swapped in on commit and discarded on abort —
/// simple and correct for the data sizes this crate's test suite uses.
#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspaces: [BTreeMap<Vec<u8>, StoredValue>; 5],
    user_version: i64,
    tx_snapshot: Option<([BTreeMap<Vec<u8>, StoredValue>; 5], i64)>,
}

fn index(keyspace: Keyspace) -> usize {
    match keyspace {
        Keyspace::Documents => 0,
        Keyspace::Revisions => 1,
        Keyspace::LocalDocs => 2,
        Keyspace::Checkpoints => 3,
        Keyspace::Raw => 4,
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { keyspaces: Default::default(), user_version: CURRENT_USER_VERSION, tx_snapshot: None }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keyspace: Keyspace, key: &[u8]) -> Result<Option<StoredValue>> {
        Ok(self.keyspaces[index(keyspace)].get(key).cloned())
    }

    fn put(&mut self, keyspace: Keyspace, key: &[u8], value: StoredValue) -> Result<()> {
        self.keyspaces[index(keyspace)].insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, keyspace: Keyspace, key: &[u8]) -> Result<()> {
        self.keyspaces[index(keyspace)].remove(key);
        Ok(())
    }

    fn enumerate(
        &self,
        keyspace: Keyspace,
        start_key: Option<&[u8]>,
        end_key: Option<&[u8]>,
        order: EnumerationOrder,
    ) -> Result<Vec<(Vec<u8>, StoredValue)>> {
        let map = &self.keyspaces[index(keyspace)];
        let mut out: Vec<(Vec<u8>, StoredValue)> = map
            .iter()
            .filter(|(k, _)| start_key.map_or(true, |s| k.as_slice() >= s))
            .filter(|(k, _)| end_key.map_or(true, |e| k.as_slice() < e))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if order == EnumerationOrder::Descending {
            out.reverse();
        }
        Ok(out)
    }

    fn begin_tx(&mut self) -> Result<()> {
        if self.tx_snapshot.is_some() {
            return Err(LiteCoreError::InvalidParameter("transaction already open".into()));
        }
        self.tx_snapshot = Some((self.keyspaces.clone(), self.user_version));
        Ok(())
    }

    fn commit_tx(&mut self) -> Result<()> {
        self.tx_snapshot
            .take()
            .ok_or_else(|| LiteCoreError::InvalidParameter("no open transaction".into()))?;
        Ok(())
    }

    fn abort_tx(&mut self) -> Result<()> {
        let (snapshot, version) = self
            .tx_snapshot
            .take()
            .ok_or_else(|| LiteCoreError::InvalidParameter("no open transaction".into()))?;
        self.keyspaces = snapshot;
        self.user_version = version;
        Ok(())
    }

    fn user_version(&self) -> Result<i64> {
        Ok(self.user_version)
    }

    fn set_user_version(&mut self, version: i64) -> Result<()> {
        self.user_version = version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut store = MemoryStore::new();
        store.put(Keyspace::Documents, b"doc1", StoredValue { value: b"hi".to_vec(), meta: vec![] }).unwrap();
        assert_eq!(store.get(Keyspace::Documents, b"doc1").unwrap().unwrap().value, b"hi");
    }

    #[test]
    fn abort_discards_writes_made_during_the_transaction() {
        let mut store = MemoryStore::new();
        store.begin_tx().unwrap();
        store.put(Keyspace::Documents, b"doc1", StoredValue { value: b"hi".to_vec(), meta: vec![] }).unwrap();
        store.abort_tx().unwrap();
        assert!(store.get(Keyspace::Documents, b"doc1").unwrap().is_none());
    }

    #[test]
    fn commit_keeps_writes_made_during_the_transaction() {
        let mut store = MemoryStore::new();
        store.begin_tx().unwrap();
        store.put(Keyspace::Documents, b"doc1", StoredValue { value: b"hi".to_vec(), meta: vec![] }).unwrap();
        store.commit_tx().unwrap();
        assert!(store.get(Keyspace::Documents, b"doc1").unwrap().is_some());
    }

    #[test]
    fn enumerate_respects_bounds_and_order() {
        let mut store = MemoryStore::new();
        for k in ["a", "b", "c"] {
            store.put(Keyspace::Documents, k.as_bytes(), StoredValue { value: vec![], meta: vec![] }).unwrap();
        }
        let ascending = store.enumerate(Keyspace::Documents, Some(b"a"), Some(b"c"), EnumerationOrder::Ascending).unwrap();
        assert_eq!(ascending.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(), vec![b"a".to_vec(), b"b".to_vec()]);

        let descending = store.enumerate(Keyspace::Documents, None, None, EnumerationOrder::Descending).unwrap();
        assert_eq!(descending.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(), vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn default_user_version_is_current() {
        let store = MemoryStore::new();
        assert_eq!(store.user_version().unwrap(), CURRENT_USER_VERSION);
    }
}
