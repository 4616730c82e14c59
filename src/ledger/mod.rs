use std::cell::Cell;
use std::collections::BTreeMap;
use std::ops::Bound;

use sha2::{Digest, Sha256};

use crate::codec::content_hash;

pub type Key = String;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Key,
    pub value: Vec<u8>,
}

/// World-state access supplied by the host for the duration of one
/// transaction. Writes become visible to later reads of the same handle; the
/// host commits or discards them as a unit.
pub trait LedgerStub {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError>;

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError>;

    fn delete_state(&mut self, key: &str) -> Result<(), LedgerError>;

    /// Entries with `start <= key < end` in ascending key order. An empty
    /// `start` or `end` leaves that side open.
    fn get_state_by_range(&self, start: &str, end: &str)
        -> Result<StateIterator<'_>, LedgerError>;
}

type Release<'a> = Box<dyn FnOnce() + 'a>;

/// Forward-only range scan over world state.
///
/// Holds a host-side cursor that is released exactly once: by [`close`], when
/// the scan is exhausted, or on drop, whichever comes first.
///
/// [`close`]: StateIterator::close
pub struct StateIterator<'a> {
    inner: Box<dyn Iterator<Item = Result<KeyValue, LedgerError>> + 'a>,
    release: Option<Release<'a>>,
}

impl<'a> StateIterator<'a> {
    pub fn new<I>(inner: I) -> Self
    where
        I: Iterator<Item = Result<KeyValue, LedgerError>> + 'a,
    {
        Self {
            inner: Box::new(inner),
            release: None,
        }
    }

    /// Registers the hook that frees the host cursor.
    pub fn on_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + 'a,
    {
        self.release = Some(Box::new(release));
        self
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    pub fn close(mut self) {
        self.release_cursor();
    }

    fn release_cursor(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.inner = Box::new(std::iter::empty());
    }
}

impl Iterator for StateIterator<'_> {
    type Item = Result<KeyValue, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next();
        if item.is_none() {
            self.release_cursor();
        }
        item
    }
}

impl Drop for StateIterator<'_> {
    fn drop(&mut self) {
        self.release_cursor();
    }
}

impl std::fmt::Debug for StateIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateIterator")
            .field("released", &self.is_released())
            .finish()
    }
}

/// `BTreeMap`-backed stub for tests and embedders without a host peer.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: BTreeMap<Key, Vec<u8>>,
    open_iterators: Cell<usize>,
    fail_writes: Option<String>,
    fail_scans: Option<String>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent put/delete fails with `reason`.
    pub fn fail_writes(&mut self, reason: impl Into<String>) {
        self.fail_writes = Some(reason.into());
    }

    /// Every subsequent range scan fails with `reason`.
    pub fn fail_scans(&mut self, reason: impl Into<String>) {
        self.fail_scans = Some(reason.into());
    }

    pub fn heal(&mut self) {
        self.fail_writes = None;
        self.fail_scans = None;
    }

    /// Writes raw bytes, bypassing the codec.
    pub fn insert_raw(&mut self, key: impl Into<Key>, value: impl Into<Vec<u8>>) {
        self.state.insert(key.into(), value.into());
    }

    pub fn raw(&self, key: &str) -> Option<&[u8]> {
        self.state.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn open_iterators(&self) -> usize {
        self.open_iterators.get()
    }

    fn check_writes(&self) -> Result<(), LedgerError> {
        match &self.fail_writes {
            Some(reason) => Err(LedgerError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl LedgerStub for MemoryLedger {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.state.get(key).cloned())
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), LedgerError> {
        self.check_writes()?;
        self.state.insert(key.to_string(), value);
        Ok(())
    }

    fn delete_state(&mut self, key: &str) -> Result<(), LedgerError> {
        self.check_writes()?;
        self.state.remove(key);
        Ok(())
    }

    fn get_state_by_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<StateIterator<'_>, LedgerError> {
        if let Some(reason) = &self.fail_scans {
            return Err(LedgerError::Unavailable(reason.clone()));
        }
        if !start.is_empty() && !end.is_empty() && start >= end {
            return Ok(StateIterator::empty());
        }
        let lower = if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(start)
        };
        let upper = if end.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(end)
        };
        let entries = self
            .state
            .range::<str, _>((lower, upper))
            .map(|(key, value)| {
                Ok(KeyValue {
                    key: key.clone(),
                    value: value.clone(),
                })
            });

        let open = &self.open_iterators;
        open.set(open.get() + 1);
        Ok(StateIterator::new(entries).on_release(move || open.set(open.get() - 1)))
    }
}

/// Merkle root over `(key, content_hash(value))` leaves in scan order.
///
/// Both the key and the value hash feed each leaf, so moving a value to a
/// different key changes the root.
pub fn state_root(entries: StateIterator<'_>) -> Result<[u8; 32], LedgerError> {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let mut hasher = Sha256::new();
        hasher.update(b"leaf");
        hasher.update((entry.key.len() as u64).to_le_bytes());
        hasher.update(entry.key.as_bytes());
        hasher.update(content_hash(&entry.value));
        leaves.push(hasher.finalize().into());
    }
    Ok(build_merkle(leaves))
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"fare-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity(leaves.len().div_ceil(2));
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(iter: StateIterator<'_>) -> Vec<String> {
        iter.map(|kv| kv.unwrap().key).collect()
    }

    fn seeded() -> MemoryLedger {
        let mut ledger = MemoryLedger::new();
        for key in ["customer3", "asset1", "customer1", "customer2"] {
            ledger.put_state(key, key.as_bytes().to_vec()).unwrap();
        }
        ledger
    }

    #[test]
    fn open_range_scans_everything_in_key_order() {
        let ledger = seeded();
        let scan = ledger.get_state_by_range("", "").unwrap();
        assert_eq!(
            keys(scan),
            vec!["asset1", "customer1", "customer2", "customer3"]
        );
    }

    #[test]
    fn range_is_start_inclusive_end_exclusive() {
        let ledger = seeded();
        let scan = ledger.get_state_by_range("customer1", "customer3").unwrap();
        assert_eq!(keys(scan), vec!["customer1", "customer2"]);
        let scan = ledger.get_state_by_range("customer2", "").unwrap();
        assert_eq!(keys(scan), vec!["customer2", "customer3"]);
        let scan = ledger.get_state_by_range("", "customer1").unwrap();
        assert_eq!(keys(scan), vec!["asset1"]);
    }

    #[test]
    fn inverted_range_is_empty() {
        let ledger = seeded();
        let scan = ledger.get_state_by_range("z", "a").unwrap();
        assert!(keys(scan).is_empty());
        assert_eq!(ledger.open_iterators(), 0);
    }

    #[test]
    fn cursor_is_released_on_drain_close_and_drop() {
        let ledger = seeded();

        let scan = ledger.get_state_by_range("", "").unwrap();
        assert_eq!(ledger.open_iterators(), 1);
        assert_eq!(scan.count(), 4);
        assert_eq!(ledger.open_iterators(), 0);

        let mut scan = ledger.get_state_by_range("", "").unwrap();
        scan.next();
        scan.close();
        assert_eq!(ledger.open_iterators(), 0);

        {
            let mut scan = ledger.get_state_by_range("", "").unwrap();
            scan.next();
            assert_eq!(ledger.open_iterators(), 1);
        }
        assert_eq!(ledger.open_iterators(), 0);
    }

    #[test]
    fn drained_iterator_reports_released() {
        let ledger = seeded();
        let mut scan = ledger.get_state_by_range("customer3", "").unwrap();
        assert!(!scan.is_released());
        assert!(scan.next().is_some());
        assert!(scan.next().is_none());
        assert!(scan.is_released());
        assert!(scan.next().is_none());
        assert_eq!(ledger.open_iterators(), 0);
    }

    #[test]
    fn injected_failures_surface_as_unavailable() {
        let mut ledger = seeded();
        ledger.fail_writes("disk full");
        assert_eq!(
            ledger.put_state("k", b"v".to_vec()),
            Err(LedgerError::Unavailable("disk full".into()))
        );
        assert!(ledger.delete_state("asset1").is_err());
        assert!(ledger.raw("asset1").is_some());

        ledger.fail_scans("peer gone");
        assert!(ledger.get_state_by_range("", "").is_err());
        ledger.heal();
        assert!(ledger.get_state_by_range("", "").is_ok());
    }

    #[test]
    fn state_root_is_deterministic_and_key_sensitive() {
        let a = seeded();
        let mut b = MemoryLedger::new();
        for key in ["customer2", "customer1", "customer3", "asset1"] {
            b.put_state(key, key.as_bytes().to_vec()).unwrap();
        }
        let root_a = state_root(a.get_state_by_range("", "").unwrap()).unwrap();
        let root_b = state_root(b.get_state_by_range("", "").unwrap()).unwrap();
        assert_eq!(root_a, root_b);

        b.put_state("customer1", b"changed".to_vec()).unwrap();
        let root_c = state_root(b.get_state_by_range("", "").unwrap()).unwrap();
        assert_ne!(root_a, root_c);

        let empty = MemoryLedger::new();
        let root_empty = state_root(empty.get_state_by_range("", "").unwrap()).unwrap();
        assert_eq!(root_empty, build_merkle(Vec::new()));
    }
}
