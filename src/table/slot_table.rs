//! The quadratic-probing slot table laid over a shared region

use std::fmt;
use std::ptr::{addr_of, addr_of_mut, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use log::{trace, warn};

use crate::error::{Result, ShmConfError};
use crate::layout::{SlotHeader, TableHeader, TableLayout, MAX_KEY_FIELDS};
use crate::record::RecordKey;

use super::probe::ProbeSequence;
use super::slot::SlotState;
use super::wait::SpinWait;

/// Result of [`SlotTable::find_or_claim`]
#[derive(Debug)]
pub enum SlotClaim<'t> {
    /// A published slot already holds the key
    Existing(u32),
    /// A free slot was claimed for the key; its payload must be written
    /// before the guard publishes it
    Claimed(PendingSlot<'t>),
}

/// Outcome of a single compare-and-swap on a free slot
enum ClaimAttempt {
    Won,
    RaceLost,
}

/// Fixed-capacity hash table of slots inside a mapped region.
///
/// The table holds only the region's base address; every slot is reached by
/// byte offset from it, so each process can map the region anywhere.
pub struct SlotTable {
    base: NonNull<u8>,
    layout: TableLayout,
    claim_timeout: Duration,
}

// SAFETY: slot state and the occupied count are only touched through atomics;
// key bytes are written before a Release publish and read after an Acquire load.
unsafe impl Send for SlotTable {}
unsafe impl Sync for SlotTable {}

impl SlotTable {
    /// # Safety
    /// `base` must point to at least `layout.region_size` bytes, aligned to a
    /// cache line, that stay mapped for the lifetime of the table and start
    /// with a [`TableHeader`].
    pub unsafe fn new(base: NonNull<u8>, layout: TableLayout, claim_timeout: Duration) -> Self {
        Self {
            base,
            layout,
            claim_timeout,
        }
    }

    /// Slot count
    pub fn capacity(&self) -> u32 {
        self.layout.capacity
    }

    /// Geometry the table was built with
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Number of published slots
    pub fn occupied(&self) -> u32 {
        self.header().occupied()
    }

    /// Find the slot holding `key`, or claim a free one for it.
    ///
    /// Losing a claim race is not an error: the slot is re-read and, if the
    /// winner stored a different key, probing continues. Fails with
    /// `CapacityExhausted` after a full walk of the table.
    pub fn find_or_claim(&self, key: &RecordKey) -> Result<SlotClaim<'_>> {
        let hash = key.signature_hash();
        for index in ProbeSequence::new(hash, self.layout.capacity) {
            loop {
                match self.state(index)? {
                    SlotState::Free => match self.try_claim(index) {
                        ClaimAttempt::Won => {
                            // SAFETY: the slot is ours until published.
                            unsafe { self.write_key(index, key, hash) };
                            return Ok(SlotClaim::Claimed(PendingSlot {
                                table: self,
                                index,
                                published: false,
                            }));
                        }
                        ClaimAttempt::RaceLost => {
                            trace!("Lost claim race on slot {}, re-reading", index);
                        }
                    },
                    SlotState::Claimed => self.wait_published(index)?,
                    SlotState::Used => {
                        if self.key_matches(index, key, hash) {
                            return Ok(SlotClaim::Existing(index));
                        }
                        break;
                    }
                }
            }
        }

        warn!(
            "Slot table full: {} slots probed for key {}",
            self.layout.capacity, key
        );
        Err(ShmConfError::capacity_exhausted(self.layout.capacity))
    }

    /// Find the published slot holding `key`.
    ///
    /// Stops at the first free slot on the walk.
    pub fn find(&self, key: &RecordKey) -> Result<Option<u32>> {
        let hash = key.signature_hash();
        for index in ProbeSequence::new(hash, self.layout.capacity) {
            loop {
                match self.state(index)? {
                    SlotState::Free => return Ok(None),
                    SlotState::Claimed => self.wait_published(index)?,
                    SlotState::Used => {
                        if self.key_matches(index, key, hash) {
                            return Ok(Some(index));
                        }
                        break;
                    }
                }
            }
        }
        Ok(None)
    }

    /// Current state of slot `index`
    pub fn state(&self, index: u32) -> Result<SlotState> {
        let raw = self.slot_state(index).load(Ordering::Acquire);
        SlotState::from_raw(raw).ok_or_else(|| {
            ShmConfError::invalid_layout(format!("slot {} has invalid state {}", index, raw))
        })
    }

    /// Key stored in slot `index`, if it is published
    pub fn key_at(&self, index: u32) -> Option<RecordKey> {
        if self.state(index).ok()? != SlotState::Used {
            return None;
        }
        // SAFETY: published key bytes are immutable.
        let (type_id, _, len, fields) = unsafe { self.read_key(index) };
        RecordKey::from_raw_parts(type_id, len, fields)
    }

    /// Indices of all published slots, in slot order
    pub fn used_indices(&self) -> Vec<u32> {
        (0..self.layout.capacity)
            .filter(|&i| matches!(self.state(i), Ok(SlotState::Used)))
            .collect()
    }

    /// Start of the payload of slot `index`
    pub fn payload_ptr(&self, index: u32) -> NonNull<u8> {
        assert!(index < self.layout.capacity, "slot {} out of range", index);
        // SAFETY: the layout keeps every payload inside the region.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(self.layout.payload_offset(index))) }
    }

    fn header(&self) -> &TableHeader {
        // SAFETY: the region starts with a table header.
        unsafe { &*(self.base.as_ptr() as *const TableHeader) }
    }

    fn slot_header(&self, index: u32) -> *mut SlotHeader {
        assert!(index < self.layout.capacity, "slot {} out of range", index);
        // SAFETY: in range per the layout.
        unsafe { self.base.as_ptr().add(self.layout.slot_offset(index)) as *mut SlotHeader }
    }

    fn slot_state(&self, index: u32) -> &AtomicU32 {
        // SAFETY: `state` is an atomic at a cache-line aligned offset.
        unsafe { &*addr_of!((*self.slot_header(index)).state) }
    }

    fn try_claim(&self, index: u32) -> ClaimAttempt {
        match self.slot_state(index).compare_exchange(
            SlotState::Free.as_raw(),
            SlotState::Claimed.as_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => ClaimAttempt::Won,
            Err(_) => ClaimAttempt::RaceLost,
        }
    }

    fn wait_published(&self, index: u32) -> Result<()> {
        let mut wait = SpinWait::new(self.claim_timeout);
        while self.slot_state(index).load(Ordering::Acquire) == SlotState::Claimed.as_raw() {
            if !wait.pause() {
                warn!(
                    "Slot {} still unpublished after {:?}; its claimant may have died",
                    index, self.claim_timeout
                );
                return Err(ShmConfError::concurrency(format!(
                    "slot {} was not published within {:?}",
                    index, self.claim_timeout
                )));
            }
        }
        Ok(())
    }

    /// # Safety
    /// The caller must hold the claim on slot `index`.
    unsafe fn write_key(&self, index: u32, key: &RecordKey, hash: u64) {
        let header = self.slot_header(index);
        addr_of_mut!((*header).type_id).write(key.type_id());
        addr_of_mut!((*header).key_hash).write(hash);
        addr_of_mut!((*header).key_len).write(key.fields().len() as u32);
        addr_of_mut!((*header).key_fields).write(key.raw_fields());
    }

    /// # Safety
    /// Slot `index` must be published.
    unsafe fn read_key(&self, index: u32) -> (u32, u64, u32, [u64; MAX_KEY_FIELDS]) {
        let header = self.slot_header(index);
        (
            addr_of!((*header).type_id).read(),
            addr_of!((*header).key_hash).read(),
            addr_of!((*header).key_len).read(),
            addr_of!((*header).key_fields).read(),
        )
    }

    fn key_matches(&self, index: u32, key: &RecordKey, hash: u64) -> bool {
        // SAFETY: only called after observing `Used` with Acquire.
        let (type_id, stored_hash, len, fields) = unsafe { self.read_key(index) };
        stored_hash == hash
            && type_id == key.type_id()
            && RecordKey::from_raw_parts(type_id, len, fields).as_ref() == Some(key)
    }

    fn publish(&self, index: u32) {
        self.slot_state(index)
            .store(SlotState::Used.as_raw(), Ordering::Release);
        self.header().occupied.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("capacity", &self.layout.capacity)
            .field("slot_size", &self.layout.slot_size)
            .field("occupied", &self.occupied())
            .finish()
    }
}

/// A claimed slot whose key is written but which other processes still see
/// as in progress.
///
/// Publishing happens on [`PendingSlot::publish`] or on drop, so an early
/// return while writing the payload never leaves the slot claimed forever.
pub struct PendingSlot<'t> {
    table: &'t SlotTable,
    index: u32,
    published: bool,
}

impl PendingSlot<'_> {
    /// Index of the claimed slot
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Payload of the claimed slot, exclusively ours until published
    pub fn payload_ptr(&self) -> NonNull<u8> {
        self.table.payload_ptr(self.index)
    }

    /// Make the slot visible to every other prober
    pub fn publish(mut self) -> u32 {
        self.publish_once();
        self.index
    }

    fn publish_once(&mut self) {
        if !self.published {
            self.table.publish(self.index);
            self.published = true;
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.publish_once();
    }
}

impl fmt::Debug for PendingSlot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingSlot")
            .field("index", &self.index)
            .field("published", &self.published)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[repr(C, align(64))]
    #[derive(Clone, Copy)]
    struct Line([u8; 64]);

    struct TestRegion {
        lines: Vec<Line>,
        layout: TableLayout,
    }

    impl TestRegion {
        fn new(capacity: u32) -> Self {
            let size = TableLayout::required_region_size(32, capacity);
            let layout = TableLayout::compute(size, 32, Some(capacity)).unwrap();
            Self {
                lines: vec![Line([0; 64]); (size + 63) / 64],
                layout,
            }
        }

        fn table(&mut self, timeout: Duration) -> SlotTable {
            let base = NonNull::new(self.lines.as_mut_ptr() as *mut u8).unwrap();
            unsafe { SlotTable::new(base, self.layout, timeout) }
        }
    }

    fn key(type_id: u32, field: u64) -> RecordKey {
        RecordKey::new(type_id, &[field]).unwrap()
    }

    fn insert(table: &SlotTable, key: &RecordKey) -> u32 {
        match table.find_or_claim(key).unwrap() {
            SlotClaim::Claimed(pending) => pending.publish(),
            SlotClaim::Existing(index) => panic!("{} already in slot {}", key, index),
        }
    }

    #[test]
    fn test_claim_then_find() {
        let mut region = TestRegion::new(7);
        let table = region.table(Duration::from_secs(1));
        let k = key(1, 42);

        assert_eq!(table.find(&k).unwrap(), None);
        let index = insert(&table, &k);
        assert_eq!(table.find(&k).unwrap(), Some(index));
        assert!(matches!(table.find_or_claim(&k).unwrap(), SlotClaim::Existing(i) if i == index));
        assert_eq!(table.key_at(index), Some(k));
        assert_eq!(table.occupied(), 1);
    }

    #[test]
    fn test_distinct_keys_distinct_slots() {
        let mut region = TestRegion::new(31);
        let table = region.table(Duration::from_secs(1));
        let mut indices: Vec<u32> = (0..20).map(|i| insert(&table, &key(1, i))).collect();
        for i in 0..20 {
            assert_eq!(table.find(&key(1, i)).unwrap(), Some(indices[i as usize]));
        }
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), 20);
        assert_eq!(table.used_indices(), indices);
    }

    #[test]
    fn test_type_identity_separates_keys() {
        let mut region = TestRegion::new(7);
        let table = region.table(Duration::from_secs(1));
        let a = insert(&table, &key(1, 5));
        let b = insert(&table, &key(2, 5));
        assert_ne!(a, b);
        assert_eq!(table.find(&key(2, 5)).unwrap(), Some(b));
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut region = TestRegion::new(7);
        let table = region.table(Duration::from_secs(1));
        for i in 0..7 {
            insert(&table, &key(1, i));
        }
        assert_eq!(table.occupied(), 7);

        let err = table.find_or_claim(&key(1, 100)).unwrap_err();
        assert!(matches!(err, ShmConfError::CapacityExhausted { capacity: 7 }));
        assert!(matches!(table.find_or_claim(&key(1, 3)).unwrap(), SlotClaim::Existing(_)));
        assert_eq!(table.find(&key(1, 100)).unwrap(), None);
    }

    #[test]
    fn test_dropped_claim_is_published() {
        let mut region = TestRegion::new(7);
        let table = region.table(Duration::from_secs(1));
        let k = key(3, 9);
        let index = match table.find_or_claim(&k).unwrap() {
            SlotClaim::Claimed(pending) => pending.index(),
            SlotClaim::Existing(_) => unreachable!(),
        };
        assert_eq!(table.state(index).unwrap(), SlotState::Used);
        assert_eq!(table.find(&k).unwrap(), Some(index));
    }

    #[test]
    fn test_prober_waits_for_publication() {
        let mut region = TestRegion::new(7);
        let table = region.table(Duration::from_secs(5));
        let k = key(1, 7);

        let pending = match table.find_or_claim(&k).unwrap() {
            SlotClaim::Claimed(pending) => pending,
            SlotClaim::Existing(_) => unreachable!(),
        };
        let claimed = pending.index();

        thread::scope(|s| {
            let prober = s.spawn(|| table.find_or_claim(&k).map(|c| match c {
                SlotClaim::Existing(i) => Some(i),
                SlotClaim::Claimed(_) => None,
            }));
            thread::sleep(Duration::from_millis(20));
            pending.publish();
            assert_eq!(prober.join().unwrap().unwrap(), Some(claimed));
        });
    }

    #[test]
    fn test_unpublished_claim_times_out() {
        let mut region = TestRegion::new(7);
        let table = region.table(Duration::from_millis(10));
        let k = key(1, 7);

        let pending = match table.find_or_claim(&k).unwrap() {
            SlotClaim::Claimed(pending) => pending,
            SlotClaim::Existing(_) => unreachable!(),
        };
        let start = Instant::now();
        let err = table.find(&k).unwrap_err();
        assert!(matches!(err, ShmConfError::Concurrency { .. }));
        assert!(start.elapsed() >= Duration::from_millis(10));
        drop(pending);
        assert!(table.find(&k).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let mut region = TestRegion::new(31);
        let table = region.table(Duration::from_secs(5));
        let k = key(9, 1);

        let results: Vec<Option<u32>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| match table.find_or_claim(&k).unwrap() {
                        SlotClaim::Claimed(pending) => {
                            pending.publish();
                            None
                        }
                        SlotClaim::Existing(i) => Some(i),
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_none()).count(), 1);
        assert_eq!(table.occupied(), 1);
        let index = table.find(&k).unwrap().unwrap();
        assert!(results.iter().flatten().all(|&i| i == index));
    }
}
