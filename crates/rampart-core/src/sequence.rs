//! Wrapping 16-bit sequence arithmetic and the sliding-window buffer.
//!
//! Sequence numbers are `u16` and wrap at 65536; comparisons use modular
//! distance so that `65535 < 0 < 1`. [`SequenceBuffer`] is the structure
//! behind every window in the protocol: recently received packets,
//! sent-packet metadata, and the message send/receive queues. Each slot
//! remembers which sequence it currently holds, so stale entries are
//! filtered by comparison rather than by zeroing memory.

/// Slot marker meaning "empty". Stored sequences are widened to `u32` so
/// every `u16` sequence remains representable alongside the sentinel.
const EMPTY: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Pure sequence comparisons
// ---------------------------------------------------------------------------

/// Whether sequence `a` is more recent than `b`, accounting for wraparound.
///
/// `a` is greater iff `(a - b) mod 65536` lies in `(0, 32768]`.
#[must_use]
pub fn sequence_greater_than(a: u16, b: u16) -> bool {
    ((a > b) && (a - b <= 0x8000)) || ((a < b) && (b - a > 0x8000))
}

/// Whether sequence `a` is older than `b`, accounting for wraparound.
#[must_use]
pub fn sequence_less_than(a: u16, b: u16) -> bool {
    sequence_greater_than(b, a)
}

// ---------------------------------------------------------------------------
// SequenceBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity circular map from 16-bit sequence numbers to entries.
///
/// The buffer tracks a current sequence `S` (the next expected value).
/// Inserting a sequence at or ahead of `S` slides the window forward,
/// invalidating every slot that falls out of `[S - capacity, S - 1]`.
/// Inserting a sequence older than the window fails, which is what keeps
/// ancient acknowledgements from aliasing onto live slots.
#[derive(Debug)]
pub struct SequenceBuffer<T> {
    sequence: u16,
    entry_sequences: Vec<u32>,
    entries: Vec<Option<T>>,
}

impl<T> SequenceBuffer<T> {
    /// Create a buffer holding up to `capacity` live entries.
    ///
    /// The capacity must be a power of two no larger than 32768: slot
    /// assignment is `sequence % capacity`, which only stays collision-free
    /// across the 16-bit wraparound when the capacity divides 65536.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity <= 0x8000,
            "capacity must be a power of two in [1, 32768]"
        );
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            sequence: 0,
            entry_sequences: vec![EMPTY; capacity],
            entries,
        }
    }

    /// The next sequence number, one past the most recently inserted.
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Slot index for a sequence number.
    #[must_use]
    pub fn index_of(&self, sequence: u16) -> usize {
        sequence as usize % self.entries.len()
    }

    /// Whether the slot for `sequence` is free (no live entry of any sequence).
    #[must_use]
    pub fn available(&self, sequence: u16) -> bool {
        self.entry_sequences[self.index_of(sequence)] == EMPTY
    }

    /// Whether a live entry for exactly `sequence` is present.
    #[must_use]
    pub fn exists(&self, sequence: u16) -> bool {
        self.entry_sequences[self.index_of(sequence)] == u32::from(sequence)
    }

    /// Insert an entry for `sequence`, returning a handle to it.
    ///
    /// A sequence at or ahead of the current sequence advances the window,
    /// clearing the slots the move leaves behind. A sequence older than
    /// `S - capacity` is rejected with `None`. Inserting over a live
    /// in-window entry replaces it.
    pub fn insert(&mut self, sequence: u16) -> Option<&mut T>
    where
        T: Default,
    {
        if sequence_greater_than(sequence.wrapping_add(1), self.sequence) {
            self.clear_range(self.sequence, sequence);
            self.sequence = sequence.wrapping_add(1);
        } else {
            let oldest = self.sequence.wrapping_sub(self.entries.len() as u16);
            if sequence_less_than(sequence, oldest) {
                return None;
            }
        }
        let index = self.index_of(sequence);
        self.entry_sequences[index] = u32::from(sequence);
        self.entries[index] = Some(T::default());
        self.entries[index].as_mut()
    }

    /// Look up the live entry for `sequence`, if present.
    pub fn find(&mut self, sequence: u16) -> Option<&mut T> {
        let index = self.index_of(sequence);
        if self.entry_sequences[index] == u32::from(sequence) {
            self.entries[index].as_mut()
        } else {
            None
        }
    }

    /// Look up the live entry for `sequence` without mutable access.
    #[must_use]
    pub fn get(&self, sequence: u16) -> Option<&T> {
        let index = self.index_of(sequence);
        if self.entry_sequences[index] == u32::from(sequence) {
            self.entries[index].as_ref()
        } else {
            None
        }
    }

    /// Drop the entry for `sequence` if it is live.
    pub fn remove(&mut self, sequence: u16) {
        let index = self.index_of(sequence);
        if self.entry_sequences[index] == u32::from(sequence) {
            self.entry_sequences[index] = EMPTY;
            self.entries[index] = None;
        }
    }

    /// Clear every entry and rewind the sequence to zero.
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.entry_sequences.fill(EMPTY);
        self.entries.fill_with(|| None);
    }

    /// Invalidate the slots for sequences `start..=finish` (modular).
    fn clear_range(&mut self, start: u16, finish: u16) {
        let span = finish.wrapping_sub(start) as usize + 1;
        if span < self.entries.len() {
            for offset in 0..span {
                let index = self.index_of(start.wrapping_add(offset as u16));
                self.entry_sequences[index] = EMPTY;
                self.entries[index] = None;
            }
        } else {
            self.entry_sequences.fill(EMPTY);
            self.entries.fill_with(|| None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn greater_than_basic() {
        assert!(sequence_greater_than(1, 0));
        assert!(sequence_greater_than(100, 0));
        assert!(!sequence_greater_than(0, 1));
        assert!(!sequence_greater_than(0, 0));
    }

    #[test]
    fn greater_than_wraparound() {
        // 0 comes right after 65535
        assert!(sequence_greater_than(0, 65535));
        assert!(sequence_greater_than(10, 65530));
        assert!(!sequence_greater_than(65535, 0));
        // half-range boundary
        assert!(sequence_greater_than(0x8000, 0));
        assert!(!sequence_greater_than(0x8001, 0));
    }

    #[test]
    fn insert_then_find() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new(256);
        *buf.insert(0).unwrap() = 7;
        assert_eq!(buf.find(0), Some(&mut 7));
        assert_eq!(buf.sequence(), 1);
    }

    #[test]
    fn find_misses_empty_and_stale_slots() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new(4);
        assert!(buf.find(0).is_none());
        *buf.insert(0).unwrap() = 1;
        // sequence 4 maps to the same slot as 0 but must not match it
        assert!(buf.find(4).is_none());
    }

    #[test]
    fn insert_rejects_sequences_older_than_window() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new(256);
        buf.insert(1000).unwrap();
        assert!(buf.insert(1000 - 256).is_none());
        // the oldest in-window sequence is still accepted
        assert!(buf.insert(1000 - 255).is_some());
    }

    #[test]
    fn advancing_clears_overwritten_window() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new(4);
        for seq in 0..4u16 {
            *buf.insert(seq).unwrap() = u32::from(seq);
        }
        // jump ahead far enough that every old slot leaves the window
        buf.insert(8).unwrap();
        for seq in 0..4u16 {
            assert!(buf.find(seq).is_none(), "seq {seq} should be cleared");
        }
        assert!(buf.exists(8));
        assert_eq!(buf.sequence(), 9);
    }

    #[test]
    fn insert_same_sequence_overwrites_in_place() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new(16);
        *buf.insert(5).unwrap() = 1;
        *buf.insert(5).unwrap() = 2;
        assert_eq!(buf.find(5), Some(&mut 2));
        assert_eq!(buf.sequence(), 6);
    }

    #[test]
    fn remove_clears_only_matching_sequence() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new(8);
        buf.insert(3).unwrap();
        buf.remove(11); // same slot, different sequence
        assert!(buf.exists(3));
        buf.remove(3);
        assert!(!buf.exists(3));
        assert!(buf.available(3));
    }

    #[test]
    fn reset_rewinds_everything() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new(8);
        buf.insert(100).unwrap();
        buf.reset();
        assert_eq!(buf.sequence(), 0);
        assert!(buf.find(100).is_none());
        assert!(buf.insert(0).is_some());
    }

    #[test]
    fn wraparound_insertion_near_top_of_range() {
        let mut buf: SequenceBuffer<u32> = SequenceBuffer::new(256);
        *buf.insert(65535).unwrap() = 1;
        *buf.insert(0).unwrap() = 2;
        assert_eq!(buf.sequence(), 1);
        assert!(buf.exists(65535));
        assert!(buf.exists(0));
    }

    proptest! {
        // An entry is found iff it was inserted and is still inside the
        // window [current - capacity, current).
        #[test]
        fn find_matches_window_membership(seqs in proptest::collection::vec(any::<u16>(), 1..200)) {
            let capacity = 64u16;
            let mut buf: SequenceBuffer<u16> = SequenceBuffer::new(capacity as usize);
            let mut inserted: Vec<u16> = Vec::new();

            for &seq in &seqs {
                if buf.insert(seq).is_some() {
                    inserted.push(seq);
                }
                let current = buf.sequence();
                for &past in &inserted {
                    let in_window = sequence_less_than(past, current)
                        && !sequence_less_than(past, current.wrapping_sub(capacity));
                    if buf.exists(past) {
                        prop_assert!(in_window, "live entry {past} outside window ending {current}");
                    }
                }
            }
        }

        #[test]
        fn stale_insert_never_aliases(start in any::<u16>()) {
            let mut buf: SequenceBuffer<u8> = SequenceBuffer::new(32);
            buf.insert(start);
            let stale = start.wrapping_sub(32);
            prop_assert!(buf.insert(stale).is_none());
            prop_assert!(!buf.exists(stale));
        }
    }
}
