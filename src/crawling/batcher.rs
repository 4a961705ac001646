//! Groups identifiers into request batches bounded by key length

use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};

use crate::domain::{IdSource, UserId};

pub const KEY_SEPARATOR: char = ',';

/// Identifiers fetched by one request, together with their joined key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    key: String,
    ids: Vec<UserId>,
}

impl Batch {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ids(&self) -> &[UserId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    max_key_len: usize,
}

impl Batcher {
    pub const fn new(max_key_len: usize) -> Self {
        Self { max_key_len }
    }

    pub const fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    /// Claims the next batch from a shared source
    ///
    /// The source lock is held from the first pop until the batch is
    /// complete, so every identifier lands in exactly one batch.
    pub fn next_batch(&self, source: &Mutex<IdSource>) -> Option<Batch> {
        let mut source = source.lock().unwrap_or_else(PoisonError::into_inner);
        self.take_batch(&mut source)
    }

    /// Builds a batch from a source the caller already owns
    ///
    /// The seed identifier is always taken, even when its text alone exceeds
    /// the limit; later identifiers are appended only while the joined key
    /// stays strictly shorter than `max_key_len`.
    pub fn take_batch(&self, source: &mut IdSource) -> Option<Batch> {
        let seed = source.peek().ok()?;
        source.pop().ok()?;

        let mut key = seed.to_string();
        let mut ids = vec![seed];
        let mut digits = String::new();

        while let Ok(next) = source.peek() {
            digits.clear();
            let _ = write!(digits, "{next}");
            if key.len() + KEY_SEPARATOR.len_utf8() + digits.len() >= self.max_key_len {
                break;
            }
            if source.pop().is_err() {
                break;
            }
            key.push(KEY_SEPARATOR);
            key.push_str(&digits);
            ids.push(next);
        }

        Some(Batch { key, ids })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn packs_ids_under_key_limit() {
        let source = Mutex::new(IdSource::full_range(12));
        let batcher = Batcher::new(10);

        let first = batcher.next_batch(&source).unwrap();
        // "1,2,3,4,5" is 9 chars; adding ",6" would reach 11
        assert_eq!(first.key(), "1,2,3,4,5");
        assert_eq!(first.ids(), &[1, 2, 3, 4, 5]);

        let second = batcher.next_batch(&source).unwrap();
        assert_eq!(second.key(), "6,7,8,9");

        let third = batcher.next_batch(&source).unwrap();
        assert_eq!(third.key(), "10,11,12");
        assert!(batcher.next_batch(&source).is_none());
    }

    #[test]
    fn oversized_seed_still_forms_a_batch() {
        let source = Mutex::new(IdSource::replay(vec![123_456_789, 1]));
        let batcher = Batcher::new(4);

        let batch = batcher.next_batch(&source).unwrap();
        assert_eq!(batch.ids(), &[123_456_789]);
        assert_eq!(batcher.next_batch(&source).unwrap().ids(), &[1]);
    }

    #[test]
    fn empty_source_yields_none() {
        let source = Mutex::new(IdSource::replay(Vec::new()));
        assert!(Batcher::new(100).next_batch(&source).is_none());
    }

    #[test]
    fn concurrent_claims_are_disjoint() {
        let source = std::sync::Arc::new(Mutex::new(IdSource::full_range(5_000)));
        let batcher = Batcher::new(64);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let source = std::sync::Arc::clone(&source);
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(batch) = batcher.next_batch(&source) {
                        seen.extend_from_slice(batch.ids());
                    }
                    seen
                })
            })
            .collect();

        let mut all: Vec<UserId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (1..=5_000).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn every_id_lands_in_exactly_one_bounded_batch(
            ids in proptest::collection::vec(1u64..10_000_000, 0..300),
            max_key_len in 9usize..200,
        ) {
            let source = Mutex::new(IdSource::replay(ids.clone()));
            let batcher = Batcher::new(max_key_len);
            let mut replayed = Vec::new();
            while let Some(batch) = batcher.next_batch(&source) {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.key().len() < max_key_len);
                let joined: Vec<String> = batch.ids().iter().map(ToString::to_string).collect();
                prop_assert_eq!(batch.key(), joined.join(","));
                replayed.extend_from_slice(batch.ids());
            }
            prop_assert_eq!(replayed, ids);
        }
    }
}
