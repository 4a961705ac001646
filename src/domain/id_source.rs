//! Work-list of user identifiers consumed by one pass
//!
//! Two backings share one contract: a dense ascending range for the first
//! pass, and a FIFO replay of previously failed identifiers for retry passes.

use std::collections::VecDeque;
use thiserror::Error;

/// User identifier as issued by the remote API
pub type UserId = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdSourceError {
    #[error("Identifier source is exhausted")]
    Exhausted,
}

/// Ordered, consumable sequence of identifiers
#[derive(Debug, Clone)]
pub enum IdSource {
    /// Ascending cursor with `left` identifiers still to hand out
    Range {
        next: UserId,
        left: u64,
        total: usize,
    },
    /// Identifiers replayed in the order they were recorded
    Replay {
        queue: VecDeque<UserId>,
        total: usize,
    },
}

impl IdSource {
    /// Dense range `1..=max_id`
    pub fn full_range(max_id: UserId) -> Self {
        Self::range(1, max_id)
    }

    /// Inclusive range `start..=end`; an inverted range is empty
    pub fn range(start: UserId, end: UserId) -> Self {
        let left = if end >= start {
            (end - start).saturating_add(1)
        } else {
            0
        };
        Self::Range {
            next: start,
            left,
            total: usize::try_from(left).unwrap_or(usize::MAX),
        }
    }

    pub fn replay(ids: impl IntoIterator<Item = UserId>) -> Self {
        let queue: VecDeque<UserId> = ids.into_iter().collect();
        let total = queue.len();
        Self::Replay { queue, total }
    }

    /// Count fixed at construction, used for progress estimation only
    pub fn total_count(&self) -> usize {
        match self {
            Self::Range { total, .. } | Self::Replay { total, .. } => *total,
        }
    }

    pub fn has_more(&self) -> bool {
        match self {
            Self::Range { left, .. } => *left > 0,
            Self::Replay { queue, .. } => !queue.is_empty(),
        }
    }

    pub fn peek(&self) -> Result<UserId, IdSourceError> {
        if !self.has_more() {
            return Err(IdSourceError::Exhausted);
        }
        match self {
            Self::Range { next, .. } => Ok(*next),
            Self::Replay { queue, .. } => queue.front().copied().ok_or(IdSourceError::Exhausted),
        }
    }

    /// Removes the identifier `peek` would return
    pub fn pop(&mut self) -> Result<(), IdSourceError> {
        if !self.has_more() {
            return Err(IdSourceError::Exhausted);
        }
        match self {
            Self::Range { next, left, .. } => {
                *left -= 1;
                // Only wraps once the last identifier (u64::MAX) is gone.
                *next = next.wrapping_add(1);
                Ok(())
            }
            Self::Replay { queue, .. } => queue
                .pop_front()
                .map(|_| ())
                .ok_or(IdSourceError::Exhausted),
        }
    }
}
