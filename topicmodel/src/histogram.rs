//Copyright 2024 Felix Engl
//
//Licensed under the Apache License, Version 2.0 (the "License");
//you may not use this file except in compliance with the License.
//You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
//Unless required by applicable law or agreed to in writing, software
//distributed under the License is distributed on an "AS IS" BASIS,
//WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//See the License for the specific language governing permissions and
//limitations under the License.

//! `OrderedSparseHistogram` — a sparse topic → count map kept in
//! count-descending order, so that the sampler can scan high-mass topics
//! first and stop early.
//!
//! Ported from `common/ordered_sparse_topic_histogram.py`: a contiguous
//! `Vec` of `(topic, count)` pairs, mutated in place with a bubble move
//! toward the correct end rather than a full re-sort.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// One non-zero entry of the histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonZero {
    pub topic: usize,
    pub count: u32,
}

/// A sparse, count-descending topic histogram over `[0, num_topics)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedSparseHistogram {
    non_zeros: Vec<NonZero>,
    num_topics: usize,
}

impl OrderedSparseHistogram {
    pub fn new(num_topics: usize) -> Self {
        Self {
            non_zeros: Vec::new(),
            num_topics,
        }
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    /// Number of distinct topics with a positive count.
    pub fn size(&self) -> usize {
        self.non_zeros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.non_zeros.is_empty()
    }

    /// Current count for `topic`, or 0 if absent.
    pub fn count(&self, topic: usize) -> u32 {
        self.non_zeros
            .iter()
            .find(|nz| nz.topic == topic)
            .map(|nz| nz.count)
            .unwrap_or(0)
    }

    /// Entries in count-descending order.
    pub fn iter(&self) -> impl Iterator<Item = NonZero> + '_ {
        self.non_zeros.iter().copied()
    }

    /// Adds `c` to `topic`'s count (creating the entry if absent), restores
    /// the count-descending invariant by bubbling the entry toward the
    /// front, and returns the updated count.
    pub fn increase(&mut self, topic: usize, c: u32) -> u32 {
        assert!(topic < self.num_topics, "topic {topic} out of range");
        assert!(c > 0, "increase requires a positive count");

        let mut index = match self.non_zeros.iter().position(|nz| nz.topic == topic) {
            Some(index) => {
                self.non_zeros[index].count += c;
                index
            }
            None => {
                self.non_zeros.push(NonZero { topic, count: c });
                self.non_zeros.len() - 1
            }
        };

        while index > 0 && self.non_zeros[index].count > self.non_zeros[index - 1].count {
            self.non_zeros.swap(index, index - 1);
            index -= 1;
        }
        self.non_zeros[index].count
    }

    /// Subtracts `c` from `topic`'s (pre-existing) count, restores the
    /// count-descending invariant by bubbling the entry toward the back,
    /// removes the entry entirely if it reaches 0, and returns the updated
    /// count (possibly 0).
    ///
    /// # Panics
    /// Panics if `topic` has no entry, or if `c` exceeds its current count —
    /// both are programming errors, not recoverable conditions.
    pub fn decrease(&mut self, topic: usize, c: u32) -> u32 {
        assert!(c > 0, "decrease requires a positive count");
        let mut index = self
            .non_zeros
            .iter()
            .position(|nz| nz.topic == topic)
            .unwrap_or_else(|| panic!("decrease on absent topic {topic}"));

        let entry = &mut self.non_zeros[index];
        assert!(
            entry.count >= c,
            "decrease({c}) on topic {topic} would underflow count {}",
            entry.count
        );
        entry.count -= c;

        while index + 1 < self.non_zeros.len()
            && self.non_zeros[index].count < self.non_zeros[index + 1].count
        {
            self.non_zeros.swap(index, index + 1);
            index += 1;
        }

        if self.non_zeros[index].count == 0 {
            self.non_zeros.remove(index);
            0
        } else {
            self.non_zeros[index].count
        }
    }

    /// Flat encoding: `(u32 topic, u32 count)` pairs, in stored
    /// (count-descending) order. The pair count is implied by the blob
    /// length, matching the `SparseTopicHistogram` persisted format (whose
    /// own length comes from the enclosing RecordIO record).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.non_zeros.len() * 8);
        for nz in &self.non_zeros {
            out.extend_from_slice(&(nz.topic as u32).to_be_bytes());
            out.extend_from_slice(&nz.count.to_be_bytes());
        }
        out
    }

    pub fn parse(num_topics: usize, blob: &[u8]) -> Result<Self, ModelError> {
        if blob.len() % 8 != 0 {
            return Err(ModelError::MalformedSparseHistogram(blob.len()));
        }
        let count = blob.len() / 8;
        let mut non_zeros = Vec::with_capacity(count);
        for i in 0..count {
            let base = i * 8;
            let topic = u32::from_be_bytes(blob[base..base + 4].try_into().unwrap()) as usize;
            let count = u32::from_be_bytes(blob[base + 4..base + 8].try_into().unwrap());
            non_zeros.push(NonZero { topic, count });
        }
        Ok(Self {
            non_zeros,
            num_topics,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn increment_ordering() {
        let mut hist = OrderedSparseHistogram::new(20);
        for i in 0..10u32 {
            hist.increase(i as usize, i + 1);
        }
        assert_eq!(hist.size(), 10);
        let entries: Vec<_> = hist.iter().collect();
        assert_eq!(entries.first().unwrap().topic, 9);
        assert_eq!(entries.first().unwrap().count, 10);
        assert_eq!(entries.last().unwrap().topic, 0);
        assert_eq!(entries.last().unwrap().count, 1);
        assert!(entries.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn decrement_to_zero_removes_entry() {
        let mut hist = OrderedSparseHistogram::new(20);
        for i in 0..10u32 {
            hist.increase(i as usize, i + 1);
        }
        let updated = hist.decrease(6, 7);
        assert_eq!(updated, 0);
        assert_eq!(hist.size(), 9);
        assert_eq!(hist.count(6), 0);
        let entries: Vec<_> = hist.iter().collect();
        assert!(entries.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn round_trip_serialize() {
        let mut hist = OrderedSparseHistogram::new(5);
        hist.increase(3, 4);
        hist.increase(1, 9);
        hist.increase(2, 9);
        let blob = hist.serialize();
        let parsed = OrderedSparseHistogram::parse(5, &blob).unwrap();
        assert_eq!(hist, parsed);
    }

    #[test]
    #[should_panic]
    fn decrease_absent_topic_panics() {
        let mut hist = OrderedSparseHistogram::new(5);
        hist.decrease(0, 1);
    }

    #[test]
    fn bubble_motion_keeps_order_under_repeated_updates() {
        let mut hist = OrderedSparseHistogram::new(8);
        let ops: &[(usize, i64)] = &[
            (0, 5),
            (1, 3),
            (2, 7),
            (0, -2),
            (3, 10),
            (1, 4),
            (2, -6),
            (4, 1),
        ];
        for &(topic, delta) in ops {
            if delta > 0 {
                hist.increase(topic, delta as u32);
            } else {
                hist.decrease(topic, (-delta) as u32);
            }
            let entries: Vec<_> = hist.iter().collect();
            assert!(entries.windows(2).all(|w| w[0].count >= w[1].count));
        }
    }
}
