// Copyright 2025 RustSMB Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::{Deserialize, Serialize};

/// Half-open byte interval `[start, start + length)`.
///
/// SMB allows a zero-length range as a degenerate sentinel: it is a legal
/// lock but overlaps nothing, not even another zero-length range at the
/// same offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockRange {
    start: u64,
    length: u64,
}

impl LockRange {
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// Whether the two ranges share at least one byte.
    ///
    /// Endpoints are widened to `u128` so `start + length` at the top of
    /// the `u64` space cannot wrap.
    pub fn overlaps(&self, other: &LockRange) -> bool {
        if self.length == 0 || other.length == 0 {
            return false;
        }
        let self_end = self.start as u128 + self.length as u128;
        let other_end = other.start as u128 + other.length as u128;
        (self.start as u128) < other_end && (other.start as u128) < self_end
    }
}

impl std::fmt::Display for LockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.start, self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_ranges() {
        let base = LockRange::new(100, 50);

        assert!(base.overlaps(&LockRange::new(100, 50)));
        assert!(base.overlaps(&LockRange::new(120, 100)));
        assert!(base.overlaps(&LockRange::new(0, 101)));
        assert!(base.overlaps(&LockRange::new(149, 1)));
    }

    #[test]
    fn disjoint_and_touching_ranges() {
        let base = LockRange::new(100, 50);

        assert!(!base.overlaps(&LockRange::new(0, 100)));
        assert!(!base.overlaps(&LockRange::new(150, 10)));
        assert!(!base.overlaps(&LockRange::new(300, 1)));
    }

    #[test]
    fn zero_length_overlaps_nothing() {
        let empty = LockRange::new(100, 0);

        assert!(!empty.overlaps(&LockRange::new(0, 1000)));
        assert!(!LockRange::new(0, 1000).overlaps(&empty));
        assert!(!empty.overlaps(&LockRange::new(100, 0)));
    }

    #[test]
    fn endpoint_at_top_of_u64_does_not_wrap() {
        // start + length == 2^64; a wrapped endpoint of 0 would make this
        // range overlap nothing.
        let top = LockRange::new(u64::MAX - 9, 10);

        assert!(top.overlaps(&LockRange::new(u64::MAX, 1)));
        assert!(top.overlaps(&LockRange::new(0, u64::MAX)));
        assert!(!top.overlaps(&LockRange::new(0, 10)));

        let last_byte = LockRange::new(u64::MAX, 1);
        assert!(last_byte.overlaps(&LockRange::new(u64::MAX, 1)));
        assert!(!last_byte.overlaps(&LockRange::new(u64::MAX - 1, 1)));
    }

    #[test]
    fn display_shows_start_and_length() {
        assert_eq!(LockRange::new(4096, 512).to_string(), "4096+512");
    }
}
