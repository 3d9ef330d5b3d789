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

//! SMB byte-range lock rules.
//!
//! Pure verdict functions over a file's lock list. Callers hold the list
//! gate: writer for grant and unlock matching, reader for access checks.

use std::sync::Arc;

use crate::file::FileHandle;
use crate::range::LockRange;
use crate::record::LockRecord;
use crate::types::{DesiredAccess, LockIdentity, LockType};

/// Verdict of the grant rule for one candidate lock.
pub(crate) enum GrantVerdict {
    /// No conflicting lock; the candidate may be installed.
    Grant,
    /// The candidate conflicts with this granted lock.
    Conflict(Arc<LockRecord>),
    /// The handle was closed before the candidate could be granted.
    HandleClosed,
}

/// Grant rule.
///
/// Overlapping shared locks coexist, whoever owns them. A shared
/// candidate may also overlap an exclusive lock held by the exact same
/// owner. An exclusive candidate conflicts with every overlapping lock,
/// including its own owner's.
pub(crate) fn evaluate_grant(
    list: &[Arc<LockRecord>],
    file: &FileHandle,
    candidate: &LockRecord,
) -> GrantVerdict {
    // The open check must happen under the list gate so a concurrent
    // close cannot race the grant.
    if !file.is_open() {
        return GrantVerdict::HandleClosed;
    }

    for held in list {
        if !held.range().overlaps(&candidate.range()) {
            continue;
        }

        if held.lock_type() == LockType::Shared && candidate.lock_type() == LockType::Shared {
            continue;
        }

        // Shared over the owner's own exclusive lock is tolerated; the
        // reverse never is.
        if candidate.lock_type() == LockType::Shared
            && held.lock_type() == LockType::Exclusive
            && held.identity() == candidate.identity()
        {
            continue;
        }

        return GrantVerdict::Conflict(held.clone());
    }

    GrantVerdict::Grant
}

/// Unlock-match rule: an unlock names exactly one record, by exact
/// start, length and identity. Partial and overlapping unlocks never
/// match.
pub(crate) fn match_unlock(
    list: &[Arc<LockRecord>],
    identity: &LockIdentity,
    range: &LockRange,
) -> Option<usize> {
    list.iter()
        .position(|held| held.range() == *range && held.identity() == *identity)
}

/// Access rule for pending reads and writes.
///
/// Reads pass over shared locks; reads and writes both pass over an
/// exclusive lock held by the same session and pid, whichever handle it
/// was taken through.
pub(crate) fn access_allowed(
    list: &[Arc<LockRecord>],
    range: &LockRange,
    desired: DesiredAccess,
    session: u64,
    pid: u32,
) -> bool {
    for held in list {
        if !held.range().overlaps(range) {
            continue;
        }

        if held.lock_type() == LockType::Shared && desired.is_read_only() {
            continue;
        }

        if held.lock_type() == LockType::Exclusive
            && held.identity().session == session
            && held.identity().pid == pid
        {
            continue;
        }

        return false;
    }

    true
}
