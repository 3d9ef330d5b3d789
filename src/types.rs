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
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::range::LockRange;

/// Lock type carried by an SMB lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    /// Shared ("read") lock; coexists with other shared locks.
    Shared,
    /// Exclusive ("write") lock.
    Exclusive,
}

/// Owner tuple used by the SMB compatibility rules.
///
/// Two locks belong to the same owner only when all four components
/// match; the access check relaxes this to session and pid alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockIdentity {
    /// Open file handle the lock was taken through.
    pub handle: u64,
    /// Session the request arrived on.
    pub session: u64,
    /// Client process id from the SMB header.
    pub pid: u32,
    /// Authenticated user id.
    pub uid: u32,
}

/// How long an acquire is willing to wait on a conflicting lock.
///
/// The wire encodes this as milliseconds with two sentinel values; the
/// dispatch boundary maps them onto explicit variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Fail immediately on conflict.
    NoWait,
    /// Wait up to the given duration.
    Bounded(Duration),
    /// Wait until the blocker goes away or the request is cancelled.
    Indefinite,
}

impl WaitTimeout {
    /// Map the SMB wire sentinels: `0` means no wait, `0xFFFF_FFFF` means
    /// wait forever.
    pub fn from_smb_millis(millis: u32) -> Self {
        match millis {
            0 => WaitTimeout::NoWait,
            u32::MAX => WaitTimeout::Indefinite,
            ms => WaitTimeout::Bounded(Duration::from_millis(u64::from(ms))),
        }
    }

    pub fn is_no_wait(&self) -> bool {
        matches!(self, WaitTimeout::NoWait)
    }

    /// Absolute deadline for a bounded wait, `None` otherwise.
    ///
    /// Computed once at acquire entry; retries after a wake reuse the
    /// same deadline.
    pub(crate) fn deadline_from(&self, now: Instant) -> Option<Instant> {
        match self {
            WaitTimeout::Bounded(duration) => Some(now + *duration),
            WaitTimeout::NoWait | WaitTimeout::Indefinite => None,
        }
    }
}

/// Access wanted by a pending read or write, checked against held locks.
///
/// Models the non-empty subsets of `{READ_DATA, WRITE_DATA}`. Only the
/// pure `ReadData` form passes over shared locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredAccess {
    ReadData,
    WriteData,
    ReadWrite,
}

impl DesiredAccess {
    pub(crate) fn is_read_only(&self) -> bool {
        matches!(self, DesiredAccess::ReadData)
    }
}

/// Lifecycle of a request as seen by the lock core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Being processed by its worker thread.
    Active,
    /// Parked on a conflicting lock.
    WaitingLock,
    /// Cancelled by its owner; a parked request unwinds on wake.
    Cancelled,
}

/// Point-in-time counters for lock traffic, for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Locks granted, first try or after a wait.
    pub granted: u64,
    /// Acquires refused with a conflict or closed-handle status.
    pub denied: u64,
    /// Times a request parked on a conflicting lock.
    pub waits: u64,
    /// Waits that ran past their deadline.
    pub timeouts: u64,
    /// Waits abandoned because the request was cancelled.
    pub cancellations: u64,
    /// Locks removed by explicit unlock.
    pub releases: u64,
    /// Handle-close sweeps over a node's lock list.
    pub handle_sweeps: u64,
}

/// One parked waiter in a conflict-graph snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedLockInfo {
    pub id: Uuid,
    pub range: LockRange,
    pub lock_type: LockType,
    pub identity: LockIdentity,
}

/// One granted lock and everything parked on it.
///
/// The snapshot is advisory: waiters come and go the moment the list
/// gate is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockGraphEntry {
    pub id: Uuid,
    pub range: LockRange,
    pub lock_type: LockType,
    pub identity: LockIdentity,
    pub blocked: Vec<BlockedLockInfo>,
}
