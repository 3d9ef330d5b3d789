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

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use uuid::Uuid;

use crate::range::LockRange;
use crate::types::{BlockedLockInfo, LockIdentity, LockType, WaitTimeout};

/// Lifecycle of a lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Created, not yet in a file's lock list.
    Pending,
    /// Installed in a file's lock list.
    Granted,
    /// Detached from the list and draining its dependents before the
    /// record is freed.
    Releasing,
}

#[derive(Debug)]
struct RecordSync {
    state: RecordState,
    /// Pending locks parked on this record. Membership here is the
    /// authoritative blocked-on relationship; `blocked_by` is not.
    dependents: HashMap<Uuid, Arc<LockRecord>>,
}

/// Outcome of parking on a conflicting lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParkOutcome {
    /// Woken by a release, a cancel, or spuriously; the caller re-runs
    /// the grant rules.
    Woken,
    /// The deadline passed while parked.
    TimedOut,
}

/// One granted or pending byte-range lock.
///
/// Identity, range, type and deadline are fixed at creation; only the
/// state and the dependent set change afterwards.
#[derive(Debug)]
pub struct LockRecord {
    id: Uuid,
    range: LockRange,
    lock_type: LockType,
    identity: LockIdentity,
    /// Absolute wait deadline; `None` waits indefinitely.
    deadline: Option<Instant>,
    sync: Mutex<RecordSync>,
    /// Parked waiters sleep here until the record is released or their
    /// request is cancelled.
    released: Condvar,
    /// The destroyer sleeps here until `dependents` drains.
    drained: Condvar,
    /// Diagnostic back-pointer to the blocker; may be stale after a wake
    /// and must never be used for correctness decisions.
    blocked_by: Mutex<Weak<LockRecord>>,
}

impl LockRecord {
    pub(crate) fn new(
        identity: LockIdentity,
        range: LockRange,
        lock_type: LockType,
        timeout: &WaitTimeout,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            range,
            lock_type,
            identity,
            deadline: timeout.deadline_from(Instant::now()),
            sync: Mutex::new(RecordSync {
                state: RecordState::Pending,
                dependents: HashMap::new(),
            }),
            released: Condvar::new(),
            drained: Condvar::new(),
            blocked_by: Mutex::new(Weak::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn range(&self) -> LockRange {
        self.range
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn identity(&self) -> LockIdentity {
        self.identity
    }

    pub fn state(&self) -> RecordState {
        self.sync.lock().state
    }

    pub(crate) fn set_granted(&self) {
        self.sync.lock().state = RecordState::Granted;
    }

    /// The granted record this one is parked on, if any and still alive.
    pub fn blocked_by(&self) -> Option<Arc<LockRecord>> {
        self.blocked_by.lock().upgrade()
    }

    pub(crate) fn clear_blocked_by(&self) {
        *self.blocked_by.lock() = Weak::new();
    }

    /// Wake every thread parked on this record without releasing it.
    /// Used by request cancellation; the woken waiters decide for
    /// themselves whether they are cancelled.
    pub(crate) fn wake_all(&self) {
        let _sync = self.sync.lock();
        self.released.notify_all();
    }

    /// Record the dependency of `pending` on `blocker`, drop the
    /// caller's list gate, and park until woken or past `pending`'s
    /// deadline.
    ///
    /// `unlock_list` runs after the dependency is visible, so the set of
    /// granted locks cannot change in between. `cancelled` is re-checked
    /// under the record mutex before sleeping: a cancel that lands
    /// between the request-state transition and the park is observed
    /// here, never missed.
    pub(crate) fn park_dependent(
        blocker: &Arc<Self>,
        pending: &Arc<LockRecord>,
        unlock_list: impl FnOnce(),
        cancelled: impl Fn() -> bool,
    ) -> ParkOutcome {
        let mut sync = blocker.sync.lock();
        *pending.blocked_by.lock() = Arc::downgrade(blocker);
        sync.dependents.insert(pending.id, pending.clone());
        unlock_list();

        let mut outcome = ParkOutcome::Woken;
        if !cancelled() {
            match pending.deadline {
                None => blocker.released.wait(&mut sync),
                Some(deadline) => {
                    if blocker.released.wait_until(&mut sync, deadline).timed_out() {
                        outcome = ParkOutcome::TimedOut;
                    }
                }
            }
        }

        sync.dependents.remove(&pending.id);
        blocker.drained.notify_all();
        outcome
    }

    /// Release protocol: wake every parked waiter, then wait for each to
    /// remove itself from the dependent set before the record is freed.
    ///
    /// Callers detach the record from the file's lock list first and must
    /// not hold the list gate here; waking waiters re-take it.
    pub(crate) fn destroy(&self) {
        let mut sync = self.sync.lock();
        sync.state = RecordState::Releasing;
        self.released.notify_all();
        while !sync.dependents.is_empty() {
            self.drained.wait(&mut sync);
        }
    }

    /// Snapshot of the waiters currently parked on this record.
    pub fn blocked_snapshot(&self) -> Vec<BlockedLockInfo> {
        let sync = self.sync.lock();
        sync.dependents
            .values()
            .map(|pending| BlockedLockInfo {
                id: pending.id,
                range: pending.range,
                lock_type: pending.lock_type,
                identity: pending.identity,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn identity(handle: u64) -> LockIdentity {
        LockIdentity {
            handle,
            session: 7,
            pid: 11,
            uid: 13,
        }
    }

    #[test]
    fn new_records_are_pending_and_unblocked() {
        let record = LockRecord::new(
            identity(1),
            LockRange::new(0, 64),
            LockType::Exclusive,
            &WaitTimeout::NoWait,
        );

        assert_eq!(record.state(), RecordState::Pending);
        assert!(record.blocked_by().is_none());
        assert!(record.blocked_snapshot().is_empty());
    }

    #[test]
    fn destroy_without_dependents_returns_immediately() {
        let record = LockRecord::new(
            identity(1),
            LockRange::new(0, 64),
            LockType::Exclusive,
            &WaitTimeout::NoWait,
        );
        record.set_granted();
        record.destroy();
        assert_eq!(record.state(), RecordState::Releasing);
    }

    #[test]
    fn destroy_waits_for_parked_dependents() {
        let blocker = LockRecord::new(
            identity(1),
            LockRange::new(0, 64),
            LockType::Exclusive,
            &WaitTimeout::NoWait,
        );
        blocker.set_granted();
        let pending = LockRecord::new(
            identity(2),
            LockRange::new(0, 64),
            LockType::Exclusive,
            &WaitTimeout::Indefinite,
        );

        let waiter = {
            let blocker = blocker.clone();
            let pending = pending.clone();
            thread::spawn(move || LockRecord::park_dependent(&blocker, &pending, || {}, || false))
        };

        // Wait for the dependency to become visible before tearing the
        // blocker down.
        let mut parked = Vec::new();
        for _ in 0..200 {
            parked = blocker.blocked_snapshot();
            if !parked.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].id, pending.id());
        assert_eq!(pending.blocked_by().unwrap().id(), blocker.id());

        blocker.destroy();
        assert!(blocker.blocked_snapshot().is_empty());
        assert_eq!(waiter.join().unwrap(), ParkOutcome::Woken);
    }

    #[test]
    fn park_respects_pre_checked_cancellation() {
        let blocker = LockRecord::new(
            identity(1),
            LockRange::new(0, 64),
            LockType::Exclusive,
            &WaitTimeout::NoWait,
        );
        blocker.set_granted();
        let pending = LockRecord::new(
            identity(2),
            LockRange::new(0, 64),
            LockType::Exclusive,
            &WaitTimeout::Indefinite,
        );

        // An already-cancelled request never sleeps.
        let outcome = LockRecord::park_dependent(&blocker, &pending, || {}, || true);
        assert_eq!(outcome, ParkOutcome::Woken);
        assert!(blocker.blocked_snapshot().is_empty());
    }
}
