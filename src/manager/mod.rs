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

//! Grant coordinator: the acquire/release paths, the blocking wait
//! protocol, bulk destroy on handle close, and the error surface.

use parking_lot::RwLockWriteGuard;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{dos, LockError, Result, SmbError};
use crate::file::{FileHandle, FileNode};
use crate::range::LockRange;
use crate::record::{LockRecord, ParkOutcome, RecordState};
use crate::request::ServerRequest;
use crate::rules::{self, GrantVerdict};
use crate::types::{DesiredAccess, LockGraphEntry, LockStats, LockType, WaitTimeout};


/// Legacy Windows heuristic: an ungranted lock starting at or above this
/// offset reports FILE_LOCK_CONFLICT, unless bit 63 of the start is set.
const CONFLICT_REMAP_FLOOR: u64 = 0xEF00_0000;

#[derive(Debug, Default)]
struct Counters {
    granted: AtomicU64,
    denied: AtomicU64,
    waits: AtomicU64,
    timeouts: AtomicU64,
    cancellations: AtomicU64,
    releases: AtomicU64,
    handle_sweeps: AtomicU64,
}

/// Outcome of one stay in the wait protocol.
enum WaitOutcome {
    /// Woken by a release, a cancel racing the wake, or spuriously; the
    /// caller re-runs the grant rules against the current list.
    Woken,
    /// The deadline passed while parked.
    TimedOut,
    /// The request was cancelled.
    Cancelled,
}

/// Byte-range lock manager for SMB file nodes.
///
/// Stateless apart from traffic counters: the locks themselves live on
/// the file nodes, so one manager serves every node.
#[derive(Debug, Default)]
pub struct RangeLockManager {
    counters: Counters,
}

impl RangeLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a byte-range lock on `file` for `sr`.
    ///
    /// A conflicting request fails immediately with `NoWait`; otherwise
    /// it parks on the conflicting lock and re-runs the grant rules each
    /// time that lock is released, until granted, past its deadline, or
    /// cancelled. Callers must not hold the session gate when a wait is
    /// possible: a concurrent close on the same session has to be able
    /// to run so it can cancel this waiter.
    pub fn acquire(
        &self,
        sr: &ServerRequest,
        file: &Arc<FileHandle>,
        start: u64,
        length: u64,
        lock_type: LockType,
        timeout: WaitTimeout,
    ) -> Result<()> {
        let node = file.node().clone();
        let record = LockRecord::new(
            sr.lock_identity(file),
            LockRange::new(start, length),
            lock_type,
            &timeout,
        );

        let mut list = node.lock_list.write();
        let mut result: Result<()> = Ok(());
        loop {
            match rules::evaluate_grant(&list, file, &record) {
                GrantVerdict::Grant => break,
                GrantVerdict::HandleClosed => {
                    result = Err(LockError::NotLocked);
                    break;
                }
                GrantVerdict::Conflict(blocker) => {
                    if timeout.is_no_wait() {
                        result = Err(LockError::NotGranted);
                        break;
                    }
                    self.counters.waits.fetch_add(1, Ordering::Relaxed);
                    let (regained, outcome) = self.wait_for_release(sr, &node, &record, &blocker, list);
                    list = regained;
                    match outcome {
                        WaitOutcome::Woken => {
                            record.clear_blocked_by();
                            continue;
                        }
                        WaitOutcome::TimedOut => {
                            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                            // A deadline expiry is still an ungranted
                            // conflict; the remap below upgrades it
                            // because the caller asked to wait.
                            result = Err(LockError::NotGranted);
                            break;
                        }
                        WaitOutcome::Cancelled => {
                            result = Err(LockError::Cancelled);
                            break;
                        }
                    }
                }
            }
        }

        record.clear_blocked_by();

        match result {
            Ok(()) => {
                record.set_granted();
                list.push(record);
                drop(list);
                self.counters.granted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    file = file.id(),
                    start,
                    length,
                    lock_type = ?lock_type,
                    "byte-range lock granted"
                );
                Ok(())
            }
            Err(error) => {
                let error = if error == LockError::NotGranted {
                    self.remap_conflict(file, start, &timeout)
                } else {
                    error
                };
                file.note_lock_failure(start);
                drop(list);
                if error == LockError::Cancelled {
                    self.counters.cancellations.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.denied.fetch_add(1, Ordering::Relaxed);
                }
                debug!(
                    file = file.id(),
                    start,
                    length,
                    lock_type = ?lock_type,
                    %error,
                    "byte-range lock refused"
                );
                Err(error)
            }
        }
    }

    /// Remove the lock that exactly matches `(start, length)` and the
    /// request's identity, then run the release protocol so parked
    /// waiters retry.
    pub fn release(&self, sr: &ServerRequest, node: &FileNode, start: u64, length: u64) -> Result<()> {
        let range = LockRange::new(start, length);
        let identity = sr.lock_identity(sr.handle());

        let removed = {
            let mut list = node.lock_list.write();
            let Some(index) = rules::match_unlock(&list, &identity, &range) else {
                return Err(LockError::NotLocked);
            };
            list.remove(index)
        };

        // Destroy outside the gate: waiters re-take it while waking.
        removed.destroy();
        self.counters.releases.fetch_add(1, Ordering::Relaxed);
        debug!(file = identity.handle, start, length, "byte-range lock released");
        Ok(())
    }

    /// Check whether a pending read or write on `(start, length)` is
    /// allowed under the node's current locks. Pure: repeated calls with
    /// no intervening mutation return identical results.
    pub fn check_access(
        &self,
        sr: &ServerRequest,
        node: &FileNode,
        start: u64,
        length: u64,
        desired: DesiredAccess,
    ) -> Result<()> {
        let range = LockRange::new(start, length);
        let list = node.lock_list.read();
        if rules::access_allowed(&list, &range, desired, sr.session(), sr.pid()) {
            Ok(())
        } else {
            Err(LockError::Conflict)
        }
    }

    /// Destroy every lock taken through `file` when the handle closes.
    ///
    /// Records are detached under the gate into a scratch list and
    /// destroyed outside it: destruction blocks on parked waiters, and a
    /// waking waiter needs the gate back. Detaching first also keeps the
    /// sweep stable against concurrent list mutation.
    pub fn destroy_by_handle(&self, node: &FileNode, file: &FileHandle) {
        let mut detached = Vec::new();
        {
            let mut list = node.lock_list.write();
            let mut index = 0;
            while index < list.len() {
                if list[index].identity().handle == file.id() {
                    detached.push(list.remove(index));
                } else {
                    index += 1;
                }
            }
        }

        if !detached.is_empty() {
            debug!(
                file = file.id(),
                count = detached.len(),
                "destroying byte-range locks for closed handle"
            );
        }
        for record in detached {
            record.destroy();
        }
        self.counters.handle_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    /// Translate a lock failure onto the request's user-visible error
    /// channel.
    pub fn raise_lock_error(&self, sr: &ServerRequest, error: LockError) {
        let raised = match error {
            // No settled NT-level mapping for a cancelled wait; raise the
            // bare DOS lock error.
            LockError::Cancelled => SmbError::dos(dos::ERROR_CLASS_DOS, dos::ERROR_LOCK),
            LockError::Conflict | LockError::NotGranted | LockError::NotLocked => {
                SmbError::cifs(error.nt_status(), dos::ERROR_CLASS_DOS, dos::ERROR_LOCK)
            }
        };
        sr.raise_error(raised);
    }

    /// Translate an unlock failure onto the request's user-visible error
    /// channel.
    pub fn raise_unlock_error(&self, sr: &ServerRequest, error: LockError) {
        debug_assert!(
            error == LockError::NotLocked,
            "unexpected unlock status {error:?}"
        );
        let raised = match error {
            LockError::NotLocked => {
                SmbError::cifs(error.nt_status(), dos::ERROR_CLASS_DOS, dos::ERROR_NOT_LOCKED)
            }
            other => SmbError::cifs(other.nt_status(), dos::ERROR_CLASS_DOS, dos::ERROR_LOCK),
        };
        sr.raise_error(raised);
    }

    /// Counters snapshot.
    pub fn stats(&self) -> LockStats {
        LockStats {
            granted: self.counters.granted.load(Ordering::Relaxed),
            denied: self.counters.denied.load(Ordering::Relaxed),
            waits: self.counters.waits.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            cancellations: self.counters.cancellations.load(Ordering::Relaxed),
            releases: self.counters.releases.load(Ordering::Relaxed),
            handle_sweeps: self.counters.handle_sweeps.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of the node's conflict graph: every granted lock and the
    /// waiters parked on it.
    pub fn conflict_graph(&self, node: &FileNode) -> Vec<LockGraphEntry> {
        let list = node.lock_list.read();
        list.iter()
            .map(|held| LockGraphEntry {
                id: held.id(),
                range: held.range(),
                lock_type: held.lock_type(),
                identity: held.identity(),
                blocked: held.blocked_snapshot(),
            })
            .collect()
    }

    /// Windows conflict remapping for an ungranted lock.
    ///
    /// The stronger FILE_LOCK_CONFLICT status applies when the caller
    /// was willing to wait, when the start sits in the legacy high-offset
    /// window, or when the handle's previous failed attempt started at
    /// the same offset.
    fn remap_conflict(&self, file: &FileHandle, start: u64, timeout: &WaitTimeout) -> LockError {
        if !timeout.is_no_wait() {
            return LockError::Conflict;
        }
        if start >= CONFLICT_REMAP_FLOOR && start & (1 << 63) == 0 {
            return LockError::Conflict;
        }
        if file.failed_before_at(start) {
            return LockError::Conflict;
        }
        LockError::NotGranted
    }

    /// Park `pending` on `blocker` until the blocker is released, the
    /// deadline passes, or the request is cancelled.
    ///
    /// Entered with the list gate held as writer; the gate is dropped
    /// while parked and re-acquired before returning, whatever the
    /// outcome.
    fn wait_for_release<'a>(
        &self,
        sr: &ServerRequest,
        node: &'a FileNode,
        pending: &Arc<LockRecord>,
        blocker: &Arc<LockRecord>,
        list: RwLockWriteGuard<'a, Vec<Arc<LockRecord>>>,
    ) -> (RwLockWriteGuard<'a, Vec<Arc<LockRecord>>>, WaitOutcome) {
        debug_assert_eq!(pending.state(), RecordState::Pending);
        debug_assert_eq!(blocker.state(), RecordState::Granted);

        if !sr.begin_lock_wait(blocker) {
            // Cancelled before the wait could start.
            return (list, WaitOutcome::Cancelled);
        }

        let parked = LockRecord::park_dependent(blocker, pending, move || drop(list), || sr.is_cancelled());

        let list = node.lock_list.write();
        let outcome = if sr.finish_lock_wait() {
            WaitOutcome::Cancelled
        } else {
            match parked {
                ParkOutcome::Woken => WaitOutcome::Woken,
                ParkOutcome::TimedOut => WaitOutcome::TimedOut,
            }
        };
        (list, outcome)
    }
}
