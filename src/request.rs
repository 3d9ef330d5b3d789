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

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::SmbError;
use crate::file::FileHandle;
use crate::record::LockRecord;
use crate::types::{LockIdentity, RequestState};

#[derive(Debug)]
struct RequestSync {
    state: RequestState,
    /// Granted record this request is parked on while waiting.
    awaiting: Option<Arc<LockRecord>>,
}

/// One in-flight request, as the lock core sees it.
///
/// The full server request carries far more; the core needs the
/// credentials that make up a lock identity, the cancellable state, and
/// the user-visible error channel.
#[derive(Debug)]
pub struct ServerRequest {
    session: u64,
    pid: u32,
    uid: u32,
    handle: Arc<FileHandle>,
    sync: Mutex<RequestSync>,
    error: Mutex<Option<SmbError>>,
}

impl ServerRequest {
    pub fn new(session: u64, pid: u32, uid: u32, handle: Arc<FileHandle>) -> Arc<Self> {
        Arc::new(Self {
            session,
            pid,
            uid,
            handle,
            sync: Mutex::new(RequestSync {
                state: RequestState::Active,
                awaiting: None,
            }),
            error: Mutex::new(None),
        })
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Handle the request's lock and unlock operations refer to.
    pub fn handle(&self) -> &Arc<FileHandle> {
        &self.handle
    }

    /// Identity tuple for locks taken through `file` on behalf of this
    /// request.
    pub fn lock_identity(&self, file: &FileHandle) -> LockIdentity {
        LockIdentity {
            handle: file.id(),
            session: self.session,
            pid: self.pid,
            uid: self.uid,
        }
    }

    pub fn state(&self) -> RequestState {
        self.sync.lock().state
    }

    /// Cancel the request. A request parked on a lock is woken so the
    /// wait path can observe the cancellation and unwind.
    pub fn cancel(&self) {
        let awaiting = {
            let mut sync = self.sync.lock();
            sync.state = RequestState::Cancelled;
            sync.awaiting.clone()
        };
        if let Some(blocker) = awaiting {
            blocker.wake_all();
        }
    }

    /// Transition into the waiting state before parking on `blocker`.
    /// Refused (returns false) when the request is already cancelled.
    pub(crate) fn begin_lock_wait(&self, blocker: &Arc<LockRecord>) -> bool {
        let mut sync = self.sync.lock();
        match sync.state {
            RequestState::Active => {
                sync.state = RequestState::WaitingLock;
                sync.awaiting = Some(blocker.clone());
                true
            }
            RequestState::Cancelled => false,
            RequestState::WaitingLock => {
                debug_assert!(false, "lock wait entered while already waiting");
                false
            }
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.sync.lock().state == RequestState::Cancelled
    }

    /// Leave the waiting state after a wake. Returns true when the
    /// request was cancelled while parked; otherwise it goes back to
    /// active.
    pub(crate) fn finish_lock_wait(&self) -> bool {
        let mut sync = self.sync.lock();
        sync.awaiting = None;
        if sync.state == RequestState::Cancelled {
            true
        } else {
            sync.state = RequestState::Active;
            false
        }
    }

    /// Latest error raised on the request's user-visible channel.
    pub fn take_error(&self) -> Option<SmbError> {
        self.error.lock().take()
    }

    pub(crate) fn raise_error(&self, error: SmbError) {
        *self.error.lock() = Some(error);
    }
}
