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

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::record::LockRecord;

/// Start offset of the most recent failed lock attempt on a handle.
///
/// Windows clients poll a conflicted offset; the conflict remap answers
/// the second and later attempts at the same offset with the stronger
/// status.
#[derive(Debug, Default)]
struct LastFailedOffset {
    pos: u64,
    valid: bool,
}

/// One open of a file, as the lock core sees it.
#[derive(Debug)]
pub struct FileHandle {
    id: u64,
    node: Arc<FileNode>,
    open: AtomicBool,
    last_failed: Mutex<LastFailedOffset>,
}

impl FileHandle {
    pub fn new(id: u64, node: Arc<FileNode>) -> Arc<Self> {
        Arc::new(Self {
            id,
            node,
            open: AtomicBool::new(true),
            last_failed: Mutex::new(LastFailedOffset::default()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn node(&self) -> &Arc<FileNode> {
        &self.node
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the handle closed. Locks taken through it are swept
    /// separately by `RangeLockManager::destroy_by_handle`.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Remember a failed lock attempt at `start`.
    pub(crate) fn note_lock_failure(&self, start: u64) {
        let mut marker = self.last_failed.lock();
        marker.pos = start;
        marker.valid = true;
    }

    /// Whether the previous failed attempt on this handle started at
    /// `start`.
    pub(crate) fn failed_before_at(&self, start: u64) -> bool {
        let marker = self.last_failed.lock();
        marker.valid && marker.pos == start
    }
}

/// Server-side object for one file; owner of the byte-range lock list.
///
/// The list holds granted records only, in insertion order. Grant,
/// unlock and handle-close sweeps take the gate as writer; access checks
/// and snapshots take it as reader.
#[derive(Debug)]
pub struct FileNode {
    path: Arc<str>,
    pub(crate) lock_list: RwLock<Vec<Arc<LockRecord>>>,
}

impl FileNode {
    pub fn new(path: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            lock_list: RwLock::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of granted locks currently attached to the node.
    pub fn lock_count(&self) -> usize {
        self.lock_list.read().len()
    }
}
