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

//! Byte-range lock management for SMB file nodes.
//!
//! Arbitrates overlapping shared/exclusive range locks on open files,
//! parks conflicting requests until they can proceed or time out, and
//! tears lock state down on unlock and handle close.

pub mod error;
pub mod file;
pub mod manager;
pub mod range;
pub mod record;
pub mod request;
mod rules;
pub mod types;

pub use error::{LockError, NtStatus, Result, SmbError};
pub use file::{FileHandle, FileNode};
pub use manager::RangeLockManager;
pub use range::LockRange;
pub use record::{LockRecord, RecordState};
pub use request::ServerRequest;
pub use types::{
    BlockedLockInfo, DesiredAccess, LockGraphEntry, LockIdentity, LockStats, LockType, RequestState, WaitTimeout,
};
