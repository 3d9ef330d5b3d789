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

use thiserror::Error;

/// NT status codes the lock core can surface at the protocol boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NtStatus {
    Success = 0x0000_0000,
    FileLockConflict = 0xC000_0054,
    LockNotGranted = 0xC000_0055,
    RangeNotLocked = 0xC000_007E,
    Cancelled = 0xC000_0120,
}

impl NtStatus {
    /// Raw 32-bit status code as it appears on the wire.
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

/// Downlevel DOS error class/code pairs used on the legacy error channel.
pub mod dos {
    /// ERRDOS error class.
    pub const ERROR_CLASS_DOS: u8 = 0x01;
    /// ERRlock: a lock request conflicted with an existing lock.
    pub const ERROR_LOCK: u16 = 33;
    /// ERRnotlocked: the range named by an unlock was not locked.
    pub const ERROR_NOT_LOCKED: u16 = 158;
}

/// Failure statuses of the lock core.
///
/// These travel upward as plain values; nothing in the core aborts on
/// external input. `raise_lock_error`/`raise_unlock_error` convert them
/// to the request's user-visible error surface.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// Non-blocking conflict with a held lock.
    #[error("lock not granted")]
    NotGranted,
    /// Conflict reported with the stronger Windows status, per the
    /// remapping heuristics.
    #[error("file lock conflict")]
    Conflict,
    /// Unlock target absent, or the handle was closed at grant time.
    #[error("range not locked")]
    NotLocked,
    /// The wait was cancelled before the lock could be granted.
    #[error("lock wait cancelled")]
    Cancelled,
}

impl LockError {
    /// NT status equivalent of this failure.
    pub fn nt_status(&self) -> NtStatus {
        match self {
            LockError::NotGranted => NtStatus::LockNotGranted,
            LockError::Conflict => NtStatus::FileLockConflict,
            LockError::NotLocked => NtStatus::RangeNotLocked,
            LockError::Cancelled => NtStatus::Cancelled,
        }
    }
}

/// Lock operation result type.
pub type Result<T> = std::result::Result<T, LockError>;

/// Error as delivered on a request's user-visible channel: the NT status
/// (when one applies) plus the downlevel DOS class/code pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmbError {
    pub status: Option<NtStatus>,
    pub class: u8,
    pub code: u16,
}

impl SmbError {
    /// Error carrying both the NT status and its DOS fallback.
    pub fn cifs(status: NtStatus, class: u8, code: u16) -> Self {
        Self {
            status: Some(status),
            class,
            code,
        }
    }

    /// Plain DOS-level error with no NT status.
    pub fn dos(class: u8, code: u16) -> Self {
        Self {
            status: None,
            class,
            code,
        }
    }
}
