//! Advisory session locking with crash recovery
//!
//! One lock file per session directory keeps two `workflow` processes from
//! transitioning the same session at once. The lock is advisory: it
//! coordinates cooperating processes and is not a security boundary.

use camino::{Utf8Path, Utf8PathBuf};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default age threshold for considering a lock stale (in seconds)
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 900;

const LOCK_FILE_NAME: &str = ".lock";
const MAX_ACQUIRE_ATTEMPTS: u32 = 3;
const MAX_READ_RETRIES: u32 = 3;
const READ_RETRY_DELAY_MS: u64 = 10;

/// Lock information stored in the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Process ID that created the lock
    pub pid: u32,
    /// Timestamp when the lock was created (seconds since UNIX epoch)
    pub created_at: u64,
    /// Session being locked
    pub session_id: String,
    /// Version of the tool that created the lock
    pub tool_version: String,
}

/// Lock errors for session locking operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "Session '{session_id}' is busy (PID {pid}, lock taken {created_ago} ago)"
    )]
    ConcurrentExecution {
        session_id: String,
        pid: u32,
        created_ago: String,
    },

    #[error(
        "Stale lock detected for session '{session_id}' (PID {pid}, age {age_secs}s). Use --force to override"
    )]
    StaleLock {
        session_id: String,
        pid: u32,
        age_secs: u64,
    },

    #[error("Lock file is corrupted or invalid: {reason}")]
    CorruptedLock { reason: String },

    #[error("Failed to acquire lock: {reason}")]
    AcquisitionFailed { reason: String },

    #[error("Failed to release lock: {reason}")]
    ReleaseFailed { reason: String },

    #[error("IO error during lock operation: {0}")]
    Io(#[from] io::Error),
}

impl LockError {
    /// True when another live process holds the session.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::ConcurrentExecution { .. })
    }
}

/// Exclusive lock over one session directory, released on drop.
pub struct SessionLock {
    lock_path: Utf8PathBuf,
    _fd_lock: Option<Box<RwLock<fs::File>>>,
    info: LockInfo,
}

impl SessionLock {
    /// Attempt to acquire the lock for `session_dir`.
    ///
    /// Uses `create_new` so two processes can never both create the file.
    /// An existing lock is overridden only when its holder is gone and either
    /// the TTL has elapsed or `force` is set.
    pub fn acquire(
        session_dir: &Utf8Path,
        session_id: &str,
        force: bool,
        ttl_seconds: Option<u64>,
    ) -> Result<Self, LockError> {
        fs::create_dir_all(session_dir).map_err(|e| LockError::AcquisitionFailed {
            reason: format!("Failed to create session directory {session_dir}: {e}"),
        })?;

        let lock_path = Self::lock_path(session_dir);
        let ttl = ttl_seconds.unwrap_or(DEFAULT_STALE_THRESHOLD_SECS);

        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            let info = LockInfo {
                pid: process::id(),
                created_at: now_secs(),
                session_id: session_id.to_string(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
            };

            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
            {
                Ok(file) => return Self::finalize(lock_path, file, info),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    Self::check_existing_lock(&lock_path, session_id, force, ttl)?;
                    Self::remove_stale_lock(&lock_path, session_id)?;
                    if attempt + 1 < MAX_ACQUIRE_ATTEMPTS {
                        // Deterministic jitter so racing processes do not retry in lockstep
                        let jitter = u64::from(process::id() % 7);
                        std::thread::sleep(Duration::from_millis(
                            (10u64 << attempt).saturating_add(jitter).min(100),
                        ));
                    }
                }
                Err(e) => {
                    return Err(LockError::AcquisitionFailed {
                        reason: format!(
                            "Failed to create lock file for session '{session_id}' at '{lock_path}': {e}"
                        ),
                    });
                }
            }
        }

        Err(LockError::AcquisitionFailed {
            reason: format!(
                "Max retries ({MAX_ACQUIRE_ATTEMPTS}) exceeded for lock acquisition on session '{session_id}'"
            ),
        })
    }

    /// Path of the lock file inside a session directory.
    #[must_use]
    pub fn lock_path(session_dir: &Utf8Path) -> Utf8PathBuf {
        session_dir.join(LOCK_FILE_NAME)
    }

    /// Information about an existing lock, if any.
    pub fn get_lock_info(session_dir: &Utf8Path) -> Result<Option<LockInfo>, LockError> {
        let lock_path = Self::lock_path(session_dir);
        if !lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&lock_path).map_err(|e| LockError::CorruptedLock {
            reason: format!("Failed to read lock file: {e}"),
        })?;
        let info = serde_json::from_str(&content).map_err(|e| LockError::CorruptedLock {
            reason: format!("Failed to parse lock file: {e}"),
        })?;
        Ok(Some(info))
    }

    /// Release the lock explicitly (also happens on drop).
    pub fn release(mut self) -> Result<(), LockError> {
        self._fd_lock.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).map_err(|e| LockError::ReleaseFailed {
                reason: format!("Failed to remove lock file: {e}"),
            })?;
        }
        Ok(())
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    #[must_use]
    pub const fn info(&self) -> &LockInfo {
        &self.info
    }

    fn finalize(
        lock_path: Utf8PathBuf,
        file: fs::File,
        info: LockInfo,
    ) -> Result<Self, LockError> {
        let json =
            serde_json::to_string_pretty(&info).map_err(|e| LockError::AcquisitionFailed {
                reason: format!(
                    "Failed to serialize lock info for session '{}': {e}",
                    info.session_id
                ),
            })?;

        let mut rw_lock = Box::new(RwLock::new(file));
        {
            let guard = rw_lock
                .try_write()
                .map_err(|_| LockError::ConcurrentExecution {
                    session_id: info.session_id.clone(),
                    pid: 0,
                    created_ago: "unknown".to_string(),
                })?;

            let mut file_ref = &*guard;
            file_ref
                .write_all(json.as_bytes())
                .and_then(|()| file_ref.flush())
                .and_then(|()| file_ref.sync_all())
                .map_err(|e| LockError::AcquisitionFailed {
                    reason: format!(
                        "Failed to write lock info for session '{}': {e}",
                        info.session_id
                    ),
                })?;
        }

        Ok(Self {
            lock_path,
            _fd_lock: Some(rw_lock),
            info,
        })
    }

    /// Read an existing lock and decide whether it may be overridden.
    ///
    /// An empty or half-written file is retried briefly since its creator may
    /// still be writing it.
    fn check_existing_lock(
        lock_path: &Utf8Path,
        session_id: &str,
        force: bool,
        ttl_seconds: u64,
    ) -> Result<(), LockError> {
        let mut last_problem = String::new();
        for attempt in 0..MAX_READ_RETRIES {
            let content = match fs::read_to_string(lock_path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    last_problem = format!("Failed to read existing lock: {e}");
                    String::new()
                }
            };

            if !content.trim().is_empty() {
                match serde_json::from_str::<LockInfo>(&content) {
                    Ok(existing) => {
                        return Self::validate_existing_lock(
                            &existing,
                            session_id,
                            force,
                            ttl_seconds,
                        );
                    }
                    Err(e) if !e.is_eof() => {
                        return Err(LockError::CorruptedLock {
                            reason: format!(
                                "Failed to parse existing lock for session '{session_id}': {e}"
                            ),
                        });
                    }
                    Err(e) => last_problem = format!("Lock file is incomplete: {e}"),
                }
            } else if last_problem.is_empty() {
                last_problem = "Lock file is empty (may be initializing)".to_string();
            }

            if attempt + 1 < MAX_READ_RETRIES {
                std::thread::sleep(Duration::from_millis(READ_RETRY_DELAY_MS));
            }
        }

        Err(LockError::CorruptedLock {
            reason: format!("{last_problem} (session '{session_id}')"),
        })
    }

    fn validate_existing_lock(
        existing: &LockInfo,
        session_id: &str,
        force: bool,
        ttl_seconds: u64,
    ) -> Result<(), LockError> {
        if force {
            return Ok(());
        }

        // Future timestamps (clock skew) count as age zero
        let age = now_secs().saturating_sub(existing.created_at);

        if is_process_running(existing.pid) || age <= ttl_seconds {
            return Err(LockError::ConcurrentExecution {
                session_id: session_id.to_string(),
                pid: existing.pid,
                created_ago: format_duration_since(existing.created_at),
            });
        }

        Err(LockError::StaleLock {
            session_id: session_id.to_string(),
            pid: existing.pid,
            age_secs: age,
        })
    }

    /// Rename-then-delete keeps the window where two processes both see the
    /// stale file as small as possible. `NotFound` means someone else won.
    fn remove_stale_lock(lock_path: &Utf8Path, session_id: &str) -> Result<(), LockError> {
        let stale_path =
            lock_path.with_extension(format!("stale.{}.{}", now_secs(), process::id()));
        match fs::rename(lock_path, &stale_path) {
            Ok(()) => {
                let _ = fs::remove_file(&stale_path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::AcquisitionFailed {
                reason: format!("Failed to rename stale lock for session '{session_id}': {e}"),
            }),
        }
    }
}

impl std::fmt::Debug for SessionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLock")
            .field("lock_path", &self.lock_path)
            .field("info", &self.info)
            .field("_fd_lock", &"<RwLock>")
            .finish()
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self._fd_lock.take();
        if self.lock_path.exists() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn format_duration_since(timestamp: u64) -> String {
    let duration = now_secs().saturating_sub(timestamp);
    if duration < 60 {
        format!("{duration}s")
    } else if duration < 3600 {
        format!("{}m", duration / 60)
    } else if duration < 86400 {
        format!("{}h", duration / 3600)
    } else {
        format!("{}d", duration / 86400)
    }
}

/// Check if a process with the given PID is still running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        // kill(pid, 0) probes without signalling; EPERM still means "exists"
        let rc = unsafe { libc::kill(pid, 0) };
        rc == 0
            || matches!(
                io::Error::last_os_error().raw_os_error(),
                Some(code) if code == libc::EPERM
            )
    }

    #[cfg(windows)]
    {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::minwinbase::STILL_ACTIVE;
        use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
        use winapi::um::winnt::PROCESS_QUERY_LIMITED_INFORMATION;

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                return false;
            }
            let mut exit_code: u32 = 0;
            let ok = GetExitCodeProcess(handle, &mut exit_code);
            CloseHandle(handle);
            ok != 0 && exit_code == STILL_ACTIVE
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        true
    }
}
