//! Named, OS-backed shared memory carved into fixed-size frame slots.
//!
//! Two independent arenas exist per job (INPUT and OUTPUT). Workers
//! "attach" to an arena by name instead of inheriting a handle, which is
//! what lets this design host the Producer, Workers and Consumer as
//! independent OS processes (or, as realized in this crate, independent
//! threads that still only ever touch the arena through its name).
//!
//! Unix-only: backed directly by POSIX `shm_open`/`mmap`/`munmap`/
//! `shm_unlink` via `libc`, the same system-interface dependency this
//! workspace already carries for its NUMA-aware allocation path.

use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::ptr;

use thiserror::Error;
use tracing::{debug, warn};

use crate::invariants::debug_assert_slot_in_range;

/// Errors that can occur while allocating, attaching to, or releasing an [`Arena`].
#[derive(Debug, Error)]
pub enum ArenaError {
    /// `allocate` was called with a name that already exists and the
    /// one-shot unlink-and-retry also failed.
    #[error("shared memory region '{name}' already exists and could not be reclaimed")]
    NameCollision { name: String },

    /// A POSIX shared-memory or mmap call failed.
    #[error("shared memory operation '{op}' on '{name}' failed: errno {errno}")]
    Os {
        op: &'static str,
        name: String,
        errno: i32,
    },
}

type Result<T> = std::result::Result<T, ArenaError>;

/// A named shared-memory region sliced into `slot_count` equal-sized slots.
///
/// Created with [`Arena::allocate`] by the owner (the Engine Controller) or
/// attached to by name with [`Arena::attach`] by a worker. Only the owner
/// may call [`Arena::release`]; an attached handle is simply dropped, which
/// unmaps the region in the calling thread/process without unlinking the
/// backing object.
pub struct Arena {
    name: String,
    fd: RawFd,
    ptr: *mut u8,
    slot_count: usize,
    slot_bytes: usize,
    owner: bool,
}

// SAFETY: the mapped region is shared, OS-backed memory. Access to any given
// byte range is serialized by the slot-rotation protocol the pipeline stages
// follow, not by anything in this type; `Arena` itself only hands out raw
// views and never races with itself.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Reserves `slot_count * slot_bytes` bytes of shared memory identified
    /// by `name`. If a stale region with this name exists (a previous crash
    /// left it behind), unlinks it and retries exactly once.
    pub fn allocate(name: &str, slot_count: usize, slot_bytes: usize) -> Result<Self> {
        match Self::create(name, slot_count, slot_bytes) {
            Ok(arena) => Ok(arena),
            Err(ArenaError::NameCollision { .. }) => {
                warn!(name, "stale shared memory region found, unlinking and retrying");
                Self::unlink_raw(name);
                Self::create(name, slot_count, slot_bytes)
            }
            Err(e) => Err(e),
        }
    }

    fn create(name: &str, slot_count: usize, slot_bytes: usize) -> Result<Self> {
        let total_bytes = slot_count
            .checked_mul(slot_bytes)
            .expect("slot_count * slot_bytes overflowed usize");
        let cname = shm_name(name);

        // SAFETY: cname is a valid NUL-terminated C string for the duration of the call.
        let fd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            let errno = last_errno();
            if errno == libc::EEXIST {
                return Err(ArenaError::NameCollision { name: name.to_string() });
            }
            return Err(ArenaError::Os { op: "shm_open", name: name.to_string(), errno });
        }

        // SAFETY: fd is a valid, just-opened file descriptor.
        if unsafe { libc::ftruncate(fd, total_bytes as libc::off_t) } != 0 {
            let errno = last_errno();
            unsafe { libc::close(fd) };
            Self::unlink_raw(name);
            return Err(ArenaError::Os { op: "ftruncate", name: name.to_string(), errno });
        }

        let ptr = map(fd, total_bytes, name)?;
        debug!(name, total_bytes, slot_count, "arena allocated");

        Ok(Self {
            name: name.to_string(),
            fd,
            ptr,
            slot_count,
            slot_bytes,
            owner: true,
        })
    }

    /// Attaches to an existing arena by name without allocating or owning it.
    pub fn attach(name: &str, slot_count: usize, slot_bytes: usize) -> Result<Self> {
        let total_bytes = slot_count
            .checked_mul(slot_bytes)
            .expect("slot_count * slot_bytes overflowed usize");
        let cname = shm_name(name);

        // SAFETY: cname is a valid NUL-terminated C string for the duration of the call.
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            let errno = last_errno();
            return Err(ArenaError::Os { op: "shm_open(attach)", name: name.to_string(), errno });
        }

        let ptr = map(fd, total_bytes, name)?;

        Ok(Self {
            name: name.to_string(),
            fd,
            ptr,
            slot_count,
            slot_bytes,
            owner: false,
        })
    }

    /// Arena name, as passed to `allocate`/`attach`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of fixed-size slots in this arena.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Byte length of a single slot.
    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }

    /// Constant-time, non-copying read view of one slot.
    ///
    /// # Safety
    /// The caller must ensure no other thread holds a mutable view of the
    /// same slot concurrently; this is guaranteed by the slot-rotation
    /// protocol (Producer writes, Worker reads+writes the paired slot,
    /// Consumer reads), never by this method.
    pub fn view(&self, slot_index: usize) -> &[u8] {
        debug_assert_slot_in_range!(slot_index, self.slot_count);
        let offset = slot_index * self.slot_bytes;
        // SAFETY: offset + slot_bytes is within the mapped region by construction,
        // and slot_index was checked against slot_count above.
        unsafe { std::slice::from_raw_parts(self.ptr.add(offset), self.slot_bytes) }
    }

    /// Constant-time, non-copying mutable view of one slot.
    ///
    /// # Safety
    /// Same discipline as [`Arena::view`]: exclusivity is enforced by the
    /// slot-rotation protocol upstream, not by this method.
    #[allow(clippy::mut_from_ref)]
    pub fn view_mut(&self, slot_index: usize) -> &mut [u8] {
        debug_assert_slot_in_range!(slot_index, self.slot_count);
        let offset = slot_index * self.slot_bytes;
        // SAFETY: see `view`; the protocol above guarantees no aliasing writer.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.add(offset), self.slot_bytes) }
    }

    /// Unmaps and, if this handle owns the region, unlinks the backing
    /// object. Must be called exactly once by the owner. Attached
    /// (non-owning) handles should simply be dropped.
    pub fn release(mut self) {
        self.unmap();
        if self.owner {
            Self::unlink_raw(&self.name);
            debug!(name = %self.name, "arena released and unlinked");
        }
        // Prevent Drop from unmapping twice.
        self.ptr = ptr::null_mut();
        self.fd = -1;
    }

    fn unmap(&mut self) {
        if !self.ptr.is_null() {
            let total_bytes = self.slot_count * self.slot_bytes;
            // SAFETY: ptr/total_bytes describe exactly the mapping created in `map`.
            unsafe {
                libc::munmap(self.ptr.cast(), total_bytes);
            }
            self.ptr = ptr::null_mut();
        }
        if self.fd >= 0 {
            // SAFETY: fd was returned by a successful shm_open in this struct.
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }

    fn unlink_raw(name: &str) {
        let cname = shm_name(name);
        // SAFETY: cname is a valid NUL-terminated C string. Failure (e.g. ENOENT)
        // is expected when nothing stale exists and is intentionally ignored.
        unsafe {
            libc::shm_unlink(cname.as_ptr());
        }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // Fallback: always safe to unmap/close even if `release` was already
        // called (ptr/fd are reset to null/-1 there) or never called at all
        // (attached, non-owning handles never unlink).
        self.unmap();
    }
}

fn map(fd: RawFd, total_bytes: usize, name: &str) -> Result<*mut u8> {
    // SAFETY: fd is a valid, appropriately-sized shared memory descriptor.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            total_bytes,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        let errno = last_errno();
        unsafe { libc::close(fd) };
        return Err(ArenaError::Os { op: "mmap", name: name.to_string(), errno });
    }
    Ok(ptr.cast())
}

fn shm_name(name: &str) -> CString {
    // POSIX shared memory object names are conventionally "/name".
    let prefixed = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };
    CString::new(prefixed).expect("arena name must not contain NUL bytes")
}

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}
