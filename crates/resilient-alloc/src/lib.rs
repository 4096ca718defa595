//! Allocator that absorbs out-of-memory instead of reporting it.
//!
//! A failed allocation is reported to a [`FailureSink`], followed by a fixed
//! backoff and another attempt, forever. Releasing (`new_size == 0`) always
//! succeeds immediately. The same value implements [`GlobalAlloc`], so one
//! `#[global_allocator]` static is the single chokepoint for every allocation
//! in the process, including the ones made by the event loop and by the
//! embedded script engine.
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOCATOR: resilient_alloc::ResilientAllocator = resilient_alloc::ResilientAllocator::system();
//! ```
//!
//! The allocator holds no mutable state of its own and needs no locking. Any
//! thread may call it; a sink that keeps state must be `Sync`.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::{self, NonNull};
use std::time::Duration;

/// Pause between two attempts after a failed allocation.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Raw allocation primitive retried by [`ResilientAllocator`].
///
/// # Safety
///
/// Implementations must uphold the [`GlobalAlloc`] contract: a returned block
/// is valid for `new_size` bytes at `layout.align()`, a failed resize leaves
/// `existing` untouched, and `release` accepts every block this backing handed
/// out together with the layout it currently has.
pub unsafe trait Backing {
    /// Allocate a fresh block (`existing == None`, only the alignment of
    /// `layout` is used) or resize `existing` from `layout.size()` to
    /// `new_size`. `None` means this attempt failed.
    ///
    /// # Safety
    ///
    /// `new_size` is non-zero and forms a valid layout with `layout.align()`.
    /// `existing` is a live block of this backing allocated with `layout`.
    unsafe fn resize(
        &self,
        existing: Option<NonNull<u8>>,
        layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `block` is a live block of this backing allocated with `layout`.
    unsafe fn release(&self, block: NonNull<u8>, layout: Layout);
}

/// [`Backing`] over the platform allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBacking;

// SAFETY: forwards to `System`, which upholds the `GlobalAlloc` contract.
unsafe impl Backing for SystemBacking {
    unsafe fn resize(
        &self,
        existing: Option<NonNull<u8>>,
        layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let raw = match existing {
            // SAFETY: caller guarantees `block` was allocated with `layout`
            // and that `new_size` is a valid non-zero size for its alignment.
            Some(block) => unsafe { System.realloc(block.as_ptr(), layout, new_size) },
            // SAFETY: caller guarantees the size/alignment pair is valid and non-zero.
            None => unsafe {
                System.alloc(Layout::from_size_align_unchecked(
                    new_size,
                    layout.align(),
                ))
            },
        };
        NonNull::new(raw)
    }

    unsafe fn release(&self, block: NonNull<u8>, layout: Layout) {
        // SAFETY: caller guarantees `block` was allocated by `System` with `layout`.
        unsafe { System.dealloc(block.as_ptr(), layout) }
    }
}

/// Observer for failed allocation attempts.
///
/// Called from inside the allocator: implementations must not allocate.
pub trait FailureSink {
    /// `attempt` counts the failures of the current request, starting at 1.
    fn allocation_failed(&self, requested: usize, attempt: u64);
}

/// Writes one fixed warning line to stderr per failed attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl FailureSink for StderrSink {
    fn allocation_failed(&self, _requested: usize, _attempt: u64) {
        const MSG: &[u8] = b"[resilient-alloc] [WARN] Allocate failed, sleeping before retry\n";
        // SAFETY: MSG is a valid buffer of MSG.len() bytes. write(2) does not allocate.
        let _ = unsafe { libc::write(libc::STDERR_FILENO, MSG.as_ptr().cast(), MSG.len()) };
    }
}

/// Allocator that retries failed allocations after a fixed backoff.
#[derive(Debug)]
pub struct ResilientAllocator<B = SystemBacking, S = StderrSink> {
    backing: B,
    sink: S,
    backoff: Duration,
}

impl ResilientAllocator {
    /// System allocator, stderr warnings, [`DEFAULT_BACKOFF`].
    pub const fn system() -> Self {
        Self::new(SystemBacking, StderrSink, DEFAULT_BACKOFF)
    }
}

impl<B, S> ResilientAllocator<B, S> {
    pub const fn new(backing: B, sink: S, backoff: Duration) -> Self {
        Self {
            backing,
            sink,
            backoff,
        }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<B: Backing, S: FailureSink> ResilientAllocator<B, S> {
    /// Allocate, resize or release a block.
    ///
    /// - `new_size == 0`: release `existing` (if any) and return `None`.
    ///   Never retried, never reported.
    /// - otherwise: allocate (`existing == None`) or resize `existing`.
    ///   Failed attempts are reported to the sink and retried after the
    ///   backoff until one succeeds.
    ///
    /// A size that cannot form a layout with `layout.align()` is a caller
    /// bug, not memory pressure, and returns `None` without retrying.
    ///
    /// # Safety
    ///
    /// `existing`, when present, is a live block of this allocator whose
    /// current layout is `layout`. After a successful resize or a release the
    /// old pointer must not be used again.
    pub unsafe fn allocate_or_resize(
        &self,
        existing: Option<NonNull<u8>>,
        layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if new_size == 0 {
            if let Some(block) = existing {
                // SAFETY: forwarded caller guarantee.
                unsafe { self.backing.release(block, layout) };
            }
            return None;
        }
        if Layout::from_size_align(new_size, layout.align()).is_err() {
            return None;
        }

        let mut attempt = 0u64;
        loop {
            // SAFETY: size/alignment validated above; `existing` per caller guarantee.
            if let Some(block) = unsafe { self.backing.resize(existing, layout, new_size) } {
                return Some(block);
            }
            attempt += 1;
            self.sink.allocation_failed(new_size, attempt);
            std::thread::sleep(self.backoff);
        }
    }
}

// SAFETY: every request is forwarded to a `Backing`, which upholds the
// `GlobalAlloc` contract; retries never hand out a block twice.
unsafe impl<B: Backing + Sync, S: FailureSink + Sync> GlobalAlloc for ResilientAllocator<B, S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // SAFETY: no existing block.
        unsafe { self.allocate_or_resize(None, layout, layout.size()) }
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if let Some(block) = NonNull::new(ptr) {
            // SAFETY: `GlobalAlloc` caller guarantees `ptr` came from us with `layout`.
            unsafe { self.backing.release(block, layout) };
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: `GlobalAlloc` caller guarantees `ptr` came from us with `layout`.
        unsafe { self.allocate_or_resize(NonNull::new(ptr), layout, new_size) }
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}
