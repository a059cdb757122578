//! Thread-local participant state: a retired list, an operation counter, and
//! the derivation of a stable per-thread [`ParticipantId`].

use std::cell::{Cell, RefCell};
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{self, Ordering};

use crate::global::GLOBAL;
use crate::hazard::ParticipantId;
use crate::retired::{Retired, RetiredBag};

thread_local! {
    static LOCAL: Local = Local::new();
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Local
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Per-thread reclamation state: the thread's own retired list plus a count
/// of retirements since the last scan.
///
/// There is exactly one [`Local`] per thread, shared by every
/// [`Queue`](crate::Queue) instance that thread touches – retired records are
/// type-erased, so there is nothing instance-specific to keep them apart by.
struct Local {
    retired: RefCell<RetiredBag>,
    ops_since_scan: Cell<u32>,
}

impl Local {
    #[inline]
    fn new() -> Self {
        Self { retired: RefCell::new(RetiredBag::new()), ops_since_scan: Cell::new(0) }
    }

    /// Appends `ptr` (reclaimed via `destroy`) to this thread's retired list,
    /// scanning for reclaimable entries once `threshold` retirements have
    /// accumulated since the last scan.
    ///
    /// # Safety
    ///
    /// Same contract as [`Retired::new`]: `destroy` must be the correct
    /// destructor for `ptr`, and `ptr` must never be dereferenced by anyone
    /// else from this point on.
    #[inline]
    unsafe fn retire(&self, threshold: u32, ptr: NonNull<()>, destroy: unsafe fn(NonNull<()>)) {
        self.retired.borrow_mut().inner.push(unsafe { Retired::new(ptr, destroy) });

        let count = self.ops_since_scan.get() + 1;
        if count >= threshold {
            self.ops_since_scan.set(0);
            self.scan_hazards();
        } else {
            self.ops_since_scan.set(count);
        }
    }

    /// Opportunistically adopts any bags abandoned by exited threads, then
    /// reclaims every entry in the (now possibly larger) retired list that no
    /// hazard slot still protects.
    fn scan_hazards(&self) {
        if let Some(adopted) = GLOBAL.try_adopt_abandoned() {
            self.retired.borrow_mut().merge(adopted.inner);
        }

        // (LOC:1) this `SeqCst` fence synchronizes-with the `SeqCst` store in
        // `HazardSlot::set_protected`; pairing a fence here with a store
        // there lets the loads in `collect_hazardous_addresses` below stay
        // `Relaxed` instead of repeating an `Acquire` load per hazard slot.
        atomic::fence(Ordering::SeqCst);

        let mut retired = self.retired.borrow_mut();
        if retired.inner.is_empty() {
            return;
        }
        retired.inner.sort_unstable_by_key(Retired::address);

        let mut hazardous = Vec::new();
        GLOBAL.collect_hazardous_addresses(&mut hazardous);

        let mut still_protected = vec![false; retired.inner.len()];
        for addr in &hazardous {
            if let Ok(idx) = retired.inner.binary_search_by(|r| r.compare_with(*addr)) {
                still_protected[idx] = true;
            }
        }

        let mut guards = still_protected.into_iter();
        // dropping a `Retired` invokes its destructor; retaining the
        // still-protected ones defers exactly those.
        retired.inner.retain(|_| guards.next().unwrap_or(true));
    }

    /// Forces an unconditional scan, used by [`Queue`](crate::Queue)'s `Drop`
    /// impl to reclaim everything reclaimable before destroying the sentinel.
    #[inline]
    fn force_cleanup(&self) {
        self.scan_hazards();
    }
}

impl Drop for Local {
    fn drop(&mut self) {
        self.scan_hazards();

        let bag = mem::replace(&mut *self.retired.borrow_mut(), RetiredBag::new());
        if !bag.inner.is_empty() {
            GLOBAL.abandon(Box::new(bag));
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// free functions
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Returns a stable identity for the calling thread's participation, derived
/// from the address of its thread-local [`Local`] cell.
#[inline]
pub(crate) fn current_participant() -> ParticipantId {
    LOCAL.with(|local| ParticipantId::from_addr(local as *const Local as usize))
}

/// Retires `ptr` on behalf of the calling thread.
///
/// # Safety
///
/// Same contract as [`Local::retire`].
#[inline]
pub(crate) unsafe fn retire(threshold: u32, ptr: NonNull<()>, destroy: unsafe fn(NonNull<()>)) {
    LOCAL.with(|local| unsafe { local.retire(threshold, ptr, destroy) })
}

/// Forces an unconditional reclamation scan on the calling thread's retired
/// list.
#[inline]
pub(crate) fn force_cleanup() {
    LOCAL.with(Local::force_cleanup)
}
