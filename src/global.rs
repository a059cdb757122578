//! The process-wide hazard table and the stack of bags abandoned by exited
//! threads.

use std::ptr::NonNull;
use std::sync::atomic::Ordering;

use crate::error::QueueError;
use crate::hazard::{HazardSlot, ParticipantId};
use crate::retired::{AbandonedBags, RetiredBag};

/// The compile-time capacity of the global hazard table.
///
/// A participant simultaneously owning `N` slots reduces the capacity
/// available to every other participant by `N`. `pop` owns exactly one slot
/// for the duration of a call; `push` owns none.
pub const HAZARD_CAPACITY: usize = 100;

/// The single, process-wide registry instance.
pub(crate) static GLOBAL: Global = Global::new();

////////////////////////////////////////////////////////////////////////////////////////////////////
// Global
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Global state required for hazard-pointer based memory reclamation.
///
/// Shared by every [`Queue`](crate::Queue) instance in the process, since the
/// contract a hazard table provides – protecting any pointer, anywhere – is
/// inherently cross-instance.
pub(crate) struct Global {
    slots: [HazardSlot; HAZARD_CAPACITY],
    abandoned: AbandonedBags,
}

impl Global {
    /// Creates the (fully `const`-initialized) global registry.
    #[inline]
    const fn new() -> Self {
        // `HazardSlot` has no `Copy` impl, so the array must be built from an
        // explicit literal rather than `[HazardSlot::new(); N]`.
        const ONE: HazardSlot = HazardSlot::new();
        Self { slots: [ONE; HAZARD_CAPACITY], abandoned: AbandonedBags::new() }
    }

    /// Scans the table for a free slot and claims it for `owner`.
    #[inline]
    pub(crate) fn acquire(&self, owner: ParticipantId) -> Result<&HazardSlot, QueueError> {
        for slot in &self.slots {
            if slot.try_claim(owner) {
                return Ok(slot);
            }
        }
        Err(QueueError::OutOfSlots)
    }

    /// Returns `true` if any slot in the table currently protects `ptr`.
    #[inline]
    pub(crate) fn is_hazard(&self, ptr: NonNull<()>) -> bool {
        self.slots.iter().any(|slot| slot.protected(Ordering::Acquire) == Some(ptr))
    }

    /// Collects the addresses of every pointer currently protected by some
    /// slot in the table.
    ///
    /// The caller is expected to have already issued a `SeqCst` fence (see
    /// `Local::scan_hazards`); that fence is what makes the `Relaxed` loads
    /// here safe to batch instead of repeating `is_hazard`'s `Acquire` load
    /// once per retired entry.
    #[inline]
    pub(crate) fn collect_hazardous_addresses(&self, out: &mut Vec<usize>) {
        out.clear();
        for slot in &self.slots {
            if let Some(protected) = slot.protected(Ordering::Relaxed) {
                out.push(protected.as_ptr() as usize);
            }
        }
    }

    /// Stores an exiting participant's non-empty, still-hazardous bag of
    /// retired records for later adoption.
    #[inline]
    pub(crate) fn abandon(&self, bag: Box<RetiredBag>) {
        self.abandoned.push(bag);
    }

    /// Takes and merges every currently abandoned bag, if any.
    #[inline]
    pub(crate) fn try_adopt_abandoned(&self) -> Option<Box<RetiredBag>> {
        self.abandoned.take_and_merge()
    }
}
