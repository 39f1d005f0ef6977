//! Single-slot request guard: at most one request per affordance in flight.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{EngineError, Result};

#[derive(Debug)]
pub struct RequestSlot {
    action: &'static str,
    busy: AtomicBool,
}

impl RequestSlot {
    pub const fn new(action: &'static str) -> Self {
        Self {
            action,
            busy: AtomicBool::new(false),
        }
    }

    /// Claims the slot or fails with [`EngineError::Busy`]. The slot frees
    /// itself when the guard drops, on success and error paths alike.
    pub fn try_acquire(&self) -> Result<SlotGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::Busy {
                action: self.action,
            })?;
        Ok(SlotGuard { slot: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct SlotGuard<'a> {
    slot: &'a RequestSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}
