use crate::memory::backoff::Backoff;
use crate::memory::slot_list::{Slot, SlotList, EMPTY};
use crate::memory::{DomainConfig, HazardError};
use log::{debug, trace};
use std::cell::Cell;
use std::fmt;
use std::ptr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use thread_local::CachedThreadLocal;

/// Raw flag value requesting blocking reclamation.
pub const NONE: u32 = 0;
/// Raw flag value requesting deferred reclamation.
pub const DEFER: u32 = 1;

/// How a retired value is reclaimed while a reader still protects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reclaim {
    /// Spin until the value is no longer protected, then deallocate it.
    Blocking,
    /// Leave the value in the retired list for a later `cleanup`.
    Deferred
}

impl Reclaim {
    pub fn from_flags(flags: u32) -> Self {
        if flags & DEFER != 0 {
            Reclaim::Deferred
        } else {
            Reclaim::Blocking
        }
    }
}

/// The protected slot this thread claimed last, tried before scanning the list.
struct SlotHint(Cell<*const Slot>);

// The pointer targets a slot of the owning domain, which outlives the hint
unsafe impl Send for SlotHint {}

/// A hazard pointer domain.
///
/// The domain tracks which handles are currently protected by readers and which
/// have been retired by writers but could not be deallocated yet. Handles are
/// opaque `usize` values; `0` is reserved and can never be protected. When a handle
/// is safe to free, the domain passes it to the deallocator given on creation.
///
/// Dropping the domain frees its bookkeeping but not the handles still sitting in
/// the retired list; run `cleanup` first if those should be deallocated.
///
/// # Examples
/// ```
/// use hazard_domain::memory::{Domain, Reclaim};
/// use std::sync::atomic::AtomicUsize;
///
/// let domain = Domain::new(|handle| println!("freeing {:#x}", handle));
/// let shared = AtomicUsize::new(0x1000);
///
/// let handle = domain.load(&shared).unwrap();
/// assert_eq!(handle, 0x1000);
/// domain.release(handle);
///
/// domain.swap(&shared, 0x2000, Reclaim::Blocking);
/// ```
pub struct Domain<F: Fn(usize)> {
    protected: SlotList,
    retired: SlotList,
    hints: CachedThreadLocal<SlotHint>,
    retired_count: AtomicUsize,
    config: DomainConfig,
    deallocator: F
}

impl<F: Fn(usize)> Domain<F> {
    pub fn new(deallocator: F) -> Self {
        Domain::with_config(DomainConfig::default(), deallocator)
    }

    pub fn with_config(config: DomainConfig, deallocator: F) -> Self {
        Domain {
            protected: SlotList::new(),
            retired: SlotList::new(),
            hints: CachedThreadLocal::new(),
            retired_count: AtomicUsize::new(0),
            config,
            deallocator
        }
    }

    /// Read the handle stored at `location` and protect it from reclamation.
    ///
    /// The returned handle stays valid until it is passed to `release`. Fails with
    /// `HazardError::NullHandle` if the location holds `0`, and with
    /// `HazardError::OutOfMemory` if the protected list could not grow.
    pub fn load(&self, location: &AtomicUsize) -> Result<usize, HazardError> {
        loop {
            let value = location.load(SeqCst);
            if value == EMPTY {
                return Err(HazardError::NullHandle);
            }
            let slot = self.protect(value)?;

            // If the location still holds the value, any writer swapping it out from
            // now on will see our protection
            if location.load(SeqCst) == value {
                return Ok(value);
            }

            trace!("handle {:#x} was swapped out during load, retrying", value);
            // Someone may have cleared and reused our slot for the same value
            if !slot.try_clear(value) {
                self.protected.remove(value);
            }
        }
    }

    fn protect(&self, value: usize) -> Result<&Slot, HazardError> {
        let hint = self.hints.get_or(|| Box::new(SlotHint(Cell::new(ptr::null()))));
        let cached = hint.0.get();
        if !cached.is_null() {
            let slot = unsafe { &*cached };
            if slot.try_claim(value) {
                return Ok(slot);
            }
        }
        let slot = self.protected.insert_or_reuse(value)?;
        hint.0.set(slot);
        Ok(slot)
    }

    /// Give up a protection obtained from `load`.
    ///
    /// # Panics
    /// Panics if `handle` is not currently protected, i.e. it was never loaded or
    /// has already been released.
    pub fn release(&self, handle: usize) {
        if !self.protected.remove(handle) {
            panic!("released handle {:#x} which is not protected", handle);
        }
    }

    /// Store `new_value` at `location` and reclaim the handle it replaces.
    ///
    /// An unprotected old handle is deallocated before this returns. A protected one
    /// is either waited on (`Reclaim::Blocking`) or moved to the retired list
    /// (`Reclaim::Deferred`).
    pub fn swap(&self, location: &AtomicUsize, new_value: usize, mode: Reclaim) {
        let old_value = location.swap(new_value, SeqCst);
        if old_value == EMPTY {
            return;
        }
        if !self.reclaim(old_value, mode) {
            self.sweep_over_threshold();
        }
    }

    /// Sweep the retired list once, deallocating every handle that is no longer
    /// protected. With `Reclaim::Blocking` this waits for each protected handle to
    /// be released; with `Reclaim::Deferred` those are left for a later sweep.
    ///
    /// Returns the number of handles deallocated.
    pub fn cleanup(&self, mode: Reclaim) -> usize {
        let mut reclaimed = 0;
        for slot in self.retired.iter() {
            let value = slot.value();
            if value == EMPTY {
                continue;
            }
            if mode == Reclaim::Deferred && self.protected.contains(value) {
                continue;
            }
            if slot.try_clear(value) {
                self.retired_count.fetch_sub(1, SeqCst);
                if self.reclaim(value, mode) {
                    reclaimed += 1;
                }
            }
        }
        debug!("cleanup reclaimed {} retired handles, {} remaining", reclaimed, self.retired_count());
        reclaimed
    }

    /// Deallocate `value` now or after waiting, or retire it. Returns whether it was
    /// deallocated.
    fn reclaim(&self, value: usize, mode: Reclaim) -> bool {
        if !self.protected.contains(value) {
            (self.deallocator)(value);
            return true;
        }
        if mode == Reclaim::Deferred {
            // Count first so that a concurrent sweep never decrements below zero
            self.retired_count.fetch_add(1, SeqCst);
            match self.retired.insert_or_reuse(value) {
                Ok(_) => {
                    debug!("deferring reclamation of protected handle {:#x}", value);
                    return false;
                },
                Err(err) => {
                    self.retired_count.fetch_sub(1, SeqCst);
                    debug!("could not retire handle {:#x} ({}), waiting instead", value, err);
                }
            }
        }
        self.wait_until_unprotected(value);
        (self.deallocator)(value);
        true
    }

    fn wait_until_unprotected(&self, value: usize) {
        let mut backoff = Backoff::new(self.config.get_spin_limit());
        if self.protected.contains(value) {
            trace!("waiting for handle {:#x} to be released", value);
        }
        while self.protected.contains(value) {
            let was_yielding = backoff.is_yielding();
            backoff.snooze();
            if !was_yielding && backoff.is_yielding() {
                trace!("still waiting for handle {:#x}, yielding", value);
            }
        }
    }

    fn sweep_over_threshold(&self) {
        if let Some(threshold) = self.config.get_retire_threshold() {
            let retired = self.retired_count();
            if retired > threshold {
                debug!("{} retired handles exceed threshold {}, sweeping", retired, threshold);
                self.cleanup(Reclaim::Deferred);
            }
        }
    }

    /// Whether at least one reader currently protects `handle`.
    pub fn is_protected(&self, handle: usize) -> bool {
        self.protected.contains(handle)
    }

    /// Number of handles waiting in the retired list.
    pub fn retired_count(&self) -> usize {
        self.retired_count.load(SeqCst)
    }

    /// Number of nodes allocated for the protected list.
    pub fn protected_slots(&self) -> usize {
        self.protected.len()
    }

    /// Number of nodes allocated for the retired list.
    pub fn retired_slots(&self) -> usize {
        self.retired.len()
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }
}

impl<F: Fn(usize)> Drop for Domain<F> {
    fn drop(&mut self) {
        let retired = self.retired_count();
        if retired > 0 {
            debug!("dropping domain with {} unreclaimed retired handles", retired);
        }
    }
}

impl<F: Fn(usize)> fmt::Debug for Domain<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Domain(\n\tprotected: {:?}, \n\tretired: {:?}, \n\tconfig: {:?})",
               self.protected, self.retired, self.config)
    }
}
