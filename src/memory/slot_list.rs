use crate::memory::HazardError;
use std::alloc::{self, Layout};
#[cfg(test)]
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize};
use std::sync::atomic::Ordering::SeqCst;

/// The reserved handle marking a slot as empty.
pub const EMPTY: usize = 0;

#[cfg(test)]
thread_local! {
    static FAIL_ALLOCATIONS: Cell<bool> = Cell::new(false);
}

/// Make every slot allocation on the calling thread fail, or succeed again.
#[cfg(test)]
pub(crate) fn fail_allocations(fail: bool) {
    FAIL_ALLOCATIONS.with(|flag| flag.set(fail));
}

/// A single entry of a `SlotList`. Holds either `EMPTY` or one handle.
pub struct Slot {
    value: AtomicUsize,
    next: AtomicPtr<Slot>
}

impl Slot {
    fn new(value: usize) -> Self {
        Slot {
            value: AtomicUsize::new(value),
            next: AtomicPtr::default()
        }
    }

    /// Allocate a slot on the heap without aborting when the allocator is exhausted.
    fn allocate(value: usize) -> Result<*mut Slot, HazardError> {
        #[cfg(test)]
        {
            if FAIL_ALLOCATIONS.with(|flag| flag.get()) {
                return Err(HazardError::OutOfMemory);
            }
        }
        let layout = Layout::new::<Slot>();
        unsafe {
            let slot_ptr = alloc::alloc(layout) as *mut Slot;
            if slot_ptr.is_null() {
                return Err(HazardError::OutOfMemory);
            }
            ptr::write(slot_ptr, Slot::new(value));
            Ok(slot_ptr)
        }
    }

    pub fn value(&self) -> usize {
        self.value.load(SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.value() == EMPTY
    }

    /// Claim an empty slot for `value`.
    pub fn try_claim(&self, value: usize) -> bool {
        self.value.compare_exchange(EMPTY, value, SeqCst, SeqCst).is_ok()
    }

    /// Empty the slot, provided it still holds `value`.
    pub fn try_clear(&self, value: usize) -> bool {
        self.value.compare_exchange(value, EMPTY, SeqCst, SeqCst).is_ok()
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Slot {{ value: {:#x} }}", self.value())
    }
}

/// An append-only, lock-free list of slots.
///
/// Slots are pushed at the head and are never unlinked or freed while the list is
/// shared; removal only empties the slot so it can be reused by a later insert.
/// This means a traversal never touches freed memory, even when other threads are
/// inserting concurrently. The nodes themselves are freed when the list is dropped,
/// which requires exclusive ownership.
pub struct SlotList {
    head: AtomicPtr<Slot>
}

impl SlotList {
    pub fn new() -> Self {
        SlotList {
            head: AtomicPtr::default()
        }
    }

    /// Store `value` in the first empty slot that can be claimed, or push a new slot
    /// holding it if none can. The returned slot remains owned by the list.
    pub fn insert_or_reuse(&self, value: usize) -> Result<&Slot, HazardError> {
        debug_assert_ne!(value, EMPTY, "the empty handle cannot be stored");
        for slot in self.iter() {
            if slot.is_empty() && slot.try_claim(value) {
                return Ok(slot);
            }
        }
        self.push(value)
    }

    fn push(&self, value: usize) -> Result<&Slot, HazardError> {
        let new_slot = Slot::allocate(value)?;
        let mut old_head = self.head.load(SeqCst);

        // Slots are never deleted, so there is no ABA to worry about on the head
        loop {
            unsafe {
                (*new_slot).next.store(old_head, SeqCst);
            }
            match self.head.compare_exchange_weak(old_head, new_slot, SeqCst, SeqCst) {
                Ok(_) => return Ok(unsafe { &*new_slot }),
                Err(current) => old_head = current
            }
        }
    }

    /// Empty the first slot found holding `value`.
    ///
    /// If `value` is registered more than once, only one registration is cleared per
    /// call, and which one is unspecified. Callers can only rely on the number of
    /// registrations dropping by one.
    pub fn remove(&self, value: usize) -> bool {
        for slot in self.iter() {
            if slot.value() == value && slot.try_clear(value) {
                return true;
            }
        }
        false
    }

    pub fn contains(&self, value: usize) -> bool {
        self.iter().any(|slot| slot.value() == value)
    }

    /// Number of slot nodes, empty or not.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Number of slots currently holding a value.
    pub fn occupied(&self) -> usize {
        self.iter().filter(|slot| !slot.is_empty()).count()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            current: self.head.load(SeqCst),
            _marker: PhantomData
        }
    }
}

impl Default for SlotList {
    fn default() -> Self {
        SlotList::new()
    }
}

impl Drop for SlotList {
    fn drop(&mut self) {
        let mut current = self.head.swap(ptr::null_mut(), SeqCst);
        while !current.is_null() {
            let slot = unsafe { Box::from_raw(current) };
            current = slot.next.load(SeqCst);
        }
    }
}

impl fmt::Debug for SlotList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over the slots of a `SlotList`, newest first.
pub struct Iter<'a> {
    current: *mut Slot,
    _marker: PhantomData<&'a Slot>
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Slot;

    fn next(&mut self) -> Option<&'a Slot> {
        if self.current.is_null() {
            return None;
        }
        let slot = unsafe { &*self.current };
        self.current = slot.next.load(SeqCst);
        Some(slot)
    }
}
