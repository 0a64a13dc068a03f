use crate::memory::{Domain, DomainConfig, HazardError, Reclaim};
use log::debug;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::AtomicUsize;

/// A shared, atomically replaceable `Box<T>`.
///
/// Readers take a `Guard` through `load`; the value it points to is not dropped until
/// the guard is, even if a writer has replaced it in the meantime. Writers replace the
/// value with `store`, and the old one is dropped once no guard refers to it.
///
/// # Examples
/// ```
/// use hazard_domain::structures::HazardCell;
/// use hazard_domain::memory::Reclaim;
///
/// let cell = HazardCell::new("hello".to_owned());
/// {
///     let guard = cell.load().unwrap();
///     cell.store("world".to_owned(), Reclaim::Deferred);
///     assert_eq!(*guard, "hello");
/// }
/// assert_eq!(cell.cleanup(Reclaim::Deferred), 1);
/// assert_eq!(*cell.load().unwrap(), "world");
/// ```
pub struct HazardCell<T> {
    shared: AtomicUsize,
    domain: Domain<fn(usize)>,
    _marker: PhantomData<Box<T>>
}

// Values are created on one thread, read on many and dropped on whichever
// thread reclaims them
unsafe impl<T: Send + Sync> Send for HazardCell<T> {}
unsafe impl<T: Send + Sync> Sync for HazardCell<T> {}

fn into_handle<T>(value: T) -> usize {
    Box::into_raw(Box::new(value)) as usize
}

fn free_boxed<T>(handle: usize) {
    unsafe {
        drop(Box::from_raw(handle as *mut T));
    }
}

impl<T> HazardCell<T> {
    pub fn new(value: T) -> Self {
        HazardCell::with_config(value, DomainConfig::default())
    }

    pub fn with_config(value: T, config: DomainConfig) -> Self {
        HazardCell {
            shared: AtomicUsize::new(into_handle(value)),
            domain: Domain::with_config(config, free_boxed::<T> as fn(usize)),
            _marker: PhantomData
        }
    }

    /// Protect the current value and return a guard to it.
    pub fn load(&self) -> Result<Guard<'_, T>, HazardError> {
        let handle = self.domain.load(&self.shared)?;
        Ok(Guard {
            cell: self,
            handle
        })
    }

    /// Replace the current value. The old value is dropped immediately if no guard
    /// refers to it, otherwise according to `mode`.
    pub fn store(&self, value: T, mode: Reclaim) {
        self.domain.swap(&self.shared, into_handle(value), mode);
    }

    /// Drop replaced values that are no longer guarded. Returns how many were dropped.
    pub fn cleanup(&self, mode: Reclaim) -> usize {
        self.domain.cleanup(mode)
    }

    /// Number of replaced values still waiting to be dropped.
    pub fn retired_count(&self) -> usize {
        self.domain.retired_count()
    }
}

impl<T> Drop for HazardCell<T> {
    fn drop(&mut self) {
        // A forgotten guard leaves its handle protected forever, so never wait here
        self.domain.cleanup(Reclaim::Deferred);
        let leaked = self.domain.retired_count();
        if leaked > 0 {
            debug!("leaking {} replaced values still marked as protected", leaked);
        }
        let current = *self.shared.get_mut();
        free_boxed::<T>(current);
    }
}

impl<T: fmt::Debug> fmt::Debug for HazardCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.load() {
            Ok(guard) => write!(f, "HazardCell {{ value: {:?}, retired: {} }}", &*guard, self.retired_count()),
            Err(err) => write!(f, "HazardCell {{ error: {} }}", err)
        }
    }
}

/// A protected reference to a value loaded from a `HazardCell`.
pub struct Guard<'a, T> {
    cell: &'a HazardCell<T>,
    handle: usize
}

impl<'a, T> Deref for Guard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*(self.handle as *const T) }
    }
}

impl<'a, T> Drop for Guard<'a, T> {
    fn drop(&mut self) {
        self.cell.domain.release(self.handle);
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for Guard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Guard({:?})", &**self)
    }
}
