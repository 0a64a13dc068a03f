//! A module for lock-free memory management.
//!
//! The `Domain` in this module implements hazard pointers, so that it can be used in
//! the development of lock-free data structures. Readers publish the handles they are
//! using, and writers only deallocate a handle they swapped out once no reader has it
//! published, preventing both use-after-free and the
//! [ABA problem](https://en.wikipedia.org/wiki/ABA_problem).

pub use self::config::DomainConfig;
pub use self::domain::{Domain, Reclaim, DEFER, NONE};
pub use self::error::HazardError;
pub use self::slot_list::{Slot, SlotList, EMPTY};

mod backoff;
mod config;
mod domain;
mod error;
mod slot_list;
