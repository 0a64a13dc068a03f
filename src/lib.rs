//! Hazard pointer based memory reclamation for lock-free data structures.
//!
//! Readers `load` a handle from a shared location and `release` it when done. Writers
//! `swap` a new handle in, and the domain makes sure the old one is only deallocated
//! once no reader still holds it. Reclamation either waits for readers to finish, or is
//! deferred to a later `cleanup` sweep. No locks are taken anywhere.
//!
//! The `memory` module exposes the raw, handle based `Domain`. The `structures` module
//! wraps it in `HazardCell`, a typed shared pointer with RAII guards.

pub mod memory;
pub mod structures;
