use thiserror::Error;

/// Errors reported by the protection protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum HazardError {
    /// A new slot could not be allocated while growing a slot list.
    #[error("out of memory while growing a slot list")]
    OutOfMemory,
    /// The shared location held the reserved empty handle `0`.
    #[error("shared location holds the reserved null handle")]
    NullHandle,
}
