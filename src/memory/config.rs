const DEFAULT_SPIN_LIMIT: u32 = 6;

/// Tuning knobs for a `Domain`.
///
/// # Examples
/// ```
/// use hazard_domain::memory::DomainConfig;
///
/// let config = DomainConfig::default().retire_threshold(64).spin_limit(4);
/// assert_eq!(config.get_retire_threshold(), Some(64));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DomainConfig {
    retire_threshold: Option<usize>,
    spin_limit: u32
}

impl DomainConfig {
    /// Once more than `threshold` values sit in the retired list, a deferred
    /// swap also sweeps the retired list.
    pub fn retire_threshold(mut self, threshold: usize) -> Self {
        self.retire_threshold = Some(threshold);
        self
    }

    /// Largest exponent of a spin burst before a blocking wait starts yielding
    /// to the scheduler.
    pub fn spin_limit(mut self, limit: u32) -> Self {
        self.spin_limit = limit;
        self
    }

    pub fn get_retire_threshold(&self) -> Option<usize> {
        self.retire_threshold
    }

    pub fn get_spin_limit(&self) -> u32 {
        self.spin_limit
    }
}

impl Default for DomainConfig {
    fn default() -> Self {
        DomainConfig {
            retire_threshold: None,
            spin_limit: DEFAULT_SPIN_LIMIT
        }
    }
}
