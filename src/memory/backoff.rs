use std::cmp;
use std::hint;
use std::thread;

/// Exponential spin used while waiting for a protection to clear.
///
/// Each call to `snooze` spins `2^step` times until `step` reaches the limit,
/// after which it yields the thread instead.
#[derive(Debug)]
pub struct Backoff {
    step: u32,
    limit: u32
}

impl Backoff {
    pub fn new(limit: u32) -> Self {
        Backoff {
            step: 0,
            limit
        }
    }

    pub fn snooze(&mut self) {
        if self.step < self.limit {
            for _ in 0..(1u32 << self.step) {
                hint::spin_loop();
            }
        } else {
            thread::yield_now();
        }
        self.step = cmp::min(self.step + 1, self.limit);
    }

    pub fn is_yielding(&self) -> bool {
        self.step >= self.limit
    }
}
