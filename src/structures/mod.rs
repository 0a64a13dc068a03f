pub use self::hazard_cell::{Guard, HazardCell};

mod hazard_cell;
