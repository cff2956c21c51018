pub mod ai;
pub mod builds;
pub mod fallback;
pub mod keys;
pub mod status;
pub mod usage;
