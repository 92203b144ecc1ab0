pub mod scheduler;
pub mod status;

pub use scheduler::Monitor;
pub use status::{PassReport, StatusSnapshot};
