pub mod monitor;
pub mod probe;
pub mod types;


pub use monitor::HealthMonitor;
pub use probe::{HealthProbe, HttpProbe};
pub use types::*;
