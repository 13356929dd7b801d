mod driver;
mod heartbeat;

pub use driver::{TimerDriver, TimerState, Transition};
pub use heartbeat::{Connectivity, Heartbeat};
