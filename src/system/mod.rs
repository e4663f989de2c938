//! Threads and channels shared by the display components.

pub mod bus;
pub mod frame;
