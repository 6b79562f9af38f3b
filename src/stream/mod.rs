//! Frame streaming
//!
//! # Components
//!
//! - `StreamScheduler` - one polling loop per streaming device
//! - `StreamSession` - status record of one loop
//! - `FrameSink` - consumer a loop delivers into

pub mod scheduler;
pub mod session;
pub mod sink;

pub use scheduler::StreamScheduler;
pub use session::{StreamSession, StreamSessionInfo, StreamStatus};
pub use sink::{FrameSink, StreamEvent};
