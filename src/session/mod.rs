//! Camera session facade
//!
//! - `service` - the six camera operations as reply-producing calls
//! - `dispatch` - endpoint name to handler table
//! - `reply` - response payloads

pub mod dispatch;
pub mod reply;
pub mod service;

pub use dispatch::{Dispatcher, Operation, OperationHandler, Request};
pub use reply::{CameraList, CameraReply, Outcome, Reply};
pub use service::CameraService;
