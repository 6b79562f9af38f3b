//! webcam-relay - expose local cameras to remote clients
//!
//! This crate tracks capture devices, runs one streaming loop per streaming
//! camera and serves camera requests and frames over WebSocket.

pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod state;
pub mod stream;
pub mod utils;
pub mod web;

pub use error::{AppError, Result};
