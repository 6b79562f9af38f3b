//! Endpoint dispatch table
//!
//! Maps each endpoint name to one handler object. The table is built once
//! when the dispatcher is created; adding an operation means adding a
//! handler, not editing a central match.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::reply::Reply;
use super::service::CameraService;
use crate::error::{AppError, Result};
use crate::stream::FrameSink;

/// Camera operations reachable from a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetCameras,
    StartCamera,
    StopCamera,
    PauseCamera,
    StartStream,
    StopStream,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::GetCameras,
        Operation::StartCamera,
        Operation::StopCamera,
        Operation::PauseCamera,
        Operation::StartStream,
        Operation::StopStream,
    ];

    /// Wire name of the endpoint
    pub fn endpoint(self) -> &'static str {
        match self {
            Operation::GetCameras => "getcameras",
            Operation::StartCamera => "startcamera",
            Operation::StopCamera => "stopcamera",
            Operation::PauseCamera => "pausecamera",
            Operation::StartStream => "startcamerastream",
            Operation::StopStream => "stopcamerastream",
        }
    }

    /// Case-insensitive lookup by wire name
    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.endpoint().eq_ignore_ascii_case(endpoint))
    }
}

/// A parsed client request
pub struct Request {
    pub args: Vec<String>,
    /// Connection the request arrived on; streams deliver into it
    pub sink: Arc<dyn FrameSink>,
}

impl Request {
    pub fn new(args: Vec<String>, sink: Arc<dyn FrameSink>) -> Self {
        Self { args, sink }
    }

    /// First argument, the device id
    pub fn device_id(&self) -> Result<&str> {
        self.args
            .first()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("missing camera id argument".to_string()))
    }
}

#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, service: &CameraService, request: Request) -> Result<Reply>;
}

struct GetCameras;
struct StartCamera;
struct StopCamera;
struct PauseCamera;
struct StartStream;
struct StopStream;

#[async_trait]
impl OperationHandler for GetCameras {
    async fn handle(&self, service: &CameraService, _request: Request) -> Result<Reply> {
        Ok(service.get_cameras().await.into())
    }
}

#[async_trait]
impl OperationHandler for StartCamera {
    async fn handle(&self, service: &CameraService, request: Request) -> Result<Reply> {
        Ok(service.start_camera(request.device_id()?).await.into())
    }
}

#[async_trait]
impl OperationHandler for StopCamera {
    async fn handle(&self, service: &CameraService, request: Request) -> Result<Reply> {
        Ok(service.stop_camera(request.device_id()?).await.into())
    }
}

#[async_trait]
impl OperationHandler for PauseCamera {
    async fn handle(&self, service: &CameraService, request: Request) -> Result<Reply> {
        Ok(service.pause_camera(request.device_id()?).await.into())
    }
}

#[async_trait]
impl OperationHandler for StartStream {
    async fn handle(&self, service: &CameraService, request: Request) -> Result<Reply> {
        let device_id = request.device_id()?;
        Ok(service.start_stream(device_id, request.sink.clone()).into())
    }
}

#[async_trait]
impl OperationHandler for StopStream {
    async fn handle(&self, service: &CameraService, request: Request) -> Result<Reply> {
        Ok(service.stop_stream(request.device_id()?).await.into())
    }
}

fn handler_for(operation: Operation) -> Box<dyn OperationHandler> {
    match operation {
        Operation::GetCameras => Box::new(GetCameras),
        Operation::StartCamera => Box::new(StartCamera),
        Operation::StopCamera => Box::new(StopCamera),
        Operation::PauseCamera => Box::new(PauseCamera),
        Operation::StartStream => Box::new(StartStream),
        Operation::StopStream => Box::new(StopStream),
    }
}

/// Routes endpoint names to their handlers
pub struct Dispatcher {
    service: Arc<CameraService>,
    handlers: HashMap<Operation, Box<dyn OperationHandler>>,
}

impl Dispatcher {
    pub fn new(service: Arc<CameraService>) -> Self {
        let handlers = Operation::ALL
            .into_iter()
            .map(|op| (op, handler_for(op)))
            .collect();
        Self { service, handlers }
    }

    pub fn service(&self) -> &Arc<CameraService> {
        &self.service
    }

    /// Whether `endpoint` names a camera operation
    pub fn handles(&self, endpoint: &str) -> bool {
        Operation::from_endpoint(endpoint).is_some_and(|op| self.handlers.contains_key(&op))
    }

    pub async fn dispatch(&self, endpoint: &str, request: Request) -> Result<Reply> {
        let handler = Operation::from_endpoint(endpoint)
            .and_then(|op| self.handlers.get(&op))
            .ok_or_else(|| AppError::BadRequest(format!("unknown endpoint: {}", endpoint)))?;
        handler.handle(&self.service, request).await
    }
}
