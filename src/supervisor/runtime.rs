// SPDX-License-Identifier: GPL-2.0-or-later

//! Boundary traits towards the media runtime: an opaque pipeline engine that
//! accepts a description string, returns an opaque handle, and emits
//! asynchronous bus messages. The runtime itself (element factories, clock,
//! dot-graph rendering) is an external collaborator; this module only
//! describes the shape the core depends on.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
#[error("pipeline parse error: {0}")]
pub struct ParsePipelineError(pub String);

/// A request to move the pipeline towards a runtime state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeState {
    Playing,
    Null,
}

#[derive(Debug, Error)]
#[error("state change error: {0}")]
pub struct StateChangeError(pub String);

/// Bus message emitted asynchronously by a live pipeline.
#[derive(Clone, Debug)]
pub enum BusMessage {
    Eos,
    Error(String),
    Other(String),
}

/// Opaque handle to a parsed, owned pipeline.
pub trait PipelineHandle: Send + Sync {
    /// Requests a state change. Returns synchronously from the runtime's API
    /// even though the runtime may defer the transition internally.
    fn request_state(&self, state: RuntimeState) -> Result<(), StateChangeError>;

    /// Injects an end-of-stream event so a file sink can finalise headers.
    fn send_eos(&self) -> Result<(), StateChangeError>;

    /// Returns the runtime's dot-graph introspection dump, or `None` if
    /// unavailable.
    fn dot_graph(&self) -> Option<Vec<u8>>;
}

/// A parsed pipeline together with the bus message stream the runtime emits
/// for it.
pub struct ParsedPipeline {
    pub handle: Box<dyn PipelineHandle>,
    pub bus: mpsc::Receiver<BusMessage>,
}

#[async_trait]
pub trait MediaRuntime: Send + Sync {
    async fn parse(&self, description: &str) -> Result<ParsedPipeline, ParsePipelineError>;
}
