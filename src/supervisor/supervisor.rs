// SPDX-License-Identifier: GPL-2.0-or-later

//! Pipeline Supervisor and Recording Supervisor.

pub mod hooks;
pub mod pipeline;
pub mod recording;
pub mod runtime;

pub use hooks::{dummy_hooks, DummyHooks, SupervisorHooks};
pub use pipeline::{spawn, Supervisor};
pub use recording::{spawn_recording, IncompleteFlush, RecordingSupervisor};
pub use runtime::{
    BusMessage, MediaRuntime, ParsePipelineError, ParsedPipeline, PipelineHandle, RuntimeState,
    StateChangeError,
};
