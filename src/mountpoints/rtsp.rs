// SPDX-License-Identifier: GPL-2.0-or-later

//! Boundary trait towards the RTSP publishing runtime: an opaque server that
//! accepts a mount path and a pipeline description at registration time. The
//! server's own connection handling and reconnect behaviour are external.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("register mount path '{0}': {1}")]
pub struct RegisterMountError(pub String, pub String);

/// Opaque handle to a mount registered with the RTSP runtime.
pub trait RtspMount: Send + Sync {
    /// Dot-graph introspection dump. `None` until the runtime first
    /// materialises the pipeline for a connecting client; implementations
    /// populate it out-of-band (e.g. behind a `Mutex`) once that hook fires,
    /// so callers should query this fresh rather than cache the result.
    fn dot_graph(&self) -> Option<Vec<u8>>;
}

pub trait RtspRuntime: Send + Sync {
    /// `path` is the RTSP mount path (e.g. `/live/cam1`), distinct from the
    /// mountpoint's configured name used for lookups and logging.
    fn register(
        &self,
        path: &str,
        description: &str,
    ) -> Result<Box<dyn RtspMount>, RegisterMountError>;
}
