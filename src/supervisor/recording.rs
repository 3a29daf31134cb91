// SPDX-License-Identifier: GPL-2.0-or-later

//! Recording Supervisor: a Pipeline Supervisor bound to a deadline. At the
//! deadline it injects an end-of-stream so the file sink can finalise, and
//! force-stops after a grace period if that flush never completes.

use crate::hooks::SupervisorHooks;
use crate::pipeline::{self, Supervisor};
use crate::runtime::{BusMessage, MediaRuntime};
use async_trait::async_trait;
use common::time::{Duration, UnixNano};
use common::{ArcLogger, ChannelName, LogEntry, LogLevel, PipelineState, PipelineStats};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Grace period after deadline EOS injection before the recording is force-stopped.
const FLUSH_GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(10);

/// Reported when a recording's deadline passed but the pipeline never reached
/// a terminal state within the grace period, so it was stopped forcibly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IncompleteFlush;

pub struct RecordingSupervisor {
    supervisor: Supervisor,
    path: PathBuf,
    incomplete_flush: Arc<AtomicBool>,
}

impl RecordingSupervisor {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn incomplete_flush(&self) -> Option<IncompleteFlush> {
        self.incomplete_flush
            .load(Ordering::SeqCst)
            .then_some(IncompleteFlush)
    }

    pub async fn start(&self) -> bool {
        self.supervisor.start().await
    }

    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    pub async fn state(&self) -> PipelineState {
        self.supervisor.state().await
    }

    pub async fn statistics(&self) -> PipelineStats {
        self.supervisor.statistics().await
    }

    pub async fn dot_graph(&self) -> Option<Vec<u8>> {
        self.supervisor.dot_graph().await
    }
}

struct RecordingHooks {
    outer: Arc<dyn SupervisorHooks>,
    terminal: Arc<Notify>,
}

#[async_trait]
impl SupervisorHooks for RecordingHooks {
    async fn on_state_changed(&self, name: &ChannelName, state: PipelineState) {
        if matches!(state, PipelineState::EndOfStream | PipelineState::Error) {
            self.terminal.notify_one();
        }
        self.outer.on_state_changed(name, state).await;
    }

    async fn on_bus_event(&self, name: &ChannelName, msg: &BusMessage) {
        self.outer.on_bus_event(name, msg).await;
    }
}

/// Spawns a recording's pipeline supervisor and its deadline watcher. `token`
/// scopes both the pipeline and the watcher; cancelling it tears the
/// recording down without marking it as an incomplete flush.
#[must_use]
pub fn spawn_recording(
    name: ChannelName,
    description: String,
    path: PathBuf,
    deadline: UnixNano,
    runtime: Arc<dyn MediaRuntime>,
    hooks: Arc<dyn SupervisorHooks>,
    logger: ArcLogger,
    token: CancellationToken,
) -> RecordingSupervisor {
    let terminal = Arc::new(Notify::new());
    let incomplete_flush = Arc::new(AtomicBool::new(false));
    let wrapped_hooks = Arc::new(RecordingHooks {
        outer: hooks,
        terminal: terminal.clone(),
    });

    let supervisor = pipeline::spawn(
        name.clone(),
        description,
        runtime,
        wrapped_hooks,
        logger.clone(),
        token.child_token(),
    );

    tokio::spawn(watch_deadline(
        supervisor.clone(),
        name,
        deadline,
        terminal,
        incomplete_flush.clone(),
        logger,
        token.child_token(),
    ));

    RecordingSupervisor {
        supervisor,
        path,
        incomplete_flush,
    }
}

async fn watch_deadline(
    supervisor: Supervisor,
    name: ChannelName,
    deadline: UnixNano,
    terminal: Arc<Notify>,
    incomplete_flush: Arc<AtomicBool>,
    logger: ArcLogger,
    token: CancellationToken,
) {
    let wait = Duration::until(deadline)
        .and_then(|d| d.as_std())
        .unwrap_or_default();

    tokio::select! {
        () = token.cancelled() => return,
        () = tokio::time::sleep(wait) => {}
    }

    let _ = supervisor.send_eos().await;

    tokio::select! {
        () = token.cancelled() => {}
        () = terminal.notified() => {
            supervisor.stop().await;
        }
        () = tokio::time::sleep(FLUSH_GRACE_PERIOD) => {
            incomplete_flush.store(true, Ordering::SeqCst);
            logger.log(LogEntry::new(
                LogLevel::Warning,
                "supervisor",
                Some(name),
                "recording flush grace period expired, forcing stop".to_owned(),
            ));
            supervisor.stop().await;
        }
    }
}
