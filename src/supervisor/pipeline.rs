// SPDX-License-Identifier: GPL-2.0-or-later

//! Pipeline Supervisor: owns one media pipeline, drives its state machine,
//! and reports transitions and bus events to a delegate. Restart policy is
//! not decided here — the owner (channel registry, recording broker, ...)
//! decides whether and how to call `restart()` from `on_state_changed`.

use crate::hooks::SupervisorHooks;
use crate::runtime::{BusMessage, MediaRuntime, RuntimeState, StateChangeError};
use common::{ArcLogger, ChannelName, LogEntry, LogLevel, PipelineState, PipelineStats};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

enum Request {
    Start(oneshot::Sender<bool>),
    Stop(oneshot::Sender<()>),
    Restart(oneshot::Sender<()>),
    State(oneshot::Sender<PipelineState>),
    Statistics(oneshot::Sender<PipelineStats>),
    DotGraph(oneshot::Sender<Option<Vec<u8>>>),
    Eos(oneshot::Sender<Result<(), StateChangeError>>),
    Bus(BusMessage),
}

/// Cheap, cloneable handle to a running supervisor actor.
#[derive(Clone)]
pub struct Supervisor {
    tx: mpsc::Sender<Request>,
}

impl Supervisor {
    /// Requests `Created -> Playing`. No-op (returns `true`) unless the
    /// supervisor is currently `Created`, `Error`, or `EndOfStream`.
    pub async fn start(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::Start(tx)).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Requests the runtime `Null` state and detaches the pipeline. Idempotent.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::Stop(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Schedules a stop+start on the supervisor's own serial context. Safe to
    /// call from any context; back-to-back calls serialize rather than race.
    pub async fn restart(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::Restart(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn state(&self) -> PipelineState {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::State(tx)).await.is_err() {
            return PipelineState::Error;
        }
        rx.await.unwrap_or(PipelineState::Error)
    }

    pub async fn statistics(&self) -> PipelineStats {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::Statistics(tx)).await.is_err() {
            return PipelineStats::default();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn dot_graph(&self) -> Option<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Request::DotGraph(tx)).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Injects an end-of-stream event into the live pipeline, if any. A no-op
    /// (returns `Ok`) when the supervisor isn't currently `Playing`.
    pub async fn send_eos(&self) -> Result<(), StateChangeError> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::Eos(tx)).await.is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }
}

/// Spawns a supervisor actor for `name`, owning `description`. `token` scopes
/// the actor's lifetime and its bus pump task.
#[must_use]
pub fn spawn(
    name: ChannelName,
    description: String,
    runtime: Arc<dyn MediaRuntime>,
    hooks: Arc<dyn SupervisorHooks>,
    logger: ArcLogger,
    token: CancellationToken,
) -> Supervisor {
    let (tx, rx) = mpsc::channel(16);
    let actor = Actor {
        name,
        description,
        runtime,
        hooks,
        logger,
        state: PipelineState::Created,
        stats: PipelineStats::default(),
        handle: None,
        bus_task: None,
        token,
        self_tx: tx.clone(),
    };
    tokio::spawn(actor.run(rx));
    Supervisor { tx }
}

struct Actor {
    name: ChannelName,
    description: String,
    runtime: Arc<dyn MediaRuntime>,
    hooks: Arc<dyn SupervisorHooks>,
    logger: ArcLogger,
    state: PipelineState,
    stats: PipelineStats,
    handle: Option<Box<dyn crate::runtime::PipelineHandle>>,
    bus_task: Option<tokio::task::JoinHandle<()>>,
    token: CancellationToken,
    self_tx: mpsc::Sender<Request>,
}

impl Actor {
    fn log(&self, level: LogLevel, msg: &str) {
        self.logger.log(LogEntry::new(
            level,
            "supervisor",
            Some(self.name.clone()),
            msg.to_owned(),
        ));
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        loop {
            tokio::select! {
                () = self.token.cancelled() => {
                    self.do_stop().await;
                    return;
                }
                req = rx.recv() => {
                    let Some(req) = req else { return; };
                    self.handle_request(req).await;
                }
            }
        }
    }

    async fn handle_request(&mut self, req: Request) {
        match req {
            Request::Start(resp) => {
                let ok = self.do_start().await;
                let _ = resp.send(ok);
            }
            Request::Stop(resp) => {
                self.do_stop().await;
                let _ = resp.send(());
            }
            Request::Restart(resp) => {
                self.stats.restart_count += 1;
                self.do_stop().await;
                let _ = self.do_start().await;
                let _ = resp.send(());
            }
            Request::State(resp) => {
                let _ = resp.send(self.state);
            }
            Request::Statistics(resp) => {
                let _ = resp.send(self.stats);
            }
            Request::DotGraph(resp) => {
                let _ = resp.send(self.handle.as_ref().and_then(|h| h.dot_graph()));
            }
            Request::Eos(resp) => {
                let result = match &self.handle {
                    Some(handle) => handle.send_eos(),
                    None => Ok(()),
                };
                let _ = resp.send(result);
            }
            Request::Bus(msg) => self.handle_bus(msg).await,
        }
    }

    async fn do_start(&mut self) -> bool {
        if !matches!(
            self.state,
            PipelineState::Created | PipelineState::Error | PipelineState::EndOfStream
        ) {
            return true;
        }

        let parsed = match self.runtime.parse(&self.description).await {
            Ok(parsed) => parsed,
            Err(e) => {
                self.log(LogLevel::Error, &format!("parse pipeline: {e}"));
                self.set_state(PipelineState::Error).await;
                return false;
            }
        };

        if let Err(e) = parsed.handle.request_state(RuntimeState::Playing) {
            self.log(LogLevel::Error, &format!("request playing state: {e}"));
            self.set_state(PipelineState::Error).await;
            return false;
        }

        self.handle = Some(parsed.handle);
        self.set_state(PipelineState::Playing).await;

        let self_tx = self.self_tx.clone();
        let mut bus = parsed.bus;
        self.bus_task = Some(tokio::spawn(async move {
            while let Some(msg) = bus.recv().await {
                if self_tx.send(Request::Bus(msg)).await.is_err() {
                    break;
                }
            }
        }));

        true
    }

    async fn do_stop(&mut self) {
        // "Requesting stop() in Error is a no-op."
        if self.state == PipelineState::Error {
            return;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.request_state(RuntimeState::Null);
        }
        if let Some(task) = self.bus_task.take() {
            task.abort();
        }
        self.set_state(PipelineState::Created).await;
    }

    async fn handle_bus(&mut self, msg: BusMessage) {
        self.hooks.on_bus_event(&self.name, &msg).await;
        match msg {
            BusMessage::Eos => {
                if self.state == PipelineState::Playing {
                    self.set_state(PipelineState::EndOfStream).await;
                }
            }
            BusMessage::Error(reason) => {
                if self.state == PipelineState::Playing {
                    self.log(LogLevel::Error, &format!("bus error: {reason}"));
                    self.set_state(PipelineState::Error).await;
                }
            }
            BusMessage::Other(_) => {}
        }
    }

    async fn set_state(&mut self, new: PipelineState) {
        self.state = new;
        self.hooks.on_state_changed(&self.name, new).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::DummyHooks;
    use crate::runtime::{ParsedPipeline, ParsePipelineError, StateChangeError};
    use async_trait::async_trait;
    use common::DummyLogger;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DummyHandle {
        fail_state_change: bool,
    }

    impl crate::runtime::PipelineHandle for DummyHandle {
        fn request_state(&self, _state: RuntimeState) -> Result<(), StateChangeError> {
            if self.fail_state_change {
                return Err(StateChangeError("nope".to_owned()));
            }
            Ok(())
        }
        fn send_eos(&self) -> Result<(), StateChangeError> {
            Ok(())
        }
        fn dot_graph(&self) -> Option<Vec<u8>> {
            Some(b"digraph{}".to_vec())
        }
    }

    struct DummyRuntime {
        should_fail_parse: AtomicBool,
    }

    #[async_trait]
    impl MediaRuntime for DummyRuntime {
        async fn parse(&self, _description: &str) -> Result<ParsedPipeline, ParsePipelineError> {
            if self.should_fail_parse.load(Ordering::SeqCst) {
                return Err(ParsePipelineError("malformed".to_owned()));
            }
            let (_tx, rx) = mpsc::channel(4);
            Ok(ParsedPipeline {
                handle: Box::new(DummyHandle {
                    fail_state_change: false,
                }),
                bus: rx,
            })
        }
    }

    fn name(s: &str) -> ChannelName {
        s.to_owned().try_into().unwrap()
    }

    #[tokio::test]
    async fn start_success_transitions_to_playing() {
        let runtime = Arc::new(DummyRuntime {
            should_fail_parse: AtomicBool::new(false),
        });
        let sup = spawn(
            name("cam1"),
            "videotestsrc".to_owned(),
            runtime,
            Arc::new(DummyHooks),
            DummyLogger::new(),
            CancellationToken::new(),
        );

        assert!(sup.start().await);
        assert_eq!(PipelineState::Playing, sup.state().await);
    }

    #[tokio::test]
    async fn parse_failure_sets_error_and_leaves_restart_count() {
        let runtime = Arc::new(DummyRuntime {
            should_fail_parse: AtomicBool::new(true),
        });
        let sup = spawn(
            name("cam1"),
            "malformed".to_owned(),
            runtime,
            Arc::new(DummyHooks),
            DummyLogger::new(),
            CancellationToken::new(),
        );

        assert!(!sup.start().await);
        assert_eq!(PipelineState::Error, sup.state().await);
        assert_eq!(0, sup.statistics().await.restart_count);
    }

    #[tokio::test]
    async fn restart_increments_restart_count() {
        let runtime = Arc::new(DummyRuntime {
            should_fail_parse: AtomicBool::new(false),
        });
        let sup = spawn(
            name("cam1"),
            "videotestsrc".to_owned(),
            runtime,
            Arc::new(DummyHooks),
            DummyLogger::new(),
            CancellationToken::new(),
        );

        assert!(sup.start().await);
        sup.restart().await;
        sup.restart().await;
        assert_eq!(2, sup.statistics().await.restart_count);
        assert_eq!(PipelineState::Playing, sup.state().await);
    }

    #[tokio::test]
    async fn stop_in_error_is_noop() {
        let runtime = Arc::new(DummyRuntime {
            should_fail_parse: AtomicBool::new(true),
        });
        let sup = spawn(
            name("cam1"),
            "malformed".to_owned(),
            runtime,
            Arc::new(DummyHooks),
            DummyLogger::new(),
            CancellationToken::new(),
        );
        sup.start().await;
        assert_eq!(PipelineState::Error, sup.state().await);
        sup.stop().await;
        assert_eq!(PipelineState::Error, sup.state().await);
    }
}
