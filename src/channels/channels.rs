// SPDX-License-Identifier: GPL-2.0-or-later

//! Channel Registry: builds one Pipeline Supervisor per configured channel at
//! start-up and keeps it running, restarting on error with a growing backoff.

use async_trait::async_trait;
use common::time::Duration;
use common::{
    ArcLogger, ChannelName, PipelineState, PipelineStats, Properties,
};
use profile::{PipelineForError, Profile, TemplateKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use supervisor::{BusMessage, MediaRuntime, Supervisor, SupervisorHooks};
use template::Variables;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub name: ChannelName,
    pub r#type: String,
    pub properties: Properties,
    /// Name of an `audioProviders` template to resolve and expose to this
    /// channel's pipeline template as `{AUDIOPROVIDER}`.
    pub audio_provider: Option<String>,
}

pub struct Channel {
    config: ChannelConfig,
    supervisor: Supervisor,
}

impl Channel {
    #[must_use]
    pub fn name(&self) -> &ChannelName {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    #[must_use]
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
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

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub name: ChannelName,
    pub state: PipelineState,
    pub stats: PipelineStats,
}

pub struct ChannelRegistry {
    channels: HashMap<ChannelName, Channel>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn channel(&self, name: &ChannelName) -> Option<&Channel> {
        self.channels.get(name)
    }

    #[must_use]
    pub fn supervisor_for(&self, name: &ChannelName) -> Option<&Supervisor> {
        self.channels.get(name).map(Channel::supervisor)
    }

    pub async fn snapshot(&self) -> Vec<ChannelSnapshot> {
        let mut out = Vec::with_capacity(self.channels.len());
        for channel in self.channels.values() {
            out.push(ChannelSnapshot {
                name: channel.name().clone(),
                state: channel.state().await,
                stats: channel.statistics().await,
            });
        }
        out
    }

    pub async fn dot_graph_for(&self, name: &ChannelName) -> Option<Vec<u8>> {
        self.channels.get(name)?.dot_graph().await
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }
}

#[derive(Debug, Error)]
pub enum BuildChannelsError {
    #[error("duplicate channel name: {0}")]
    DuplicateChannel(ChannelName),

    #[error("channel '{0}': {1}")]
    PipelineFor(ChannelName, PipelineForError),

    #[error("channel '{0}' audio provider: {1}")]
    AudioProvider(ChannelName, PipelineForError),
}

/// Builds a supervisor for each configured channel, starts it, and arms the
/// error-triggered restart policy for its lifetime. `token` scopes every
/// channel's supervisor and restart listener.
pub async fn start(
    configs: Vec<ChannelConfig>,
    profile: &Profile,
    runtime: Arc<dyn MediaRuntime>,
    outer_hooks: Arc<dyn SupervisorHooks>,
    logger: ArcLogger,
    token: &CancellationToken,
) -> Result<ChannelRegistry, BuildChannelsError> {
    let mut channels = HashMap::with_capacity(configs.len());

    for config in configs {
        if channels.contains_key(&config.name) {
            return Err(BuildChannelsError::DuplicateChannel(config.name));
        }

        let mut variables: Variables = config.properties.clone();
        variables.insert("CHANNELNAME".to_owned(), config.name.to_string());

        if let Some(provider) = &config.audio_provider {
            let audio_pipeline = profile
                .pipeline_for(TemplateKind::AudioProviders, provider, &variables)
                .map_err(|e| BuildChannelsError::AudioProvider(config.name.clone(), e))?;
            variables.insert("AUDIOPROVIDER".to_owned(), audio_pipeline);
        }

        let description = profile
            .pipeline_for(TemplateKind::Channels, &config.r#type, &variables)
            .map_err(|e| BuildChannelsError::PipelineFor(config.name.clone(), e))?;

        let (restart_tx, restart_rx) = mpsc::channel(4);
        let hooks = Arc::new(RestartHooks {
            outer: outer_hooks.clone(),
            restart_tx,
        });

        let supervisor_token = token.child_token();
        let sup = supervisor::spawn(
            config.name.clone(),
            description,
            runtime.clone(),
            hooks,
            logger.clone(),
            supervisor_token,
        );
        sup.start().await;

        spawn_restart_listener(sup.clone(), restart_rx, token.child_token());

        channels.insert(
            config.name.clone(),
            Channel {
                config,
                supervisor: sup,
            },
        );
    }

    Ok(ChannelRegistry { channels })
}

struct RestartHooks {
    outer: Arc<dyn SupervisorHooks>,
    restart_tx: mpsc::Sender<()>,
}

#[async_trait]
impl SupervisorHooks for RestartHooks {
    async fn on_state_changed(&self, name: &ChannelName, state: PipelineState) {
        if state == PipelineState::Error {
            let _ = self.restart_tx.send(()).await;
        }
        self.outer.on_state_changed(name, state).await;
    }

    async fn on_bus_event(&self, name: &ChannelName, msg: &BusMessage) {
        self.outer.on_bus_event(name, msg).await;
    }
}

/// One listener per channel. Collapses repeated error notifications that
/// arrive while a retry loop is already in flight: each failed attempt inside
/// that loop re-enters `Error` and fires another notification, which this
/// listener ignores rather than starting a second concurrent retry loop.
fn spawn_restart_listener(
    sup: Supervisor,
    mut restart_rx: mpsc::Receiver<()>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let retrying = Arc::new(AtomicBool::new(false));
        loop {
            tokio::select! {
                () = token.cancelled() => return,
                msg = restart_rx.recv() => {
                    let Some(()) = msg else { return; };
                    if retrying.swap(true, Ordering::SeqCst) {
                        continue;
                    }
                    let sup = sup.clone();
                    let flag = retrying.clone();
                    retry::spawn(
                        move || {
                            let sup = sup.clone();
                            let flag = flag.clone();
                            async move {
                                sup.restart().await;
                                let ok = sup.state().await == PipelineState::Playing;
                                if ok {
                                    flag.store(false, Ordering::SeqCst);
                                }
                                ok
                            }
                        },
                        Duration::from_secs(1),
                        Duration::from_secs(1),
                        Duration::from_secs(10),
                        &token,
                    );
                }
            }
        }
    });
}
