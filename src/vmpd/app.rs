// SPDX-License-Identifier: GPL-2.0-or-later

use crate::adapters::{UnconfiguredCalendarSource, UnconfiguredMediaRuntime, UnconfiguredRtspRuntime};
use async_trait::async_trait;
use broker::RecordingBroker;
use calendar::{CalendarConfig, CalendarFeedSource, CalendarHooks};
use channels::{ChannelConfig, ChannelRegistry};
use common::time::Duration as CalDuration;
use common::{CalendarEvent, ChannelName, ILogger, LogEntry, LogLevel, ParsePlatformTagError, PlatformTag, PLATFORM_ALL};
use config::Config;
use log::Logger;
use mountpoints::rtsp::RtspRuntime;
use mountpoints::{MountpointBinder, MountpointConfig};
use profile::NoCompatibleProfile;
use std::path::PathBuf;
use std::sync::Arc;
use supervisor::MediaRuntime;
use template::Variables;
use thiserror::Error;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Recording template every calendar-triggered recording resolves through.
/// `CalendarEvent` carries no recording-type field of its own (unlike the
/// control plane's `POST /api/v1/recordings`, which derives one from its
/// request path), so the scheduler always asks for this one.
const CALENDAR_RECORDING_TYPE: &str = "mp4";

const CALENDAR_POLL_INTERVAL_SECS: u32 = 60;

/// Upper bound on each stage of the shutdown sequence (calendar scheduler,
/// then channel supervisors, then the RTSP runtime).
const SHUTDOWN_STAGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunError {
    #[error("load config: {0}")]
    Config(#[from] config::ConfigNewError),

    #[error("platform override: {0}")]
    PlatformTag(#[from] ParsePlatformTagError),

    #[error("load profiles: {0}")]
    LoadProfiles(#[from] profile::LoadProfilesError),

    #[error("select active profile: {0}")]
    SelectProfile(#[from] NoCompatibleProfile),

    #[error("start channels: {0}")]
    StartChannels(#[from] channels::BuildChannelsError),

    #[error("bind mountpoints: {0}")]
    BindMountpoints(#[from] mountpoints::BindMountpointsError),

    #[error("listen on sigterm: {0}")]
    SigTermListener(std::io::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        use RunError::*;
        match self {
            Config(_) | PlatformTag(_) => 1,
            LoadProfiles(_) | SelectProfile(_) => 2,
            StartChannels(_) | BindMountpoints(_) | SigTermListener(_) => 3,
        }
    }
}

pub async fn run(config_path: &PathBuf) -> Result<(), RunError> {
    let app = App::new(config_path).await?;
    let mut shutdown_complete_rx = app.run()?;
    shutdown_complete_rx.recv().await;
    Ok(())
}

/// Handles a control-plane transport needs to serve spec.md section 6's
/// resources. The HTTP routing itself lives outside this workspace; this is
/// the seam it would be wired in through.
#[derive(Clone)]
pub struct ControlHandles {
    pub config: Arc<Config>,
    pub channels: Arc<ChannelRegistry>,
    pub mountpoints: Arc<MountpointBinder>,
    pub broker: Arc<RecordingBroker>,
}

pub struct App {
    token: CancellationToken,
    config: Arc<Config>,
    logger: Arc<Logger>,
    shutdown_complete_tx: mpsc::Sender<()>,
    shutdown_complete_rx: mpsc::Receiver<()>,
    channels: Arc<ChannelRegistry>,
    channel_order: Vec<ChannelName>,
    mountpoints: Arc<MountpointBinder>,
    broker: Arc<RecordingBroker>,
    calendar_token: CancellationToken,
    calendar_handle: tokio::task::JoinHandle<()>,
}

impl App {
    pub async fn new(config_path: &PathBuf) -> Result<App, RunError> {
        let token = CancellationToken::new();
        let config = Config::load(config_path)?;
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel::<()>(1);

        let logger: Arc<Logger> = Arc::new(Logger::default());

        let platform = match config.platform_override() {
            Some(tag) => PlatformTag::try_from(tag.to_owned())?,
            None => PlatformTag::try_from(PLATFORM_ALL.to_owned())
                .expect("built-in platform tag is valid"),
        };
        let profiles = profile::load_profiles(config.profile_directory())?;
        let profile = Arc::new(profile::select_active(&profiles, &platform)?.clone());

        let media_runtime: Arc<dyn MediaRuntime> = Arc::new(UnconfiguredMediaRuntime);
        let rtsp_runtime: Arc<dyn RtspRuntime> = Arc::new(UnconfiguredRtspRuntime);

        let channel_configs: Vec<ChannelConfig> = config
            .channels()
            .iter()
            .map(|c| ChannelConfig {
                name: c.name.clone(),
                r#type: c.r#type.clone(),
                properties: c.properties.clone(),
                audio_provider: c.audio_provider.clone(),
            })
            .collect();
        let channel_order: Vec<ChannelName> = channel_configs.iter().map(|c| c.name.clone()).collect();

        let channels = channels::start(
            channel_configs,
            &profile,
            media_runtime.clone(),
            supervisor::dummy_hooks(),
            logger.clone(),
            &token,
        )
        .await?;

        let mountpoint_configs: Vec<MountpointConfig> = config
            .mountpoints()
            .iter()
            .map(|m| MountpointConfig {
                name: m.name.clone(),
                path: m.path.clone(),
                r#type: m.r#type.clone(),
                properties: m.properties.clone(),
            })
            .collect();

        let mountpoints = mountpoints::bind(mountpoint_configs, &profile, rtsp_runtime.as_ref())?;

        let broker = Arc::new(RecordingBroker::new(
            profile.clone(),
            media_runtime.clone(),
            config.scratch_directory().to_path_buf(),
            logger.clone(),
            token.child_token(),
        ));

        let calendar_token = token.child_token();
        let calendar_source: Arc<dyn CalendarFeedSource> = Arc::new(UnconfiguredCalendarSource);
        let calendar_hooks: Arc<dyn CalendarHooks> = Arc::new(RecordingCalendarHooks {
            broker: broker.clone(),
            logger: logger.clone(),
        });
        let calendar_handle = calendar::spawn(
            calendar_source,
            CalendarConfig {
                locations: config.locations().to_vec(),
                poll_interval: CalDuration::from_secs(CALENDAR_POLL_INTERVAL_SECS),
            },
            calendar_hooks,
            logger.clone(),
            calendar_token.clone(),
        );

        Ok(App {
            token,
            config: Arc::new(config),
            logger,
            shutdown_complete_tx,
            shutdown_complete_rx,
            channels: Arc::new(channels),
            channel_order,
            mountpoints: Arc::new(mountpoints),
            broker,
            calendar_token,
            calendar_handle,
        })
    }

    #[must_use]
    pub fn control_handles(&self) -> ControlHandles {
        ControlHandles {
            config: self.config.clone(),
            channels: self.channels.clone(),
            mountpoints: self.mountpoints.clone(),
            broker: self.broker.clone(),
        }
    }

    // `App` must be dropped when this returns.
    pub fn run(self) -> Result<mpsc::Receiver<()>, RunError> {
        let App {
            token,
            config,
            logger,
            shutdown_complete_tx,
            shutdown_complete_rx,
            channels,
            channel_order,
            mountpoints,
            broker,
            calendar_token,
            calendar_handle,
        } = self;

        logger.log(LogEntry::new(
            LogLevel::Info,
            "app",
            None,
            format!(
                "vmpd '{}' running, control plane on port {}",
                config.name(),
                config.http_port()
            ),
        ));

        let shutdown_token = token.clone();
        let shutdown_logger = logger.clone();
        tokio::spawn(async move {
            shutdown_token.cancelled().await;

            shutdown_logger.log(LogEntry::new(
                LogLevel::Info,
                "app",
                None,
                "stopping calendar scheduler".to_owned(),
            ));
            calendar_token.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_STAGE_TIMEOUT, calendar_handle).await;

            shutdown_logger.log(LogEntry::new(
                LogLevel::Info,
                "app",
                None,
                "stopping channel supervisors".to_owned(),
            ));
            for name in channel_order.iter().rev() {
                if let Some(sup) = channels.supervisor_for(name) {
                    let _ = tokio::time::timeout(SHUTDOWN_STAGE_TIMEOUT, sup.stop()).await;
                }
            }

            // Dropping the binder releases its registered mounts, ending the
            // RTSP runtime's reference to each one.
            drop(mountpoints);
            drop(broker);
            drop(shutdown_complete_tx);
        });

        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RunError::SigTermListener)?;
        tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    match result {
                        Ok(()) => eprintln!("\nreceived interrupt, stopping..\n"),
                        Err(e) => eprintln!("\ninterrupt error: {e}"),
                    }
                }
                _ = sigterm.recv() => eprintln!("\nreceived terminate, stopping..\n"),
            }
            token.cancel();
        });

        Ok(shutdown_complete_rx)
    }
}

struct RecordingCalendarHooks {
    broker: Arc<RecordingBroker>,
    logger: Arc<Logger>,
}

#[async_trait]
impl CalendarHooks for RecordingCalendarHooks {
    async fn on_event_due(&self, event: CalendarEvent) {
        let mut variables = Variables::new();
        variables.insert("SUMMARY".to_owned(), event.summary.clone());
        variables.insert("LOCATION".to_owned(), event.location.clone());

        if let Err(e) = self
            .broker
            .start(
                event.uid.clone(),
                CALENDAR_RECORDING_TYPE,
                event.end_date,
                variables,
            )
            .await
        {
            self.logger.log(LogEntry::new(
                LogLevel::Error,
                "app",
                None,
                format!("schedule recording for event '{}': {e}", event.uid),
            ));
        }
    }
}
