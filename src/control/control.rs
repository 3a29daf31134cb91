// SPDX-License-Identifier: GPL-2.0-or-later

//! Control Adapter: translates the control-plane's resource operations into
//! calls against the Channel Registry, Mountpoint Binder, Recording Broker
//! and Config. The HTTP transport (routing, auth, request parsing) is an
//! external collaborator; this module only performs the operation and
//! reports an outcome the transport layer maps onto a status code.

use broker::{RecordingBroker, RecordingSnapshot, ScheduleRejected};
use channels::ChannelRegistry;
use common::time::UnixNano;
use common::{CalendarUid, ChannelName, MountpointName, PipelineState};
use config::Config;
use mountpoints::MountpointBinder;
use std::path::Path;
use template::Variables;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSummary {
    pub name: ChannelName,
    pub r#type: String,
    pub state: PipelineState,
    pub number_of_restarts: u64,
}

/// `GET /api/v1/config` — the config document with `httpPassword` redacted.
#[must_use]
pub fn get_config(config: &Config) -> String {
    config.snapshot()
}

/// `GET /api/v1/channels`.
pub async fn get_channels(registry: &ChannelRegistry) -> Vec<ChannelSummary> {
    let mut out = Vec::with_capacity(registry.channels().count());
    for channel in registry.channels() {
        out.push(ChannelSummary {
            name: channel.name().clone(),
            r#type: channel.config().r#type.clone(),
            state: channel.state().await,
            number_of_restarts: channel.statistics().await.restart_count,
        });
    }
    out
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("channel '{0}' is not known")]
    UnknownChannel(ChannelName),

    #[error("mountpoint '{0}' is not known")]
    UnknownMountpoint(MountpointName),

    #[error("dot graph not yet available")]
    NotAvailable,
}

/// `GET /api/v1/channel/{name}/graph`.
pub async fn get_channel_graph(
    registry: &ChannelRegistry,
    name: &ChannelName,
) -> Result<Vec<u8>, GraphError> {
    let channel = registry
        .channel(name)
        .ok_or_else(|| GraphError::UnknownChannel(name.clone()))?;
    channel.dot_graph().await.ok_or(GraphError::NotAvailable)
}

/// `GET /api/v1/mountpoint/{name}/graph`.
pub fn get_mountpoint_graph(
    binder: &MountpointBinder,
    name: &MountpointName,
) -> Result<Vec<u8>, GraphError> {
    let mountpoint = binder
        .mountpoint(name)
        .ok_or_else(|| GraphError::UnknownMountpoint(name.clone()))?;
    mountpoint.dot_graph().ok_or(GraphError::NotAvailable)
}

/// Body of `POST /api/v1/recordings`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleRecordingRequest {
    pub video_channel: ChannelName,
    pub audio_channel: Option<ChannelName>,
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub scaled_width: Option<String>,
    pub scaled_height: Option<String>,
    pub deadline: UnixNano,
    /// Destination path relative to `scratchDirectory`. Its file stem is
    /// used as the recording's UID and its extension selects the recording
    /// template, mirroring how the Calendar Scheduler derives both from a
    /// due event's UID and the recording type the caller requests.
    pub path: String,
}

#[derive(Debug, Error)]
pub enum ScheduleRecordingError {
    #[error("path '{0}' has no file extension to select a recording template")]
    MissingExtension(String),

    #[error("path '{0}' is not a valid recording identifier: {1}")]
    InvalidUid(String, common::ParseCalendarUidError),

    #[error(transparent)]
    Rejected(#[from] ScheduleRejected),
}

/// `POST /api/v1/recordings`.
pub async fn post_recording(
    broker: &RecordingBroker,
    request: ScheduleRecordingRequest,
) -> Result<RecordingSnapshot, ScheduleRecordingError> {
    let path = Path::new(&request.path);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ScheduleRecordingError::MissingExtension(request.path.clone()))?
        .to_owned();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&request.path);

    let uid: CalendarUid = stem
        .to_owned()
        .try_into()
        .map_err(|e| ScheduleRecordingError::InvalidUid(request.path.clone(), e))?;

    let mut variables = Variables::new();
    variables.insert("VIDEOCHANNEL".to_owned(), request.video_channel.to_string());
    if let Some(audio_channel) = &request.audio_channel {
        variables.insert("AUDIOCHANNEL".to_owned(), audio_channel.to_string());
    }
    if let Some(v) = &request.video_bitrate {
        variables.insert("VIDEOBITRATE".to_owned(), v.clone());
    }
    if let Some(v) = &request.audio_bitrate {
        variables.insert("AUDIOBITRATE".to_owned(), v.clone());
    }
    if let Some(v) = &request.scaled_width {
        variables.insert("SCALEDWIDTH".to_owned(), v.clone());
    }
    if let Some(v) = &request.scaled_height {
        variables.insert("SCALEDHEIGHT".to_owned(), v.clone());
    }

    broker.start(uid, &ext, request.deadline, variables).await?;

    Ok(broker
        .list()
        .await
        .into_iter()
        .find(|r| r.path.file_stem().and_then(|s| s.to_str()) == Some(stem))
        .expect("broker.start just inserted this recording"))
}

/// `GET /api/v1/recordings`.
pub async fn get_recordings(broker: &RecordingBroker) -> Vec<RecordingSnapshot> {
    broker.list().await
}
