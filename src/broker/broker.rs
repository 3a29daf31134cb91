// SPDX-License-Identifier: GPL-2.0-or-later

//! Recording Broker: turns a schedule request (from the Calendar Scheduler's
//! due-event hook, or a direct control-plane call) into a Recording
//! Supervisor, enforcing at most one active recording per UID and rejecting
//! requests whose deadline has already passed.

use async_trait::async_trait;
use common::time::UnixNano;
use common::{
    ArcLogger, CalendarUid, ChannelName, PipelineState, PipelineStats, CHANNEL_NAME_MAX_LENGTH,
};
use profile::{PipelineForError, Profile};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use supervisor::{recording, IncompleteFlush, MediaRuntime, RecordingSupervisor};
use template::Variables;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingSnapshot {
    pub uid: CalendarUid,
    pub path: PathBuf,
    pub state: PipelineState,
    pub stats: PipelineStats,
    pub incomplete_flush: Option<IncompleteFlush>,
}

/// Reasons a schedule request is rejected, named to match the control-plane's
/// `ScheduleRejected` error kind.
#[derive(Debug, Error)]
pub enum ScheduleRejected {
    #[error("recording already active for uid '{0}'")]
    UidActive(CalendarUid),

    #[error("deadline for uid '{0}' has already passed")]
    DeadlinePast(CalendarUid),

    #[error("uid '{0}': {1}")]
    TemplateError(CalendarUid, PipelineForError),
}

struct Active {
    supervisor: Arc<RecordingSupervisor>,
}

pub struct RecordingBroker {
    profile: Arc<Profile>,
    runtime: Arc<dyn MediaRuntime>,
    recordings_dir: PathBuf,
    logger: ArcLogger,
    token: CancellationToken,
    active: Mutex<HashMap<CalendarUid, Active>>,
}

impl RecordingBroker {
    #[must_use]
    pub fn new(
        profile: Arc<Profile>,
        runtime: Arc<dyn MediaRuntime>,
        recordings_dir: PathBuf,
        logger: ArcLogger,
        token: CancellationToken,
    ) -> Self {
        Self {
            profile,
            runtime,
            recordings_dir,
            logger,
            token,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a recording identified by `uid`, using the `recording_type`
    /// template (whose name doubles as the recording file's extension) and
    /// ending no later than `deadline`. Rejects a second concurrent
    /// recording for the same `uid`, and any request whose deadline has
    /// already passed.
    ///
    /// `variables` carries the template substitutions specific to the
    /// caller (e.g. `VIDEOCHANNEL`/`AUDIOCHANNEL` for a control-plane
    /// request, or `SUMMARY`/`LOCATION` for a calendar-driven one); `UID` is
    /// always added by this call.
    pub async fn start(
        &self,
        uid: CalendarUid,
        recording_type: &str,
        deadline: UnixNano,
        mut variables: Variables,
    ) -> Result<Arc<RecordingSupervisor>, ScheduleRejected> {
        {
            let active = self.active.lock().expect("lock poisoned");
            if active.contains_key(&uid) {
                return Err(ScheduleRejected::UidActive(uid));
            }
        }

        if deadline.before(UnixNano::now()) {
            return Err(ScheduleRejected::DeadlinePast(uid));
        }

        variables.insert("UID".to_owned(), uid.to_string());

        let description = self
            .profile
            .pipeline_for(profile::TemplateKind::Recordings, recording_type, &variables)
            .map_err(|e| ScheduleRejected::TemplateError(uid.clone(), e))?;

        let path = self
            .recordings_dir
            .join(format!("{}.{recording_type}", *uid));
        let identity = recording_identity(&uid);

        let sup = recording::spawn_recording(
            identity,
            description,
            path.clone(),
            deadline,
            self.runtime.clone(),
            supervisor::dummy_hooks(),
            self.logger.clone(),
            self.token.child_token(),
        );
        sup.start().await;

        let sup = Arc::new(sup);
        self.active.lock().expect("lock poisoned").insert(
            uid.clone(),
            Active {
                supervisor: sup.clone(),
            },
        );

        Ok(sup)
    }

    /// Drops recordings that reached a terminal state, then returns a
    /// snapshot of everything still tracked.
    pub async fn list(&self) -> Vec<RecordingSnapshot> {
        let entries: Vec<(CalendarUid, Arc<RecordingSupervisor>)> = {
            let active = self.active.lock().expect("lock poisoned");
            active
                .iter()
                .map(|(uid, a)| (uid.clone(), a.supervisor.clone()))
                .collect()
        };

        let mut out = Vec::with_capacity(entries.len());
        let mut finished = Vec::new();
        for (uid, sup) in entries {
            let state = sup.state().await;
            if matches!(state, PipelineState::EndOfStream | PipelineState::Error) {
                finished.push(uid.clone());
            }
            out.push(RecordingSnapshot {
                uid,
                path: sup.path().to_path_buf(),
                state,
                stats: sup.statistics().await,
                incomplete_flush: sup.incomplete_flush(),
            });
        }

        if !finished.is_empty() {
            let mut active = self.active.lock().expect("lock poisoned");
            for uid in finished {
                active.remove(&uid);
            }
        }

        out
    }
}

/// Derives a valid `ChannelName` from an arbitrary iCalendar UID for use as
/// the recording's supervisor/logging identity.
fn recording_identity(uid: &CalendarUid) -> ChannelName {
    let mut s: String = uid
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    if s.is_empty() {
        s = "recording".to_owned();
    }
    s.truncate(CHANNEL_NAME_MAX_LENGTH);
    ChannelName::try_from(s).expect("sanitized string is a valid channel name")
}

#[cfg(test)]
mod tests {
    use super::*;
    use supervisor::{ParsePipelineError, ParsedPipeline, PipelineHandle, RuntimeState, StateChangeError};
    use tokio::sync::mpsc;

    struct DummyHandle;
    impl PipelineHandle for DummyHandle {
        fn request_state(&self, _state: RuntimeState) -> Result<(), StateChangeError> {
            Ok(())
        }
        fn send_eos(&self) -> Result<(), StateChangeError> {
            Ok(())
        }
        fn dot_graph(&self) -> Option<Vec<u8>> {
            None
        }
    }

    struct DummyRuntime;
    #[async_trait]
    impl MediaRuntime for DummyRuntime {
        async fn parse(&self, _description: &str) -> Result<ParsedPipeline, ParsePipelineError> {
            let (_tx, rx) = mpsc::channel(4);
            Ok(ParsedPipeline {
                handle: Box::new(DummyHandle),
                bus: rx,
            })
        }
    }

    fn test_profile(dir: &tempfile::TempDir) -> Profile {
        std::fs::write(
            dir.path().join("a.json"),
            r#"{
                "identifier": "org.test.profile",
                "version": "1",
                "supportedPlatforms": ["all"],
                "recordings": {"event": "rtspsrc location=rtsp://localhost/{UID} ! filesink"}
            }"#,
        )
        .unwrap();
        profile::load_profiles(dir.path()).unwrap().remove(0)
    }

    fn test_uid(uid: &str) -> CalendarUid {
        uid.to_owned().try_into().unwrap()
    }

    fn far_deadline() -> UnixNano {
        UnixNano::now()
            .add_duration(common::time::Duration::from_secs(3600))
            .unwrap()
    }

    fn broker(dir: &tempfile::TempDir) -> RecordingBroker {
        RecordingBroker::new(
            Arc::new(test_profile(dir)),
            Arc::new(DummyRuntime),
            dir.path().to_path_buf(),
            common::DummyLogger::new(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn starts_and_lists_a_recording() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker(&dir);
        let uid = test_uid("evt-1");

        broker
            .start(uid, "event", far_deadline(), Variables::new())
            .await
            .unwrap();

        let list = broker.list().await;
        assert_eq!(1, list.len());
        assert_eq!(PipelineState::Playing, list[0].state);
    }

    #[tokio::test]
    async fn duplicate_uid_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker(&dir);
        let uid = test_uid("evt-1");

        broker
            .start(uid.clone(), "event", far_deadline(), Variables::new())
            .await
            .unwrap();

        let err = broker
            .start(uid, "event", far_deadline(), Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleRejected::UidActive(_)));
    }

    #[tokio::test]
    async fn past_deadline_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker(&dir);
        let uid = test_uid("evt-1");
        let past = UnixNano::now()
            .sub_duration(common::time::Duration::from_secs(10))
            .unwrap();

        let err = broker
            .start(uid, "event", past, Variables::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleRejected::DeadlinePast(_)));
    }
}
