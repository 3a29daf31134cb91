// SPDX-License-Identifier: GPL-2.0-or-later

//! Default implementations of the media runtime, RTSP runtime, and calendar
//! feed source boundary traits. A real deployment links a GStreamer-style
//! pipeline engine, an RTSP server, and an HTTP+ICS calendar client in their
//! place; none of those are part of this workspace, so these adapters report
//! every operation as unavailable rather than pretend to perform it. The
//! supervisors and the calendar scheduler already treat that as a normal,
//! retried failure.

use async_trait::async_trait;
use calendar::{CalendarFeedSource, FetchError};
use common::CalendarEvent;
use mountpoints::rtsp::{RegisterMountError, RtspMount, RtspRuntime};
use supervisor::{MediaRuntime, ParsePipelineError, ParsedPipeline};

pub struct UnconfiguredMediaRuntime;

#[async_trait]
impl MediaRuntime for UnconfiguredMediaRuntime {
    async fn parse(&self, _description: &str) -> Result<ParsedPipeline, ParsePipelineError> {
        Err(ParsePipelineError("no media runtime configured".to_owned()))
    }
}

pub struct UnconfiguredRtspRuntime;

impl RtspRuntime for UnconfiguredRtspRuntime {
    fn register(
        &self,
        path: &str,
        _description: &str,
    ) -> Result<Box<dyn RtspMount>, RegisterMountError> {
        Err(RegisterMountError(
            path.to_owned(),
            "no rtsp runtime configured".to_owned(),
        ))
    }
}

pub struct UnconfiguredCalendarSource;

#[async_trait]
impl CalendarFeedSource for UnconfiguredCalendarSource {
    async fn fetch(&self) -> Result<Vec<CalendarEvent>, FetchError> {
        Err(FetchError("no calendar feed source configured".to_owned()))
    }
}
