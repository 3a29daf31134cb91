// SPDX-License-Identifier: GPL-2.0-or-later

pub mod time;

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, convert::TryFrom, fmt, ops::Deref, str::FromStr, sync::Arc};
use thiserror::Error;
use time::UnixNano;

pub type ArcLogger = Arc<dyn ILogger + Send + Sync>;

pub trait ILogger {
    /// Send log.
    fn log(&self, _: LogEntry) {}
}

/// Log entry. See `LogEntryWithTime` in the `log` crate.
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub level: LogLevel,
    pub source: LogSource,
    pub channel_id: Option<ChannelName>,
    pub message: LogMessage,
}

impl LogEntry {
    #[allow(clippy::unwrap_used, clippy::needless_pass_by_value)]
    #[must_use]
    pub fn new(
        level: LogLevel,
        source: &'static str,
        channel_id: Option<ChannelName>,
        message: String,
    ) -> Self {
        let source: LogSource = source.to_owned().try_into().expect("source should be valid");
        let message = match LogMessage::try_from(message) {
            Ok(v) => v,
            Err(e) => LogMessage::try_from(format!("bad message: {e}"))
                .expect("error message should be a valid log message"),
        };
        Self {
            level,
            source,
            channel_id,
            message,
        }
    }
}

/// Severity of the log message.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Something requires attention.
    Error,

    /// Something may require attention.
    Warning,

    /// Standard information.
    Info,

    /// Verbose debugging information.
    Debug,
}

impl LogLevel {
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        match self {
            LogLevel::Error => 16,
            LogLevel::Warning => 24,
            LogLevel::Info => 32,
            LogLevel::Debug => 48,
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseLogLevelError {
    #[error("invalid value: '{0}'")]
    InvalidValue(u8),

    #[error("unknown log level: '{0}'")]
    UnknownLevel(String),
}

impl TryFrom<u8> for LogLevel {
    type Error = ParseLogLevelError;

    fn try_from(value: u8) -> Result<Self, ParseLogLevelError> {
        match value {
            16 => Ok(Self::Error),
            24 => Ok(Self::Warning),
            32 => Ok(Self::Info),
            48 => Ok(Self::Debug),
            _ => Err(ParseLogLevelError::InvalidValue(value)),
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(LogLevel::Error),
            "warning" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(ParseLogLevelError::UnknownLevel(s.to_owned())),
        }
    }
}

#[macro_export]
macro_rules! impl_deserialize_try_from_and_display {
    ($type:ident) => {
        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                String::deserialize(deserializer)?
                    .try_into()
                    .map_err(serde::de::Error::custom)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

pub const CHANNEL_NAME_MAX_LENGTH: usize = 64;

/// Unique identifier of a configured channel; also used as the inter-pipeline
/// routing key between a channel and the mountpoints/recordings that consume it.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize)]
pub struct ChannelName(String);
impl_deserialize_try_from_and_display!(ChannelName);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseChannelNameError {
    #[error("empty string")]
    Empty,

    #[error("invalid character: '{0}'")]
    InvalidChar(char),

    #[error("too long")]
    TooLong,
}

const ALLOWED_CHANNEL_NAME_CHARS: [char; 2] = ['_', '-'];

impl TryFrom<String> for ChannelName {
    type Error = ParseChannelNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParseChannelNameError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        for c in s.chars() {
            if !c.is_alphanumeric() && !ALLOWED_CHANNEL_NAME_CHARS.contains(&c) {
                return Err(InvalidChar(c));
            }
        }
        if s.len() > CHANNEL_NAME_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(s))
    }
}

impl Deref for ChannelName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub const MOUNTPOINT_NAME_MAX_LENGTH: usize = 64;

/// Unique identifier of a configured mountpoint.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize)]
pub struct MountpointName(String);
impl_deserialize_try_from_and_display!(MountpointName);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseMountpointNameError {
    #[error("empty string")]
    Empty,

    #[error("invalid character: '{0}'")]
    InvalidChar(char),

    #[error("too long")]
    TooLong,
}

impl TryFrom<String> for MountpointName {
    type Error = ParseMountpointNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParseMountpointNameError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        for c in s.chars() {
            if !c.is_alphanumeric() && !ALLOWED_CHANNEL_NAME_CHARS.contains(&c) {
                return Err(InvalidChar(c));
            }
        }
        if s.len() > MOUNTPOINT_NAME_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(s))
    }
}

impl Deref for MountpointName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub const PROFILE_IDENTIFIER_MAX_LENGTH: usize = 128;

/// Reverse-domain profile identifier, e.g. `org.example.profile.jetson`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, PartialOrd, Ord)]
pub struct ProfileIdentifier(String);
impl_deserialize_try_from_and_display!(ProfileIdentifier);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseProfileIdentifierError {
    #[error("empty string")]
    Empty,

    #[error("missing '.' separator")]
    MissingSeparator,

    #[error("invalid character: '{0}'")]
    InvalidChar(char),

    #[error("too long")]
    TooLong,
}

const ALLOWED_PROFILE_IDENTIFIER_CHARS: [char; 2] = ['.', '-'];

impl TryFrom<String> for ProfileIdentifier {
    type Error = ParseProfileIdentifierError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParseProfileIdentifierError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        if !s.contains('.') {
            return Err(MissingSeparator);
        }
        for c in s.chars() {
            if !c.is_alphanumeric() && !ALLOWED_PROFILE_IDENTIFIER_CHARS.contains(&c) {
                return Err(InvalidChar(c));
            }
        }
        if s.len() > PROFILE_IDENTIFIER_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(s))
    }
}

impl Deref for ProfileIdentifier {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub const PLATFORM_TAG_MAX_LENGTH: usize = 32;

/// Wildcard platform tag that matches every runtime platform.
pub const PLATFORM_ALL: &str = "all";

/// A platform tag, e.g. `deepstream-6`, `vaapi`, or the wildcard `all`.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, PartialOrd, Ord)]
pub struct PlatformTag(String);
impl_deserialize_try_from_and_display!(PlatformTag);

impl PlatformTag {
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == PLATFORM_ALL
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePlatformTagError {
    #[error("empty string")]
    Empty,

    #[error("invalid character: '{0}'")]
    InvalidChar(char),

    #[error("too long")]
    TooLong,
}

impl TryFrom<String> for PlatformTag {
    type Error = ParsePlatformTagError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParsePlatformTagError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        for c in s.chars() {
            if !c.is_alphanumeric() && !ALLOWED_CHANNEL_NAME_CHARS.contains(&c) {
                return Err(InvalidChar(c));
            }
        }
        if s.len() > PLATFORM_TAG_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(s))
    }
}

impl Deref for PlatformTag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub const LOG_SOURCE_MAX_LENGTH: usize = 16;

#[repr(transparent)]
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, PartialOrd, Ord)]
pub struct LogSource(String);
impl_deserialize_try_from_and_display!(LogSource);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseLogSourceError {
    #[error("empty string")]
    Empty,

    #[error("invalid characters: '{0}'")]
    InvalidChars(String),

    #[error("too long")]
    TooLong,
}

impl TryFrom<String> for LogSource {
    type Error = ParseLogSourceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        use ParseLogSourceError::*;
        if s.is_empty() {
            return Err(Empty);
        }
        if !s.chars().all(char::is_alphanumeric) {
            return Err(InvalidChars(s));
        }
        if s.len() > LOG_SOURCE_MAX_LENGTH {
            return Err(TooLong);
        }
        Ok(Self(s))
    }
}

impl Deref for LogSource {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[repr(transparent)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LogMessage(String);
impl_deserialize_try_from_and_display!(LogMessage);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseLogMessageError {
    #[error("empty string")]
    Empty,

    #[error("too long")]
    TooLong,
}

const LOG_MESSAGE_MAX_LENGTH: usize = 1024 * 4;

impl TryFrom<String> for LogMessage {
    type Error = ParseLogMessageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Err(ParseLogMessageError::Empty);
        }
        if s.len() > LOG_MESSAGE_MAX_LENGTH {
            return Err(ParseLogMessageError::TooLong);
        }
        Ok(Self(s))
    }
}

impl Deref for LogMessage {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct DummyLogger;

impl DummyLogger {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(DummyLogger {})
    }
}

impl ILogger for DummyLogger {
    fn log(&self, _: LogEntry) {}
}

impl MsgLogger for DummyLogger {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

pub type ArcMsgLogger = Arc<dyn MsgLogger + Send + Sync>;

/// Small per-component wrapper around an `ArcLogger` that pins `source` and
/// an optional channel id, so callers only ever pass a level and a message.
pub trait MsgLogger {
    fn log(&self, level: LogLevel, msg: &str);
}

pub struct DummyMsgLogger;

impl MsgLogger for DummyMsgLogger {
    fn log(&self, _: LogLevel, _: &str) {}
}

#[must_use]
pub fn new_dummy_msg_logger() -> Arc<impl MsgLogger> {
    Arc::new(DummyMsgLogger {})
}

/// State of a supervised pipeline. Monotonic within a run; `restart()` returns to `Created`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelineState {
    Created,
    Playing,
    EndOfStream,
    Error,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Created => write!(f, "created"),
            PipelineState::Playing => write!(f, "playing"),
            PipelineState::EndOfStream => write!(f, "end_of_stream"),
            PipelineState::Error => write!(f, "error"),
        }
    }
}

/// Statistics that live for the lifetime of the owning process, not of any
/// single pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    #[serde(rename = "restartCount")]
    pub restart_count: u64,
}

pub const CALENDAR_UID_MAX_LENGTH: usize = 256;

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize)]
pub struct CalendarUid(String);
impl_deserialize_try_from_and_display!(CalendarUid);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCalendarUidError {
    #[error("empty string")]
    Empty,

    #[error("too long")]
    TooLong,
}

impl TryFrom<String> for CalendarUid {
    type Error = ParseCalendarUidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Err(ParseCalendarUidError::Empty);
        }
        if s.len() > CALENDAR_UID_MAX_LENGTH {
            return Err(ParseCalendarUidError::TooLong);
        }
        Ok(Self(s))
    }
}

impl Deref for CalendarUid {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// An event observed on the configured iCalendar feed. The feed fetch and ICS
/// parsing themselves are external collaborators; the core only consumes this
/// already-parsed record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub uid: CalendarUid,
    pub summary: String,
    pub location: String,
    pub start_date: UnixNano,
    pub end_date: UnixNano,
}

/// Free-form key/value properties attached to a channel or mountpoint config,
/// consumed by template substitution.
pub type Properties = HashMap<String, String>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_name() {
        ChannelName::try_from("abc".to_owned()).unwrap();
        ChannelName::try_from("123".to_owned()).unwrap();
        ChannelName::try_from("a-a".to_owned()).unwrap();
        ChannelName::try_from("a_a".to_owned()).unwrap();

        ChannelName::try_from(String::new()).unwrap_err();
        ChannelName::try_from("a a".to_owned()).unwrap_err();
    }

    #[test]
    fn test_parse_profile_identifier() {
        ProfileIdentifier::try_from("org.example.jetson".to_owned()).unwrap();

        ProfileIdentifier::try_from(String::new()).unwrap_err();
        ProfileIdentifier::try_from("noseparator".to_owned()).unwrap_err();
        ProfileIdentifier::try_from("org.example!".to_owned()).unwrap_err();
    }

    #[test]
    fn test_platform_tag_wildcard() {
        let tag = PlatformTag::try_from("all".to_owned()).unwrap();
        assert!(tag.is_wildcard());

        let tag = PlatformTag::try_from("vaapi".to_owned()).unwrap();
        assert!(!tag.is_wildcard());
    }

    #[test]
    fn test_parse_log_message() {
        LogMessage::try_from("abc".to_owned()).unwrap();
        LogMessage::try_from(String::new()).unwrap_err();
    }
}
