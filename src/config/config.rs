// SPDX-License-Identifier: GPL-2.0-or-later

//! Daemon configuration: reads a TOML document, validates required keys,
//! canonicalises directory paths, and generates a commented default file on
//! first run.

use common::{ChannelName, MountpointName, Properties};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RawMountpointConfig {
    pub name: MountpointName,
    pub path: String,
    pub r#type: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RawChannelConfig {
    pub name: ChannelName,
    pub r#type: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(rename = "audioProvider", default)]
    pub audio_provider: Option<String>,
}

/// Daemon configuration, validated and with directory keys canonicalised.
/// `httpPassword` is carried separately from `raw` so `configSnapshot` can
/// redact it without touching the rest of the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    name: String,
    profile_directory: PathBuf,
    scratch_directory: PathBuf,
    ical_url: String,
    rtsp_address: String,
    rtsp_port: u16,
    http_port: u16,
    http_auth: bool,
    http_username: Option<String>,
    http_password: Option<String>,
    locations: Vec<String>,
    platform_override: Option<String>,
    mountpoints: Vec<RawMountpointConfig>,
    channels: Vec<RawChannelConfig>,
    raw: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    name: String,
    #[serde(rename = "profileDirectory")]
    profile_directory: PathBuf,
    #[serde(rename = "scratchDirectory")]
    scratch_directory: PathBuf,
    #[serde(rename = "icalURL")]
    ical_url: String,
    #[serde(rename = "rtspAddress")]
    rtsp_address: String,
    #[serde(rename = "rtspPort")]
    rtsp_port: u16,
    #[serde(rename = "httpPort")]
    http_port: u16,
    #[serde(rename = "httpAuth", default)]
    http_auth: bool,
    #[serde(rename = "httpUsername", default)]
    http_username: Option<String>,
    #[serde(rename = "httpPassword", default)]
    http_password: Option<String>,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(rename = "platformOverride", default)]
    platform_override: Option<String>,
    #[serde(default)]
    mountpoints: Vec<RawMountpointConfig>,
    #[serde(default)]
    channels: Vec<RawChannelConfig>,
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Config, ConfigNewError> {
        use ConfigNewError::*;
        if !config_path.exists() {
            print!(
                "\n\nGenerating '{}' and exiting..\n\n\n",
                config_path.to_string_lossy()
            );
            let cwd = std::env::current_dir().map_err(GetCwd)?;
            generate_config(config_path, &cwd)?;
            std::process::exit(0);
        }

        let raw_toml = fs::read_to_string(config_path).map_err(ReadFile)?;
        Ok(parse_config(raw_toml)?)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[must_use]
    pub fn profile_directory(&self) -> &Path {
        &self.profile_directory
    }
    #[must_use]
    pub fn scratch_directory(&self) -> &Path {
        &self.scratch_directory
    }
    #[must_use]
    pub fn ical_url(&self) -> &str {
        &self.ical_url
    }
    #[must_use]
    pub fn rtsp_address(&self) -> &str {
        &self.rtsp_address
    }
    #[must_use]
    pub fn rtsp_port(&self) -> u16 {
        self.rtsp_port
    }
    #[must_use]
    pub fn http_port(&self) -> u16 {
        self.http_port
    }
    #[must_use]
    pub fn http_auth(&self) -> Option<(&str, &str)> {
        if !self.http_auth {
            return None;
        }
        Some((self.http_username.as_deref()?, self.http_password.as_deref()?))
    }
    #[must_use]
    pub fn locations(&self) -> &[String] {
        &self.locations
    }
    #[must_use]
    pub fn platform_override(&self) -> Option<&str> {
        self.platform_override.as_deref()
    }
    #[must_use]
    pub fn mountpoints(&self) -> &[RawMountpointConfig] {
        &self.mountpoints
    }
    #[must_use]
    pub fn channels(&self) -> &[RawChannelConfig] {
        &self.channels
    }

    /// The raw document, with `httpPassword` replaced by a redaction marker,
    /// for the control plane's `GET /api/v1/config`.
    #[must_use]
    pub fn snapshot(&self) -> String {
        if self.http_password.is_none() {
            return self.raw.clone();
        }
        self.raw
            .lines()
            .map(|line| {
                if line.trim_start().starts_with("httpPassword") {
                    "httpPassword = \"<redacted>\"".to_owned()
                } else {
                    line.to_owned()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Error)]
pub enum ConfigNewError {
    #[error("read config file: {0}")]
    ReadFile(std::io::Error),

    #[error("generate config: {0}")]
    Generate(#[from] GenerateConfigError),

    #[error("parse config: {0}")]
    Parse(#[from] ParseConfigError),

    #[error("get current working directory: {0}")]
    GetCwd(std::io::Error),
}

#[derive(Debug, Error)]
pub enum GenerateConfigError {
    #[error("create file: {0}")]
    CreateFile(std::io::Error),

    #[error("templater error: {0}")]
    AddTemplate(upon::Error),

    #[error("render template: {0}")]
    RenderTemplate(upon::Error),

    #[error("get parent directory")]
    GetParentDir(),

    #[error("create directory: {0}")]
    CreateDir(std::io::Error),

    #[error("write file: {0}")]
    WriteFile(std::io::Error),
}

fn generate_config(path: &Path, cwd: &Path) -> Result<(), GenerateConfigError> {
    use GenerateConfigError::*;

    let data = HashMap::from([("cwd", cwd)]);

    let mut engine = upon::Engine::new();
    engine
        .add_template("config", CONFIG_TEMPLATE)
        .map_err(AddTemplate)?;

    let config = engine
        .get_template("config")
        .expect("template should just have been added")
        .render(data)
        .to_string()
        .map_err(RenderTemplate)?;

    let config_dir = path.parent().ok_or(GetParentDir())?;
    fs::create_dir_all(config_dir).map_err(CreateDir)?;

    let mut file = File::create(path).map_err(CreateFile)?;
    write!(file, "{config}").map_err(WriteFile)?;

    Ok(())
}

/// Embedded rather than `include_str!`-ed: the template lives alongside the
/// rest of this crate's source, not in a separate file that could go missing.
const CONFIG_TEMPLATE: &str = r#"# vmpd configuration, generated for {{ cwd }}

name = "vmpd"
profileDirectory = "{{ cwd }}/profiles"
scratchDirectory = "{{ cwd }}/recordings"
icalURL = "https://example.invalid/calendar.ics"
rtspAddress = "0.0.0.0"
rtspPort = 8554
httpPort = 2020
httpAuth = false

locations = []

mountpoints = []
channels = []
"#;

#[derive(Debug, Error)]
pub enum ParseConfigError {
    #[error("{0}")]
    DeserializeToml(#[from] toml::de::Error),

    #[error("{0} path is not absolute '{1}'")]
    PathNotAbsolute(String, PathBuf),

    #[error("create profile directory: {0} {1}")]
    CreateProfileDir(PathBuf, std::io::Error),

    #[error("create scratch directory: {0} {1}")]
    CreateScratchDir(PathBuf, std::io::Error),

    #[error("canonicalize path: {0:?} {1}")]
    Canonicalize(PathBuf, std::io::Error),

    #[error("httpAuth is enabled but {0} is missing")]
    MissingAuthField(&'static str),
}

fn parse_config(raw_toml: String) -> Result<Config, ParseConfigError> {
    use ParseConfigError::*;
    let raw: RawConfig = toml::from_str(&raw_toml)?;

    if !raw.profile_directory.is_absolute() {
        return Err(PathNotAbsolute(
            "profileDirectory".to_owned(),
            raw.profile_directory,
        ));
    }
    if !raw.scratch_directory.is_absolute() {
        return Err(PathNotAbsolute(
            "scratchDirectory".to_owned(),
            raw.scratch_directory,
        ));
    }
    if raw.http_auth && (raw.http_username.is_none() || raw.http_password.is_none()) {
        return Err(MissingAuthField("httpUsername/httpPassword"));
    }

    fs::create_dir_all(&raw.profile_directory)
        .map_err(|e| CreateProfileDir(raw.profile_directory.clone(), e))?;
    let profile_directory = raw
        .profile_directory
        .canonicalize()
        .map_err(|e| Canonicalize(raw.profile_directory, e))?;

    fs::create_dir_all(&raw.scratch_directory)
        .map_err(|e| CreateScratchDir(raw.scratch_directory.clone(), e))?;
    let scratch_directory = raw
        .scratch_directory
        .canonicalize()
        .map_err(|e| Canonicalize(raw.scratch_directory, e))?;

    Ok(Config {
        name: raw.name,
        profile_directory,
        scratch_directory,
        ical_url: raw.ical_url,
        rtsp_address: raw.rtsp_address,
        rtsp_port: raw.rtsp_port,
        http_port: raw.http_port,
        http_auth: raw.http_auth,
        http_username: raw.http_username,
        http_password: raw.http_password,
        locations: raw.locations,
        platform_override: raw.platform_override,
        mountpoints: raw.mountpoints,
        channels: raw.channels,
        raw: raw_toml,
    })
}
