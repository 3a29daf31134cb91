// SPDX-License-Identifier: GPL-2.0-or-later

//! Loads profile descriptors from a directory, scores them against the
//! runtime platform, and exposes the winner's template maps.

use common::{PlatformTag, ProfileIdentifier, PLATFORM_ALL};
use serde::Deserialize;
use std::{
    collections::HashMap,
    convert::TryFrom,
    fs,
    path::{Path, PathBuf},
};
use template::{expand, TemplateError, Variables};
use thiserror::Error;

/// Kind of template map a profile exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateKind {
    Channels,
    Mountpoints,
    AudioProviders,
    Recordings,
}

impl TemplateKind {
    fn field_name(self) -> &'static str {
        match self {
            TemplateKind::Channels => "channels",
            TemplateKind::Mountpoints => "mountpoints",
            TemplateKind::AudioProviders => "audioProviders",
            TemplateKind::Recordings => "recordings",
        }
    }
}

/// A named, platform-scored bundle of pipeline templates. Immutable after load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    pub identifier: ProfileIdentifier,
    pub version: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub supported_platforms: Vec<PlatformTag>,
    channels: HashMap<String, String>,
    mountpoints: HashMap<String, String>,
    audio_providers: HashMap<String, String>,
    recordings: HashMap<String, String>,
}

impl Profile {
    fn templates(&self, kind: TemplateKind) -> &HashMap<String, String> {
        match kind {
            TemplateKind::Channels => &self.channels,
            TemplateKind::Mountpoints => &self.mountpoints,
            TemplateKind::AudioProviders => &self.audio_providers,
            TemplateKind::Recordings => &self.recordings,
        }
    }

    /// Selects `profile[kind][type]` and expands it against `variables`.
    pub fn pipeline_for(
        &self,
        kind: TemplateKind,
        r#type: &str,
        variables: &Variables,
    ) -> Result<String, PipelineForError> {
        let Some(tpl) = self.templates(kind).get(r#type) else {
            return Err(PipelineForError::TemplateNotFound(
                kind.field_name(),
                r#type.to_owned(),
            ));
        };
        Ok(expand(tpl, variables)?)
    }

    /// Score against `platform`: `-1` if incompatible, else `10*exact + 1*wildcard`.
    #[must_use]
    pub fn score(&self, platform: &PlatformTag) -> i32 {
        let exact = self.supported_platforms.contains(platform);
        let wildcard = self
            .supported_platforms
            .iter()
            .any(common::PlatformTag::is_wildcard);

        if !exact && !wildcard {
            return -1;
        }
        10 * i32::from(exact) + i32::from(wildcard)
    }
}

#[derive(Debug, Error)]
pub enum PipelineForError {
    #[error("template not found: {0}.{1}")]
    TemplateNotFound(&'static str, String),

    #[error("expand template: {0}")]
    Expand(#[from] TemplateError),
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    identifier: String,
    version: String,
    description: Option<String>,
    title: Option<String>,
    #[serde(rename = "supportedPlatforms")]
    supported_platforms: Vec<String>,
    #[serde(default)]
    mountpoints: HashMap<String, String>,
    #[serde(default)]
    channels: HashMap<String, String>,
    #[serde(rename = "audioProviders", default)]
    audio_providers: HashMap<String, String>,
    #[serde(default)]
    recordings: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum ProfileMalformed {
    #[error("{0}: read file: {1}")]
    ReadFile(PathBuf, std::io::Error),

    #[error("{0}: parse json: {1}")]
    Parse(PathBuf, serde_json::Error),

    #[error("{0}: invalid identifier: {1}")]
    Identifier(PathBuf, common::ParseProfileIdentifierError),

    #[error("{0}: empty version")]
    EmptyVersion(PathBuf),

    #[error("{0}: supportedPlatforms is empty")]
    EmptyPlatforms(PathBuf),

    #[error("{0}: invalid platform tag: {1}")]
    PlatformTag(PathBuf, common::ParsePlatformTagError),
}

#[derive(Debug, Error)]
pub enum LoadProfilesError {
    #[error("read directory: {0}")]
    ReadDir(std::io::Error),

    #[error("read entry: {0}")]
    ReadEntry(std::io::Error),

    #[error(transparent)]
    Malformed(#[from] ProfileMalformed),
}

/// Loads every `*.json` profile descriptor found directly inside `dir`.
pub fn load_profiles(dir: &Path) -> Result<Vec<Profile>, LoadProfilesError> {
    let mut profiles = Vec::new();
    for entry in fs::read_dir(dir).map_err(LoadProfilesError::ReadDir)? {
        let entry = entry.map_err(LoadProfilesError::ReadEntry)?;
        let path = entry.path();
        if path.extension().and_then(std::ffi::OsStr::to_str) != Some("json") {
            continue;
        }
        profiles.push(load_profile(&path)?);
    }
    Ok(profiles)
}

fn load_profile(path: &Path) -> Result<Profile, ProfileMalformed> {
    use ProfileMalformed::*;

    let raw = fs::read_to_string(path).map_err(|e| ReadFile(path.to_owned(), e))?;
    let file: ProfileFile = serde_json::from_str(&raw).map_err(|e| Parse(path.to_owned(), e))?;

    let identifier = ProfileIdentifier::try_from(file.identifier)
        .map_err(|e| Identifier(path.to_owned(), e))?;

    if file.version.is_empty() {
        return Err(EmptyVersion(path.to_owned()));
    }
    if file.supported_platforms.is_empty() {
        return Err(EmptyPlatforms(path.to_owned()));
    }

    let mut supported_platforms = Vec::with_capacity(file.supported_platforms.len());
    for tag in file.supported_platforms {
        supported_platforms.push(
            PlatformTag::try_from(tag).map_err(|e| PlatformTag(path.to_owned(), e))?,
        );
    }

    Ok(Profile {
        identifier,
        version: file.version,
        title: file.title,
        description: file.description,
        supported_platforms,
        channels: file.channels,
        mountpoints: file.mountpoints,
        audio_providers: file.audio_providers,
        recordings: file.recordings,
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no compatible profile for platform '{0}'")]
pub struct NoCompatibleProfile(pub PlatformTag);

/// Picks the highest-scoring non-negative profile; ties break on identifier.
pub fn select_active<'a>(
    profiles: &'a [Profile],
    platform: &PlatformTag,
) -> Result<&'a Profile, NoCompatibleProfile> {
    profiles
        .iter()
        .map(|p| (p.score(platform), p))
        .filter(|(score, _)| *score >= 0)
        .max_by(|(score_a, a), (score_b, b)| {
            score_a.cmp(score_b).then_with(|| b.identifier.cmp(&a.identifier))
        })
        .map(|(_, p)| p)
        .ok_or_else(|| NoCompatibleProfile(platform.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn profile(identifier: &str, platforms: &[&str]) -> Profile {
        Profile {
            identifier: ProfileIdentifier::try_from(identifier.to_owned()).unwrap(),
            version: "1".to_owned(),
            title: None,
            description: None,
            supported_platforms: platforms
                .iter()
                .map(|p| PlatformTag::try_from((*p).to_owned()).unwrap())
                .collect(),
            channels: Map::new(),
            mountpoints: Map::new(),
            audio_providers: Map::new(),
            recordings: Map::new(),
        }
    }

    #[test]
    fn scoring_end_to_end_scenario() {
        let a = profile("org.a", &["all"]);
        let b = profile("org.b", &["deepstream-6"]);
        let c = profile("org.c", &["vaapi", "all"]);
        let profiles = vec![a, b, c];

        let deepstream = PlatformTag::try_from("deepstream-6".to_owned()).unwrap();
        let winner = select_active(&profiles, &deepstream).unwrap();
        assert_eq!("org.b", &*winner.identifier);

        let other = PlatformTag::try_from("other".to_owned()).unwrap();
        let winner = select_active(&profiles, &other).unwrap();
        // org.a and org.c both score 1; tie-break favors the smaller identifier.
        assert_eq!("org.a", &*winner.identifier);
    }

    #[test]
    fn all_only_profile_scores_non_negative_against_any_platform() {
        let p = profile("org.a", &["all"]);
        let platform = PlatformTag::try_from("whatever".to_owned()).unwrap();
        assert!(p.score(&platform) >= 0);
    }

    #[test]
    fn disqualified_profile_scores_negative() {
        let p = profile("org.a", &["deepstream-6"]);
        let platform = PlatformTag::try_from("vaapi".to_owned()).unwrap();
        assert_eq!(-1, p.score(&platform));
    }

    #[test]
    fn no_compatible_profile() {
        let p = profile("org.a", &["deepstream-6"]);
        let platform = PlatformTag::try_from("vaapi".to_owned()).unwrap();
        assert!(select_active(&[p], &platform).is_err());
    }

    #[test]
    fn pipeline_for_missing_type() {
        let p = profile("org.a", &["all"]);
        let err = p
            .pipeline_for(TemplateKind::Channels, "usb", &Variables::new())
            .unwrap_err();
        assert!(matches!(err, PipelineForError::TemplateNotFound("channels", _)));
    }

    #[test]
    fn load_profiles_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{
                "identifier": "org.example.a",
                "version": "1",
                "supportedPlatforms": ["all"],
                "channels": {"usb": "v4l2src device={DEVICE}"}
            }"#,
        )
        .unwrap();

        let profiles = load_profiles(dir.path()).unwrap();
        assert_eq!(1, profiles.len());
        assert_eq!("org.example.a", &*profiles[0].identifier);
    }
}
