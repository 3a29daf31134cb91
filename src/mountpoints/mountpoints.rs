// SPDX-License-Identifier: GPL-2.0-or-later

//! Mountpoint Binder: expands each configured mountpoint's pipeline template
//! and registers it with the RTSP runtime once, at start-up. Mountpoints are
//! not restarted by the core; the RTSP runtime owns reconnect behaviour for
//! the mounts it serves. Dot-graph introspection is read through to the
//! registered mount on every query rather than cached, since the graph only
//! exists once the runtime has materialised the pipeline for a client.

pub mod rtsp;

use common::{MountpointName, Properties};
use profile::{PipelineForError, Profile, TemplateKind};
use rtsp::{RegisterMountError, RtspRuntime};
use std::collections::HashMap;
use std::sync::Arc;
use template::Variables;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountpointConfig {
    pub name: MountpointName,
    pub path: String,
    pub r#type: String,
    pub properties: Properties,
}

pub struct Mountpoint {
    config: MountpointConfig,
    mount: Box<dyn rtsp::RtspMount>,
}

impl Mountpoint {
    #[must_use]
    pub fn name(&self) -> &MountpointName {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &MountpointConfig {
        &self.config
    }

    /// Queries the runtime's current dot graph for this mount. `None` until
    /// a client has caused the RTSP runtime to materialise the pipeline.
    #[must_use]
    pub fn dot_graph(&self) -> Option<Vec<u8>> {
        self.mount.dot_graph()
    }
}

pub struct MountpointBinder {
    mounts: HashMap<MountpointName, Mountpoint>,
}

impl MountpointBinder {
    #[must_use]
    pub fn mountpoint(&self, name: &MountpointName) -> Option<&Mountpoint> {
        self.mounts.get(name)
    }

    #[must_use]
    pub fn dot_graph_for(&self, name: &MountpointName) -> Option<Vec<u8>> {
        self.mounts.get(name)?.dot_graph()
    }

    pub fn mountpoints(&self) -> impl Iterator<Item = &Mountpoint> {
        self.mounts.values()
    }
}

#[derive(Debug, Error)]
pub enum BindMountpointsError {
    #[error("duplicate mountpoint name: {0}")]
    DuplicateMountpoint(MountpointName),

    #[error("mountpoint '{0}': {1}")]
    PipelineFor(MountpointName, PipelineForError),

    #[error(transparent)]
    Register(#[from] RegisterMountError),
}

/// Expands and registers every configured mountpoint against `profile` and
/// `rtsp`. Each mount's dot graph is queried live from the runtime, not
/// cached, so it reflects the `None` -> populated transition that happens
/// when a client first connects.
pub fn bind(
    configs: Vec<MountpointConfig>,
    profile: &Profile,
    rtsp: &dyn RtspRuntime,
) -> Result<MountpointBinder, BindMountpointsError> {
    let mut mounts = HashMap::with_capacity(configs.len());

    for config in configs {
        if mounts.contains_key(&config.name) {
            return Err(BindMountpointsError::DuplicateMountpoint(config.name));
        }

        let mut variables: Variables = config.properties.clone();
        variables.insert("MOUNTPOINTNAME".to_owned(), config.name.to_string());

        let description = profile
            .pipeline_for(TemplateKind::Mountpoints, &config.r#type, &variables)
            .map_err(|e| BindMountpointsError::PipelineFor(config.name.clone(), e))?;

        let mount = rtsp.register(&config.path, &description)?;

        mounts.insert(config.name.clone(), Mountpoint { config, mount });
    }

    Ok(MountpointBinder { mounts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtsp::RtspMount;
    use std::sync::Mutex;

    /// Mimics a real RTSP runtime: the dot graph is `None` until something
    /// external calls `materialize()`, simulating the runtime's construction
    /// hook firing when a client first connects.
    struct DummyMount {
        dot_graph: Arc<Mutex<Option<Vec<u8>>>>,
    }
    impl RtspMount for DummyMount {
        fn dot_graph(&self) -> Option<Vec<u8>> {
            self.dot_graph.lock().unwrap().clone()
        }
    }

    struct DummyRtspRuntime {
        materialized: Arc<Mutex<Option<Vec<u8>>>>,
    }
    impl RtspRuntime for DummyRtspRuntime {
        fn register(
            &self,
            _path: &str,
            _description: &str,
        ) -> Result<Box<dyn RtspMount>, RegisterMountError> {
            Ok(Box::new(DummyMount {
                dot_graph: self.materialized.clone(),
            }))
        }
    }

    fn test_profile(dir: &tempfile::TempDir) -> Profile {
        std::fs::write(
            dir.path().join("a.json"),
            r#"{
                "identifier": "org.test.profile",
                "version": "1",
                "supportedPlatforms": ["all"],
                "mountpoints": {"live": "( rtph264pay name=pay0 )"}
            }"#,
        )
        .unwrap();
        profile::load_profiles(dir.path()).unwrap().remove(0)
    }

    #[test]
    fn dot_graph_is_nil_until_runtime_materializes_it() {
        let dir = tempfile::tempdir().unwrap();
        let materialized = Arc::new(Mutex::new(None));
        let binder = bind(
            vec![MountpointConfig {
                name: "cam1".to_owned().try_into().unwrap(),
                path: "/live/cam1".to_owned(),
                r#type: "live".to_owned(),
                properties: Properties::new(),
            }],
            &test_profile(&dir),
            &DummyRtspRuntime {
                materialized: materialized.clone(),
            },
        )
        .unwrap();

        let name: MountpointName = "cam1".to_owned().try_into().unwrap();
        let mount = binder.mountpoint(&name).unwrap();
        assert_eq!(None, mount.dot_graph());
        assert_eq!(None, binder.dot_graph_for(&name));

        *materialized.lock().unwrap() = Some(b"digraph{}".to_vec());

        assert_eq!(Some(b"digraph{}".to_vec()), mount.dot_graph());
        assert_eq!(Some(b"digraph{}".to_vec()), binder.dot_graph_for(&name));
    }

    #[test]
    fn duplicate_mountpoint_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let configs = vec![
            MountpointConfig {
                name: "cam1".to_owned().try_into().unwrap(),
                path: "/live/cam1".to_owned(),
                r#type: "live".to_owned(),
                properties: Properties::new(),
            },
            MountpointConfig {
                name: "cam1".to_owned().try_into().unwrap(),
                path: "/live/cam1-dup".to_owned(),
                r#type: "live".to_owned(),
                properties: Properties::new(),
            },
        ];

        let err = bind(
            configs,
            &test_profile(&dir),
            &DummyRtspRuntime {
                materialized: Arc::new(Mutex::new(None)),
            },
        )
        .unwrap_err();
        assert!(matches!(err, BindMountpointsError::DuplicateMountpoint(_)));
    }
}
