// Mission resources: lookup, fingerprinting, load info, and instantiation.
//
// The lifecycle only ever talks to the `MissionResources` trait. It asks
// whether a mission exists, fingerprints it, pulls the lightweight load info
// shown to clients before the heavy load, and finally instantiates the
// mission's objects into the active container target. What a mission
// *contains* is opaque to the lifecycle; its one postcondition check (the
// top-level group exists) happens in `lifecycle.rs` after instantiation.
//
// `MissionStore` is the shipped implementation. It reads JSON mission
// documents either from a directory on disk or from an in-memory map (tests,
// embedded servers):
//
//   { "info":    { "name": "Outpost", "description": ["..."] },
//     "objects": [ { "class": "SimGroup", "name": "MissionGroup",
//                    "children": [ { "class": "Marker", "name": "Spawn" } ] } ] }
//
// Objects of a group class (or with children) become containers; everything
// else becomes a `SessionObject` in the enclosing container. Load info is
// extracted without building any objects.
//
// Mission paths are store-relative with `/` separators. Absolute paths and
// paths containing `..` are treated as missing rather than read.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::container::{ObjectContainers, SessionObject};
use crate::crc;
use crate::error::{ContainerError, ResourceError};
use crate::types::{ContainerId, MissionCrc};

/// Object class that always instantiates as a container.
pub const GROUP_CLASS: &str = "SimGroup";

/// File extensions `MissionStore::list` treats as missions.
const MISSION_EXTENSIONS: &[&str] = &["mis", "json"];

/// Display metadata sent to clients in stage 1, before the heavy load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadInfo {
    pub mission_path: String,
    pub name: String,
    pub description: Vec<String>,
}

impl LoadInfo {
    /// Load info for a mission that could not be read: the file stem as the
    /// display name, no description.
    pub fn placeholder(mission_path: &str) -> Self {
        let name = Path::new(mission_path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| mission_path.to_string());
        Self {
            mission_path: mission_path.to_string(),
            name,
            description: Vec::new(),
        }
    }
}

/// The resource operations the lifecycle consumes.
pub trait MissionResources {
    /// Whether `path` names a loadable mission resource.
    fn exists(&self, path: &str) -> bool;

    /// Fingerprint of the resource's bytes.
    fn fingerprint(&self, path: &str) -> Result<MissionCrc, ResourceError>;

    /// Display metadata only. Must not instantiate any objects.
    fn load_info(&self, path: &str) -> Result<LoadInfo, ResourceError>;

    /// Instantiate the mission's objects under the active container target.
    fn instantiate(
        &mut self,
        path: &str,
        containers: &mut ObjectContainers,
    ) -> Result<(), ResourceError>;
}

#[derive(Debug, Default, Deserialize)]
struct MissionInfoDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Vec<String>,
}

// Only the `info` block. The `objects` array is skipped, not built.
#[derive(Debug, Default, Deserialize)]
struct MissionHeader {
    #[serde(default)]
    info: MissionInfoDef,
}

#[derive(Debug, Default, Deserialize)]
struct MissionDocument {
    #[serde(default)]
    objects: Vec<ObjectDef>,
}

#[derive(Debug, Deserialize)]
struct ObjectDef {
    class: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    children: Vec<ObjectDef>,
}

impl ObjectDef {
    fn is_group(&self) -> bool {
        self.class == GROUP_CLASS || !self.children.is_empty()
    }
}

#[derive(Debug)]
enum Source {
    Directory(PathBuf),
    Memory(BTreeMap<String, Vec<u8>>),
}

/// JSON mission store backed by a directory or an in-memory map.
#[derive(Debug)]
pub struct MissionStore {
    source: Source,
}

impl MissionStore {
    /// Store reading missions from files under `root`.
    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::Directory(root.into()),
        }
    }

    /// Empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            source: Source::Memory(BTreeMap::new()),
        }
    }

    /// Add or replace a mission. Directory stores write the file.
    pub fn insert(&mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<(), ResourceError> {
        match &mut self.source {
            Source::Memory(map) => {
                map.insert(path.to_string(), bytes.into());
                Ok(())
            }
            Source::Directory(root) => {
                let file = resolve(root, path).ok_or_else(|| ResourceError::NotFound {
                    path: path.to_string(),
                })?;
                let bytes: Vec<u8> = bytes.into();
                std::fs::write(file, bytes).map_err(|source| ResourceError::Io {
                    path: path.to_string(),
                    source,
                })
            }
        }
    }

    /// Builder form of `insert` for in-memory stores. Ignored for directory
    /// stores, which are populated on disk.
    pub fn with_mission(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        if let Source::Memory(map) = &mut self.source {
            map.insert(path.to_string(), bytes.into());
        }
        self
    }

    /// Mission paths available in the store, sorted. Directory stores list
    /// top-level files with a mission extension.
    pub fn list(&self) -> Vec<String> {
        match &self.source {
            Source::Memory(map) => map.keys().cloned().collect(),
            Source::Directory(root) => {
                let Ok(entries) = std::fs::read_dir(root) else {
                    return Vec::new();
                };
                let mut missions: Vec<String> = entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| {
                        path.is_file()
                            && path
                                .extension()
                                .and_then(|ext| ext.to_str())
                                .is_some_and(|ext| MISSION_EXTENSIONS.contains(&ext))
                    })
                    .filter_map(|path| {
                        path.file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                    })
                    .collect();
                missions.sort();
                missions
            }
        }
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let not_found = || ResourceError::NotFound {
            path: path.to_string(),
        };
        match &self.source {
            Source::Memory(map) => map.get(path).cloned().ok_or_else(not_found),
            Source::Directory(root) => {
                let file = resolve(root, path).ok_or_else(not_found)?;
                std::fs::read(&file).map_err(|source| match source.kind() {
                    std::io::ErrorKind::NotFound => not_found(),
                    _ => ResourceError::Io {
                        path: path.to_string(),
                        source,
                    },
                })
            }
        }
    }
}

/// Join a store-relative mission path onto `root`, refusing anything that
/// could escape it.
fn resolve(root: &Path, path: &str) -> Option<PathBuf> {
    let relative = Path::new(path);
    if path.is_empty()
        || !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

impl MissionResources for MissionStore {
    fn exists(&self, path: &str) -> bool {
        match &self.source {
            Source::Memory(map) => map.contains_key(path),
            Source::Directory(root) => resolve(root, path).is_some_and(|file| file.is_file()),
        }
    }

    fn fingerprint(&self, path: &str) -> Result<MissionCrc, ResourceError> {
        Ok(crc::fingerprint(&self.read(path)?))
    }

    fn load_info(&self, path: &str) -> Result<LoadInfo, ResourceError> {
        let bytes = self.read(path)?;
        let header: MissionHeader =
            serde_json::from_slice(&bytes).map_err(|source| ResourceError::Parse {
                path: path.to_string(),
                source,
            })?;
        let mut info = LoadInfo::placeholder(path);
        if let Some(name) = header.info.name {
            info.name = name;
        }
        info.description = header.info.description;
        Ok(info)
    }

    fn instantiate(
        &mut self,
        path: &str,
        containers: &mut ObjectContainers,
    ) -> Result<(), ResourceError> {
        let bytes = self.read(path)?;
        let document: MissionDocument =
            serde_json::from_slice(&bytes).map_err(|source| ResourceError::Parse {
                path: path.to_string(),
                source,
            })?;
        let Some(target) = containers.active_target() else {
            return Err(ResourceError::Instantiate {
                path: path.to_string(),
                source: ContainerError::NoActiveTarget,
            });
        };

        debug!(
            "instantiating {} top-level objects from {path}",
            document.objects.len()
        );
        build_objects(document.objects, target, containers).map_err(|source| {
            ResourceError::Instantiate {
                path: path.to_string(),
                source,
            }
        })
    }
}

fn build_objects(
    defs: Vec<ObjectDef>,
    parent: ContainerId,
    containers: &mut ObjectContainers,
) -> Result<(), ContainerError> {
    for def in defs {
        if def.is_group() {
            let group = containers.create(def.name.unwrap_or_default(), Some(parent))?;
            build_objects(def.children, group, containers)?;
        } else {
            let object = SessionObject {
                class: def.class,
                name: def.name,
                fields: def.fields,
            };
            containers.insert_object(parent, object)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPOST: &str = r#"{
        "info": { "name": "Outpost", "description": ["Hold the ridge.", "Two bases."] },
        "objects": [
            { "class": "SimGroup", "name": "MissionGroup", "children": [
                { "class": "Marker", "name": "SpawnA", "fields": { "team": 1 } },
                { "class": "SimGroup", "name": "Lights", "children": [
                    { "class": "Sun" }
                ] }
            ] }
        ]
    }"#;

    fn server_scope(containers: &mut ObjectContainers) -> ContainerId {
        let scope = containers.create("ServerGroup", None).unwrap();
        containers.set_active_target(scope).unwrap();
        scope
    }

    #[test]
    fn load_info_reads_header_only() {
        let store = MissionStore::in_memory().with_mission("outpost.mis", OUTPOST);
        let info = store.load_info("outpost.mis").unwrap();
        assert_eq!(info.name, "Outpost");
        assert_eq!(info.description, vec!["Hold the ridge.", "Two bases."]);
        assert_eq!(info.mission_path, "outpost.mis");
    }

    #[test]
    fn load_info_falls_back_to_file_stem() {
        let store = MissionStore::in_memory().with_mission("maps/ridge.mis", "{}");
        let info = store.load_info("maps/ridge.mis").unwrap();
        assert_eq!(info.name, "ridge");
        assert!(info.description.is_empty());
    }

    #[test]
    fn instantiate_builds_groups_and_objects() {
        let mut store = MissionStore::in_memory().with_mission("outpost.mis", OUTPOST);
        let mut containers = ObjectContainers::new();
        let scope = server_scope(&mut containers);

        store.instantiate("outpost.mis", &mut containers).unwrap();

        let group = containers.find_child(scope, "MissionGroup").unwrap();
        let lights = containers.find_child(group, "Lights").unwrap();
        assert_eq!(containers.get(group).unwrap().objects().len(), 1);
        assert_eq!(containers.get(lights).unwrap().objects()[0].class, "Sun");
        assert_eq!(containers.object_count(scope), 2);
        let spawn = &containers.get(group).unwrap().objects()[0];
        assert_eq!(spawn.fields["team"], serde_json::json!(1));
    }

    #[test]
    fn instantiate_without_target_fails() {
        let mut store = MissionStore::in_memory().with_mission("outpost.mis", OUTPOST);
        let mut containers = ObjectContainers::new();
        let err = store.instantiate("outpost.mis", &mut containers).unwrap_err();
        assert!(matches!(err, ResourceError::Instantiate { .. }));
    }

    #[test]
    fn malformed_mission_is_a_parse_error() {
        let mut store = MissionStore::in_memory().with_mission("bad.mis", "{ objects: ");
        let mut containers = ObjectContainers::new();
        server_scope(&mut containers);
        let err = store.instantiate("bad.mis", &mut containers).unwrap_err();
        assert!(matches!(err, ResourceError::Parse { .. }));
    }

    #[test]
    fn missing_mission_reports_not_found() {
        let store = MissionStore::in_memory();
        assert!(!store.exists("nope.mis"));
        assert!(matches!(
            store.fingerprint("nope.mis"),
            Err(ResourceError::NotFound { .. })
        ));
    }

    #[test]
    fn fingerprint_is_crc_of_bytes() {
        let store = MissionStore::in_memory().with_mission("outpost.mis", OUTPOST);
        assert_eq!(
            store.fingerprint("outpost.mis").unwrap(),
            crc::fingerprint(OUTPOST.as_bytes())
        );
    }

    #[test]
    fn directory_store_reads_and_lists_missions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("outpost.mis"), OUTPOST).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a mission").unwrap();
        let mut store = MissionStore::directory(dir.path());
        store.insert("ridge.json", "{}").unwrap();

        assert!(store.exists("outpost.mis"));
        assert!(!store.exists("missing.mis"));
        assert_eq!(store.list(), vec!["outpost.mis", "ridge.json"]);
        assert_eq!(store.load_info("outpost.mis").unwrap().name, "Outpost");
    }

    #[test]
    fn directory_store_refuses_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("missions");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(dir.path().join("secret.mis"), "{}").unwrap();
        let store = MissionStore::directory(&inner);

        assert!(!store.exists("../secret.mis"));
        assert!(!store.exists(""));
        assert!(matches!(
            store.load_info("../secret.mis"),
            Err(ResourceError::NotFound { .. })
        ));
    }
}
