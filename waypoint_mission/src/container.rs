// Hierarchical object containers for session-scoped objects.
//
// `ObjectContainers` is an arena of named containers keyed by `ContainerId`.
// Each container has an optional parent, an ordered list of child
// containers, and an ordered list of plain objects. Destroying a container
// destroys its whole subtree. IDs are allocated monotonically and never
// reused, so "this ID no longer exists" is a reliable "this scope was
// destroyed" signal for the scheduler (see `scheduler.rs`).
//
// The manager also tracks the **active target**: the container that newly
// instantiated objects attach to. Mission loading points it at the server
// scope while a mission resource is instantiated, then at the cleanup
// container so transient objects created afterwards land somewhere that can
// be thrown away independently.
//
// Objects are opaque to the lifecycle: a class name, an optional name, and
// free-form JSON fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ContainerError;
use crate::types::ContainerId;

/// A plain (non-container) object instantiated into a container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionObject {
    pub class: String,
    pub name: Option<String>,
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl SessionObject {
    pub fn new(class: impl Into<String>, name: Option<String>) -> Self {
        Self {
            class: class.into(),
            name,
            fields: BTreeMap::new(),
        }
    }
}

/// A named container node.
#[derive(Clone, Debug)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub parent: Option<ContainerId>,
    children: Vec<ContainerId>,
    objects: Vec<SessionObject>,
}

impl Container {
    pub fn children(&self) -> &[ContainerId] {
        &self.children
    }

    pub fn objects(&self) -> &[SessionObject] {
        &self.objects
    }
}

/// Arena of containers plus the active instantiation target.
#[derive(Debug, Default)]
pub struct ObjectContainers {
    containers: BTreeMap<ContainerId, Container>,
    next_id: u64,
    active_target: Option<ContainerId>,
}

impl ObjectContainers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty container. `parent = None` creates a root scope.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        parent: Option<ContainerId>,
    ) -> Result<ContainerId, ContainerError> {
        if let Some(parent_id) = parent
            && !self.containers.contains_key(&parent_id)
        {
            return Err(ContainerError::UnknownContainer(parent_id));
        }

        let id = self.create_root(name);
        if let Some(parent_id) = parent {
            if let Some(child) = self.containers.get_mut(&id) {
                child.parent = Some(parent_id);
            }
            if let Some(parent) = self.containers.get_mut(&parent_id) {
                parent.children.push(id);
            }
        }
        Ok(id)
    }

    /// Create a parentless root scope.
    pub fn create_root(&mut self, name: impl Into<String>) -> ContainerId {
        let id = ContainerId(self.next_id);
        self.next_id += 1;
        self.containers.insert(
            id,
            Container {
                id,
                name: name.into(),
                parent: None,
                children: Vec::new(),
                objects: Vec::new(),
            },
        );
        id
    }

    /// Create a container under the active target.
    pub fn create_in_target(&mut self, name: impl Into<String>) -> Result<ContainerId, ContainerError> {
        let target = self.active_target.ok_or(ContainerError::NoActiveTarget)?;
        self.create(name, Some(target))
    }

    /// Destroy a container and everything beneath it. Returns `false` if it
    /// did not exist (destroying twice is a no-op).
    pub fn destroy(&mut self, id: ContainerId) -> bool {
        let Some(container) = self.containers.remove(&id) else {
            return false;
        };
        if let Some(parent_id) = container.parent
            && let Some(parent) = self.containers.get_mut(&parent_id)
        {
            parent.children.retain(|child| *child != id);
        }

        let mut pending = container.children;
        while let Some(child_id) = pending.pop() {
            if let Some(child) = self.containers.remove(&child_id) {
                pending.extend(child.children);
            }
        }

        if self.active_target.is_some_and(|target| !self.containers.contains_key(&target)) {
            self.active_target = None;
        }
        true
    }

    /// Destroy every child container and object of `id`, keeping `id`
    /// itself (and anything bound to it) alive.
    pub fn clear(&mut self, id: ContainerId) -> Result<(), ContainerError> {
        let container = self
            .containers
            .get_mut(&id)
            .ok_or(ContainerError::UnknownContainer(id))?;
        container.objects.clear();
        let children = container.children.clone();
        for child in children {
            self.destroy(child);
        }
        Ok(())
    }

    pub fn exists(&self, id: ContainerId) -> bool {
        self.containers.contains_key(&id)
    }

    pub fn get(&self, id: ContainerId) -> Option<&Container> {
        self.containers.get(&id)
    }

    /// Set where subsequently instantiated objects attach.
    pub fn set_active_target(&mut self, id: ContainerId) -> Result<(), ContainerError> {
        if !self.exists(id) {
            return Err(ContainerError::UnknownContainer(id));
        }
        self.active_target = Some(id);
        Ok(())
    }

    pub fn active_target(&self) -> Option<ContainerId> {
        self.active_target
    }

    /// Add a plain object to the active target.
    pub fn add_object(&mut self, object: SessionObject) -> Result<(), ContainerError> {
        let target = self.active_target.ok_or(ContainerError::NoActiveTarget)?;
        self.insert_object(target, object)
    }

    /// Add a plain object to a specific container.
    pub fn insert_object(
        &mut self,
        id: ContainerId,
        object: SessionObject,
    ) -> Result<(), ContainerError> {
        let container = self
            .containers
            .get_mut(&id)
            .ok_or(ContainerError::UnknownContainer(id))?;
        container.objects.push(object);
        Ok(())
    }

    /// First direct child of `parent` with the given name.
    pub fn find_child(&self, parent: ContainerId, name: &str) -> Option<ContainerId> {
        self.containers
            .get(&parent)?
            .children
            .iter()
            .copied()
            .find(|child| self.containers.get(child).is_some_and(|c| c.name == name))
    }

    /// Total number of live containers.
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Number of plain objects in `id` and all of its descendants.
    pub fn object_count(&self, id: ContainerId) -> usize {
        let mut count = 0;
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(container) = self.containers.get(&current) {
                count += container.objects.len();
                pending.extend(container.children.iter().copied());
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_links_parent_and_child() {
        let mut containers = ObjectContainers::new();
        let root = containers.create("ServerGroup", None).unwrap();
        let child = containers.create("MissionGroup", Some(root)).unwrap();

        assert_eq!(containers.get(child).unwrap().parent, Some(root));
        assert_eq!(containers.get(root).unwrap().children(), &[child]);
        assert_eq!(containers.find_child(root, "MissionGroup"), Some(child));
        assert_eq!(containers.find_child(root, "MissionCleanup"), None);
    }

    #[test]
    fn create_under_unknown_parent_fails() {
        let mut containers = ObjectContainers::new();
        let err = containers.create("orphan", Some(ContainerId(99))).unwrap_err();
        assert_eq!(err, ContainerError::UnknownContainer(ContainerId(99)));
        assert!(containers.is_empty());
    }

    #[test]
    fn destroy_removes_subtree_and_is_idempotent() {
        let mut containers = ObjectContainers::new();
        let root = containers.create("root", None).unwrap();
        let a = containers.create("a", Some(root)).unwrap();
        let b = containers.create("b", Some(a)).unwrap();
        let c = containers.create("c", Some(root)).unwrap();

        assert!(containers.destroy(a));
        assert!(!containers.exists(a));
        assert!(!containers.exists(b));
        assert!(containers.exists(c));
        assert_eq!(containers.get(root).unwrap().children(), &[c]);

        assert!(!containers.destroy(a));
        assert_eq!(containers.len(), 2);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut containers = ObjectContainers::new();
        let first = containers.create("scope", None).unwrap();
        containers.destroy(first);
        let second = containers.create("scope", None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn objects_attach_to_active_target() {
        let mut containers = ObjectContainers::new();
        let root = containers.create("root", None).unwrap();
        let cleanup = containers.create("cleanup", Some(root)).unwrap();

        assert_eq!(
            containers.add_object(SessionObject::new("Marker", None)),
            Err(ContainerError::NoActiveTarget)
        );

        containers.set_active_target(cleanup).unwrap();
        containers
            .add_object(SessionObject::new("Path", Some("patrol".into())))
            .unwrap();
        assert_eq!(containers.get(cleanup).unwrap().objects().len(), 1);
        assert_eq!(containers.object_count(root), 1);
    }

    #[test]
    fn destroying_active_target_clears_it() {
        let mut containers = ObjectContainers::new();
        let root = containers.create("root", None).unwrap();
        let child = containers.create("child", Some(root)).unwrap();
        containers.set_active_target(child).unwrap();

        containers.destroy(root);
        assert_eq!(containers.active_target(), None);
    }

    #[test]
    fn clear_keeps_the_container_itself() {
        let mut containers = ObjectContainers::new();
        let root = containers.create("root", None).unwrap();
        containers.create("junk", Some(root)).unwrap();
        containers.set_active_target(root).unwrap();
        containers.add_object(SessionObject::new("Marker", None)).unwrap();

        containers.clear(root).unwrap();
        assert!(containers.exists(root));
        assert!(containers.get(root).unwrap().children().is_empty());
        assert_eq!(containers.object_count(root), 0);
        assert_eq!(containers.len(), 1);
    }

    #[test]
    fn set_active_target_rejects_unknown_container() {
        let mut containers = ObjectContainers::new();
        assert_eq!(
            containers.set_active_target(ContainerId(3)),
            Err(ContainerError::UnknownContainer(ContainerId(3)))
        );
    }
}
