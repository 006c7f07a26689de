use serde::{Serialize, Deserialize};
use serde_json::{Value as Json, Map as JsonMap};
use std::collections::BTreeSet;

use crate::{get_att, ref_to, references, ResourceId, SynthError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy { Delete, Retain, Snapshot }

/// A synthesized, low-level resource: CloudFormation type plus properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub type_name: String,
    pub properties: JsonMap<String, Json>,
    #[serde(default)]
    pub depends_on: BTreeSet<ResourceId>,
    #[serde(default)]
    pub deletion_policy: Option<DeletionPolicy>,
}

impl Resource {
    /// `properties` is expected to be a JSON object; anything else yields a
    /// resource without properties.
    pub fn new(id: ResourceId, type_name: impl Into<String>, properties: Json) -> Self {
        let properties = match properties {
            Json::Object(map) => map,
            _ => JsonMap::new(),
        };
        Resource { id, type_name: type_name.into(), properties, depends_on: BTreeSet::new(), deletion_policy: None }
    }

    pub fn depends_on(mut self, id: &ResourceId) -> Self {
        self.depends_on.insert(id.clone());
        self
    }

    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    pub fn is_type(&self, type_name: &str) -> bool { self.type_name == type_name }

    pub fn prop(&self, key: &str) -> Option<&Json> { self.properties.get(key) }

    /// Looks up a dotted property path, e.g. `EndpointConfiguration.Types.0`.
    pub fn pointer(&self, path: &str) -> Option<&Json> {
        let mut segments = path.split('.');
        let mut cur = self.properties.get(segments.next()?)?;
        for seg in segments {
            cur = match cur {
                Json::Object(map) => map.get(seg)?,
                Json::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cur)
    }

    /// Escape hatch: set a property at a dotted path, creating intermediate objects.
    pub fn add_override(&mut self, path: &str, value: Json) -> Result<(), SynthError> {
        let segments: Vec<&str> = path.split('.').collect();
        if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(self.invalid_override(path));
        }
        let mut root = Json::Object(std::mem::take(&mut self.properties));
        let ok = set_path(&mut root, &segments, value);
        if let Json::Object(map) = root { self.properties = map; }
        if ok { Ok(()) } else { Err(self.invalid_override(path)) }
    }

    /// Escape hatch: remove the property at a dotted path. Missing paths are ignored.
    pub fn add_deletion_override(&mut self, path: &str) {
        let segments: Vec<&str> = path.split('.').collect();
        let mut root = Json::Object(std::mem::take(&mut self.properties));
        remove_path(&mut root, &segments);
        if let Json::Object(map) = root { self.properties = map; }
    }

    /// Every other resource this one needs: intrinsic references plus explicit `DependsOn`.
    pub fn dependencies(&self) -> BTreeSet<ResourceId> {
        let mut deps = references(&Json::Object(self.properties.clone()));
        deps.extend(self.depends_on.iter().cloned());
        deps.remove(&self.id);
        deps
    }

    /// Whether any property refers to `target` through an intrinsic.
    pub fn refers_to(&self, target: &ResourceId) -> bool {
        self.properties.values().any(|v| references(v).contains(target))
    }

    pub fn ref_(&self) -> Json { ref_to(&self.id) }

    pub fn get_att(&self, attr: &str) -> Json { get_att(&self.id, attr) }

    fn invalid_override(&self, path: &str) -> SynthError {
        SynthError::InvalidOverride { id: self.id.clone(), path: path.to_string() }
    }
}

fn set_path(node: &mut Json, path: &[&str], value: Json) -> bool {
    let Some((head, rest)) = path.split_first() else {
        *node = value;
        return true;
    };
    match node {
        Json::Null => {
            *node = Json::Object(JsonMap::new());
            set_path(node, path, value)
        }
        Json::Object(map) => {
            let child = map.entry(head.to_string()).or_insert(Json::Null);
            set_path(child, rest, value)
        }
        Json::Array(items) => match head.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            Some(child) => set_path(child, rest, value),
            None => false,
        },
        _ => false,
    }
}

fn remove_path(node: &mut Json, path: &[&str]) {
    match path {
        [] => {}
        [leaf] => match node {
            Json::Object(map) => { map.remove(*leaf); }
            Json::Array(items) => {
                if let Some(i) = leaf.parse::<usize>().ok().filter(|i| *i < items.len()) { items.remove(i); }
            }
            _ => {}
        },
        [head, rest @ ..] => {
            let child = match node {
                Json::Object(map) => map.get_mut(*head),
                Json::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
                _ => None,
            };
            if let Some(child) = child { remove_path(child, rest); }
        }
    }
}
