//! Resource-definition layer: logical ids, synthesized resources and the
//! two-phase [`Stack`] (construct everything, then validate and synthesize).

use serde::{Serialize, Deserialize};
use serde_json::{json, Value as Json};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

mod resource;
mod stack;

pub use resource::{DeletionPolicy, Resource};
pub use stack::{Assembly, Diagnostic, Stack, Validation, ValidationReport};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Logical id for a construct path. CloudFormation only accepts ASCII
    /// alphanumerics, everything else is dropped.
    pub fn from_path(parts: &[&str]) -> Self {
        let id: String = parts
            .iter()
            .flat_map(|p| p.chars())
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        ResourceId(id)
    }

    pub fn new(id: impl AsRef<str>) -> Self { Self::from_path(&[id.as_ref()]) }

    pub fn child(&self, suffix: &str) -> Self { Self::from_path(&[&self.0, suffix]) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// `{ "Ref": id }`
pub fn ref_to(id: &ResourceId) -> Json { json!({ "Ref": id.0 }) }

/// `{ "Fn::GetAtt": [id, attr] }`
pub fn get_att(id: &ResourceId, attr: &str) -> Json { json!({ "Fn::GetAtt": [id.0, attr] }) }

/// Logical ids referenced through `Ref` / `Fn::GetAtt` anywhere in `value`.
/// Pseudo parameters (`AWS::Region`, ...) are not resources and are skipped.
pub fn references(value: &Json) -> BTreeSet<ResourceId> {
    let mut out = BTreeSet::new();
    collect_references(value, &mut out);
    out
}

fn collect_references(value: &Json, out: &mut BTreeSet<ResourceId>) {
    match value {
        Json::Object(map) => {
            if let Some(Json::String(target)) = map.get("Ref") {
                if !target.starts_with("AWS::") { out.insert(ResourceId(target.clone())); }
            }
            match map.get("Fn::GetAtt") {
                Some(Json::Array(parts)) => {
                    if let Some(Json::String(target)) = parts.first() { out.insert(ResourceId(target.clone())); }
                }
                Some(Json::String(dotted)) => {
                    if let Some((target, _)) = dotted.split_once('.') { out.insert(ResourceId(target.to_string())); }
                }
                _ => {}
            }
            for v in map.values() { collect_references(v, out); }
        }
        Json::Array(items) => {
            for v in items { collect_references(v, out); }
        }
        _ => {}
    }
}

/// Synthesized state a validation needs is missing entirely. This is a
/// construction fault, not a compliance verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct Misconfiguration(pub String);

impl Misconfiguration {
    pub fn new(msg: impl Into<String>) -> Self { Misconfiguration(msg.into()) }
}

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("dependency cycle detected")]
    Cycle,
    #[error("duplicate logical id '{0}'")]
    DuplicateId(ResourceId),
    #[error("resource '{from}' references unknown resource '{to}'")]
    UnresolvedReference { from: ResourceId, to: ResourceId },
    #[error("cannot override '{path}' on resource '{id}'")]
    InvalidOverride { id: ResourceId, path: String },
    #[error("{path}: {source}")]
    Misconfigured { path: String, source: Misconfiguration },
    #[error("validation failed:\n{}", stack::render_diagnostics(.0))]
    Validation(Vec<Diagnostic>),
}
