use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::fmt;

use crate::{Misconfiguration, Resource, ResourceId, SynthError};

/// A check registered during construction and run when the stack is synthesized.
pub trait Validation {
    /// One message per failed check. `Err` when the stack lacks the state needed to judge.
    fn validate(&self, stack: &Stack) -> Result<Vec<String>, Misconfiguration>;
}

impl<F> Validation for F
where
    F: Fn(&Stack) -> Result<Vec<String>, Misconfiguration>,
{
    fn validate(&self, stack: &Stack) -> Result<Vec<String>, Misconfiguration> { self(stack) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Construct path that registered the failing validation.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "[{}] {}", self.path, self.message) }
}

pub(crate) fn render_diagnostics(diags: &[Diagnostic]) -> String {
    diags.iter().map(|d| format!("  {d}")).collect::<Vec<_>>().join("\n")
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_compliant(&self) -> bool { self.diagnostics.is_empty() }

    pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics.iter().filter(move |d| d.path == path)
    }
}

/// Output of a successful synthesis: resources in dependency order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assembly {
    pub stack_name: String,
    pub description: Option<String>,
    pub resources: Vec<Resource>,
}

/// Build-phase controller. Constructs add resources and register validations;
/// [`Stack::synth`] consumes the stack, so validation runs exactly once and
/// only after the whole graph exists.
pub struct Stack {
    name: String,
    description: Option<String>,
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    validations: Vec<(String, Box<dyn Validation>)>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Stack { name: name.into(), description: None, resources: Vec::new(), index: HashMap::new(), validations: Vec::new() }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn add(&mut self, resource: Resource) -> Result<ResourceId, SynthError> {
        if self.index.contains_key(&resource.id) {
            return Err(SynthError::DuplicateId(resource.id));
        }
        let id = resource.id.clone();
        tracing::debug!(stack = %self.name, id = %id, type_name = %resource.type_name, "resource added");
        self.index.insert(id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(id)
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn get_mut(&mut self, id: &ResourceId) -> Option<&mut Resource> {
        self.index.get(id).map(|&i| &mut self.resources[i])
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> { self.resources.iter() }

    pub fn of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources.iter().filter(move |r| r.is_type(type_name))
    }

    pub fn add_validation(&mut self, path: impl Into<String>, validation: impl Validation + 'static) {
        self.validations.push((path.into(), Box::new(validation)));
    }

    /// Runs every registered validation in registration order. A fault aborts
    /// immediately; failed checks are collected.
    pub fn validate(&self) -> Result<ValidationReport, SynthError> {
        let mut report = ValidationReport::default();
        for (path, validation) in &self.validations {
            let messages = validation
                .validate(self)
                .map_err(|source| SynthError::Misconfigured { path: path.clone(), source })?;
            report.diagnostics.extend(messages.into_iter().map(|message| Diagnostic { path: path.clone(), message }));
        }
        Ok(report)
    }

    pub fn synth(self) -> Result<Assembly, SynthError> {
        let report = self.validate()?;
        if !report.is_compliant() {
            tracing::warn!(stack = %self.name, failures = report.diagnostics.len(), "stack is not compliant");
            return Err(SynthError::Validation(report.diagnostics));
        }

        let mut g: DiGraph<usize, ()> = DiGraph::new();
        let nodes: Vec<_> = (0..self.resources.len()).map(|i| g.add_node(i)).collect();
        for (i, r) in self.resources.iter().enumerate() {
            for dep in r.dependencies() {
                let Some(&from) = self.index.get(&dep) else {
                    return Err(SynthError::UnresolvedReference { from: r.id.clone(), to: dep });
                };
                g.add_edge(nodes[from], nodes[i], ());
            }
        }
        let ordered = toposort(&g, None).map_err(|_| SynthError::Cycle)?;

        let mut slots: Vec<Option<Resource>> = self.resources.into_iter().map(Some).collect();
        let resources: Vec<Resource> = ordered.into_iter().filter_map(|ix| slots[g[ix]].take()).collect();
        tracing::info!(stack = %self.name, resources = resources.len(), "synthesized stack");
        Ok(Assembly { stack_name: self.name, description: self.description, resources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Checked = Result<Vec<String>, Misconfiguration>;

    fn res(id: &str, props: serde_json::Value) -> Resource {
        Resource::new(ResourceId::new(id), "AWS::Test::Thing", props)
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut stack = Stack::new("s");
        stack.add(res("A", json!({}))).unwrap();
        assert!(matches!(stack.add(res("A", json!({}))), Err(SynthError::DuplicateId(_))));
    }

    #[test]
    fn synth_orders_resources_by_reference() {
        let mut stack = Stack::new("s");
        stack.add(res("Plan", json!({ "Vault": { "Ref": "Vault" } }))).unwrap();
        stack.add(res("Selection", json!({ "Plan": { "Fn::GetAtt": ["Plan", "Id"] } }))).unwrap();
        stack.add(res("Vault", json!({}))).unwrap();
        let ids: Vec<_> = stack.synth().unwrap().resources.into_iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec!["Vault", "Plan", "Selection"]);
    }

    #[test]
    fn unknown_references_and_cycles_fail() {
        let mut stack = Stack::new("s");
        stack.add(res("A", json!({ "X": { "Ref": "Ghost" } }))).unwrap();
        assert!(matches!(stack.synth(), Err(SynthError::UnresolvedReference { .. })));

        let mut stack = Stack::new("s");
        stack.add(res("A", json!({ "X": { "Ref": "B" } }))).unwrap();
        stack.add(res("B", json!({ "X": { "Ref": "A" } }))).unwrap();
        assert!(matches!(stack.synth(), Err(SynthError::Cycle)));
    }

    #[test]
    fn validations_see_resources_added_after_registration() {
        let mut stack = Stack::new("s");
        stack.add_validation("Bucket", |s: &Stack| -> Checked {
            Ok(if s.get(&ResourceId::new("Policy")).is_some() { vec![] } else { vec!["no policy".to_string()] })
        });
        assert_eq!(stack.validate().unwrap().diagnostics.len(), 1);
        stack.add(res("Policy", json!({}))).unwrap();
        assert!(stack.validate().unwrap().is_compliant());
    }

    #[test]
    fn diagnostics_fail_synth_and_keep_registration_order() {
        let mut stack = Stack::new("s");
        stack.add_validation("First", |_: &Stack| -> Checked { Ok(vec!["one".to_string(), "two".to_string()]) });
        stack.add_validation("Second", |_: &Stack| -> Checked { Ok(vec!["three".to_string()]) });
        match stack.synth() {
            Err(SynthError::Validation(diags)) => {
                let rendered: Vec<_> = diags.iter().map(|d| d.to_string()).collect();
                assert_eq!(rendered, vec!["[First] one", "[First] two", "[Second] three"]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn faults_abort_with_the_construct_path() {
        let mut stack = Stack::new("s");
        stack.add_validation("Ok", |_: &Stack| -> Checked { Ok(vec!["ignored".to_string()]) });
        stack.add_validation("Api", |_: &Stack| -> Checked { Err(Misconfiguration::new("endpoint configuration missing")) });
        let err = stack.validate().unwrap_err();
        assert_eq!(err.to_string(), "Api: endpoint configuration missing");
    }
}
