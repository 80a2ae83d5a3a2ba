//! Workflow specs and submission-time verification

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::spec::FunctionSpec;

/// A workflow spec: the declarative template a graph is instantiated from.
/// Node names key the dependency edges between the member function specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "functionspecs", default)]
    pub function_specs: Vec<FunctionSpec>,
}

/// Why a workflow spec was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowVerificationError {
    #[error("workflow spec has no function specs")]
    Empty,

    #[error("node name is empty")]
    EmptyNodeName,

    #[error("duplicate node name: {0}")]
    DuplicateNodeName(String),

    #[error("dependency {dependency} of node {node} is not declared in the spec")]
    UnknownDependency { node: String, dependency: String },

    #[error("workflow has no root node")]
    NoRoot,

    #[error("dependency cycle involving node {0}")]
    Cycle(String),
}

impl WorkflowSpec {
    pub fn new(colony_id: impl Into<String>) -> Self {
        Self {
            colony_id: colony_id.into(),
            function_specs: Vec::new(),
        }
    }

    pub fn add(&mut self, spec: FunctionSpec) {
        self.function_specs.push(spec);
    }

    /// Verify the spec before any row is written: node names unique and
    /// non-empty, dependencies resolve within the spec, at least one root,
    /// and no dependency cycles.
    pub fn verify(&self) -> Result<(), WorkflowVerificationError> {
        if self.function_specs.is_empty() {
            return Err(WorkflowVerificationError::Empty);
        }

        let mut names = HashSet::new();
        for spec in &self.function_specs {
            if spec.node_name.is_empty() {
                return Err(WorkflowVerificationError::EmptyNodeName);
            }
            if !names.insert(spec.node_name.as_str()) {
                return Err(WorkflowVerificationError::DuplicateNodeName(
                    spec.node_name.clone(),
                ));
            }
        }

        let mut has_root = false;
        for spec in &self.function_specs {
            if spec.conditions.dependencies.is_empty() {
                has_root = true;
            }
            for dependency in &spec.conditions.dependencies {
                if !names.contains(dependency.as_str()) {
                    return Err(WorkflowVerificationError::UnknownDependency {
                        node: spec.node_name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        if !has_root {
            return Err(WorkflowVerificationError::NoRoot);
        }

        self.check_cycles()
    }

    /// Three-color DFS over node → dependencies; a back-edge is a cycle.
    fn check_cycles(&self) -> Result<(), WorkflowVerificationError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let edges: HashMap<&str, &[String]> = self
            .function_specs
            .iter()
            .map(|s| (s.node_name.as_str(), s.conditions.dependencies.as_slice()))
            .collect();
        let mut colors: HashMap<&str, Color> =
            edges.keys().map(|&name| (name, Color::White)).collect();

        fn visit<'a>(
            node: &'a str,
            edges: &HashMap<&'a str, &'a [String]>,
            colors: &mut HashMap<&'a str, Color>,
        ) -> Result<(), WorkflowVerificationError> {
            colors.insert(node, Color::Gray);
            for dependency in edges.get(node).copied().unwrap_or_default() {
                match colors.get(dependency.as_str()) {
                    Some(Color::Gray) => {
                        return Err(WorkflowVerificationError::Cycle(dependency.clone()))
                    }
                    Some(Color::White) => visit(dependency, edges, colors)?,
                    _ => {}
                }
            }
            colors.insert(node, Color::Black);
            Ok(())
        }

        for spec in &self.function_specs {
            if colors[spec.node_name.as_str()] == Color::White {
                visit(&spec.node_name, &edges, &mut colors)?;
            }
        }
        Ok(())
    }
}
