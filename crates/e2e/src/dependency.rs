//! Test dependency graph
//!
//! Every test declares the tests that must have passed before it may run.
//! Declarations for the same test are merged (set union), and the transitive
//! closure is recomputed on every registration so that cycles are rejected
//! as soon as they are introduced.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Adjacency map from a test name to its directly declared dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    declared: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `deps` into the declared dependencies of `name` and return the
    /// resulting transitive closure.
    ///
    /// If the merge would introduce a cycle the new edges are rolled back and
    /// [`E2eError::DependencyCycle`] is returned with the offending path.
    pub fn add_dependencies<I, S>(&mut self, name: &str, deps: I) -> E2eResult<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.declared.entry(name.to_string()).or_default();
        let added: Vec<String> = deps
            .into_iter()
            .map(Into::into)
            .filter(|dep| entry.insert(dep.clone()))
            .collect();

        match self.try_closure(name) {
            Ok(closure) => {
                debug!(test = name, added = ?added, closure = ?closure, "registered dependencies");
                Ok(closure)
            }
            Err(err) => {
                if let Some(entry) = self.declared.get_mut(name) {
                    for dep in &added {
                        entry.remove(dep);
                    }
                }
                Err(err)
            }
        }
    }

    /// Whether `name` has been registered (with or without dependencies).
    pub fn contains(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    /// Directly declared dependencies of `name`.
    pub fn direct(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.declared.get(name)
    }

    /// Every test that must pass before `name`, transitively.
    ///
    /// The graph is kept acyclic by [`add_dependencies`](Self::add_dependencies),
    /// so the result never contains `name` itself.
    pub fn closure(&self, name: &str) -> BTreeSet<String> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<&str> = self
            .declared
            .get(name)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default();

        while let Some(dep) = stack.pop() {
            if dep == name || !closure.insert(dep.to_string()) {
                continue;
            }
            if let Some(next) = self.declared.get(dep) {
                stack.extend(next.iter().map(String::as_str));
            }
        }

        closure
    }

    fn try_closure(&self, name: &str) -> E2eResult<BTreeSet<String>> {
        let mut closure = BTreeSet::new();
        let mut done = HashSet::new();
        let mut path = Vec::new();
        done.insert(name);
        self.visit(name, &mut done, &mut path, &mut closure)?;
        Ok(closure)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        done: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
        closure: &mut BTreeSet<String>,
    ) -> E2eResult<()> {
        path.push(node);

        if let Some(deps) = self.declared.get(node) {
            for dep in deps {
                if let Some(start) = path.iter().position(|n| *n == dep.as_str()) {
                    let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(dep.clone());
                    return Err(E2eError::DependencyCycle(cycle));
                }

                closure.insert(dep.clone());
                if done.insert(dep.as_str()) {
                    self.visit(dep, done, path, closure)?;
                }
            }
        }

        path.pop();
        Ok(())
    }
}
