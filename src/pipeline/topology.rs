//! Pipeline-scoped topology registry.
//!
//! Owns pipe identity (id allocation, name interning) and the link graph,
//! and performs all construction-time validation: self-links, duplicates,
//! launched endpoints, cycles, and optional-ancestor agreement at fan-in
//! joins. Keeping the registry on the pipeline (rather than in globals)
//! means two pipelines in one process never share mutable state.

use crate::error::ProtocolError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Identifier of a pipe within its pipeline.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipeId(u64);

impl PipeId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value, for diagnostics.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipeId({})", self.0)
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe-{}", self.0)
    }
}

struct PipeNode {
    name: Arc<str>,
    optional: bool,
    launched: bool,
    /// Upstream pipe per input link, parallel to the pipe's ready vector.
    inputs: Vec<PipeId>,
    /// Downstream pipes, in link order.
    outputs: Vec<PipeId>,
}

/// The pipeline's view of pipe identity and linkage.
pub(crate) struct Topology {
    nodes: HashMap<PipeId, PipeNode>,
    interned: HashMap<String, Arc<str>>,
    next_id: u64,
}

impl Topology {
    pub(crate) fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            interned: HashMap::new(),
            next_id: 0,
        }
    }

    /// Registers a new pipe, returning its id and interned name.
    pub(crate) fn register(&mut self, name: &str, optional: bool) -> (PipeId, Arc<str>) {
        let name = self.intern(name);
        let id = PipeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            PipeNode {
                name: Arc::clone(&name),
                optional,
                launched: false,
                inputs: Vec::new(),
                outputs: Vec::new(),
            },
        );
        (id, name)
    }

    fn intern(&mut self, name: &str) -> Arc<str> {
        if let Some(interned) = self.interned.get(name) {
            return Arc::clone(interned);
        }
        let interned: Arc<str> = Arc::from(name);
        self.interned
            .insert(name.to_string(), Arc::clone(&interned));
        interned
    }

    pub(crate) fn mark_launched(&mut self, id: PipeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.launched = true;
        }
    }

    fn name_of(&self, id: PipeId) -> String {
        self.nodes
            .get(&id)
            .map(|n| n.name.to_string())
            .unwrap_or_else(|| id.to_string())
    }

    /// Validates the edge `from -> to` against every construction rule.
    pub(crate) fn validate_link(&self, from: PipeId, to: PipeId) -> Result<(), ProtocolError> {
        if from == to {
            return Err(ProtocolError::SelfLink {
                pipe: self.name_of(from),
            });
        }

        let from_node = self.nodes.get(&from).ok_or(ProtocolError::StalePipeline)?;
        let to_node = self.nodes.get(&to).ok_or(ProtocolError::StalePipeline)?;

        if from_node.outputs.contains(&to) {
            return Err(ProtocolError::DuplicateLink {
                from: self.name_of(from),
                to: self.name_of(to),
            });
        }

        if to_node.launched {
            return Err(ProtocolError::AlreadyLaunched {
                pipe: self.name_of(to),
            });
        }
        if from_node.launched {
            return Err(ProtocolError::AlreadyLaunched {
                pipe: self.name_of(from),
            });
        }

        if self.reaches(to, from) {
            return Err(ProtocolError::CyclicLink {
                from: self.name_of(from),
                to: self.name_of(to),
            });
        }

        // Fan-in joins must agree on the optional branch point governing
        // their synchronization. The first link into a pipe is free; every
        // further link must share the existing governing ancestor, and a
        // join with no optional ancestor anywhere has no governing point at
        // all and is rejected.
        if !to_node.inputs.is_empty() {
            let existing = self.nearest_optional_ancestor(to);
            let incoming = if from_node.optional {
                Some(from)
            } else {
                self.nearest_optional_ancestor(from)
            };
            if existing != incoming || existing.is_none() {
                return Err(ProtocolError::OptionalAncestorMismatch {
                    from: self.name_of(from),
                    to: self.name_of(to),
                });
            }
        }

        Ok(())
    }

    /// Records the edge `from -> to`. Must be preceded by `validate_link`.
    pub(crate) fn add_link(&mut self, from: PipeId, to: PipeId) {
        if let Some(node) = self.nodes.get_mut(&from) {
            node.outputs.push(to);
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            node.inputs.push(from);
        }
    }

    /// Returns true if `target` is reachable downstream from `start`.
    fn reaches(&self, start: PipeId, target: PipeId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                queue.extend(node.outputs.iter().copied());
            }
        }
        false
    }

    /// The nearest optional pipe on the upstream walk from `id`, excluding
    /// `id` itself.
    ///
    /// Validation guarantees all upstream paths of an already-linked pipe
    /// agree, so walking the first input link of each hop suffices.
    fn nearest_optional_ancestor(&self, id: PipeId) -> Option<PipeId> {
        let mut current = id;
        let mut visited = HashSet::new();
        while visited.insert(current) {
            let node = self.nodes.get(&current)?;
            let up = *node.inputs.first()?;
            let up_node = self.nodes.get(&up)?;
            if up_node.optional {
                return Some(up);
            }
            current = up;
        }
        None
    }
}
