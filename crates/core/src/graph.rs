use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use thiserror::Error;

use crate::model::{Concept, ConceptId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Construction failures. Both are course-configuration errors and
/// fatal to course load; a course with a broken graph cannot be served.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
    #[error("concept {0} appears more than once")]
    DuplicateConcept(ConceptId),

    #[error("concept {concept} requires unknown concept {missing}")]
    DanglingEdge {
        concept: ConceptId,
        missing: ConceptId,
    },

    #[error("prerequisite cycle among {} concept(s)", remaining.len())]
    CycleDetected { remaining: Vec<ConceptId> },
}

//
// ─── GRAPH ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug)]
struct Node {
    position: u32,
    prerequisites: Vec<ConceptId>,
    dependents: Vec<ConceptId>,
}

/// Immutable per-course DAG of concepts and "requires" edges.
///
/// Built once when a course is loaded and shared read-only across
/// requests afterwards. Edges point prerequisite → dependent.
/// Query-time calls never fail: asking about an unknown concept id
/// answers "not attemptable" / "no prerequisites" rather than erroring.
#[derive(Debug)]
pub struct PrerequisiteGraph {
    nodes: HashMap<ConceptId, Node>,
}

impl PrerequisiteGraph {
    /// Builds the graph from a course's concepts, validating it.
    ///
    /// # Errors
    ///
    /// - `GraphError::DuplicateConcept` if an id appears twice.
    /// - `GraphError::DanglingEdge` if a prerequisite references an id
    ///   outside the course.
    /// - `GraphError::CycleDetected` if any concept transitively
    ///   requires itself.
    pub fn build(concepts: &[Concept]) -> Result<Self, GraphError> {
        let mut nodes: HashMap<ConceptId, Node> = HashMap::with_capacity(concepts.len());
        for concept in concepts {
            if nodes.contains_key(&concept.id()) {
                return Err(GraphError::DuplicateConcept(concept.id()));
            }
            nodes.insert(
                concept.id(),
                Node {
                    position: concept.position(),
                    prerequisites: concept.prerequisites().to_vec(),
                    dependents: Vec::new(),
                },
            );
        }

        for concept in concepts {
            for prereq in concept.prerequisites() {
                if !nodes.contains_key(prereq) {
                    return Err(GraphError::DanglingEdge {
                        concept: concept.id(),
                        missing: *prereq,
                    });
                }
            }
        }
        for concept in concepts {
            for prereq in concept.prerequisites() {
                if let Some(node) = nodes.get_mut(prereq) {
                    node.dependents.push(concept.id());
                }
            }
        }

        let graph = Self { nodes };

        // A topological pass that cannot consume every node proves a cycle.
        let visited = graph.topological_order().count();
        if visited < graph.len() {
            let mut seen: Vec<ConceptId> = graph.topological_order().collect();
            seen.sort_unstable();
            let mut remaining: Vec<ConceptId> = graph
                .nodes
                .keys()
                .filter(|id| seen.binary_search(id).is_err())
                .copied()
                .collect();
            remaining.sort_unstable();
            return Err(GraphError::CycleDetected { remaining });
        }

        Ok(graph)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: ConceptId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Direct prerequisite ids of a concept; empty for roots and for
    /// unknown ids.
    #[must_use]
    pub fn prerequisites_of(&self, id: ConceptId) -> &[ConceptId] {
        self.nodes
            .get(&id)
            .map_or(&[], |node| node.prerequisites.as_slice())
    }

    /// Concepts that list `id` as a direct prerequisite.
    #[must_use]
    pub fn dependents_of(&self, id: ConceptId) -> &[ConceptId] {
        self.nodes
            .get(&id)
            .map_or(&[], |node| node.dependents.as_slice())
    }

    /// Whether every direct prerequisite of `id` meets the mastery
    /// threshold in the supplied map.
    ///
    /// A concept absent from the map has mastery 0. An unknown `id` is
    /// never attemptable. The check is deliberately direct-only, not
    /// transitive: a prerequisite's own ancestors were already verified
    /// when that prerequisite unlocked, which bounds this call to the
    /// concept's in-degree instead of the graph size.
    #[must_use]
    pub fn can_attempt(
        &self,
        id: ConceptId,
        mastery: &HashMap<ConceptId, u8>,
        threshold: u8,
    ) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        node.prerequisites
            .iter()
            .all(|prereq| mastery.get(prereq).copied().unwrap_or(0) >= threshold)
    }

    /// Lazy dependency-respecting walk over the whole course.
    ///
    /// Yields every concept exactly once, each before all its
    /// dependents, tie-breaking by course position then id so the walk
    /// is deterministic. Calling this again restarts from the top.
    #[must_use]
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        let mut in_degree: HashMap<ConceptId, usize> = HashMap::with_capacity(self.nodes.len());
        let mut ready = BinaryHeap::new();
        for (id, node) in &self.nodes {
            in_degree.insert(*id, node.prerequisites.len());
            if node.prerequisites.is_empty() {
                ready.push(Reverse((node.position, *id)));
            }
        }
        TopologicalOrder {
            graph: self,
            in_degree,
            ready,
        }
    }
}

//
// ─── TOPOLOGICAL ORDER ─────────────────────────────────────────────────────────
//

/// Iterator state for [`PrerequisiteGraph::topological_order`].
///
/// Kahn's algorithm: concepts become ready once every prerequisite has
/// been yielded. On a cyclic input (only possible mid-`build`) the
/// iterator simply ends early.
pub struct TopologicalOrder<'a> {
    graph: &'a PrerequisiteGraph,
    in_degree: HashMap<ConceptId, usize>,
    ready: BinaryHeap<Reverse<(u32, ConceptId)>>,
}

impl Iterator for TopologicalOrder<'_> {
    type Item = ConceptId;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((_, id)) = self.ready.pop()?;
        for dependent in self.graph.dependents_of(id) {
            if let Some(remaining) = self.in_degree.get_mut(dependent) {
                *remaining -= 1;
                if *remaining == 0 {
                    let position = self.graph.nodes[dependent].position;
                    self.ready.push(Reverse((position, *dependent)));
                }
            }
        }
        Some(id)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CourseId;

    fn concept(id: u64, position: u32, prereqs: &[u64]) -> Concept {
        Concept::new(
            ConceptId::new(id),
            CourseId::new(1),
            format!("Concept {id}"),
            None,
            1,
            1.0,
            position,
            prereqs.iter().map(|&p| ConceptId::new(p)).collect(),
            None,
            None,
        )
        .unwrap()
    }

    fn chain() -> Vec<Concept> {
        // 1 -> 2 -> 3, plus 4 depending on 2
        vec![
            concept(1, 0, &[]),
            concept(2, 1, &[1]),
            concept(3, 2, &[2]),
            concept(4, 3, &[2]),
        ]
    }

    #[test]
    fn build_accepts_acyclic_course() {
        let graph = PrerequisiteGraph::build(&chain()).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.prerequisites_of(ConceptId::new(3)), &[ConceptId::new(2)]);
        assert_eq!(
            graph.dependents_of(ConceptId::new(2)),
            &[ConceptId::new(3), ConceptId::new(4)]
        );
    }

    #[test]
    fn build_rejects_dangling_edge() {
        let concepts = vec![concept(1, 0, &[]), concept(2, 1, &[99])];
        let err = PrerequisiteGraph::build(&concepts).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingEdge {
                concept: ConceptId::new(2),
                missing: ConceptId::new(99),
            }
        );
    }

    #[test]
    fn build_rejects_cycle() {
        let concepts = vec![
            concept(1, 0, &[3]),
            concept(2, 1, &[1]),
            concept(3, 2, &[2]),
            concept(4, 3, &[]),
        ];
        let err = PrerequisiteGraph::build(&concepts).unwrap_err();
        match err {
            GraphError::CycleDetected { remaining } => {
                assert_eq!(
                    remaining,
                    vec![ConceptId::new(1), ConceptId::new(2), ConceptId::new(3)]
                );
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn build_rejects_duplicate_concept() {
        let concepts = vec![concept(1, 0, &[]), concept(1, 1, &[])];
        let err = PrerequisiteGraph::build(&concepts).unwrap_err();
        assert_eq!(err, GraphError::DuplicateConcept(ConceptId::new(1)));
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let graph = PrerequisiteGraph::build(&chain()).unwrap();
        let order: Vec<ConceptId> = graph.topological_order().collect();
        assert_eq!(order.len(), 4);

        let index = |id: u64| order.iter().position(|&c| c == ConceptId::new(id)).unwrap();
        assert!(index(1) < index(2));
        assert!(index(2) < index(3));
        assert!(index(2) < index(4));
        // deterministic tie-break by position
        assert!(index(3) < index(4));
    }

    #[test]
    fn topological_order_is_restartable() {
        let graph = PrerequisiteGraph::build(&chain()).unwrap();
        let first: Vec<ConceptId> = graph.topological_order().collect();
        let second: Vec<ConceptId> = graph.topological_order().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn can_attempt_checks_direct_prerequisites_only() {
        let graph = PrerequisiteGraph::build(&chain()).unwrap();
        let mut mastery = HashMap::new();

        // nothing mastered: only the root is attemptable
        assert!(graph.can_attempt(ConceptId::new(1), &mastery, 70));
        assert!(!graph.can_attempt(ConceptId::new(2), &mastery, 70));

        mastery.insert(ConceptId::new(1), 69);
        assert!(!graph.can_attempt(ConceptId::new(2), &mastery, 70));

        mastery.insert(ConceptId::new(1), 70);
        assert!(graph.can_attempt(ConceptId::new(2), &mastery, 70));

        // direct-only: concept 3 needs only 2, regardless of 1's score now
        mastery.insert(ConceptId::new(1), 0);
        mastery.insert(ConceptId::new(2), 85);
        assert!(graph.can_attempt(ConceptId::new(3), &mastery, 70));
    }

    #[test]
    fn unknown_concept_is_never_attemptable() {
        let graph = PrerequisiteGraph::build(&chain()).unwrap();
        let mastery = HashMap::new();
        assert!(!graph.can_attempt(ConceptId::new(99), &mastery, 70));
        assert!(graph.prerequisites_of(ConceptId::new(99)).is_empty());
    }
}
