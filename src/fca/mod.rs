//! Formal Concept Analysis: build a concept lattice from a boolean context
//! of elements × attributes.
//!
//! Concept ids are assigned by a canonical ordering (intent size ascending,
//! ties broken by extent size descending then sorted intent) so that, for a
//! fixed context, the lattice is bit-for-bit reproducible. Concept 0 is
//! always the top concept - the one closest to the empty intent, which is
//! only actually empty when no attribute is shared by every element.

use indexmap::IndexSet;
use tracing::debug;

/// A boolean elements × attributes matrix. Rows and columns are both kept in
/// a canonical (sorted) order so concept enumeration is deterministic.
#[derive(Debug, Clone)]
pub struct FormalContext {
    pub elements: Vec<String>,
    pub attributes: Vec<String>,
    /// `rows[i]` is the set of attribute indices element `i` has.
    rows: Vec<IndexSet<usize>>,
}

impl FormalContext {
    pub fn new(mut elements: Vec<String>, mut attributes: Vec<String>) -> Self {
        elements.sort();
        attributes.sort();
        let rows = vec![IndexSet::new(); elements.len()];
        Self {
            elements,
            attributes,
            rows,
        }
    }

    /// Build a context from a closure mapping each element to its raw
    /// attribute set. If the resulting context has zero columns, a single
    /// sentinel `"∅"` attribute is substituted so a well-formed top/bottom
    /// pair can still be constructed downstream.
    pub fn build(
        mut elements: Vec<String>,
        mut attribute_universe: Vec<String>,
        mut membership: impl FnMut(&str, &str) -> bool,
    ) -> Self {
        elements.sort();
        attribute_universe.sort();
        if attribute_universe.is_empty() {
            attribute_universe.push("\u{2205}".to_string());
        }
        let attr_index: std::collections::HashMap<&str, usize> = attribute_universe
            .iter()
            .enumerate()
            .map(|(i, a)| (a.as_str(), i))
            .collect();
        let rows = elements
            .iter()
            .map(|element| {
                attribute_universe
                    .iter()
                    .filter(|attr| {
                        attr.as_str() != "\u{2205}" && membership(element, attr)
                    })
                    .map(|attr| attr_index[attr.as_str()])
                    .collect()
            })
            .collect();
        Self {
            elements,
            attributes: attribute_universe,
            rows,
        }
    }

    fn extent_of(&self, intent: &IndexSet<usize>) -> IndexSet<usize> {
        (0..self.elements.len())
            .filter(|&i| intent.is_subset(&self.rows[i]))
            .collect()
    }

    fn intent_of(&self, extent: &IndexSet<usize>) -> IndexSet<usize> {
        if extent.is_empty() {
            return (0..self.attributes.len()).collect();
        }
        let mut iter = extent.iter();
        let first = *iter.next().unwrap();
        let mut intent = self.rows[first].clone();
        for &i in iter {
            intent.retain(|a| self.rows[i].contains(a));
        }
        intent
    }
}

#[derive(Debug, Clone)]
pub struct Concept {
    pub id: usize,
    pub extent: IndexSet<usize>,
    pub intent: IndexSet<usize>,
    pub parents: Vec<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ConceptLattice {
    pub concepts: Vec<Concept>,
}

impl ConceptLattice {
    pub fn top(&self) -> Option<&Concept> {
        self.concepts.first()
    }

    pub fn bottom(&self) -> Option<&Concept> {
        self.concepts.last()
    }

    /// Render the Hasse diagram as Graphviz DOT, labeling each concept with
    /// its id and extent size rather than the default `{:?}` debug label.
    pub fn to_dot(&self, context: &FormalContext) -> String {
        let mut graph: petgraph::graph::DiGraph<String, ()> = petgraph::graph::DiGraph::new();
        let nodes: Vec<petgraph::graph::NodeIndex> = self
            .concepts
            .iter()
            .map(|c| {
                let intent: Vec<&str> = c
                    .intent
                    .iter()
                    .map(|&i| context.attributes[i].as_str())
                    .collect();
                graph.add_node(format!("C{} |{}| {{{}}}", c.id, c.extent.len(), intent.join(",")))
            })
            .collect();
        for concept in &self.concepts {
            for &child in &concept.children {
                graph.add_edge(nodes[concept.id], nodes[child], ());
            }
        }
        petgraph::dot::Dot::with_config(&graph, &[petgraph::dot::Config::EdgeNoLabel]).to_string()
    }
}

/// Enumerate all formal concepts of `context` via Next-Closure (Ganter's
/// algorithm), then derive the immediate parent/child (Hasse) edges.
pub fn build_lattice(context: &FormalContext) -> ConceptLattice {
    let n_attrs = context.attributes.len();
    let mut intents: Vec<IndexSet<usize>> = Vec::new();

    // The lectically smallest closed set is closure(∅) = intent_of(extent_of(∅)),
    // not `intent_of(∅)` directly — the latter treats ∅ as an extent and
    // returns the full attribute set (vacuous truth for zero elements), which
    // is the *bottom* concept's intent, not the starting point for Next-Closure.
    let mut current: IndexSet<usize> = context.intent_of(&context.extent_of(&IndexSet::new()));
    intents.push(current.clone());

    loop {
        let mut next = None;
        for attr in (0..n_attrs).rev() {
            if current.contains(&attr) {
                continue;
            }
            // A ⊕ attr := closure((A ∩ {0,...,attr-1}) ∪ {attr}) - attributes of
            // `current` at or above `attr` must be dropped before unioning, or
            // the closure below pulls in constraints that belong to a lectically
            // later candidate and some concepts never get generated.
            let mut candidate_extent_attrs: IndexSet<usize> =
                current.iter().copied().filter(|&a| a < attr).collect();
            candidate_extent_attrs.insert(attr);
            let extent = context.extent_of(&candidate_extent_attrs);
            let closure = context.intent_of(&extent);
            let lectically_smaller_attrs_unchanged = (0..attr).all(|a| {
                closure.contains(&a) == current.contains(&a)
            });
            if lectically_smaller_attrs_unchanged {
                next = Some(closure);
                break;
            }
        }
        match next {
            Some(closure) => {
                intents.push(closure.clone());
                current = closure;
            }
            None => break,
        }
    }

    debug!(concept_count = intents.len(), "enumerated formal concepts");

    let mut concepts: Vec<Concept> = intents
        .into_iter()
        .enumerate()
        .map(|(id, intent)| {
            let extent = context.extent_of(&intent);
            Concept {
                id,
                extent,
                intent,
                parents: Vec::new(),
                children: Vec::new(),
            }
        })
        .collect();

    // Order by increasing intent size (ties by extent size descending) so
    // concept 0 is top and the last is bottom.
    concepts.sort_by(|a, b| {
        a.intent
            .len()
            .cmp(&b.intent.len())
            .then_with(|| b.extent.len().cmp(&a.extent.len()))
            .then_with(|| sorted(&a.intent).cmp(&sorted(&b.intent)))
    });
    for (new_id, concept) in concepts.iter_mut().enumerate() {
        concept.id = new_id;
    }

    link_hasse_edges(&mut concepts);
    ConceptLattice { concepts }
}

fn sorted(set: &IndexSet<usize>) -> Vec<usize> {
    let mut v: Vec<usize> = set.iter().copied().collect();
    v.sort_unstable();
    v
}

/// A concept `b` is a direct child of `a` iff `a.intent ⊊ b.intent` and no
/// other concept's intent sits strictly between them.
fn link_hasse_edges(concepts: &mut [Concept]) {
    let n = concepts.len();
    let subsumes: Vec<Vec<bool>> = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    i != j && concepts[i].intent.is_subset(&concepts[j].intent)
                })
                .collect()
        })
        .collect();

    let mut child_edges: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in 0..n {
            if !subsumes[i][j] {
                continue;
            }
            let is_direct = !(0..n).any(|k| k != i && k != j && subsumes[i][k] && subsumes[k][j]);
            if is_direct {
                child_edges[i].push(j);
            }
        }
    }
    for (i, children) in child_edges.into_iter().enumerate() {
        for child in children {
            concepts[i].children.push(child);
            concepts[child].parents.push(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_context() -> FormalContext {
        FormalContext::build(
            vec!["n1".into(), "n2".into(), "n3".into()],
            vec!["Person".into(), "Customer".into()],
            |element, attr| match (element, attr) {
                ("n1", "Person") => true,
                ("n2", "Person") => true,
                ("n2", "Customer") => true,
                ("n3", "Person") => true,
                ("n3", "Customer") => true,
                _ => false,
            },
        )
    }

    #[test]
    fn top_concept_has_the_shared_attribute_as_its_intent() {
        let context = sample_context();
        let lattice = build_lattice(&context);
        let top = lattice.top().unwrap();
        // "Person" is common to every element, so it's already part of the
        // closure of the empty attribute set - the top concept's intent is
        // never emptier than what every element actually shares.
        let intent: Vec<&str> = top.intent.iter().map(|&i| context.attributes[i].as_str()).collect();
        assert_eq!(intent, vec!["Person"]);
        assert_eq!(top.extent.len(), 3);
    }

    #[test]
    fn bottom_concept_has_full_intent_when_elements_share_nothing_extra() {
        let context = sample_context();
        let lattice = build_lattice(&context);
        let bottom = lattice.bottom().unwrap();
        assert_eq!(bottom.intent.len(), 2);
        assert_eq!(bottom.extent.len(), 2);
    }

    #[test]
    fn zero_column_context_gets_sentinel_attribute() {
        let context = FormalContext::build(
            vec!["n1".into()],
            vec![],
            |_, _| false,
        );
        assert_eq!(context.attributes, vec!["\u{2205}".to_string()]);
        let lattice = build_lattice(&context);
        // No real attribute separates anything, so the lattice degenerates to
        // a trivial top/bottom pair: top = (all elements, no shared attribute),
        // bottom = (no element, the sentinel).
        assert_eq!(lattice.concepts.len(), 2);
        let top = lattice.top().unwrap();
        assert!(top.intent.is_empty());
        assert_eq!(top.extent.len(), 1);
        let bottom = lattice.bottom().unwrap();
        assert_eq!(bottom.intent.len(), 1);
        assert!(bottom.extent.is_empty());
    }

    #[test]
    fn disjoint_attributes_each_get_their_own_atom_concept() {
        // Three elements, each carrying exactly one attribute none of the
        // others have. The lattice must still surface an atom concept per
        // element, not just the top and bottom - a candidate that unions the
        // full running intent with the trial attribute instead of truncating
        // it to attributes below the trial one would skip straight past these.
        let context = FormalContext::build(
            vec!["p".into(), "q".into(), "r".into()],
            vec!["P".into(), "Q".into(), "R".into()],
            |element, attr| element.to_uppercase() == attr,
        );
        let lattice = build_lattice(&context);
        assert_eq!(lattice.concepts.len(), 5);
        let singleton_extents: usize = lattice
            .concepts
            .iter()
            .filter(|c| c.intent.len() == 1 && c.extent.len() == 1)
            .count();
        assert_eq!(singleton_extents, 3);
    }

    #[test]
    fn to_dot_renders_one_node_per_concept() {
        let context = sample_context();
        let lattice = build_lattice(&context);
        let dot = lattice.to_dot(&context);
        assert!(dot.starts_with("digraph"));
        for concept in &lattice.concepts {
            assert!(dot.contains(&format!("C{}", concept.id)));
        }
    }

    #[test]
    fn lattice_is_deterministic_across_runs() {
        let context = sample_context();
        let a = build_lattice(&context);
        let b = build_lattice(&context);
        for (ca, cb) in a.concepts.iter().zip(b.concepts.iter()) {
            assert_eq!(ca.intent, cb.intent);
            assert_eq!(ca.extent, cb.extent);
        }
    }
}
