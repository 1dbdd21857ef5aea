//! The `Type` entity: a schema class with mandatory/optional labels and
//! properties, a sub/supertype DAG, member elements, and (for edges)
//! endpoint node-type sets.

use std::fmt;

use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::graph::DataType;
use crate::graph::ElementKind;
use crate::indented_display::write_indented_lines;
use crate::indented_display::State;

#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub kind: ElementKind,
    pub is_abstract: bool,
    pub labels: IndexSet<String>,
    pub optional_labels: IndexSet<String>,
    pub properties: IndexMap<String, DataType>,
    pub optional_properties: IndexMap<String, DataType>,
    pub supertypes: IndexSet<String>,
    pub subtypes: IndexSet<String>,
    pub members: IndexSet<String>,
    pub start_node_types: IndexSet<String>,
    pub end_node_types: IndexSet<String>,
    pub open_labels: bool,
    pub open_properties: bool,
}

impl Type {
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_abstract: false,
            labels: IndexSet::new(),
            optional_labels: IndexSet::new(),
            properties: IndexMap::new(),
            optional_properties: IndexMap::new(),
            supertypes: IndexSet::new(),
            subtypes: IndexSet::new(),
            members: IndexSet::new(),
            start_node_types: IndexSet::new(),
            end_node_types: IndexSet::new(),
            open_labels: false,
            open_properties: false,
        }
    }

    pub fn get_all_supertypes<'a>(
        &self,
        types: &'a IndexMap<String, Type>,
    ) -> IndexSet<String> {
        let mut seen = IndexSet::new();
        let mut frontier: Vec<&str> = self.supertypes.iter().map(String::as_str).collect();
        while let Some(name) = frontier.pop() {
            if !seen.insert(name.to_string()) {
                continue;
            }
            if let Some(t) = types.get(name) {
                frontier.extend(t.supertypes.iter().map(String::as_str));
            }
        }
        seen
    }

    pub fn get_all_subtypes(&self, types: &IndexMap<String, Type>) -> IndexSet<String> {
        let mut seen = IndexSet::new();
        let mut frontier: Vec<&str> = self.subtypes.iter().map(String::as_str).collect();
        while let Some(name) = frontier.pop() {
            if !seen.insert(name.to_string()) {
                continue;
            }
            if let Some(t) = types.get(name) {
                frontier.extend(t.subtypes.iter().map(String::as_str));
            }
        }
        seen
    }

    /// Subtract every transitive supertype's labels/properties/(endpoints for
    /// edges) from this type's own sets, so emission relies on the `&`
    /// inheritance operator to reconstitute them.
    pub fn remove_inherited_features(&mut self, types: &IndexMap<String, Type>) {
        let supertype_names = self.get_all_supertypes(types);
        let mut inherited_labels = IndexSet::new();
        let mut inherited_optional_labels = IndexSet::new();
        let mut inherited_properties = IndexMap::new();
        let mut inherited_optional_properties = IndexMap::new();
        let mut inherited_start = IndexSet::new();
        let mut inherited_end = IndexSet::new();
        for name in &supertype_names {
            if let Some(t) = types.get(name) {
                inherited_labels.extend(t.labels.iter().cloned());
                inherited_optional_labels.extend(t.optional_labels.iter().cloned());
                inherited_properties.extend(
                    t.properties
                        .iter()
                        .map(|(k, v)| (k.clone(), *v)),
                );
                inherited_optional_properties.extend(
                    t.optional_properties
                        .iter()
                        .map(|(k, v)| (k.clone(), *v)),
                );
                inherited_start.extend(t.start_node_types.iter().cloned());
                inherited_end.extend(t.end_node_types.iter().cloned());
            }
        }
        self.labels.retain(|l| !inherited_labels.contains(l));
        self.optional_labels
            .retain(|l| !inherited_optional_labels.contains(l));
        self.properties
            .retain(|k, _| !inherited_properties.contains_key(k));
        self.optional_properties
            .retain(|k, _| !inherited_optional_properties.contains_key(k));
        self.start_node_types
            .retain(|n| !inherited_start.contains(n));
        self.end_node_types.retain(|n| !inherited_end.contains(n));
    }

    /// Size-weighted average of the four facet Jaccard scores, used
    /// throughout extraction (merge-by-similarity, cap-merge, abstract
    /// synthesis).
    pub fn weighted_jaccard_similarity(&self, other: &Type) -> f64 {
        let facets = [
            facet_jaccard(&self.labels, &other.labels),
            facet_jaccard(&self.optional_labels, &other.optional_labels),
            facet_jaccard_map(&self.properties, &other.properties),
            facet_jaccard_map(&self.optional_properties, &other.optional_properties),
        ];
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (ratio, union_size) in facets {
            numerator += ratio * union_size as f64;
            denominator += union_size as f64;
        }
        if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }

    /// Unweighted arithmetic mean of the four facet Jaccard scores, always
    /// divided by four even when a facet is empty. Used by the schema
    /// merger, which inherited this formula from the type model's original
    /// `jaccard_similarity` rather than the extractor's weighted variant
    /// (see `SPEC_FULL.md` section 9).
    pub fn unweighted_jaccard_similarity(&self, other: &Type) -> f64 {
        let (label_sim, _) = facet_jaccard(&self.labels, &other.labels);
        let (optional_label_sim, _) =
            facet_jaccard(&self.optional_labels, &other.optional_labels);
        let (property_sim, _) = facet_jaccard_map(&self.properties, &other.properties);
        let (optional_property_sim, _) =
            facet_jaccard_map(&self.optional_properties, &other.optional_properties);
        (label_sim + optional_label_sim + property_sim + optional_property_sim) / 4.0
    }

    /// Merge `other` into `self`, which becomes the surviving supertype.
    /// Features present in both stay mandatory; features present in only one
    /// side become optional. `other`'s members and subtype references are
    /// absorbed by `self`.
    pub fn merge_with(&mut self, other: &Type) {
        let merged_labels: IndexSet<String> =
            self.labels.intersection(&other.labels).cloned().collect();
        let mut merged_optional_labels: IndexSet<String> = self
            .optional_labels
            .union(&other.optional_labels)
            .cloned()
            .collect();
        for label in self.labels.symmetric_difference(&other.labels) {
            merged_optional_labels.insert(label.clone());
        }
        merged_optional_labels.retain(|l| !merged_labels.contains(l));

        let merged_properties: IndexMap<String, DataType> = self
            .properties
            .iter()
            .filter_map(|(k, v)| {
                other
                    .properties
                    .get(k)
                    .map(|_| (k.clone(), *v))
            })
            .collect();
        let mut merged_optional_properties: IndexMap<String, DataType> = self
            .optional_properties
            .iter()
            .chain(other.optional_properties.iter())
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for (k, v) in self.properties.iter().chain(other.properties.iter()) {
            if !merged_properties.contains_key(k) {
                merged_optional_properties.insert(k.clone(), *v);
            }
        }
        merged_optional_properties.retain(|k, _| !merged_properties.contains_key(k));

        self.labels = merged_labels;
        self.optional_labels = merged_optional_labels;
        self.properties = merged_properties;
        self.optional_properties = merged_optional_properties;
        self.members.extend(other.members.iter().cloned());
        self.start_node_types
            .extend(other.start_node_types.iter().cloned());
        self.end_node_types
            .extend(other.end_node_types.iter().cloned());
        self.subtypes.extend(
            other
                .subtypes
                .iter()
                .filter(|s| *s != &self.name)
                .cloned(),
        );
        self.subtypes.shift_remove(&other.name);
    }
}

/// Union each type's labels/properties with those of every transitive
/// supertype, populating the inheritance directly into its own sets. This
/// is the inverse of [`Type::remove_inherited_features`].
pub fn propagate_labels_and_properties(types: &mut IndexMap<String, Type>) {
    let snapshot = types.clone();
    for t in types.values_mut() {
        for name in t.get_all_supertypes(&snapshot) {
            let Some(s) = snapshot.get(&name) else {
                continue;
            };
            t.labels.extend(s.labels.iter().cloned());
            t.optional_labels.extend(s.optional_labels.iter().cloned());
            t.properties.extend(s.properties.iter().map(|(k, v)| (k.clone(), *v)));
            t.optional_properties
                .extend(s.optional_properties.iter().map(|(k, v)| (k.clone(), *v)));
        }
        let labels = t.labels.clone();
        t.optional_labels.retain(|l| !labels.contains(l));
        let property_keys: IndexSet<String> = t.properties.keys().cloned().collect();
        t.optional_properties.retain(|k, _| !property_keys.contains(k));
    }
}

fn facet_jaccard(a: &IndexSet<String>, b: &IndexSet<String>) -> (f64, usize) {
    let union_size = a.union(b).count();
    if union_size == 0 {
        return (0.0, 0);
    }
    let intersection_size = a.intersection(b).count();
    (intersection_size as f64 / union_size as f64, union_size)
}

fn facet_jaccard_map(
    a: &IndexMap<String, DataType>,
    b: &IndexMap<String, DataType>,
) -> (f64, usize) {
    let a_keys: IndexSet<String> = a.keys().cloned().collect();
    let b_keys: IndexSet<String> = b.keys().cloned().collect();
    facet_jaccard(&a_keys, &b_keys)
}

/// A full inferred (or parsed) schema: its node types and edge types plus
/// the graph type's own name and openness mode.
#[derive(Debug, Clone)]
pub struct GraphType {
    pub name: String,
    pub loose: bool,
    pub node_types: IndexMap<String, Type>,
    pub edge_types: IndexMap<String, Type>,
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = State::new(f);
        state.write(format!(
            "CREATE GRAPH TYPE {} {}",
            self.name,
            if self.loose { "LOOSE" } else { "STRICT" }
        ))?;
        state.write(" {")?;
        let node_types: Vec<&Type> = self.node_types.values().collect();
        let edge_types: Vec<&Type> = self.edge_types.values().collect();
        let mut first = true;
        write_indented_lines(&mut state, &node_types, &mut first, |s, t| write_node_type(s, t))?;
        write_indented_lines(&mut state, &edge_types, &mut first, |s, t| write_edge_type(s, t))?;
        state.new_line()?;
        state.write("}")
    }
}

fn write_inherit_list(
    state: &mut State<'_, '_>,
    supertypes: &IndexSet<String>,
    labels: &IndexSet<String>,
    optional_labels: &IndexSet<String>,
) -> fmt::Result {
    let mut items: Vec<String> = supertypes.iter().cloned().collect();
    items.extend(labels.iter().cloned());
    items.extend(optional_labels.iter().map(|l| format!("{l}?")));
    if items.is_empty() {
        return Ok(());
    }
    state.write(" : ")?;
    state.write(items.join(" & "))
}

fn write_properties(
    state: &mut State<'_, '_>,
    properties: &IndexMap<String, DataType>,
    optional_properties: &IndexMap<String, DataType>,
    open_properties: bool,
) -> fmt::Result {
    state.write(" {")?;
    let mut entries: Vec<String> = properties
        .iter()
        .map(|(k, v)| format!("{k} {v}"))
        .collect();
    entries.extend(
        optional_properties
            .iter()
            .map(|(k, v)| format!("OPTIONAL {k} {v}")),
    );
    if open_properties {
        entries.push("OPEN".to_string());
    }
    state.write(entries.join(", "))?;
    state.write("}")
}

fn write_node_type(state: &mut State<'_, '_>, t: &Type) -> fmt::Result {
    if t.is_abstract {
        state.write("ABSTRACT ")?;
    }
    state.write("(")?;
    state.write(&t.name)?;
    write_inherit_list(state, &t.supertypes, &t.labels, &t.optional_labels)?;
    if t.open_labels {
        state.write(" OPEN")?;
    }
    write_properties(state, &t.properties, &t.optional_properties, t.open_properties)?;
    state.write(")")
}

fn write_edge_type(state: &mut State<'_, '_>, t: &Type) -> fmt::Result {
    if t.is_abstract {
        state.write("ABSTRACT ")?;
    }
    state.write("(:")?;
    state.write(t.start_node_types.iter().cloned().collect::<Vec<_>>().join("|"))?;
    state.write(") - [")?;
    state.write(&t.name)?;
    write_inherit_list(state, &t.supertypes, &t.labels, &t.optional_labels)?;
    if t.open_labels {
        state.write(" OPEN")?;
    }
    write_properties(state, &t.properties, &t.optional_properties, t.open_properties)?;
    state.write("] -> (:")?;
    state.write(t.end_node_types.iter().cloned().collect::<Vec<_>>().join("|"))?;
    state.write(")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ElementKind;

    fn person() -> Type {
        let mut t = Type::new("NodeType0", ElementKind::Node);
        t.labels.insert("Person".into());
        t.properties.insert("name".into(), DataType::String);
        t
    }

    #[test]
    fn disjoint_labels_and_optional_labels_invariant_holds_after_merge() {
        let mut a = person();
        let mut b = person();
        b.labels.insert("Customer".into());
        a.merge_with(&b);
        assert!(a.labels.is_disjoint(&a.optional_labels));
        assert!(a.labels.contains("Person"));
        assert!(a.optional_labels.contains("Customer"));
    }

    #[test]
    fn weighted_similarity_is_symmetric() {
        let a = person();
        let mut b = person();
        b.labels.insert("Customer".into());
        assert!((a.weighted_jaccard_similarity(&b) - b.weighted_jaccard_similarity(&a)).abs() < 1e-9);
    }

    #[test]
    fn unweighted_similarity_divides_by_four_even_when_facets_are_empty() {
        let a = person();
        let b = person();
        // Labels and properties match exactly (Jaccard 1.0 each); the two
        // empty optional facets each contribute a 0 term rather than being
        // excluded from the average, so the total is 0.5, not 1.0.
        let sim = a.unweighted_jaccard_similarity(&b);
        assert!((sim - 0.5).abs() < 1e-9);
    }
}
