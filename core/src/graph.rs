use std::collections::HashMap;

/// Internal node identifier (dense index into the node table).
pub type NodeId = u64;

/// A single concept as held by the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptRecord {
    /// Globally unique node identifier.
    pub id: String,
    /// Owning vocabulary id (the `classOf` target).
    pub vocab: String,
    /// Vocabulary-local code.
    pub code: String,
    pub label: String,
    pub synonyms: Vec<String>,
}

impl ConceptRecord {
    pub fn new(
        id: impl Into<String>,
        vocab: impl Into<String>,
        code: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            vocab: vocab.into(),
            code: code.into(),
            label: label.into(),
            synonyms: Vec::new(),
        }
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }
}

/// Which side of a `subClassOf` edge to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyDirection {
    /// Follow `subClassOf` edges forward: child -> parent.
    Parents,
    /// Follow `subClassOf` edges backward: parent -> child.
    Children,
}

/// In-memory hierarchy: concept table + vocabulary membership + `subClassOf`
/// adjacency lists.
///
/// Edges are stored bidirectionally: `parents[a]` holds the direct
/// `subClassOf` targets of a, `children[b]` holds the concepts pointing at b.
/// Both are populated on insert.
pub struct HierarchyGraph {
    nodes: Vec<ConceptRecord>,
    parents: HashMap<NodeId, Vec<NodeId>>,
    children: HashMap<NodeId, Vec<NodeId>>,
    vocabularies: HashMap<String, String>,
    members: HashMap<String, Vec<NodeId>>,
    code_index: HashMap<(String, String), NodeId>,
    id_index: HashMap<String, NodeId>,
}

impl HierarchyGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            parents: HashMap::new(),
            children: HashMap::new(),
            vocabularies: HashMap::new(),
            members: HashMap::new(),
            code_index: HashMap::new(),
            id_index: HashMap::new(),
        }
    }

    /// Pre-allocate for a known hierarchy size.
    pub fn with_capacity(node_count: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(node_count),
            parents: HashMap::with_capacity(node_count),
            children: HashMap::with_capacity(node_count),
            vocabularies: HashMap::new(),
            members: HashMap::new(),
            code_index: HashMap::with_capacity(node_count),
            id_index: HashMap::with_capacity(node_count),
        }
    }

    /// Register a vocabulary. Re-registering replaces the label.
    pub fn add_vocabulary(&mut self, id: impl Into<String>, label: impl Into<String>) {
        let id = id.into();
        self.members.entry(id.clone()).or_default();
        self.vocabularies.insert(id, label.into());
    }

    pub fn has_vocabulary(&self, id: &str) -> bool {
        self.vocabularies.contains_key(id)
    }

    pub fn vocabulary_label(&self, id: &str) -> Option<&str> {
        self.vocabularies.get(id).map(String::as_str)
    }

    /// Add a concept and its `classOf` membership.
    ///
    /// A record whose `(vocab, code)` is already present replaces the stored
    /// record and keeps its NodeId, so edges pointing at it stay valid.
    pub fn add_concept(&mut self, record: ConceptRecord) -> NodeId {
        let key = (record.vocab.clone(), record.code.clone());
        if let Some(&existing) = self.code_index.get(&key) {
            let slot = &mut self.nodes[existing as usize];
            self.id_index.remove(&slot.id);
            self.id_index.insert(record.id.clone(), existing);
            *slot = record;
            return existing;
        }

        if !self.vocabularies.contains_key(&record.vocab) {
            self.add_vocabulary(record.vocab.clone(), record.vocab.clone());
        }

        let id = self.nodes.len() as NodeId;
        self.id_index.insert(record.id.clone(), id);
        self.members.entry(record.vocab.clone()).or_default().push(id);
        self.code_index.insert(key, id);
        self.nodes.push(record);
        id
    }

    /// Add a `subClassOf` edge from `child` to `parent`.
    pub fn add_sub_class_of(&mut self, child: NodeId, parent: NodeId) {
        self.parents.entry(child).or_default().push(parent);
        self.children.entry(parent).or_default().push(child);
    }

    /// Add a `subClassOf` edge by codes within one vocabulary.
    /// Returns false when either code is unknown.
    pub fn link(&mut self, vocab: &str, child_code: &str, parent_code: &str) -> bool {
        match (self.resolve(vocab, child_code), self.resolve(vocab, parent_code)) {
            (Some(child), Some(parent)) => {
                self.add_sub_class_of(child, parent);
                true
            }
            _ => false,
        }
    }

    /// Bulk load concepts with their direct parent codes.
    ///
    /// Two phases: every concept is registered first, then edges are added,
    /// so a record may name a parent that appears later in the input.
    /// Parent codes that never resolve are skipped.
    pub fn load_records<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = (ConceptRecord, Vec<String>)>,
    {
        let mut pending = Vec::new();
        for (record, parent_codes) in records {
            let vocab = record.vocab.clone();
            let child = self.add_concept(record);
            pending.push((vocab, child, parent_codes));
        }

        let mut linked = 0;
        for (vocab, child, parent_codes) in pending {
            for code in parent_codes {
                if let Some(parent) = self.resolve(&vocab, &code) {
                    self.add_sub_class_of(child, parent);
                    linked += 1;
                }
            }
        }
        linked
    }

    /// Look up a concept by its vocabulary-scoped code.
    pub fn resolve(&self, vocab: &str, code: &str) -> Option<NodeId> {
        self.code_index
            .get(&(vocab.to_string(), code.to_string()))
            .copied()
    }

    /// Look up a concept by its global node identifier.
    pub fn resolve_id(&self, id: &str) -> Option<NodeId> {
        self.id_index.get(id).copied()
    }

    pub fn concept(&self, id: NodeId) -> Option<&ConceptRecord> {
        self.nodes.get(id as usize)
    }

    /// Concepts belonging to a vocabulary, in insertion order.
    pub fn members(&self, vocab: &str) -> impl Iterator<Item = NodeId> + '_ {
        self.members
            .get(vocab)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .copied()
    }

    /// Direct neighbors along `subClassOf` in the given direction.
    pub fn neighbors(&self, id: NodeId, direction: HierarchyDirection) -> &[NodeId] {
        let adjacency = match direction {
            HierarchyDirection::Parents => &self.parents,
            HierarchyDirection::Children => &self.children,
        };
        adjacency.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.parents.values().map(|v| v.len()).sum()
    }

    /// Registered vocabularies as `(id, label)`, ordered by id.
    pub fn vocabularies(&self) -> Vec<(&str, &str)> {
        let mut all: Vec<_> = self
            .vocabularies
            .iter()
            .map(|(id, label)| (id.as_str(), label.as_str()))
            .collect();
        all.sort_unstable();
        all
    }

    pub fn vocabulary_count(&self) -> usize {
        self.vocabularies.len()
    }

    /// Approximate memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        use std::mem::size_of;

        let text: usize = self
            .nodes
            .iter()
            .map(|n| {
                n.id.len()
                    + n.vocab.len()
                    + n.code.len()
                    + n.label.len()
                    + n.synonyms.iter().map(|s| s.len() + 24).sum::<usize>()
            })
            .sum();
        let nodes_mem = self.nodes.len() * size_of::<ConceptRecord>() + text;
        let up: usize = self.parents.values().map(|v| v.len() * size_of::<NodeId>()).sum();
        let down: usize = self.children.values().map(|v| v.len() * size_of::<NodeId>()).sum();
        let index_mem = (self.code_index.len() + self.id_index.len()) * 80;

        nodes_mem + up + down + index_mem
    }
}

impl Default for HierarchyGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vocab: &str, code: &str) -> ConceptRecord {
        ConceptRecord::new(format!("{vocab}:{code}"), vocab, code, format!("Label {code}"))
    }

    #[test]
    fn test_resolve_is_vocabulary_scoped() {
        let mut g = HierarchyGraph::new();
        let a = g.add_concept(record("icd10cm", "A00"));
        let b = g.add_concept(record("snomed", "A00"));
        assert_ne!(a, b);
        assert_eq!(g.resolve("icd10cm", "A00"), Some(a));
        assert_eq!(g.resolve("snomed", "A00"), Some(b));
        assert_eq!(g.resolve("loinc", "A00"), None);
    }

    #[test]
    fn test_readd_replaces_record_and_keeps_id() {
        let mut g = HierarchyGraph::new();
        let first = g.add_concept(record("v", "X"));
        let replaced = g.add_concept(
            ConceptRecord::new("v:X2", "v", "X", "Renamed").with_synonyms(["alt"]),
        );
        assert_eq!(first, replaced);
        assert_eq!(g.node_count(), 1);
        let c = g.concept(first).unwrap();
        assert_eq!(c.label, "Renamed");
        assert_eq!(c.synonyms, vec!["alt".to_string()]);
        assert_eq!(g.resolve_id("v:X2"), Some(first));
        assert_eq!(g.resolve_id("v:X"), None);
    }

    #[test]
    fn test_unknown_vocabulary_registered_on_concept_insert() {
        let mut g = HierarchyGraph::new();
        g.add_concept(record("icd10cm", "Q90"));
        assert!(g.has_vocabulary("icd10cm"));
        assert_eq!(g.vocabulary_label("icd10cm"), Some("icd10cm"));

        g.add_vocabulary("icd10cm", "ICD-10-CM");
        assert_eq!(g.vocabulary_label("icd10cm"), Some("ICD-10-CM"));
        assert_eq!(g.vocabulary_count(), 1);
        assert_eq!(g.vocabularies(), vec![("icd10cm", "ICD-10-CM")]);
    }

    #[test]
    fn test_members_in_insertion_order() {
        let mut g = HierarchyGraph::new();
        let ids: Vec<NodeId> = ["C", "A", "B"]
            .iter()
            .map(|c| g.add_concept(record("v", c)))
            .collect();
        g.add_concept(record("other", "Z"));
        assert_eq!(g.members("v").collect::<Vec<_>>(), ids);
        assert_eq!(g.members("missing").count(), 0);
    }

    #[test]
    fn test_link_populates_both_directions() {
        let mut g = HierarchyGraph::new();
        let child = g.add_concept(record("v", "child"));
        let parent = g.add_concept(record("v", "parent"));
        assert!(g.link("v", "child", "parent"));
        assert!(!g.link("v", "child", "nope"));
        assert_eq!(g.neighbors(child, HierarchyDirection::Parents), &[parent]);
        assert_eq!(g.neighbors(parent, HierarchyDirection::Children), &[child]);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_load_records_forward_references() {
        let mut g = HierarchyGraph::new();
        let linked = g.load_records(vec![
            (record("v", "leaf"), vec!["root".to_string()]),
            (record("v", "root"), vec![]),
            (record("v", "orphan"), vec!["missing".to_string()]),
        ]);
        assert_eq!(linked, 1);
        let leaf = g.resolve("v", "leaf").unwrap();
        let root = g.resolve("v", "root").unwrap();
        assert_eq!(g.neighbors(leaf, HierarchyDirection::Parents), &[root]);
    }

    #[test]
    fn test_memory_usage_nonzero() {
        let mut g = HierarchyGraph::new();
        g.load_records((0..100).map(|i| (record("v", &i.to_string()), vec!["0".to_string()])));
        assert!(g.memory_usage() > 0);
        assert_eq!(g.node_count(), 100);
    }
}
