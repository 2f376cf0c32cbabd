//! Merge-time identity graph.
//!
//! One node per distinct tagged id. Linking is symmetric and transitive, so
//! the graph is kept as a disjoint-set forest: two nodes are linked iff they
//! share a root. Union by rank, path compression, no recursion.

use std::collections::BTreeMap;

use dirk_core::{TaggedId, UserAndService, UserWrapper};

/// A node: the user, plus its wrapped form when the owning service could
/// produce one (nodes without it take part in links only as targets).
pub(crate) struct LinkedUser {
    pub(crate) user_and_service: UserAndService,
    pub(crate) wrapped: Option<UserWrapper>,
}

pub(crate) struct LinkedUsers {
    nodes: Vec<LinkedUser>,
    by_tagged_id: BTreeMap<TaggedId, usize>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl LinkedUsers {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            by_tagged_id: BTreeMap::new(),
            parent: Vec::new(),
            rank: Vec::new(),
        }
    }

    /// Adds a node. Returns `false` (and keeps the first) if the tagged id is
    /// already present.
    pub(crate) fn insert(&mut self, node: LinkedUser) -> bool {
        let tagged_id = node.user_and_service.tagged_id().clone();
        if self.by_tagged_id.contains_key(&tagged_id) {
            return false;
        }
        let index = self.nodes.len();
        self.by_tagged_id.insert(tagged_id, index);
        self.nodes.push(node);
        self.parent.push(index);
        self.rank.push(0);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, index: usize) -> &LinkedUser {
        &self.nodes[index]
    }

    pub(crate) fn index_of(&self, tagged_id: &TaggedId) -> Option<usize> {
        self.by_tagged_id.get(tagged_id).copied()
    }

    fn find(&mut self, index: usize) -> usize {
        let mut root = index;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cursor = index;
        while self.parent[cursor] != root {
            let next = self.parent[cursor];
            self.parent[cursor] = root;
            cursor = next;
        }
        root
    }

    /// Links two nodes (and, through them, both their clusters). Returns
    /// whether the clusters were distinct.
    pub(crate) fn link(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        true
    }

    #[cfg(test)]
    fn linked(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Connected components, each listed in tagged-id order, components
    /// ordered by their smallest tagged id.
    pub(crate) fn clusters(&mut self) -> Vec<Vec<usize>> {
        let ordered: Vec<usize> = self.by_tagged_id.values().copied().collect();
        let mut cluster_of_root: BTreeMap<usize, usize> = BTreeMap::new();
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for index in ordered {
            let root = self.find(index);
            let slot = *cluster_of_root.entry(root).or_insert_with(|| {
                clusters.push(Vec::new());
                clusters.len() - 1
            });
            clusters[slot].push(index);
        }
        clusters
    }
}
