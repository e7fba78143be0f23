//! Connected components over an undirected graph with dense `usize` nodes.

/// Disjoint-set forest with path halving and union by size.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(nodes: usize) -> Self {
        Self {
            parent: (0..nodes).collect(),
            size: vec![1; nodes],
        }
    }

    pub fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }

    /// Components as sorted node lists, ordered by their smallest node.
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let nodes = self.parent.len();
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); nodes];
        for node in 0..nodes {
            let root = self.find(node);
            by_root[root].push(node);
        }
        let mut components: Vec<Vec<usize>> =
            by_root.into_iter().filter(|c| !c.is_empty()).collect();
        components.sort_by_key(|c| c[0]);
        components
    }
}

/// Groups `nodes` into connected components given an edge list.
pub fn connected_components(nodes: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(nodes);
    for &(a, b) in edges {
        uf.union(a, b);
    }
    uf.components()
}
