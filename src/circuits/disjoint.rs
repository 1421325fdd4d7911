//! Index-based disjoint-set forest with path compression and union by rank.
//!
//! Rebuilt for every analysis; indices are only meaningful within one run.

/// Disjoint-set forest over `0..len`.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    /// Creates `len` singleton sets.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// True when there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of `x`'s set, compressing the path on the way.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merges the sets holding `a` and `b`. Returns false if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
        true
    }

    /// Maps every element to a dense group index (0-based, in first-seen order).
    pub fn groups(&mut self) -> (Vec<usize>, usize) {
        let n = self.len();
        let mut root_to_group = vec![usize::MAX; n];
        let mut assignment = Vec::with_capacity(n);
        let mut count = 0;
        for i in 0..n {
            let root = self.find(i);
            if root_to_group[root] == usize::MAX {
                root_to_group[root] = count;
                count += 1;
            }
            assignment.push(root_to_group[root]);
        }
        (assignment, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_merges_and_find_agrees() {
        let mut ds = DisjointSet::new(5);
        assert!(ds.union(0, 1));
        assert!(ds.union(3, 4));
        assert!(!ds.union(1, 0));
        assert_eq!(ds.find(0), ds.find(1));
        assert_ne!(ds.find(0), ds.find(3));
        let (groups, count) = ds.groups();
        assert_eq!(count, 3);
        assert_eq!(groups, vec![0, 0, 1, 2, 2]);
    }

    #[test]
    fn long_chains_compress() {
        let mut ds = DisjointSet::new(100);
        for i in 1..100 {
            ds.union(i - 1, i);
        }
        let root = ds.find(99);
        assert!((0..100).all(|i| ds.find(i) == root));
    }
}
