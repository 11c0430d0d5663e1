//! Disjoint-set forests, plain and parity-tracking.
//!
//! [`Dsf`] is a weighted, path-compressing union-find over `0..n`, the
//! workhorse of every connectivity argument in the solvers. [`Edsf`] extends
//! it with a per-element inversion bit, so two elements can be related as
//! "same" or "opposite"; merging two elements that are already related with
//! the wrong relative parity is a contradiction, which solvers use to detect
//! impossible deductions.

use derive_more::{Display, Error};

/// A weighted, path-compressing disjoint-set forest over `0..n`.
///
/// # Examples
///
/// ```
/// use parlor_core::Dsf;
///
/// let mut dsf = Dsf::new(4);
/// dsf.merge(0, 1);
/// dsf.merge(2, 3);
/// assert!(dsf.equivalent(0, 1));
/// assert!(!dsf.equivalent(1, 2));
/// assert_eq!(dsf.size(0), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsf {
    /// For a root, `Root(class size)`; otherwise the parent index.
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Root { size: usize },
    Child { parent: usize },
}

impl Dsf {
    /// Creates `n` singleton classes.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            nodes: vec![Node::Root { size: 1 }; n],
        }
    }

    /// Number of elements (not classes).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the forest has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resets every element back to a singleton class.
    ///
    /// Solvers that run repeatedly over the same index space reuse one
    /// allocation this way.
    pub fn reinit(&mut self) {
        for node in &mut self.nodes {
            *node = Node::Root { size: 1 };
        }
    }

    fn find_root(&self, mut i: usize) -> usize {
        while let Node::Child { parent } = self.nodes[i] {
            i = parent;
        }
        i
    }

    fn compress_path(&mut self, mut i: usize, root: usize) {
        while let Node::Child { parent } = self.nodes[i] {
            self.nodes[i] = Node::Child { parent: root };
            i = parent;
        }
        debug_assert_eq!(i, root);
    }

    /// Returns the canonical representative of `i`'s class, compressing the
    /// path walked.
    pub fn canonify(&mut self, i: usize) -> usize {
        let root = self.find_root(i);
        self.compress_path(i, root);
        root
    }

    /// Returns whether `a` and `b` are in the same class.
    pub fn equivalent(&mut self, a: usize, b: usize) -> bool {
        self.canonify(a) == self.canonify(b)
    }

    /// Unions the classes of `i` and `j`, weighted by class size.
    ///
    /// Idempotent; returns `true` iff the two were previously in distinct
    /// classes.
    pub fn merge(&mut self, i: usize, j: usize) -> bool {
        let ri = self.canonify(i);
        let rj = self.canonify(j);
        if ri == rj {
            return false;
        }
        let si = self.root_size(ri);
        let sj = self.root_size(rj);
        // Attach the smaller tree below the larger.
        let (child, root) = if si < sj { (ri, rj) } else { (rj, ri) };
        self.nodes[child] = Node::Child { parent: root };
        self.nodes[root] = Node::Root { size: si + sj };
        true
    }

    /// Size of `i`'s class.
    pub fn size(&mut self, i: usize) -> usize {
        let root = self.canonify(i);
        self.root_size(root)
    }

    /// Number of distinct classes.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Root { .. }))
            .count()
    }

    fn root_size(&self, root: usize) -> usize {
        match self.nodes[root] {
            Node::Root { size } => size,
            Node::Child { .. } => unreachable!("root_size called on non-root"),
        }
    }
}

/// Error returned by [`Edsf::merge`] when the requested relation conflicts
/// with the relation already recorded between the two elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[display("contradictory parity merge")]
pub struct EdsfContradiction;

/// A disjoint-set forest whose elements carry a relative inversion bit.
///
/// Two elements in the same class are related either as "same" (inverse bit
/// difference 0) or "opposite" (difference 1). [`Edsf::canonify`] returns the
/// representative together with the element's inversion relative to it.
///
/// # Examples
///
/// ```
/// use parlor_core::Edsf;
///
/// let mut edsf = Edsf::new(3);
/// edsf.merge(0, 1, true).unwrap();
/// edsf.merge(1, 2, true).unwrap();
/// // Opposite of opposite is same.
/// let (r0, i0) = edsf.canonify(0);
/// let (r2, i2) = edsf.canonify(2);
/// assert_eq!(r0, r2);
/// assert_eq!(i0, i2);
/// // Relating 0 and 2 as opposite now contradicts the forest.
/// assert!(edsf.merge(0, 2, true).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edsf {
    nodes: Vec<Node>,
    /// Inversion of each element relative to its parent. Meaningless for
    /// roots.
    flip: Vec<bool>,
}

impl Edsf {
    /// Creates `n` singleton classes, each its own uninverted representative.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            nodes: vec![Node::Root { size: 1 }; n],
            flip: vec![false; n],
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the forest has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resets every element back to a singleton class.
    pub fn reinit(&mut self) {
        for node in &mut self.nodes {
            *node = Node::Root { size: 1 };
        }
        for f in &mut self.flip {
            *f = false;
        }
    }

    /// Returns `(representative, inverse)`: `inverse` is the XOR of the
    /// inversion bits along the path from `i` to its root. Path-compresses.
    pub fn canonify(&mut self, i: usize) -> (usize, bool) {
        // First walk: find the root and the total inversion.
        let mut j = i;
        let mut inverse = false;
        while let Node::Child { parent } = self.nodes[j] {
            inverse ^= self.flip[j];
            j = parent;
        }
        let root = j;

        // Second walk: repoint everything at the root, folding each
        // element's accumulated inversion into its (now direct) parent link.
        let mut j = i;
        let mut remaining = inverse;
        while let Node::Child { parent } = self.nodes[j] {
            let step = self.flip[j];
            self.nodes[j] = Node::Child { parent: root };
            self.flip[j] = remaining;
            remaining ^= step;
            j = parent;
        }

        (root, inverse)
    }

    /// Unifies the classes of `i` and `j` such that they are related by
    /// `inverse` (`false` = same, `true` = opposite).
    ///
    /// Returns `Ok(true)` if the classes were joined, `Ok(false)` if they
    /// were already consistently related, and an error if they were already
    /// related with the opposite parity.
    ///
    /// # Errors
    ///
    /// [`EdsfContradiction`] if `i` and `j` are already equivalent with a
    /// relative inversion differing from `inverse`.
    pub fn merge(&mut self, i: usize, j: usize, inverse: bool) -> Result<bool, EdsfContradiction> {
        let (ri, ii) = self.canonify(i);
        let (rj, ij) = self.canonify(j);
        if ri == rj {
            return if ii ^ ij == inverse {
                Ok(false)
            } else {
                Err(EdsfContradiction)
            };
        }
        let si = self.root_size(ri);
        let sj = self.root_size(rj);
        // The child root's bit must make the overall i-j relation come out
        // as `inverse`.
        let relation = ii ^ ij ^ inverse;
        let (child, root) = if si < sj { (ri, rj) } else { (rj, ri) };
        self.nodes[child] = Node::Child { parent: root };
        self.flip[child] = relation;
        self.nodes[root] = Node::Root { size: si + sj };
        Ok(true)
    }

    /// Size of `i`'s class.
    pub fn size(&mut self, i: usize) -> usize {
        let (root, _) = self.canonify(i);
        self.root_size(root)
    }

    fn root_size(&self, root: usize) -> usize {
        match self.nodes[root] {
            Node::Root { size } => size,
            Node::Child { .. } => unreachable!("root_size called on non-root"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_singletons() {
        let mut dsf = Dsf::new(5);
        for i in 0..5 {
            assert_eq!(dsf.canonify(i), i);
            assert_eq!(dsf.size(i), 1);
        }
        assert_eq!(dsf.num_classes(), 5);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut dsf = Dsf::new(4);
        assert!(dsf.merge(0, 1));
        assert!(!dsf.merge(0, 1));
        assert!(!dsf.merge(1, 0));
        assert_eq!(dsf.size(1), 2);
        assert_eq!(dsf.num_classes(), 3);
    }

    #[test]
    fn test_chain_merge_sizes() {
        let mut dsf = Dsf::new(8);
        for i in 0..7 {
            dsf.merge(i, i + 1);
        }
        for i in 0..8 {
            assert_eq!(dsf.size(i), 8);
            assert_eq!(dsf.canonify(i), dsf.canonify(0));
        }
        assert_eq!(dsf.num_classes(), 1);
    }

    #[test]
    fn test_reinit() {
        let mut dsf = Dsf::new(4);
        dsf.merge(0, 3);
        dsf.reinit();
        assert!(!dsf.equivalent(0, 3));
        assert_eq!(dsf.num_classes(), 4);
    }

    #[test]
    fn test_edsf_same_and_opposite() {
        let mut edsf = Edsf::new(4);
        edsf.merge(0, 1, false).unwrap();
        edsf.merge(1, 2, true).unwrap();

        let (r0, i0) = edsf.canonify(0);
        let (r1, i1) = edsf.canonify(1);
        let (r2, i2) = edsf.canonify(2);
        assert_eq!(r0, r1);
        assert_eq!(r1, r2);
        assert_eq!(i0, i1);
        assert_ne!(i1, i2);
    }

    #[test]
    fn test_edsf_contradiction() {
        let mut edsf = Edsf::new(3);
        edsf.merge(0, 1, false).unwrap();
        // Consistent re-merge reports no change.
        assert_eq!(edsf.merge(0, 1, false), Ok(false));
        assert_eq!(edsf.merge(0, 1, true), Err(EdsfContradiction));
    }

    #[test]
    fn test_edsf_long_chain_parity() {
        let n = 64;
        let mut edsf = Edsf::new(n);
        for i in 0..n - 1 {
            edsf.merge(i, i + 1, true).unwrap();
        }
        let (r0, i0) = edsf.canonify(0);
        for i in 0..n {
            let (r, inv) = edsf.canonify(i);
            assert_eq!(r, r0);
            assert_eq!(inv ^ i0, i % 2 == 1, "element {i}");
        }
    }

    proptest! {
        #[test]
        fn prop_merge_commutes(pairs in prop::collection::vec((0usize..20, 0usize..20), 0..40)) {
            let mut a = Dsf::new(20);
            let mut b = Dsf::new(20);
            for &(x, y) in &pairs {
                a.merge(x, y);
                b.merge(y, x);
            }
            for i in 0..20 {
                for j in 0..20 {
                    prop_assert_eq!(a.equivalent(i, j), b.equivalent(i, j));
                }
            }
        }

        #[test]
        fn prop_size_counts_class_members(pairs in prop::collection::vec((0usize..16, 0usize..16), 0..40)) {
            let mut dsf = Dsf::new(16);
            for &(x, y) in &pairs {
                dsf.merge(x, y);
            }
            for i in 0..16 {
                let members = (0..16).filter(|&j| dsf.equivalent(i, j)).count();
                prop_assert_eq!(dsf.size(i), members);
            }
        }

        #[test]
        fn prop_edsf_merge_establishes_relation(
            merges in prop::collection::vec((0usize..12, 0usize..12, any::<bool>()), 0..30)
        ) {
            let mut edsf = Edsf::new(12);
            for &(x, y, r) in &merges {
                if edsf.merge(x, y, r).is_ok() {
                    let (rx, ix) = edsf.canonify(x);
                    let (ry, iy) = edsf.canonify(y);
                    prop_assert_eq!(rx, ry);
                    prop_assert_eq!(ix ^ iy, r);
                }
            }
        }
    }
}
