use std::cmp::Ordering;

/// Anything the scheduler keeps in a [`MinHeap`].
///
/// Nodes are ordered by `sort_index` first and by `id` second, so two nodes with
/// the same sort index come out in creation order.
pub trait HeapNode {
    fn sort_index(&self) -> f64;
    fn id(&self) -> u64;
}

/// Total order over heap nodes: `(sort_index, id)` ascending.
pub fn compare<T: HeapNode>(a: &T, b: &T) -> Ordering {
    a.sort_index()
        .total_cmp(&b.sort_index())
        .then_with(|| a.id().cmp(&b.id()))
}

/// Array-backed binary min-heap.
///
/// Index 0 always holds the minimum under [`compare`]. Keys are read when a node
/// is pushed or sifted, so a node's sort index must not change while it is held.
#[derive(Debug)]
pub struct MinHeap<T> {
    nodes: Vec<T>,
}

impl<T> Default for MinHeap<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T: HeapNode> MinHeap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, node: T) {
        let index = self.nodes.len();
        self.nodes.push(node);
        self.sift_up(index);
    }

    pub fn peek(&self) -> Option<&T> {
        self.nodes.first()
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.nodes.is_empty() {
            return None;
        }
        // swap_remove moves the last node into slot 0.
        let first = self.nodes.swap_remove(0);
        if !self.nodes.is_empty() {
            self.sift_down(0);
        }
        Some(first)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in storage (heap) order, not sorted order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.nodes.iter()
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) >> 1;
            if compare(&self.nodes[parent], &self.nodes[index]) == Ordering::Greater {
                self.nodes.swap(parent, index);
                index = parent;
            } else {
                return;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let length = self.nodes.len();
        let half = length >> 1;
        while index < half {
            let left = 2 * index + 1;
            let right = left + 1;

            // The smaller child takes the parent's slot.
            let smaller = if right < length
                && compare(&self.nodes[right], &self.nodes[left]) == Ordering::Less
            {
                right
            } else {
                left
            };

            if compare(&self.nodes[smaller], &self.nodes[index]) == Ordering::Less {
                self.nodes.swap(smaller, index);
                index = smaller;
            } else {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Node {
        id: u64,
        sort_index: f64,
    }

    impl HeapNode for Node {
        fn sort_index(&self) -> f64 {
            self.sort_index
        }

        fn id(&self) -> u64 {
            self.id
        }
    }

    fn node(id: u64, sort_index: f64) -> Node {
        Node { id, sort_index }
    }

    #[test]
    fn test_empty_heap() {
        let mut heap: MinHeap<Node> = MinHeap::new();
        assert!(heap.peek().is_none());
        assert!(heap.pop().is_none());
        assert!(heap.is_empty());
    }

    #[test]
    fn test_pop_returns_minimum() {
        let mut heap = MinHeap::new();
        for (id, key) in [(1, 50.0), (2, 10.0), (3, 30.0), (4, -1.0), (5, 20.0), (6, 40.0)] {
            heap.push(node(id, key));
        }

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|n| n.id).collect();
        assert_eq!(order, vec![4, 2, 5, 3, 6, 1]);
    }

    #[test]
    fn test_ties_break_on_id() {
        let mut heap = MinHeap::new();
        heap.push(node(3, 5.0));
        heap.push(node(1, 5.0));
        heap.push(node(2, 5.0));
        heap.push(node(0, 7.0));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|n| n.id).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let mut heap = MinHeap::new();
        heap.push(node(1, 2.0));
        heap.push(node(2, 1.0));

        assert_eq!(heap.peek().map(|n| n.id), Some(2));
        assert_eq!(heap.peek().map(|n| n.id), Some(2));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_interleaved_push_pop_keeps_order() {
        // Deterministic pseudo-random keys.
        let mut heap = MinHeap::with_capacity(64);
        let mut shadow: Vec<Node> = Vec::new();
        let mut seed: u64 = 0x2545_f491;
        let mut next_id = 0;

        for round in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;

            if round % 3 == 2 {
                let expected = shadow
                    .iter()
                    .copied()
                    .min_by(|a, b| compare(a, b));
                let popped = heap.pop();
                assert_eq!(popped, expected);
                if let Some(p) = popped {
                    shadow.retain(|n| n.id != p.id);
                }
            } else {
                let n = node(next_id, (seed % 20) as f64);
                next_id += 1;
                heap.push(n);
                shadow.push(n);
            }
            assert_eq!(heap.len(), shadow.len());
        }
    }
}
