//! Fixed-capacity genome storage.
//!
//! A [`Genome`] packs one CPPN into two arrays allocated once at the run's
//! configured capacity: `nodes` with `node_count` live entries and `links` with
//! `link_count` live entries. Nothing is ever freed or grown. Deleting an entry
//! shifts the tail of its array left, and inserting a node shifts the tail
//! right, rewriting every link endpoint that referred to a moved node so
//! positions stay correct.
//!
//! For feed-forward genomes the layout is:
//!
//! ```text
//! [ inputs | hidden nodes in topological order | outputs ]
//! ```
//!
//! and every link satisfies `from_node < to_node`, which is what lets an
//! activator evaluate the network in a single pass.

use serde::{Deserialize, Serialize};

use crate::gene::{Link, Node, MAX_CAPACITY};
use crate::innovation::InnovationCounter;

/// One CPPN packed into fixed-capacity node and link arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PackedGenome")]
pub struct Genome {
    nodes: Box<[Node]>,
    node_count: usize,
    links: Box<[Link]>,
    link_count: usize,
}

/// Storage layout problems found while loading a serialized genome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("Genome capacity {0} exceeds {max}", max = MAX_CAPACITY)]
    CapacityTooLarge(usize),
    #[error("Genome has {nodes} node slots but {links} link slots")]
    MismatchedSlots { nodes: usize, links: usize },
    #[error("Node count {count} exceeds capacity {capacity}")]
    NodeCount { count: usize, capacity: usize },
    #[error("Link count {count} exceeds capacity {capacity}")]
    LinkCount { count: usize, capacity: usize },
}

/// Serialized form of a [`Genome`], checked before it becomes one.
#[derive(Deserialize)]
struct PackedGenome {
    nodes: Box<[Node]>,
    node_count: usize,
    links: Box<[Link]>,
    link_count: usize,
}

impl TryFrom<PackedGenome> for Genome {
    type Error = LayoutError;

    fn try_from(packed: PackedGenome) -> Result<Self, Self::Error> {
        let capacity = packed.nodes.len();
        if capacity > MAX_CAPACITY {
            return Err(LayoutError::CapacityTooLarge(capacity));
        }
        if packed.links.len() != capacity {
            return Err(LayoutError::MismatchedSlots {
                nodes: capacity,
                links: packed.links.len(),
            });
        }
        if packed.node_count > capacity {
            return Err(LayoutError::NodeCount {
                count: packed.node_count,
                capacity,
            });
        }
        if packed.link_count > capacity {
            return Err(LayoutError::LinkCount {
                count: packed.link_count,
                capacity,
            });
        }
        Ok(Self {
            nodes: packed.nodes,
            node_count: packed.node_count,
            links: packed.links,
            link_count: packed.link_count,
        })
    }
}

impl Genome {
    /// Allocate an empty genome with room for `capacity` nodes and links.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds [`MAX_CAPACITY`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity <= MAX_CAPACITY,
            "genome capacity {capacity} exceeds {MAX_CAPACITY}"
        );
        Self {
            nodes: vec![Node::default(); capacity].into_boxed_slice(),
            node_count: 0,
            links: vec![Link::default(); capacity].into_boxed_slice(),
            link_count: 0,
        }
    }

    /// Maximum number of nodes (and of links) this genome can hold.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live nodes.
    #[inline]
    #[must_use]
    pub const fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of live links.
    #[inline]
    #[must_use]
    pub const fn link_count(&self) -> usize {
        self.link_count
    }

    /// The live nodes, in position order.
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes[..self.node_count]
    }

    /// The live links.
    #[inline]
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links[..self.link_count]
    }

    /// The node at `position`, if live.
    #[inline]
    #[must_use]
    pub fn node(&self, position: usize) -> Option<Node> {
        self.nodes().get(position).copied()
    }

    /// The link at `index`, if live.
    #[inline]
    #[must_use]
    pub fn link(&self, index: usize) -> Option<Link> {
        self.links().get(index).copied()
    }

    /// Mutable access to the live nodes.
    #[inline]
    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes[..self.node_count]
    }

    /// Mutable access to the live links.
    #[inline]
    pub(crate) fn links_mut(&mut self) -> &mut [Link] {
        &mut self.links[..self.link_count]
    }

    /// Whether `nodes` more nodes and `links` more links would fit.
    #[inline]
    #[must_use]
    pub fn has_room_for(&self, nodes: usize, links: usize) -> bool {
        self.node_count + nodes <= self.capacity() && self.link_count + links <= self.capacity()
    }

    /// Forget all nodes and links. Storage is kept.
    pub fn clear(&mut self) {
        self.node_count = 0;
        self.link_count = 0;
    }

    /// Append a node at the end of the node list.
    ///
    /// Returns `false` without changing anything when the genome is full.
    pub fn push_node(&mut self, node: Node) -> bool {
        if self.node_count == self.capacity() {
            return false;
        }
        self.nodes[self.node_count] = node;
        self.node_count += 1;
        true
    }

    /// Insert `node` at `position`, shifting later nodes right by one.
    ///
    /// Every link endpoint at or after `position` is incremented so links keep
    /// pointing at the same nodes. This is O(N + L). Returns `false` without
    /// changing anything when the genome is full or `position` is past the end.
    pub fn insert_node(&mut self, position: usize, node: Node) -> bool {
        if self.node_count == self.capacity() || position > self.node_count {
            return false;
        }

        self.nodes
            .copy_within(position..self.node_count, position + 1);
        self.nodes[position] = node;
        self.node_count += 1;

        let position = position as u8;
        for link in self.links_mut() {
            if link.from_node >= position {
                link.from_node += 1;
            }
            if link.to_node >= position {
                link.to_node += 1;
            }
        }
        true
    }

    /// Delete the node at `position`, shifting later nodes left by one.
    ///
    /// Links touching the deleted node are deleted too, and endpoints past it
    /// are decremented. Returns `false` if `position` is not a live node.
    pub fn delete_node(&mut self, position: usize) -> bool {
        if position >= self.node_count {
            return false;
        }

        self.nodes
            .copy_within(position + 1..self.node_count, position);
        self.node_count -= 1;

        let position = position as u8;
        let mut l = 0;
        while l < self.link_count {
            let Link {
                from_node, to_node, ..
            } = self.links[l];
            if from_node == position || to_node == position {
                self.delete_link(l);
                // The next link just shifted into slot `l`.
                continue;
            }
            let link = &mut self.links[l];
            if link.from_node > position {
                link.from_node -= 1;
            }
            if link.to_node > position {
                link.to_node -= 1;
            }
            l += 1;
        }
        true
    }

    /// Overwrite the live node at `position`.
    pub fn set_node(&mut self, position: usize, node: Node) -> bool {
        match self.nodes_mut().get_mut(position) {
            Some(slot) => {
                *slot = node;
                true
            }
            None => false,
        }
    }

    /// Append a link that already carries an innovation number.
    ///
    /// Used when copying genes between genomes. Returns `false` when full.
    pub fn push_link(&mut self, link: Link) -> bool {
        if self.link_count == self.capacity() {
            return false;
        }
        self.links[self.link_count] = link;
        self.link_count += 1;
        true
    }

    /// Append a brand-new link, claiming a fresh innovation number.
    ///
    /// Returns the innovation, or `None` when the genome is full. No number is
    /// claimed in that case.
    pub fn add_link(
        &mut self,
        from_node: usize,
        to_node: usize,
        weight: f32,
        innovations: &InnovationCounter,
    ) -> Option<u32> {
        if self.link_count == self.capacity() {
            return None;
        }
        let innovation = innovations.claim();
        self.push_link(Link::new(from_node, to_node, weight, innovation));
        Some(innovation)
    }

    /// Delete the link at `index`, shifting later links left by one.
    pub fn delete_link(&mut self, index: usize) -> bool {
        if index >= self.link_count {
            return false;
        }
        self.links.copy_within(index + 1..self.link_count, index);
        self.link_count -= 1;
        true
    }

    /// Overwrite the live link at `index`.
    pub fn set_link(&mut self, index: usize, link: Link) -> bool {
        match self.links_mut().get_mut(index) {
            Some(slot) => {
                *slot = link;
                true
            }
            None => false,
        }
    }

    /// Replace this genome's live contents with `other`'s.
    pub fn copy_live_from(&mut self, other: &Genome) {
        self.clear();
        for &node in other.nodes() {
            self.push_node(node);
        }
        for &link in other.links() {
            self.push_link(link);
        }
    }

    /// Copy `other`'s entire storage, dead tail slots included, and its counts.
    pub fn copy_raw_from(&mut self, other: &Genome) {
        let capacity = self.capacity().min(other.capacity());
        self.nodes[..capacity].copy_from_slice(&other.nodes[..capacity]);
        self.links[..capacity].copy_from_slice(&other.links[..capacity]);
        self.node_count = other.node_count.min(capacity);
        self.link_count = other.link_count.min(capacity);
    }

    /// Raw node storage, including dead slots past `node_count`.
    #[must_use]
    pub fn raw_nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Raw link storage, including dead slots past `link_count`.
    #[must_use]
    pub fn raw_links(&self) -> &[Link] {
        &self.links
    }
}
