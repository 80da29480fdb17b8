//! Fixed-size bulk records for moving genomes to and from flat buffers.
//!
//! A [`GenomeRecord`] has one [`NodeRecord`] and one [`LinkRecord`] slot per
//! unit of capacity. Live entries occupy the leading slots in order and the
//! rest hold a sentinel (`kind = -1`, `from_node = -1`, NaN floats). Both
//! record types are plain `#[repr(C)]` data, so a whole population can be
//! viewed as bytes and shipped to a device or a checkpoint file unchanged.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use crate::activation::Activation;
use crate::gene::{Link, Node, NodeKind, MAX_CAPACITY};
use crate::genome::Genome;

/// Raw node layout: `kind: i8, act_func: i8, bias: f32, gain: f32`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NodeRecord {
    pub kind: i8,
    pub act_func: i8,
    pub padding: [u8; 2],
    pub bias: f32,
    pub gain: f32,
}

/// Raw link layout: `from_node: i8, to_node: i8, weight: f32, innovation: i32`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LinkRecord {
    pub from_node: i8,
    pub to_node: i8,
    pub padding: [u8; 2],
    pub weight: f32,
    pub innovation: i32,
}

impl NodeRecord {
    /// Marks an unused node slot.
    pub const SENTINEL: Self = Self {
        kind: -1,
        act_func: -1,
        padding: [0; 2],
        bias: f32::NAN,
        gain: f32::NAN,
    };

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.kind == -1
    }
}

impl From<Node> for NodeRecord {
    fn from(node: Node) -> Self {
        Self {
            kind: node.kind.id() as i8,
            act_func: node.activation.id() as i8,
            padding: [0; 2],
            bias: node.bias,
            gain: node.gain,
        }
    }
}

impl LinkRecord {
    /// Marks an unused link slot.
    pub const SENTINEL: Self = Self {
        from_node: -1,
        to_node: -1,
        padding: [0; 2],
        weight: f32::NAN,
        innovation: -1,
    };

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.from_node == -1
    }
}

/// Fails when the innovation does not fit the record's `i32` field.
impl TryFrom<Link> for LinkRecord {
    type Error = u32;

    fn try_from(link: Link) -> Result<Self, Self::Error> {
        let innovation = i32::try_from(link.innovation).map_err(|_| link.innovation)?;
        Ok(Self {
            from_node: link.from_node as i8,
            to_node: link.to_node as i8,
            padding: [0; 2],
            weight: link.weight,
            innovation,
        })
    }
}

/// Bulk import errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Record capacity {0} exceeds {max}", max = MAX_CAPACITY)]
    CapacityTooLarge(usize),
    #[error("Record has {nodes} node slots but {links} link slots")]
    MismatchedSlots { nodes: usize, links: usize },
    #[error("Expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("Node slot {slot} is live after an unused slot")]
    NodeGap { slot: usize },
    #[error("Link slot {slot} is live after an unused slot")]
    LinkGap { slot: usize },
    #[error("Node slot {slot} has unknown kind {kind}")]
    InvalidKind { slot: usize, kind: i8 },
    #[error("Node slot {slot} has unknown activation function {act_func}")]
    InvalidActivation { slot: usize, act_func: i8 },
    #[error("Link slot {slot} has negative endpoint ({from_node} -> {to_node})")]
    InvalidEndpoint {
        slot: usize,
        from_node: i8,
        to_node: i8,
    },
    #[error("Link slot {slot} has negative innovation {innovation}")]
    InvalidInnovation { slot: usize, innovation: i32 },
    #[error("Link {slot} has innovation {innovation}, which does not fit a record")]
    InnovationOverflow { slot: usize, innovation: u32 },
}

/// One genome as fixed-size node and link slot arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct GenomeRecord {
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<LinkRecord>,
}

impl GenomeRecord {
    /// Size in bytes of a record with `capacity` slots of each kind.
    #[must_use]
    pub const fn byte_len(capacity: usize) -> usize {
        capacity * (size_of::<NodeRecord>() + size_of::<LinkRecord>())
    }

    /// Export a genome, padding every slot past the live counts with sentinels.
    ///
    /// Fails if a link's innovation exceeds `i32::MAX`.
    pub fn from_genome(genome: &Genome) -> Result<Self, RecordError> {
        let capacity = genome.capacity();
        let mut nodes = vec![NodeRecord::SENTINEL; capacity];
        for (slot, &node) in nodes.iter_mut().zip(genome.nodes()) {
            *slot = node.into();
        }
        let mut links = vec![LinkRecord::SENTINEL; capacity];
        for (slot, (record, &link)) in links.iter_mut().zip(genome.links()).enumerate() {
            *record = LinkRecord::try_from(link)
                .map_err(|innovation| RecordError::InnovationOverflow { slot, innovation })?;
        }
        Ok(Self { nodes, links })
    }

    /// Rebuild a genome. Slot `k` becomes position `k`, and the live counts
    /// are the number of non-sentinel slots.
    ///
    /// Structural invariants (link direction, node kind regions, innovation
    /// uniqueness) are not checked here; see [`crate::validation::validate`].
    pub fn to_genome(&self) -> Result<Genome, RecordError> {
        let capacity = self.nodes.len();
        if self.links.len() != capacity {
            return Err(RecordError::MismatchedSlots {
                nodes: capacity,
                links: self.links.len(),
            });
        }
        if capacity > MAX_CAPACITY {
            return Err(RecordError::CapacityTooLarge(capacity));
        }

        let mut genome = Genome::new(capacity);
        let mut ended = false;
        for (slot, record) in self.nodes.iter().enumerate() {
            if record.is_sentinel() {
                ended = true;
                continue;
            }
            if ended {
                return Err(RecordError::NodeGap { slot });
            }
            let kind = u8::try_from(record.kind)
                .ok()
                .and_then(NodeKind::from_id)
                .ok_or(RecordError::InvalidKind {
                    slot,
                    kind: record.kind,
                })?;
            let activation = u8::try_from(record.act_func)
                .ok()
                .and_then(Activation::from_id)
                .ok_or(RecordError::InvalidActivation {
                    slot,
                    act_func: record.act_func,
                })?;
            genome.push_node(Node::new(kind, activation, record.bias, record.gain));
        }

        ended = false;
        for (slot, record) in self.links.iter().enumerate() {
            if record.is_sentinel() {
                ended = true;
                continue;
            }
            if ended {
                return Err(RecordError::LinkGap { slot });
            }
            let (Ok(from_node), Ok(to_node)) =
                (u8::try_from(record.from_node), u8::try_from(record.to_node))
            else {
                return Err(RecordError::InvalidEndpoint {
                    slot,
                    from_node: record.from_node,
                    to_node: record.to_node,
                });
            };
            let innovation =
                u32::try_from(record.innovation).map_err(|_| RecordError::InvalidInnovation {
                    slot,
                    innovation: record.innovation,
                })?;
            genome.push_link(Link {
                from_node,
                to_node,
                weight: record.weight,
                innovation,
            });
        }
        Ok(genome)
    }

    /// The largest innovation carried by a live link.
    #[must_use]
    pub fn max_innovation(&self) -> Option<u32> {
        self.links
            .iter()
            .filter(|l| !l.is_sentinel())
            .filter_map(|l| u32::try_from(l.innovation).ok())
            .max()
    }

    /// Append the raw bytes of this record (all node slots, then all link
    /// slots) to `out`.
    pub fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(bytemuck::cast_slice(&self.nodes));
        out.extend_from_slice(bytemuck::cast_slice(&self.links));
    }

    /// The raw bytes of this record.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::byte_len(self.nodes.len()));
        self.write_bytes(&mut out);
        out
    }

    /// Parse a record with `capacity` slots from exactly
    /// [`byte_len(capacity)`](Self::byte_len) bytes. Alignment is not required.
    pub fn from_bytes(bytes: &[u8], capacity: usize) -> Result<Self, RecordError> {
        let expected = Self::byte_len(capacity);
        if bytes.len() != expected {
            return Err(RecordError::Length {
                expected,
                actual: bytes.len(),
            });
        }
        let (node_bytes, link_bytes) = bytes.split_at(capacity * size_of::<NodeRecord>());
        let nodes = node_bytes
            .chunks_exact(size_of::<NodeRecord>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        let links = link_bytes
            .chunks_exact(size_of::<LinkRecord>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        Ok(Self { nodes, links })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeatConfig;
    use crate::innovation::InnovationCounter;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sample() -> Genome {
        let mut genome = Genome::new(6);
        genome.push_node(Node::input());
        genome.push_node(Node::hidden(Activation::Gaus, 0.25, -1.5));
        genome.push_node(Node::output(Activation::Step, -0.5, 2.0));
        genome.push_link(Link::new(0, 1, 0.75, 3));
        genome.push_link(Link::new(1, 2, -2.0, 11));
        genome
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(size_of::<NodeRecord>(), 12);
        assert_eq!(size_of::<LinkRecord>(), 12);
        assert_eq!(GenomeRecord::byte_len(MAX_CAPACITY), MAX_CAPACITY * 24);
    }

    #[test]
    fn test_export_pads_with_sentinels() {
        let record = GenomeRecord::from_genome(&sample()).unwrap();
        assert_eq!(record.nodes.len(), 6);
        assert_eq!(record.links.len(), 6);
        assert_eq!(record.nodes[1].act_func, Activation::Gaus.id() as i8);
        assert!(record.nodes[3..].iter().all(NodeRecord::is_sentinel));
        assert!(record.links[2..].iter().all(LinkRecord::is_sentinel));
        assert!(record.links[2].weight.is_nan());
        assert_eq!(record.max_innovation(), Some(11));
    }

    #[test]
    fn test_import_restores_genome() {
        let genome = sample();
        let restored = GenomeRecord::from_genome(&genome).unwrap().to_genome().unwrap();
        assert_eq!(restored.capacity(), 6);
        assert_eq!(restored.nodes(), genome.nodes());
        assert_eq!(restored.links(), genome.links());
    }

    #[test]
    fn test_bytes_preserve_a_random_genome() {
        let config = NeatConfig::cppn(3, 2);
        let innovations = InnovationCounter::new();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut genome = Genome::new(config.max_network_size);
        genome.random_init(&config, &innovations, &mut rng);

        let bytes = GenomeRecord::from_genome(&genome).unwrap().to_bytes();
        assert_eq!(bytes.len(), GenomeRecord::byte_len(config.max_network_size));
        let restored = GenomeRecord::from_bytes(&bytes[..], config.max_network_size)
            .unwrap()
            .to_genome()
            .unwrap();
        assert_eq!(restored.nodes(), genome.nodes());
        assert_eq!(restored.links(), genome.links());
    }

    #[test]
    fn test_import_rejects_malformed_records() {
        let mut record = GenomeRecord::from_genome(&sample()).unwrap();
        record.nodes[4] = NodeRecord::from(Node::input());
        assert_eq!(record.to_genome(), Err(RecordError::NodeGap { slot: 4 }));

        let mut record = GenomeRecord::from_genome(&sample()).unwrap();
        record.nodes[0].kind = 7;
        assert!(matches!(
            record.to_genome(),
            Err(RecordError::InvalidKind { slot: 0, kind: 7 })
        ));

        let mut record = GenomeRecord::from_genome(&sample()).unwrap();
        record.nodes[2].act_func = Activation::COUNT as i8;
        assert!(matches!(
            record.to_genome(),
            Err(RecordError::InvalidActivation { slot: 2, .. })
        ));

        let mut record = GenomeRecord::from_genome(&sample()).unwrap();
        record.links[1].innovation = -4;
        assert!(matches!(
            record.to_genome(),
            Err(RecordError::InvalidInnovation { slot: 1, .. })
        ));

        assert!(matches!(
            GenomeRecord::from_bytes(&[0; 10], 6),
            Err(RecordError::Length { .. })
        ));
    }

    #[test]
    fn test_innovation_range_on_export() {
        let mut genome = sample();
        let mut link = genome.link(1).unwrap();
        link.innovation = i32::MAX as u32;
        assert!(genome.set_link(1, link));
        let record = GenomeRecord::from_genome(&genome).unwrap();
        assert_eq!(record.max_innovation(), Some(i32::MAX as u32));
        assert_eq!(record.to_genome().unwrap().links(), genome.links());

        link.innovation = i32::MAX as u32 + 1;
        assert!(genome.set_link(1, link));
        assert_eq!(
            GenomeRecord::from_genome(&genome),
            Err(RecordError::InnovationOverflow {
                slot: 1,
                innovation: i32::MAX as u32 + 1
            })
        );
    }
}
