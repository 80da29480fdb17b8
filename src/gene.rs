//! Gene types for CPPN genomes.
//!
//! This module defines the fundamental building blocks of a packed genome:
//! - [`Node`]: a neuron, addressed only by its position in the genome
//! - [`Link`]: a weighted synapse between two node positions

use serde::{Deserialize, Serialize};

use crate::activation::Activation;

/// Hard ceiling on the per-genome node and link capacity.
///
/// Link endpoints are stored in a single byte and exported as signed bytes
/// (with `-1` reserved as the empty-slot sentinel), so no position may exceed
/// `i8::MAX`.
pub const MAX_CAPACITY: usize = 128;

/// The role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum NodeKind {
    /// Input node - receives external values, no activation applied.
    Input = 0,
    /// Hidden node - internal processing node added through mutation.
    #[default]
    Hidden = 1,
    /// Output node - produces final network output.
    Output = 2,
}

impl NodeKind {
    /// Numeric id used by the bulk record format.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Inverse of [`NodeKind::id`].
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Input),
            1 => Some(Self::Hidden),
            2 => Some(Self::Output),
            _ => None,
        }
    }
}

/// A node gene representing one neuron of a CPPN.
///
/// Nodes never reference other nodes. Links refer to them by position, so a
/// node's identity within a genome is simply its index.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    /// The role of this node in the network.
    pub kind: NodeKind,
    /// The activation function applied to `gain * sum + bias`.
    pub activation: Activation,
    /// Bias added before activation.
    pub bias: f32,
    /// Gain applied to the weighted input sum.
    pub gain: f32,
}

impl Node {
    /// Create a node with explicit parameters.
    #[must_use]
    pub const fn new(kind: NodeKind, activation: Activation, bias: f32, gain: f32) -> Self {
        Self {
            kind,
            activation,
            bias,
            gain,
        }
    }

    /// Create an input node with neutral parameters.
    #[must_use]
    pub const fn input() -> Self {
        Self::new(NodeKind::Input, Activation::Identity, 0.0, 1.0)
    }

    /// Create a hidden node.
    #[must_use]
    pub const fn hidden(activation: Activation, bias: f32, gain: f32) -> Self {
        Self::new(NodeKind::Hidden, activation, bias, gain)
    }

    /// Create an output node.
    #[must_use]
    pub const fn output(activation: Activation, bias: f32, gain: f32) -> Self {
        Self::new(NodeKind::Output, activation, bias, gain)
    }
}

/// A link gene representing a directed, weighted synapse.
///
/// Endpoints are node positions within the same genome. The innovation number
/// is claimed from the run-wide counter when the link is first created and is
/// only used to align homologous links between two genomes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Link {
    /// Position of the source node.
    pub from_node: u8,
    /// Position of the target node.
    pub to_node: u8,
    /// The link weight.
    pub weight: f32,
    /// Historical marker used for crossover alignment.
    pub innovation: u32,
}

impl Link {
    /// Create a link between two node positions.
    ///
    /// Positions must be below [`MAX_CAPACITY`].
    #[must_use]
    pub fn new(from_node: usize, to_node: usize, weight: f32, innovation: u32) -> Self {
        debug_assert!(from_node < MAX_CAPACITY && to_node < MAX_CAPACITY);
        Self {
            from_node: from_node as u8,
            to_node: to_node as u8,
            weight,
            innovation,
        }
    }

    /// Source position as an index.
    #[inline]
    #[must_use]
    pub const fn from(&self) -> usize {
        self.from_node as usize
    }

    /// Target position as an index.
    #[inline]
    #[must_use]
    pub const fn to(&self) -> usize {
        self.to_node as usize
    }
}
