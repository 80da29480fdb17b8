//! Stochastic mutation operators.
//!
//! All operators are total: when a mutation's precondition does not hold (the
//! genome is full, there is no hidden node to delete, ...) it quietly does
//! nothing or falls back to a benign alternative. Invariants are preserved in
//! every case, so a genome that was valid before a mutation is valid after it.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::config::NeatConfig;
use crate::gene::{Node, NodeKind};
use crate::genome::Genome;
use crate::innovation::InnovationCounter;

/// The kinds of mutation [`Genome::mutate_one`] chooses between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Split a random link with a new hidden node.
    AddNode,
    /// Delete a random hidden node and its links.
    DeleteNode,
    /// Give a random node a new activation function.
    ChangeActivation,
    /// Perturb a random node's bias.
    ChangeBias,
    /// Perturb a random node's gain.
    ChangeGain,
    /// Add a random link.
    AddLink,
    /// Delete a random link.
    DeleteLink,
    /// Perturb a random link's weight, or add a link if there are none.
    ChangeWeight,
}

impl MutationKind {
    /// All mutation kinds.
    pub const ALL: [Self; 8] = [
        Self::AddNode,
        Self::DeleteNode,
        Self::ChangeActivation,
        Self::ChangeBias,
        Self::ChangeGain,
        Self::AddLink,
        Self::DeleteLink,
        Self::ChangeWeight,
    ];

    /// Pick a mutation kind uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

/// Uniform sample from `[-range, range]`.
#[inline]
fn symmetric<R: Rng + ?Sized>(rng: &mut R, range: f32) -> f32 {
    rng.random_range(-range..=range)
}

/// Gaussian perturbation with standard deviation `scale * range`, clamped.
#[inline]
fn perturb<R: Rng + ?Sized>(rng: &mut R, value: f32, range: f32, scale: f32) -> f32 {
    let noise: f32 = rng.sample(StandardNormal);
    (value + noise * scale * range).clamp(-range, range)
}

/// A node of the given kind with random activation, bias and gain.
pub fn random_node<R: Rng + ?Sized>(kind: NodeKind, config: &NeatConfig, rng: &mut R) -> Node {
    Node::new(
        kind,
        Activation::random(rng),
        symmetric(rng, config.bias_range),
        symmetric(rng, config.gain_range),
    )
}

impl Genome {
    /// Reset to a bare network: the inputs followed by the outputs, each with
    /// random parameters, and no links.
    pub fn init_interface<R: Rng + ?Sized>(&mut self, config: &NeatConfig, rng: &mut R) {
        self.clear();
        for _ in 0..config.num_inputs {
            self.push_node(random_node(NodeKind::Input, config, rng));
        }
        for _ in 0..config.num_outputs {
            self.push_node(random_node(NodeKind::Output, config, rng));
        }
    }

    /// Build a random genome from scratch.
    ///
    /// Starts from [`init_interface`](Self::init_interface) and applies a
    /// uniformly drawn number of mutations in
    /// `[network_size, network_size * max_initial_mutations]`, so larger
    /// interfaces start with proportionally more structure.
    pub fn random_init<R: Rng + ?Sized>(
        &mut self,
        config: &NeatConfig,
        innovations: &InnovationCounter,
        rng: &mut R,
    ) {
        self.init_interface(config, rng);
        let network_size = config.network_size();
        let max_mutations = network_size * config.max_initial_mutations.max(1);
        let count = rng.random_range(network_size..=max_mutations);
        for _ in 0..count {
            self.mutate_one(config, innovations, rng);
        }
    }

    /// Add a link between two random nodes.
    ///
    /// Feed-forward genomes draw `from` from the non-output nodes and `to`
    /// from the non-input nodes after it, so the link always points forward.
    /// Recurrent genomes may link any node to any non-input node. Returns
    /// `false` if the genome has no room for another link.
    pub fn add_random_link<R: Rng + ?Sized>(
        &mut self,
        config: &NeatConfig,
        innovations: &InnovationCounter,
        rng: &mut R,
    ) -> bool {
        let node_count = self.node_count();
        if !self.has_room_for(0, 1) || node_count <= config.num_inputs {
            return false;
        }

        let (from_node, to_node) = if config.is_recurrent {
            (
                rng.random_range(0..node_count),
                rng.random_range(config.num_inputs..node_count),
            )
        } else {
            let sources = node_count.saturating_sub(config.num_outputs);
            if sources == 0 {
                return false;
            }
            let from_node = rng.random_range(0..sources);
            let first_target = (from_node + 1).max(config.num_inputs);
            if first_target >= node_count {
                return false;
            }
            (from_node, rng.random_range(first_target..node_count))
        };

        let weight = symmetric(rng, config.weight_range);
        self.add_link(from_node, to_node, weight, innovations)
            .is_some()
    }

    /// Replace a random link with a new hidden node and two links.
    ///
    /// If the genome has no links, one is added first. The new node goes
    /// strictly between the split link's endpoints (clamped into the hidden
    /// region) so topological order is kept; recurrent genomes place it at the
    /// end of the hidden region instead. The incoming link keeps the original
    /// weight and the outgoing link gets weight 1.0. Returns `false`, leaving
    /// the genome untouched, if the result would not fit.
    pub fn add_random_node<R: Rng + ?Sized>(
        &mut self,
        config: &NeatConfig,
        innovations: &InnovationCounter,
        rng: &mut R,
    ) -> bool {
        let links_needed = if self.link_count() == 0 { 2 } else { 1 };
        if self.node_count() < config.network_size() || !self.has_room_for(1, links_needed) {
            return false;
        }
        if self.link_count() == 0 && !self.add_random_link(config, innovations, rng) {
            return false;
        }

        let l = rng.random_range(0..self.link_count());
        let split = self.links()[l];
        let hidden_end = self.node_count() - config.num_outputs;
        let position = if config.is_recurrent {
            hidden_end
        } else {
            let drawn = if split.from() < split.to() {
                rng.random_range(split.from()..split.to()) + 1
            } else {
                split.from() + 1
            };
            drawn.clamp(config.num_inputs, hidden_end)
        };

        let node = random_node(NodeKind::Hidden, config, rng);
        self.insert_node(position, node);

        // Re-read the link: its endpoints may have shifted.
        let split = self.links()[l];
        self.delete_link(l);
        self.add_link(split.from(), position, split.weight, innovations);
        self.add_link(position, split.to(), 1.0f32.min(config.weight_range), innovations);
        true
    }

    /// Delete a random hidden node. Returns `false` if there are none.
    pub fn delete_random_node<R: Rng + ?Sized>(
        &mut self,
        config: &NeatConfig,
        rng: &mut R,
    ) -> bool {
        let hidden_end = self.node_count().saturating_sub(config.num_outputs);
        if hidden_end <= config.num_inputs {
            return false;
        }
        let position = rng.random_range(config.num_inputs..hidden_end);
        self.delete_node(position)
    }

    /// Apply one mutation of a uniformly chosen kind and report which.
    pub fn mutate_one<R: Rng + ?Sized>(
        &mut self,
        config: &NeatConfig,
        innovations: &InnovationCounter,
        rng: &mut R,
    ) -> MutationKind {
        let kind = MutationKind::random(rng);
        let scale = config.perturbation_scale;
        match kind {
            MutationKind::AddNode => {
                self.add_random_node(config, innovations, rng);
            }
            MutationKind::DeleteNode => {
                self.delete_random_node(config, rng);
            }
            MutationKind::ChangeActivation => {
                if self.node_count() > 0 {
                    let n = rng.random_range(0..self.node_count());
                    self.nodes_mut()[n].activation = Activation::random(rng);
                }
            }
            MutationKind::ChangeBias => {
                if self.node_count() > 0 {
                    let n = rng.random_range(0..self.node_count());
                    let node = &mut self.nodes_mut()[n];
                    node.bias = perturb(rng, node.bias, config.bias_range, scale);
                }
            }
            MutationKind::ChangeGain => {
                if self.node_count() > 0 {
                    let n = rng.random_range(0..self.node_count());
                    let node = &mut self.nodes_mut()[n];
                    node.gain = perturb(rng, node.gain, config.gain_range, scale);
                }
            }
            MutationKind::AddLink => {
                self.add_random_link(config, innovations, rng);
            }
            MutationKind::DeleteLink => {
                if self.link_count() > 0 {
                    let l = rng.random_range(0..self.link_count());
                    self.delete_link(l);
                }
            }
            MutationKind::ChangeWeight => {
                if self.link_count() > 0 {
                    let l = rng.random_range(0..self.link_count());
                    let link = &mut self.links_mut()[l];
                    link.weight = perturb(rng, link.weight, config.weight_range, scale);
                } else {
                    self.add_random_link(config, innovations, rng);
                }
            }
        }
        kind
    }

    /// Give every node and link one chance to trigger a mutation.
    ///
    /// Each of the `node_count + link_count` opportunities (counted up front)
    /// fires independently with probability `mutation_rate`, so bigger genomes
    /// see proportionally more mutations. Returns the number applied.
    pub fn mutate<R: Rng + ?Sized>(
        &mut self,
        config: &NeatConfig,
        innovations: &InnovationCounter,
        rng: &mut R,
    ) -> usize {
        let opportunities = self.node_count() + self.link_count();
        let mut applied = 0;
        for _ in 0..opportunities {
            if rng.random::<f32>() < config.mutation_rate {
                self.mutate_one(config, innovations, rng);
                applied += 1;
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_init_interface() {
        let config = NeatConfig::cppn(3, 2);
        let mut rng = test_rng();
        let mut genome = Genome::new(config.max_network_size);
        genome.init_interface(&config, &mut rng);

        assert_eq!(genome.node_count(), 5);
        assert_eq!(genome.link_count(), 0);
        assert!(genome.nodes()[..3].iter().all(|n| n.kind == NodeKind::Input));
        assert!(genome.nodes()[3..].iter().all(|n| n.kind == NodeKind::Output));
        for node in genome.nodes() {
            assert!(node.bias.abs() <= config.bias_range);
            assert!(node.gain.abs() <= config.gain_range);
        }
    }

    #[test]
    fn test_add_random_link_points_forward() {
        let config = NeatConfig::cppn(3, 2);
        let innovations = InnovationCounter::new();
        let mut rng = test_rng();
        let mut genome = Genome::new(config.max_network_size);
        genome.init_interface(&config, &mut rng);

        while genome.add_random_link(&config, &innovations, &mut rng) {}
        assert_eq!(genome.link_count(), genome.capacity());
        for link in genome.links() {
            assert!(link.from() < link.to());
            assert!(link.to() >= config.num_inputs);
            assert!(link.from() < genome.node_count() - config.num_outputs);
        }
    }

    #[test]
    fn test_add_random_node_splits_single_link() {
        let config = NeatConfig::cppn(2, 1);
        let innovations = InnovationCounter::starting_at(7);
        let mut genome = Genome::new(config.max_network_size);
        genome.push_node(Node::input());
        genome.push_node(Node::input());
        genome.push_node(Node::output(Activation::Sigmoid, 0.0, 1.0));
        assert_eq!(genome.add_link(0, 2, 0.5, &innovations), Some(7));

        // With one link and no hidden nodes, every seed makes the same split.
        for seed in 0..16 {
            let mut genome = genome.clone();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            assert!(genome.add_random_node(&config, &innovations, &mut rng));

            assert_eq!(genome.node_count(), 4);
            assert_eq!(genome.node(2).unwrap().kind, NodeKind::Hidden);
            assert_eq!(genome.node(3).unwrap().kind, NodeKind::Output);

            let links = genome.links();
            assert_eq!(links.len(), 2);
            assert_eq!((links[0].from(), links[0].to()), (0, 2));
            assert!((links[0].weight - 0.5).abs() < 1e-6);
            assert_eq!((links[1].from(), links[1].to()), (2, 3));
            assert!((links[1].weight - 1.0).abs() < 1e-6);
            assert!(links[0].innovation > 7);
            assert!(links[1].innovation > links[0].innovation);
        }
    }

    #[test]
    fn test_add_random_node_respects_capacity() {
        let config = NeatConfig {
            max_network_size: 6,
            ..NeatConfig::cppn(2, 1)
        };
        let innovations = InnovationCounter::new();
        let mut rng = test_rng();
        let mut genome = Genome::new(config.max_network_size);
        genome.init_interface(&config, &mut rng);

        for _ in 0..50 {
            genome.add_random_node(&config, &innovations, &mut rng);
            assert!(genome.node_count() <= config.max_network_size);
            assert!(genome.link_count() <= config.max_network_size);
        }
        assert_eq!(genome.node_count(), config.max_network_size);

        let before = genome.clone();
        assert!(!genome.add_random_node(&config, &innovations, &mut rng));
        assert_eq!(genome, before);
    }

    #[test]
    fn test_delete_random_node_only_removes_hidden() {
        let config = NeatConfig::cppn(2, 1);
        let innovations = InnovationCounter::new();
        let mut rng = test_rng();
        let mut genome = Genome::new(config.max_network_size);
        genome.init_interface(&config, &mut rng);
        assert!(!genome.delete_random_node(&config, &mut rng));

        genome.add_random_node(&config, &innovations, &mut rng);
        assert!(genome.delete_random_node(&config, &mut rng));
        assert_eq!(genome.node_count(), 3);
        assert!(validate(&genome, &config, innovations.peek()).is_ok());
    }

    #[test]
    fn test_mutation_preserves_invariants() {
        for config in [NeatConfig::cppn(3, 2), NeatConfig::recurrent(3, 2)] {
            let innovations = InnovationCounter::new();
            let mut rng = test_rng();
            let mut genome = Genome::new(config.max_network_size);
            genome.init_interface(&config, &mut rng);

            for step in 0..2000 {
                let kind = genome.mutate_one(&config, &innovations, &mut rng);
                if let Err(err) = validate(&genome, &config, innovations.peek()) {
                    panic!("step {step} ({kind:?}) broke the genome: {err}");
                }
            }
        }
    }

    #[test]
    fn test_change_weight_falls_back_to_add_link() {
        let config = NeatConfig::cppn(2, 1);
        let innovations = InnovationCounter::new();
        let mut rng = test_rng();
        let mut genome = Genome::new(config.max_network_size);
        genome.init_interface(&config, &mut rng);

        let mut grew = false;
        for _ in 0..100 {
            let mut candidate = genome.clone();
            if candidate.mutate_one(&config, &innovations, &mut rng) == MutationKind::ChangeWeight {
                grew = candidate.link_count() == 1;
                break;
            }
        }
        assert!(grew);
    }

    #[test]
    fn test_random_init_grows_structure() {
        let config = NeatConfig::cppn(4, 2);
        let innovations = InnovationCounter::new();
        let mut rng = test_rng();
        let mut genome = Genome::new(config.max_network_size);
        genome.random_init(&config, &innovations, &mut rng);

        assert!(genome.node_count() >= config.network_size());
        assert!(validate(&genome, &config, innovations.peek()).is_ok());
    }

    #[test]
    fn test_mutate_scales_with_size() {
        let config = NeatConfig {
            mutation_rate: 0.0,
            ..NeatConfig::cppn(2, 1)
        };
        let innovations = InnovationCounter::new();
        let mut rng = test_rng();
        let mut genome = Genome::new(config.max_network_size);
        genome.init_interface(&config, &mut rng);
        assert_eq!(genome.mutate(&config, &innovations, &mut rng), 0);

        let config = NeatConfig {
            mutation_rate: 1.0,
            ..config
        };
        assert_eq!(genome.clone().mutate(&config, &innovations, &mut rng), 3);
    }

    #[test]
    fn test_perturb_stays_in_range() {
        let mut rng = test_rng();
        for _ in 0..1000 {
            let value = perturb(&mut rng, 0.9, 1.0, 5.0);
            assert!((-1.0..=1.0).contains(&value));
        }
    }
}
