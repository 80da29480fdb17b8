//! Reference forward activation of packed genomes.
//!
//! The [`Activator`] reads a genome only through its node and link slices, the
//! same surface the population exposes to external renderers. Feed-forward
//! genomes are evaluated in one pass because every link points from a lower
//! position to a higher one. Recurrent genomes keep their activation buffer
//! between calls, so a backward link reads the value its source held at the
//! previous step.

use rayon::prelude::*;

use crate::config::NeatConfig;
use crate::genome::Genome;

/// Reusable activation buffer for evaluating genomes of one configuration.
#[derive(Debug, Clone)]
pub struct Activator {
    num_inputs: usize,
    num_outputs: usize,
    act: Vec<f32>,
}

impl Activator {
    /// Create an activator for genomes built with `config`.
    #[must_use]
    pub fn new(config: &NeatConfig) -> Self {
        Self {
            num_inputs: config.num_inputs,
            num_outputs: config.num_outputs,
            act: vec![0.0; config.max_network_size],
        }
    }

    /// Zero the activation buffer, forgetting recurrent state.
    pub fn reset(&mut self) {
        self.act.fill(0.0);
    }

    /// Activate `genome` once, writing its outputs clamped to `[0, 1]`.
    ///
    /// Every non-input node, in position order, computes
    /// `f(gain * sum(act[from] * weight) + bias)` over its incoming links.
    ///
    /// # Panics
    ///
    /// Panics if `inputs` or `outputs` do not match the configured interface,
    /// or if the genome is larger than the configured network size.
    pub fn activate(&mut self, genome: &Genome, inputs: &[f32], outputs: &mut [f32]) {
        assert_eq!(
            inputs.len(),
            self.num_inputs,
            "Input length mismatch: expected {}, got {}",
            self.num_inputs,
            inputs.len()
        );
        assert_eq!(
            outputs.len(),
            self.num_outputs,
            "Output length mismatch: expected {}, got {}",
            self.num_outputs,
            outputs.len()
        );

        let node_count = genome.node_count();
        self.act[..self.num_inputs].copy_from_slice(inputs);

        for (n, node) in genome.nodes().iter().enumerate().skip(self.num_inputs) {
            let raw: f32 = genome
                .links()
                .iter()
                .filter(|link| link.to() == n)
                .map(|link| self.act[link.from()] * link.weight)
                .sum();
            self.act[n] = node.activation.apply(node.gain * raw + node.bias);
        }

        let first_output = node_count - self.num_outputs;
        for (out, &value) in outputs.iter_mut().zip(&self.act[first_output..node_count]) {
            *out = value.clamp(0.0, 1.0);
        }
    }

    /// Activate `genome` and return its outputs.
    pub fn evaluate(&mut self, genome: &Genome, inputs: &[f32]) -> Vec<f32> {
        let mut outputs = vec![0.0; self.num_outputs];
        self.activate(genome, inputs, &mut outputs);
        outputs
    }
}

/// Activate every genome on its own input vector, in parallel.
///
/// `inputs` holds `num_inputs` values per genome and `outputs` receives
/// `num_outputs` values per genome, both in genome order. Each genome starts
/// from a zeroed buffer.
///
/// # Panics
///
/// Panics if the buffer lengths do not match `genomes.len()`.
pub fn activate_many(genomes: &[Genome], config: &NeatConfig, inputs: &[f32], outputs: &mut [f32]) {
    assert_eq!(inputs.len(), genomes.len() * config.num_inputs);
    assert_eq!(outputs.len(), genomes.len() * config.num_outputs);

    outputs
        .par_chunks_mut(config.num_outputs)
        .zip(inputs.par_chunks(config.num_inputs))
        .zip(genomes.par_iter())
        .for_each_init(
            || Activator::new(config),
            |activator, ((out, input), genome)| {
                activator.reset();
                activator.activate(genome, input, out);
            },
        );
}
