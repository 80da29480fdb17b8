//! Invariant checking for packed genomes.
//!
//! Nothing on the evolution hot path calls this. A violation means a bug in
//! the mutation or reproduction code, not a recoverable condition, so the
//! report lists every failing node and link to make the bug easy to find.

use crate::config::NeatConfig;
use crate::gene::NodeKind;
use crate::genome::Genome;

/// Every invariant violation found in one genome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} invariant violation(s):\n  {}", .violations.len(), .violations.join("\n  "))]
pub struct ValidationError {
    /// One human-readable line per violation.
    pub violations: Vec<String>,
}

/// Check every genome invariant.
///
/// `innovation_limit` is the innovation counter's current value; every link
/// must carry an innovation below it.
pub fn validate(
    genome: &Genome,
    config: &NeatConfig,
    innovation_limit: u32,
) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    let node_count = genome.node_count();
    let link_count = genome.link_count();

    if node_count > config.max_network_size {
        violations.push(format!(
            "node_count {node_count} exceeds max network size {}",
            config.max_network_size
        ));
    }
    if link_count > config.max_network_size {
        violations.push(format!(
            "link_count {link_count} exceeds max network size {}",
            config.max_network_size
        ));
    }
    if node_count < config.network_size() {
        violations.push(format!(
            "node_count {node_count} is below the {} fixed input and output nodes",
            config.network_size()
        ));
    }

    let hidden_end = node_count.saturating_sub(config.num_outputs);
    for (n, node) in genome.nodes().iter().enumerate() {
        let expected = if n < config.num_inputs {
            NodeKind::Input
        } else if n < hidden_end {
            NodeKind::Hidden
        } else {
            NodeKind::Output
        };
        if node.kind != expected {
            violations.push(format!(
                "Node {n} has kind {:?}, expected {expected:?}",
                node.kind
            ));
        }
        if !(node.bias.abs() <= config.bias_range) {
            violations.push(format!(
                "Node {n} has bias {} outside ±{}",
                node.bias, config.bias_range
            ));
        }
        if !(node.gain.abs() <= config.gain_range) {
            violations.push(format!(
                "Node {n} has gain {} outside ±{}",
                node.gain, config.gain_range
            ));
        }
    }

    for (l, link) in genome.links().iter().enumerate() {
        let (from, to) = (link.from(), link.to());
        if from >= node_count {
            violations.push(format!("Link {l} has from_node {from} out of range"));
        }
        if to >= node_count {
            violations.push(format!("Link {l} has to_node {to} out of range"));
        }
        if to < config.num_inputs {
            violations.push(format!("Link {l} targets input node {to}"));
        }
        if !config.is_recurrent && to <= from {
            violations.push(format!(
                "Link {l} references nodes in non-ascending order ({from} -> {to})"
            ));
        }
        if !(link.weight.abs() <= config.weight_range) {
            violations.push(format!(
                "Link {l} has weight {} outside ±{}",
                link.weight, config.weight_range
            ));
        }
        if link.innovation >= innovation_limit {
            violations.push(format!(
                "Link {l} has innovation {} that was never issued (counter at {innovation_limit})",
                link.innovation
            ));
        }
        for (l2, other) in genome.links().iter().enumerate().skip(l + 1) {
            if other.innovation == link.innovation {
                violations.push(format!(
                    "Links {l} and {l2} share innovation {}",
                    link.innovation
                ));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { violations })
    }
}
