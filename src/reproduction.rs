//! Producing offspring genomes from one or two parents.

use rand::Rng;

use crate::compatibility::align;
use crate::config::NeatConfig;
use crate::genome::Genome;

/// Overwrite `child` with an exact copy of `parent`'s live nodes and links.
pub fn clone_into(child: &mut Genome, parent: &Genome) {
    child.copy_live_from(parent);
}

/// Overwrite `child` with a crossover of `parent` and `mate`.
///
/// The child takes the parent's topology: all of its nodes and links, in
/// order. For each parent link whose innovation the mate also carries, a fair
/// coin decides whether the child takes the mate's weight instead. With
/// [`NeatConfig::inherit_mate_nodes`] set, the child also takes the mate's
/// activation, bias and gain for that link's target node (the node kind stays
/// the parent's). Genes found only in the mate are never inherited.
///
/// Returns the number of genes taken from the mate.
pub fn crossover_into<R: Rng + ?Sized>(
    child: &mut Genome,
    parent: &Genome,
    mate: &Genome,
    config: &NeatConfig,
    rng: &mut R,
) -> usize {
    child.copy_live_from(parent);
    let alignment = align(parent, mate);

    let mut inherited = 0;
    for l in 0..parent.link_count() {
        let Some(m) = alignment.partner(l) else {
            continue;
        };
        if !rng.random_bool(0.5) {
            continue;
        }
        let mate_link = mate.links()[m];
        let to = parent.links()[l].to();
        child.links_mut()[l].weight = mate_link.weight;

        if config.inherit_mate_nodes {
            if let Some(donor) = mate.node(mate_link.to()) {
                let node = &mut child.nodes_mut()[to];
                node.activation = donor.activation;
                node.bias = donor.bias;
                node.gain = donor.gain;
            }
        }
        inherited += 1;
    }
    inherited
}
