//! Genome persistence: a symmetric JSON reader/writer and a dot-language
//! graph exporter.
//!
//! Grounded on the teacher's `serde`/`serde_json` persistence idiom
//! (`tests/persistence_flow_tests.rs`, `examples/graph_persistence.rs`),
//! generalized to the field layout SPEC_FULL.md §6 "Serialized genome
//! format" spells out explicitly, rather than serializing `Genome`'s
//! internal layout directly — this keeps the on-disk contract stable even
//! if `Genome`'s own fields are refactored later.

use crate::edge::{ForwardEdge, RecurrentEdge};
use crate::errors::{EngineError, EngineResult};
use crate::genome::Genome;
use crate::node::{CellType, LayerRole, Node};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenomeHeader {
    generation_id: u64,
    input_count: usize,
    output_count: usize,
    param_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    innovation_number: i64,
    layer_role: LayerRole,
    cell_type: CellType,
    depth: f64,
    enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForwardEdgeRecord {
    innovation_number: i64,
    input_innovation: i64,
    output_innovation: i64,
    weight: f64,
    enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecurrentEdgeRecord {
    innovation_number: i64,
    input_innovation: i64,
    output_innovation: i64,
    weight: f64,
    enabled: bool,
    delay: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GenomeFile {
    header: GenomeHeader,
    nodes: Vec<NodeRecord>,
    forward_edges: Vec<ForwardEdgeRecord>,
    recurrent_edges: Vec<RecurrentEdgeRecord>,
    parameters: Vec<f64>,
}

fn to_file(genome: &Genome) -> GenomeFile {
    let parameters = genome.flatten();
    GenomeFile {
        header: GenomeHeader {
            generation_id: genome.generation_id,
            input_count: genome.input_node_innovations().len(),
            output_count: genome.output_node_innovations().len(),
            param_len: parameters.len(),
        },
        nodes: genome
            .nodes
            .iter()
            .map(|n| NodeRecord {
                innovation_number: n.innovation_number,
                layer_role: n.layer_role,
                cell_type: n.kernel.cell_type(),
                depth: n.depth,
                enabled: n.enabled,
            })
            .collect(),
        forward_edges: genome
            .forward_edges
            .iter()
            .map(|e| ForwardEdgeRecord {
                innovation_number: e.innovation_number,
                input_innovation: e.input_innovation,
                output_innovation: e.output_innovation,
                weight: e.weight,
                enabled: e.enabled,
            })
            .collect(),
        recurrent_edges: genome
            .recurrent_edges
            .iter()
            .map(|e| RecurrentEdgeRecord {
                innovation_number: e.innovation_number,
                input_innovation: e.input_innovation,
                output_innovation: e.output_innovation,
                weight: e.weight,
                enabled: e.enabled,
                delay: e.delay,
            })
            .collect(),
        parameters,
    }
}

fn from_file(file: GenomeFile) -> EngineResult<Genome> {
    let mut genome = Genome::new("deserialized");
    genome.generation_id = file.header.generation_id;

    genome.nodes = file
        .nodes
        .iter()
        .map(|n| {
            let mut node = Node::new(n.innovation_number, n.layer_role, n.depth, n.cell_type);
            node.enabled = n.enabled;
            node
        })
        .collect();
    genome.forward_edges = file
        .forward_edges
        .iter()
        .map(|e| {
            let mut edge = ForwardEdge::new(e.innovation_number, e.input_innovation, e.output_innovation, e.weight);
            edge.enabled = e.enabled;
            edge
        })
        .collect();
    genome.recurrent_edges = file
        .recurrent_edges
        .iter()
        .map(|e| {
            let mut edge = RecurrentEdge::new(e.innovation_number, e.input_innovation, e.output_innovation, e.weight, e.delay);
            edge.enabled = e.enabled;
            edge
        })
        .collect();
    genome.update_reachability();

    let recomputed = genome.param_len();
    if file.header.param_len != recomputed || file.parameters.len() != recomputed {
        return Err(EngineError::SerializationMismatch {
            expected: recomputed,
            found: file.parameters.len(),
        });
    }
    genome.unflatten(&file.parameters)?;
    Ok(genome)
}

/// Serializes `genome` to one JSON document, per SPEC_FULL.md §6's
/// "Serialized genome format".
pub fn write_genome_json(genome: &Genome) -> EngineResult<String> {
    Ok(serde_json::to_string_pretty(&to_file(genome))?)
}

/// Writes `genome` to `path` as one JSON document.
pub fn write_genome_file(genome: &Genome, path: impl AsRef<Path>) -> EngineResult<()> {
    let json = write_genome_json(genome)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Parses a genome from a JSON document, rejecting files whose declared
/// parameter length disagrees with the length recomputed from the node and
/// edge tables (SPEC_FULL.md §6, §7 "serialization mismatch").
pub fn read_genome_json(json: &str) -> EngineResult<Genome> {
    let file: GenomeFile = serde_json::from_str(json)?;
    from_file(file)
}

pub fn read_genome_file(path: impl AsRef<Path>) -> EngineResult<Genome> {
    let json = std::fs::read_to_string(path)?;
    read_genome_json(&json)
}

/// Renders `genome` as a dot-language directed graph: one node per cell
/// (innovation, cell type, depth) and one edge per enabled edge (recurrent
/// edges additionally labeled with their delay), per SPEC_FULL.md §6
/// "Graph export".
pub fn to_dot(genome: &Genome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph genome_{} {{", genome.generation_id);
    for node in &genome.nodes {
        let role = match node.layer_role {
            LayerRole::Input => "input",
            LayerRole::Hidden => "hidden",
            LayerRole::Output => "output",
        };
        let cell_type = format!("{:?}", node.kernel.cell_type());
        let _ = writeln!(
            out,
            "  n{} [label=\"inn={} {} {} depth={:.3}\"];",
            node.innovation_number, node.innovation_number, role, cell_type, node.depth
        );
    }
    for edge in genome.forward_edges.iter().filter(|e| e.enabled) {
        let _ = writeln!(
            out,
            "  n{} -> n{} [label=\"w={:.4}\"];",
            edge.input_innovation, edge.output_innovation, edge.weight
        );
    }
    for edge in genome.recurrent_edges.iter().filter(|e| e.enabled) {
        let _ = writeln!(
            out,
            "  n{} -> n{} [label=\"w={:.4} delay={}\", style=dashed];",
            edge.input_innovation, edge.output_innovation, edge.weight, edge.delay
        );
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng;

    #[test]
    fn genome_round_trips_through_json() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(17);
        let genome = Genome::seed(&mut next_inn, &mut rng, 2, 1);
        let json = write_genome_json(&genome).unwrap();
        let restored = read_genome_json(&json).unwrap();
        assert_eq!(restored.flatten(), genome.flatten());
        assert_eq!(restored.nodes.len(), genome.nodes.len());
        assert_eq!(restored.forward_edges.len(), genome.forward_edges.len());
    }

    #[test]
    fn read_rejects_parameter_length_mismatch() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(18);
        let genome = Genome::seed(&mut next_inn, &mut rng, 1, 1);
        let mut file = to_file(&genome);
        file.parameters.push(0.0);
        file.header.param_len = file.parameters.len();
        let json = serde_json::to_string(&file).unwrap();
        let err = read_genome_json(&json).unwrap_err();
        assert!(matches!(err, EngineError::SerializationMismatch { .. }));
    }

    #[test]
    fn dot_export_contains_every_node_and_enabled_edge() {
        let mut next_inn = 0;
        let mut rng = Rng::from_seed(19);
        let genome = Genome::seed(&mut next_inn, &mut rng, 1, 1);
        let dot = to_dot(&genome);
        for node in &genome.nodes {
            assert!(dot.contains(&format!("n{}", node.innovation_number)));
        }
        assert!(dot.starts_with("digraph"));
    }
}
