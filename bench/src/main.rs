use std::collections::VecDeque;
use std::time::Instant;

use vocab_graph_core::{closure, ConceptRecord, HierarchyDirection, HierarchyGraph, HopRange};

const VOCAB: &str = "bench";

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mode = args.get(1).map(|s| s.as_str()).unwrap_or("all");
    let node_count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1_000_000);

    if mode == "help" || mode == "--help" {
        println!("Usage: vocab-graph-bench [mode] [node_count]");
        println!();
        println!("Modes:");
        println!("  all         Run all generators and benchmark each (default)");
        println!("  tree        Balanced classification tree (one parent per concept)");
        println!("  polyhier    Tree plus secondary parents (multi-parent DAG)");
        println!("  flat        Wide, shallow vocabulary (few roots, many leaves)");
        println!("  cyclic      Polyhierarchy with back edges (cycle safety)");
        println!();
        println!("Default node_count: 1000000");
        return;
    }

    println!("vocab-graph-bench");
    println!("=================");
    println!();

    let generators: Vec<(&str, fn(u64) -> HierarchyGraph)> = match mode {
        "tree" => vec![("Classification tree", gen_tree)],
        "polyhier" => vec![("Polyhierarchy", gen_polyhierarchy)],
        "flat" => vec![("Flat vocabulary", gen_flat)],
        "cyclic" => vec![("Cyclic polyhierarchy", gen_cyclic)],
        "all" => vec![
            ("Classification tree", gen_tree as fn(u64) -> HierarchyGraph),
            ("Polyhierarchy", gen_polyhierarchy),
            ("Flat vocabulary", gen_flat),
            ("Cyclic polyhierarchy", gen_cyclic),
        ],
        _ => {
            eprintln!("Unknown mode: {}. Use --help for options.", mode);
            return;
        }
    };

    for (name, generator) in generators {
        run_benchmark(name, generator, node_count);
    }
}

fn run_benchmark(name: &str, generator: fn(u64) -> HierarchyGraph, node_count: u64) {
    println!("--- {} ---", name);
    println!("Target: {} concepts", node_count);

    let t = Instant::now();
    let graph = generator(node_count);
    let gen_time = t.elapsed();
    println!(
        "Generated in {:.2}s: {} concepts, {} subClassOf edges, ~{:.0}MB",
        gen_time.as_secs_f64(),
        graph.node_count(),
        graph.edge_count(),
        graph.memory_usage() as f64 / 1_048_576.0
    );

    let root = 0;
    let leaf = (graph.node_count() as u64).saturating_sub(1);

    println!();
    println!("{:>12} {:>8} {:>12} {:>12} {:>10}", "operation", "start", "found", "visited", "time");
    println!("{:->12} {:->8} {:->12} {:->12} {:->10}", "", "", "", "", "");

    let cases = [
        ("children", root, HierarchyDirection::Children, HopRange::exactly_one()),
        ("descendants", root, HierarchyDirection::Children, HopRange::strict()),
        ("flatten", root, HierarchyDirection::Children, HopRange::reflexive()),
        ("parents", leaf, HierarchyDirection::Parents, HopRange::exactly_one()),
        ("ancestors", leaf, HierarchyDirection::Parents, HopRange::strict()),
    ];

    for (op, start, direction, hops) in cases {
        let t = Instant::now();
        let result = closure(&graph, start, direction, hops);
        let elapsed = t.elapsed();
        println!(
            "{:>12} {:>8} {:>12} {:>12} {:>8.1}ms",
            op,
            start,
            result.nodes.len(),
            result.nodes_visited,
            elapsed.as_secs_f64() * 1000.0
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// Generators: all O(n) or O(n + edges), single-threaded, deterministic
// ---------------------------------------------------------------------------

/// Simple LCG for deterministic, fast pseudo-random numbers.
struct FastRng(u64);

impl FastRng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }
    fn next(&mut self, max: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 33) % max
    }
}

fn concept(i: u64) -> ConceptRecord {
    ConceptRecord::new(
        format!("{VOCAB}:{i}"),
        VOCAB,
        format!("C{i}"),
        format!("Concept {i}"),
    )
    .with_synonyms([format!("Synonym {i}")])
}

fn add_concepts(graph: &mut HierarchyGraph, node_count: u64) {
    graph.add_vocabulary(VOCAB, "Benchmark vocabulary");
    for i in 0..node_count {
        graph.add_concept(concept(i));
    }
}

/// Balanced tree: each concept gets `branching` children, breadth first.
/// NodeIds equal insertion order, so node 0 is the root.
fn gen_tree(node_count: u64) -> HierarchyGraph {
    let mut graph = HierarchyGraph::with_capacity(node_count as usize);
    add_concepts(&mut graph, node_count);

    let branching = 4u64;
    let mut frontier: VecDeque<u64> = VecDeque::from([0]);
    let mut next_id = 1u64;

    while next_id < node_count {
        let Some(parent) = frontier.pop_front() else { break };
        for _ in 0..branching {
            if next_id >= node_count {
                break;
            }
            graph.add_sub_class_of(next_id, parent);
            frontier.push_back(next_id);
            next_id += 1;
        }
    }

    graph
}

/// Tree plus a secondary parent for ~20% of concepts, always pointing at an
/// earlier concept so the result stays acyclic.
fn gen_polyhierarchy(node_count: u64) -> HierarchyGraph {
    let mut graph = gen_tree(node_count);
    let mut rng = FastRng::new(12345);

    for child in 2..node_count {
        if rng.next(5) == 0 {
            let parent = rng.next(child);
            graph.add_sub_class_of(child, parent);
        }
    }

    graph
}

/// Shallow vocabulary: a root, a handful of chapters, everything else a leaf.
fn gen_flat(node_count: u64) -> HierarchyGraph {
    let mut graph = HierarchyGraph::with_capacity(node_count as usize);
    add_concepts(&mut graph, node_count);
    let mut rng = FastRng::new(54321);

    let chapters = 20u64.min(node_count.saturating_sub(1));
    for chapter in 1..=chapters {
        graph.add_sub_class_of(chapter, 0);
    }
    for leaf in (chapters + 1)..node_count {
        let chapter = 1 + rng.next(chapters.max(1));
        graph.add_sub_class_of(leaf, chapter);
    }

    graph
}

/// Polyhierarchy with ~1% back edges from an ancestor-side concept to a
/// later one, producing cycles. Closure must still terminate.
fn gen_cyclic(node_count: u64) -> HierarchyGraph {
    let mut graph = gen_polyhierarchy(node_count);
    let mut rng = FastRng::new(77777);

    for parent in 1..node_count / 2 {
        if rng.next(100) == 0 {
            let descendant = parent + 1 + rng.next(node_count - parent - 1);
            graph.add_sub_class_of(parent, descendant);
        }
    }

    graph
}
