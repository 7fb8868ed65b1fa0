//! Step dependency graph for a recipe.
//!
//! Nodes are 1-based step numbers. Every ingredient, instrument, or vessel
//! use that names a product adds an edge from the producing step to the
//! consuming step. Parallel edges are kept in [`RecipeGraph::edges`]; the
//! transitive reduction in [`RecipeGraph::reduced_edges`] is the minimal
//! form used for display.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt::Write as _;

use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use super::{Recipe, RecipeStep};
use crate::error::{PlanError, PlanResult};

/// A producer -> consumer dependency between two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub producer: u32,
    pub consumer: u32,
}

#[derive(Debug, Clone)]
pub struct RecipeGraph {
    nodes: Vec<u32>,
    edges: Vec<Edge>,
    reduced: Vec<Edge>,
    order: Vec<u32>,
    labels: HashMap<u32, String>,
}

/// Build and validate the step graph of `recipe`.
///
/// Fails with [`PlanError::UnresolvedProductRef`] when a use names a product
/// no step of this recipe makes, and with [`PlanError::RecipeNotAcyclic`]
/// on any cycle, self-loops included.
pub fn build_graph(recipe: &Recipe) -> PlanResult<RecipeGraph> {
    let mut steps: Vec<&RecipeStep> = recipe.steps.iter().collect();
    steps.sort_by_key(|s| s.index);

    let mut producers: HashMap<&str, u32> = HashMap::new();
    for step in &steps {
        for product in &step.products {
            producers.insert(product.id.as_str(), step.number());
        }
    }

    let mut graph: DiGraph<u32, ()> = DiGraph::new();
    let mut node_of: HashMap<u32, NodeIndex> = HashMap::new();
    for step in &steps {
        node_of.insert(step.number(), graph.add_node(step.number()));
    }

    let mut edges = Vec::new();
    for step in &steps {
        let refs = step
            .ingredients
            .iter()
            .filter_map(|u| u.product_ref.as_deref())
            .chain(step.instruments.iter().filter_map(|u| u.product_ref.as_deref()))
            .chain(step.vessels.iter().filter_map(|u| u.product_ref.as_deref()));

        for product in refs {
            let producer =
                *producers
                    .get(product)
                    .ok_or_else(|| PlanError::UnresolvedProductRef {
                        recipe_id: recipe.id.clone(),
                        step: step.number(),
                        product: product.to_owned(),
                    })?;
            graph.add_edge(node_of[&producer], node_of[&step.number()], ());
            edges.push(Edge {
                producer,
                consumer: step.number(),
            });
        }
    }

    if is_cyclic_directed(&graph) {
        return Err(PlanError::RecipeNotAcyclic {
            recipe_id: recipe.id.clone(),
        });
    }

    edges.sort_by_key(|e| (e.consumer, e.producer));
    let order = topological_order(&graph);
    let reduced = transitive_reduction(&edges);

    Ok(RecipeGraph {
        nodes: steps.iter().map(|s| s.number()).collect(),
        edges,
        reduced,
        order,
        labels: steps
            .iter()
            .map(|s| (s.number(), s.preparation.clone()))
            .collect(),
    })
}

/// Kahn's algorithm, always releasing the lowest ready step number first so
/// the order is deterministic.
fn topological_order(graph: &DiGraph<u32, ()>) -> Vec<u32> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|n| (n, graph.neighbors_directed(n, Direction::Incoming).count()))
        .collect();

    let mut ready: BinaryHeap<Reverse<(u32, NodeIndex)>> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(n, _)| Reverse((graph[*n], *n)))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse((number, node))) = ready.pop() {
        order.push(number);
        // neighbors() yields once per parallel edge, matching in_degree.
        for next in graph.neighbors(node) {
            if let Some(deg) = in_degree.get_mut(&next) {
                *deg -= 1;
                if *deg == 0 {
                    ready.push(Reverse((graph[next], next)));
                }
            }
        }
    }
    order
}

/// Drop every edge implied by a longer path. Input must be acyclic.
fn transitive_reduction(edges: &[Edge]) -> Vec<Edge> {
    let mut map: DiGraphMap<u32, ()> = DiGraphMap::new();
    for edge in edges {
        // Re-adding an existing edge just replaces its weight.
        map.add_edge(edge.producer, edge.consumer, ());
    }

    let mut reduced: Vec<Edge> = map
        .all_edges()
        .filter(|(from, to, _)| {
            !map.neighbors(*from)
                .filter(|mid| mid != to)
                .any(|mid| has_path_connecting(&map, mid, *to, None))
        })
        .map(|(producer, consumer, _)| Edge { producer, consumer })
        .collect();
    reduced.sort_by_key(|e| (e.consumer, e.producer));
    reduced
}

impl RecipeGraph {
    /// Step numbers in ascending order.
    pub fn nodes(&self) -> &[u32] {
        &self.nodes
    }

    /// Every dependency edge, duplicates included, ordered by (consumer,
    /// producer).
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Minimal edge set with the same reachability, ordered by (consumer,
    /// producer).
    pub fn reduced_edges(&self) -> &[Edge] {
        &self.reduced
    }

    /// A valid execution order; ties go to the lower step number.
    pub fn topological_order(&self) -> &[u32] {
        &self.order
    }

    /// Steps whose products `step` consumes directly, ascending.
    pub fn dependencies(&self, step: u32) -> Vec<u32> {
        let mut deps: Vec<u32> = self
            .edges
            .iter()
            .filter(|e| e.consumer == step)
            .map(|e| e.producer)
            .collect();
        deps.dedup();
        deps
    }

    /// Render the reduced graph as a Mermaid flowchart.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        for number in &self.nodes {
            let label = self
                .labels
                .get(number)
                .map(|l| l.replace('"', "#quot;"))
                .unwrap_or_default();
            let _ = writeln!(out, "    step{number}[\"Step #{number}: {label}\"]");
        }
        for edge in &self.reduced {
            let _ = writeln!(out, "    step{} --> step{}", edge.producer, edge.consumer);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::ToolUse;
    use crate::recipe::fixtures::{product, product_use, recipe, step};

    /// 1 -> 2 -> 3 with an extra direct 1 -> 3 edge.
    fn diamond_free_chain() -> Recipe {
        let mut s1 = step(0);
        s1.products.push(product("dough"));
        let mut s2 = step(1);
        s2.ingredients.push(product_use("u1", "dough"));
        s2.products.push(product("shaped"));
        let mut s3 = step(2);
        s3.ingredients.push(product_use("u2", "shaped"));
        s3.ingredients.push(product_use("u3", "dough"));
        recipe("bread", vec![s1, s2, s3])
    }

    #[test]
    fn single_step_has_no_edges() {
        let graph = build_graph(&recipe("r", vec![step(0)])).unwrap();
        assert_eq!(graph.nodes(), &[1]);
        assert!(graph.edges().is_empty());
        assert_eq!(graph.topological_order(), &[1]);
    }

    #[test]
    fn edges_sorted_by_consumer_then_producer() {
        let graph = build_graph(&diamond_free_chain()).unwrap();
        let edges: Vec<(u32, u32)> = graph
            .edges()
            .iter()
            .map(|e| (e.consumer, e.producer))
            .collect();
        assert_eq!(edges, vec![(2, 1), (3, 1), (3, 2)]);
        assert_eq!(graph.topological_order(), &[1, 2, 3]);
        assert_eq!(graph.dependencies(3), vec![1, 2]);
    }

    #[test]
    fn reduction_drops_implied_edge() {
        let graph = build_graph(&diamond_free_chain()).unwrap();
        let reduced: Vec<(u32, u32)> = graph
            .reduced_edges()
            .iter()
            .map(|e| (e.producer, e.consumer))
            .collect();
        assert_eq!(reduced, vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn duplicate_references_collapse_in_reduction() {
        let mut s1 = step(0);
        s1.products.push(product("stock"));
        let mut s2 = step(1);
        s2.ingredients.push(product_use("a", "stock"));
        s2.ingredients.push(product_use("b", "stock"));
        let graph = build_graph(&recipe("soup", vec![s1, s2])).unwrap();

        assert_eq!(graph.edges().len(), 2);
        assert_eq!(graph.reduced_edges().len(), 1);
        assert_eq!(graph.dependencies(2), vec![1]);
    }

    #[test]
    fn tool_products_create_edges() {
        let mut s1 = step(0);
        s1.products.push(product("lined tin"));
        let mut s2 = step(1);
        s2.vessels.push(ToolUse {
            id: "v".into(),
            name: "tin".into(),
            product_ref: Some("lined tin".into()),
        });
        let graph = build_graph(&recipe("cake", vec![s1, s2])).unwrap();
        assert_eq!(graph.dependencies(2), vec![1]);
    }

    #[test]
    fn cycle_is_rejected() {
        let mut s1 = step(0);
        s1.products.push(product("a"));
        s1.ingredients.push(product_use("u1", "b"));
        let mut s2 = step(1);
        s2.products.push(product("b"));
        s2.ingredients.push(product_use("u2", "a"));

        let err = build_graph(&recipe("loop", vec![s1, s2])).unwrap_err();
        assert!(matches!(err, PlanError::RecipeNotAcyclic { recipe_id } if recipe_id == "loop"));
    }

    #[test]
    fn self_loop_is_rejected() {
        let mut s1 = step(0);
        s1.products.push(product("sourdough starter"));
        s1.ingredients.push(product_use("u1", "sourdough starter"));

        let err = build_graph(&recipe("starter", vec![s1])).unwrap_err();
        assert!(matches!(err, PlanError::RecipeNotAcyclic { .. }));
    }

    #[test]
    fn unknown_product_is_reported_with_step_number() {
        let mut s1 = step(0);
        s1.ingredients.push(product_use("u1", "ghost"));

        let err = build_graph(&recipe("r", vec![s1])).unwrap_err();
        match err {
            PlanError::UnresolvedProductRef { step, product, .. } => {
                assert_eq!(step, 1);
                assert_eq!(product, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mermaid_lists_nodes_and_reduced_edges() {
        let graph = build_graph(&diamond_free_chain()).unwrap();
        let mermaid = graph.to_mermaid();
        assert!(mermaid.starts_with("flowchart TD\n"));
        assert!(mermaid.contains("step1[\"Step #1: prep 0\"]"));
        assert!(mermaid.contains("step1 --> step2"));
        assert!(mermaid.contains("step2 --> step3"));
        assert!(!mermaid.contains("step1 --> step3"));
    }
}
