use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::schema::SchemaGraph;

/// Summary of relationship graph structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Dependency ordering of the tables of a schema graph.
///
/// `order` lists every table parents-first once `deferred` relationships are
/// ignored. Deferred relationships are nullable edges inside a cycle; they are
/// filled by a follow-up update after both rows exist. Tables in
/// `unsatisfiable` sit on (or depend through required edges on) a cycle made
/// only of non-nullable relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub summary: GraphSummary,
    pub order: Vec<String>,
    pub deferred: BTreeSet<String>,
    pub unsatisfiable: BTreeSet<String>,
}

impl DependencyReport {
    /// Position of a table in `order`.
    pub fn rank(&self, table_id: &str) -> Option<usize> {
        self.order.iter().position(|id| id == table_id)
    }

    pub fn is_deferred(&self, relationship: &str) -> bool {
        self.deferred.contains(relationship)
    }

    pub fn is_satisfiable(&self, table_id: &str) -> bool {
        !self.unsatisfiable.contains(table_id)
    }
}

struct Edge<'a> {
    name: &'a str,
    parent: &'a str,
    child: &'a str,
    nullable: bool,
}

/// Build a deterministic dependency report for a schema graph.
pub fn analyze_dependencies(schema: &SchemaGraph) -> DependencyReport {
    let nodes: BTreeSet<String> = schema.table_ids().into_iter().collect();
    let edges: Vec<Edge<'_>> = schema
        .relationships
        .iter()
        .filter(|rel| nodes.contains(&rel.parent) && nodes.contains(&rel.child))
        .map(|rel| Edge {
            name: rel.name.as_str(),
            parent: rel.parent.as_str(),
            child: rel.child.as_str(),
            nullable: rel.is_nullable,
        })
        .collect();

    let summary = GraphSummary {
        nodes: nodes.len(),
        edges: edges.len(),
    };

    let full = adjacency(&nodes, edges.iter());
    let mut deferred = BTreeSet::new();
    let mut unsatisfiable = BTreeSet::new();

    for component in strongly_connected(&full) {
        let members: BTreeSet<&str> = component.iter().map(String::as_str).collect();
        let cyclic = members.len() > 1
            || edges
                .iter()
                .any(|edge| edge.parent == edge.child && members.contains(edge.parent));
        if !cyclic {
            continue;
        }

        let inner: Vec<&Edge<'_>> = edges
            .iter()
            .filter(|edge| members.contains(edge.parent) && members.contains(edge.child))
            .collect();
        for edge in inner.iter().filter(|edge| edge.nullable) {
            deferred.insert(edge.name.to_string());
        }

        let component_nodes: BTreeSet<String> = component.iter().cloned().collect();
        let required = adjacency(
            &component_nodes,
            inner.iter().copied().filter(|edge| !edge.nullable),
        );
        if let Err(stuck) = toposort(&required) {
            unsatisfiable.extend(stuck);
        }
        // A required self-reference can never be satisfied by an earlier insert.
        for edge in inner
            .iter()
            .filter(|edge| edge.parent == edge.child && !edge.nullable)
        {
            unsatisfiable.insert(edge.parent.to_string());
        }
    }

    let ordering = adjacency(
        &nodes,
        edges.iter().filter(|edge| {
            !deferred.contains(edge.name)
                && !(unsatisfiable.contains(edge.parent) && unsatisfiable.contains(edge.child))
        }),
    );
    let order = match toposort(&ordering) {
        Ok(order) => order,
        // The remaining graph is acyclic by construction; keep every table anyway.
        Err(_) => nodes.iter().cloned().collect(),
    };

    // A required edge into an unsatisfiable parent poisons the child as well.
    for table in &order {
        let poisoned = edges.iter().any(|edge| {
            edge.child == table.as_str()
                && !edge.nullable
                && edge.parent != edge.child
                && unsatisfiable.contains(edge.parent)
        });
        if poisoned {
            unsatisfiable.insert(table.clone());
        }
    }

    DependencyReport {
        summary,
        order,
        deferred,
        unsatisfiable,
    }
}

fn adjacency<'a, 'e: 'a>(
    nodes: &BTreeSet<String>,
    edges: impl Iterator<Item = &'a Edge<'e>>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = nodes
        .iter()
        .map(|node| (node.clone(), BTreeSet::new()))
        .collect();

    for edge in edges {
        if edge.parent == edge.child {
            continue;
        }
        if let Some(targets) = graph.get_mut(edge.parent)
            && nodes.contains(edge.child)
        {
            targets.insert(edge.child.to_string());
        }
    }

    graph
}

fn toposort(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, Vec<String>> {
    let mut indegree: BTreeMap<String, usize> = BTreeMap::new();

    for node in graph.keys() {
        indegree.entry(node.clone()).or_insert(0);
    }

    for targets in graph.values() {
        for target in targets {
            let entry = indegree.entry(target.clone()).or_insert(0);
            *entry += 1;
        }
    }

    let mut ready: BTreeSet<String> = indegree
        .iter()
        .filter_map(|(node, count)| if *count == 0 { Some(node.clone()) } else { None })
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        order.push(node.clone());

        if let Some(targets) = graph.get(&node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(target.clone());
                    }
                }
            }
        }
    }

    if order.len() == graph.len() {
        Ok(order)
    } else {
        let cycle_nodes: Vec<String> = indegree
            .into_iter()
            .filter_map(|(node, count)| if count > 0 { Some(node) } else { None })
            .collect();
        Err(cycle_nodes)
    }
}

fn strongly_connected(graph: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    let mut state = Tarjan {
        graph,
        next_index: 0,
        indices: HashMap::new(),
        lowlink: HashMap::new(),
        stack: Vec::new(),
        on_stack: HashSet::new(),
        components: Vec::new(),
    };

    for node in graph.keys() {
        if !state.indices.contains_key(node.as_str()) {
            state.visit(node);
        }
    }

    state.components
}

struct Tarjan<'g> {
    graph: &'g BTreeMap<String, BTreeSet<String>>,
    next_index: usize,
    indices: HashMap<&'g str, usize>,
    lowlink: HashMap<&'g str, usize>,
    stack: Vec<&'g str>,
    on_stack: HashSet<&'g str>,
    components: Vec<Vec<String>>,
}

impl<'g> Tarjan<'g> {
    fn visit(&mut self, node: &'g str) {
        self.indices.insert(node, self.next_index);
        self.lowlink.insert(node, self.next_index);
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack.insert(node);

        let graph = self.graph;
        if let Some(targets) = graph.get(node) {
            for target in targets {
                let target = target.as_str();
                if !self.indices.contains_key(target) {
                    self.visit(target);
                    let low = self.lowlink[node].min(self.lowlink[target]);
                    self.lowlink.insert(node, low);
                } else if self.on_stack.contains(target) {
                    let low = self.lowlink[node].min(self.indices[target]);
                    self.lowlink.insert(node, low);
                }
            }
        }

        if self.lowlink[node] == self.indices[node] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(member);
                component.push(member.to_string());
                if member == node {
                    break;
                }
            }
            component.sort();
            self.components.push(component);
        }
    }
}
