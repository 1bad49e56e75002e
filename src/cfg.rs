//! Control-flow graph nodes and the interface to the external CFG/IR provider.
//!
//! CFG recovery itself is somebody else's job: this module only models the
//! recovered graph (stable per-block address/size/name, predecessor and
//! successor sets) and the [`BlockLifter`] trait through which a block's IR can
//! be (re-)lifted on demand at a chosen optimization level.

use crate::analysis_config::CONFIG;
use crate::ir::IrBlock;
use crate::log::*;

use itertools::Itertools;

/// Index of a node within its [`Cfg`]. Only meaningful for the graph it was
/// issued by.
pub type NodeId = usize;

/// One recovered basic block.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CfgNode {
    /// Machine address of the block's first instruction; the block's stable
    /// identity.
    pub addr: u64,
    /// Size of the block in bytes.
    pub size: usize,
    /// Human-readable name (usually derived from the containing symbol).
    pub name: String,
}

/// A recovered control-flow graph. Nodes are addressed by [`NodeId`]; edges
/// are stored as per-node predecessor and successor lists.
#[derive(Default, Debug)]
pub struct Cfg {
    nodes: Vec<CfgNode>,
    predecessors: Vec<Vec<NodeId>>,
    successors: Vec<Vec<NodeId>>,
}

impl Cfg {
    /// A new, empty graph.
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a node, returning its id.
    pub fn add_node(&mut self, addr: u64, size: usize, name: impl Into<String>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(CfgNode {
            addr,
            size,
            name: name.into(),
        });
        self.predecessors.push(vec![]);
        self.successors.push(vec![]);
        id
    }

    /// Add a directed edge `from -> to`.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        assert!(from < self.nodes.len() && to < self.nodes.len());
        self.successors[from].push(to);
        self.predecessors[to].push(from);
    }

    /// The node with id `id`.
    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.nodes[id]
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of all nodes, in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        0..self.nodes.len()
    }

    /// Predecessors of `id`.
    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        &self.predecessors[id]
    }

    /// Successors of `id`.
    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        &self.successors[id]
    }

    /// Render the graph as GraphViz `.dot` to `w`.
    pub fn write_dot(&self, w: &mut impl std::io::Write) -> std::io::Result<()> {
        type Node = NodeId;
        type Edge = (NodeId, NodeId);

        struct Graph<'a> {
            cfg: &'a Cfg,
        }

        impl<'a> dot::Labeller<'a, Node, Edge> for Graph<'a> {
            fn graph_id(&'a self) -> dot::Id<'a> {
                dot::Id::new("Cfg").unwrap()
            }
            fn node_id(&'a self, n: &Node) -> dot::Id<'a> {
                dot::Id::new(format!("n{:#x}", self.cfg.node(*n).addr)).unwrap()
            }
            fn node_label<'b>(&'b self, n: &Node) -> dot::LabelText<'b> {
                let node = self.cfg.node(*n);
                dot::LabelText::label(format!("{}\n{:#x}+{}", node.name, node.addr, node.size))
            }
        }

        impl<'a> dot::GraphWalk<'a, Node, Edge> for Graph<'a> {
            fn nodes(&self) -> dot::Nodes<'a, Node> {
                self.cfg.node_ids().collect::<Vec<_>>().into()
            }
            fn edges(&'a self) -> dot::Edges<'a, Edge> {
                self.cfg
                    .node_ids()
                    .flat_map(|n| self.cfg.successors(n).iter().map(move |&s| (n, s)))
                    .collect::<Vec<_>>()
                    .into()
            }
            fn source(&self, e: &Edge) -> Node {
                e.0
            }
            fn target(&self, e: &Edge) -> Node {
                e.1
            }
        }

        dot::render(&Graph { cfg: self }, w)
    }

    /// Render the graph as GraphViz `.dot` into a `String`.
    pub fn generate_dot(&self) -> String {
        let mut s: Vec<u8> = vec![];
        self.write_dot(&mut s).unwrap();
        String::from_utf8(s).unwrap()
    }
}

/// The external IR provider: lifts the IR of the block starting at `addr`.
///
/// `opt_level` selects how much front-end optimization is applied to the
/// lifted IR; the dataflow passes always request level 0 so register writes
/// stay explicit, while the raw traversal diagnostic uses the configured
/// level. Returns `None` for addresses the provider has no block for (e.g.
/// unresolvable jump targets).
pub trait BlockLifter {
    fn lift_block(&self, addr: u64, opt_level: u8) -> Option<IrBlock>;
}

/// Walk the graph from its indegree-zero roots in depth-first order, writing a
/// textual dump of every reachable node to `out`: address, size, the block's
/// lifted IR (at the configured traversal optimization level), and the
/// successor list. Purely diagnostic.
///
/// When `process` is given, it is invoked with each lifted block instead of
/// printing the IR, allowing callers to hook their own per-block rendering in.
pub fn traverse(
    cfg: &Cfg,
    lifter: &impl BlockLifter,
    mut process: Option<&mut dyn FnMut(&CfgNode, &IrBlock, &mut dyn std::io::Write)>,
    out: &mut impl std::io::Write,
) -> std::io::Result<()> {
    let mut visited = vec![false; cfg.len()];
    let mut stack: Vec<NodeId> = cfg
        .node_ids()
        .filter(|&n| cfg.predecessors(n).is_empty())
        .collect();

    while let Some(id) = stack.pop() {
        if visited[id] {
            continue;
        }
        visited[id] = true;

        let node = cfg.node(id);
        writeln!(
            out,
            "{} start addr: {:X} of size: {}",
            node.name, node.addr, node.size
        )?;

        match lifter.lift_block(node.addr, CONFIG.traverse_opt_level) {
            Some(block) => {
                if let Some(process) = process.as_mut() {
                    process(node, &block, out);
                } else {
                    for stmt in &block.stmts {
                        writeln!(out, "   {}", stmt)?;
                    }
                }
            }
            None => {
                debug!("No block lifted during traversal"; "addr" => node.addr);
            }
        }

        writeln!(
            out,
            "successors: [{}]",
            cfg.successors(id)
                .iter()
                .map(|&s| format!("{:#x}", cfg.node(s).addr))
                .join(", ")
        )?;
        writeln!(out)?;

        stack.extend(cfg.successors(id));
    }
    Ok(())
}
