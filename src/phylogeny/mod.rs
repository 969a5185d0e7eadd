use color_eyre::eyre::{eyre, Report, Result, WrapErr};
use color_eyre::Help;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::HashMap;
use std::path::Path;

/// Name of the root node in the lineage nomenclature tree.
pub const ROOT_NODE: &str = "MRCA";
/// Name of the node whose subtree holds the designated recombinants.
pub const RECOMBINANT_NODE: &str = "X";

// ----------------------------------------------------------------------------
// Phylogeny
// ----------------------------------------------------------------------------

/// Rooted lineage nomenclature tree, nodes are lineage names.
#[derive(Debug, Default)]
pub struct Phylogeny {
    pub graph: Graph<String, isize>,
    pub lookup: HashMap<String, NodeIndex>,
}

impl Phylogeny {
    pub fn new() -> Self {
        Phylogeny {
            graph: Graph::new(),
            lookup: HashMap::new(),
        }
    }

    /// Read a newick tree from file.
    pub fn from_newick(path: &Path) -> Result<Phylogeny, Report> {
        let newick = std::fs::read_to_string(path)
            .wrap_err_with(|| eyre!("Failed to read tree: {path:?}"))?;
        Phylogeny::from_newick_str(&newick)
            .wrap_err_with(|| eyre!("Failed to parse tree: {path:?}"))
    }

    /// Parse a newick string into a phylogeny.
    pub fn from_newick_str(newick: &str) -> Result<Phylogeny, Report> {
        let mut phylogeny = Phylogeny::new();

        let newick = newick.trim().trim_end_matches(';');
        if newick.is_empty() {
            return Err(eyre!("Newick string is empty."));
        }
        if !newick.is_ascii() {
            return Err(eyre!("Newick string contains non-ascii characters."));
        }

        let mut node_i = 0;
        phylogeny.add_clade(newick, None, &mut node_i)?;

        Ok(phylogeny)
    }

    /// Add a newick clade ("name" or "(child,...)name") under an optional parent.
    fn add_clade(
        &mut self,
        newick: &str,
        parent: Option<NodeIndex>,
        node_i: &mut usize,
    ) -> Result<(), Report> {
        let newick = newick.trim();

        let (children, label) = if newick.starts_with('(') {
            let close = matching_parenthesis(newick)?;
            (&newick[1..close], &newick[close + 1..])
        } else {
            ("", newick)
        };

        // node name precedes the branch length (":"), unnamed internal
        // nodes are auto-numbered
        let mut name = label.split(':').next().unwrap_or("").to_string();
        if name.is_empty() {
            name = format!("NODE_{node_i}");
            *node_i += 1;
        }

        if self.lookup.contains_key(&name) {
            return Err(eyre!("Node {name} appears multiple times in the newick tree."));
        }
        let node = self.graph.add_node(name.clone());
        self.lookup.insert(name, node);

        if let Some(parent) = parent {
            self.graph.add_edge(parent, node, 1);
        }

        for child in split_clades(children) {
            self.add_clade(child, Some(node), node_i)?;
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn get_node(&self, name: &str) -> Result<NodeIndex, Report> {
        if self.lookup.contains_key(name) {
            let node = self.lookup[name];
            Ok(node)
        } else {
            Err(eyre!("Node {name} is not found in the phylogeny."))
        }
    }

    pub fn get_name(&self, node: &NodeIndex) -> String {
        self.graph[*node].clone()
    }

    /// Get the root node, the single node with no incoming edges.
    pub fn get_root(&self) -> Result<String, Report> {
        let roots = self
            .graph
            .node_indices()
            .filter(|n| {
                self.graph.neighbors_directed(*n, Direction::Incoming).next().is_none()
            })
            .collect::<Vec<_>>();

        match roots[..] {
            [root] => Ok(self.get_name(&root)),
            _ => Err(eyre!("Phylogeny has {} root nodes, expected 1.", roots.len())),
        }
    }

    /// Get all descendant names of a node, including the node itself.
    pub fn get_descendants(&self, name: &str) -> Result<Vec<String>, Report> {
        let mut descendants = Vec::new();

        let node = self.get_node(name)?;
        let mut dfs = Dfs::new(&self.graph, node);
        while let Some(nx) = dfs.next(&self.graph) {
            descendants.push(self.get_name(&nx));
        }

        Ok(descendants)
    }

    /// Get the path of names from the root down to a node, inclusive.
    pub fn get_ancestors(&self, name: &str) -> Result<Vec<String>, Report> {
        let mut path = vec![name.to_string()];

        let mut node = self.get_node(name)?;
        while let Some(parent) =
            self.graph.neighbors_directed(node, Direction::Incoming).next()
        {
            path.push(self.get_name(&parent));
            node = parent;
        }

        path.reverse();
        Ok(path)
    }

    /// Identify the most recent common ancestor shared between all names.
    pub fn get_common_ancestor(&self, names: &[String]) -> Result<String, Report> {
        let first = names
            .first()
            .ok_or_else(|| eyre!("Cannot find the common ancestor of no lineages."))?;
        if names.len() == 1 {
            // a node is its own ancestor
            self.get_node(first)?;
            return Ok(first.clone());
        }

        let paths = names
            .iter()
            .map(|name| self.get_ancestors(name))
            .collect::<Result<Vec<_>, Report>>()?;

        // walk down from the root while all paths agree
        let mut common_ancestor = paths[0][0].clone();
        let min_depth = paths.iter().map(|p| p.len()).min().unwrap_or(0);
        for depth in 0..min_depth {
            let name = &paths[0][depth];
            if paths.iter().all(|p| p[depth] == *name) {
                common_ancestor = name.clone();
            } else {
                break;
            }
        }

        Ok(common_ancestor)
    }

    /// Count the edges separating two nodes, walking through their
    /// common ancestor.
    pub fn get_distance(&self, name_1: &str, name_2: &str) -> Result<usize, Report> {
        let path_1 = self.get_ancestors(name_1)?;
        let path_2 = self.get_ancestors(name_2)?;

        let shared = path_1
            .iter()
            .zip(path_2.iter())
            .take_while(|(n1, n2)| n1 == n2)
            .count();

        Ok((path_1.len() - shared) + (path_2.len() - shared))
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Find the index of the parenthesis closing the one that opens the string.
fn matching_parenthesis(newick: &str) -> Result<usize, Report> {
    let mut depth = 0;
    for (i, c) in newick.chars().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => continue,
        }
    }

    Err(eyre!("Unmatched parenthesis in newick: {newick}")
        .suggestion("Is the newick tree complete?"))
}

/// Split sibling clades on commas outside of parentheses.
fn split_clades(newick: &str) -> Vec<&str> {
    let mut clades = Vec::new();
    let mut depth = 0;
    let mut start = 0;

    for (i, c) in newick.chars().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                clades.push(&newick[start..i]);
                start = i + 1;
            }
            _ => continue,
        }
    }
    if start < newick.len() {
        clades.push(&newick[start..]);
    }

    clades.into_iter().filter(|c| !c.trim().is_empty()).collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
