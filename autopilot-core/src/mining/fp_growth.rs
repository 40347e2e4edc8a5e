//! Frequent-itemset mining via FP-Growth.
//!
//! Pattern growth over a prefix tree: no candidate generation, one pass
//! to count items, one pass to build the tree, then recursive mining of
//! conditional trees. Output order is deterministic for a fixed input
//! ordering (items are ranked by descending frequency with lexicographic
//! tie-breaks).

use std::collections::{BTreeSet, HashMap};

/// A frequent itemset: sorted item strings and the number of
/// transactions containing all of them.
pub type ItemsetCounts = HashMap<Vec<String>, usize>;

struct Node {
    item: usize,
    count: usize,
    parent: usize,
    children: HashMap<usize, usize>,
}

struct Tree {
    nodes: Vec<Node>,
    /// item id -> node indices holding that item
    header: HashMap<usize, Vec<usize>>,
}

const ROOT: usize = 0;

impl Tree {
    fn new() -> Self {
        Self {
            nodes: vec![Node {
                item: usize::MAX,
                count: 0,
                parent: ROOT,
                children: HashMap::new(),
            }],
            header: HashMap::new(),
        }
    }

    /// Insert a ranked, descending-frequency item path with a weight.
    fn insert(&mut self, path: &[usize], weight: usize) {
        let mut current = ROOT;
        for &item in path {
            if let Some(&child) = self.nodes[current].children.get(&item) {
                self.nodes[child].count += weight;
                current = child;
            } else {
                let idx = self.nodes.len();
                self.nodes.push(Node {
                    item,
                    count: weight,
                    parent: current,
                    children: HashMap::new(),
                });
                self.nodes[current].children.insert(item, idx);
                self.header.entry(item).or_default().push(idx);
                current = idx;
            }
        }
    }

    /// Weighted prefix paths ending just above nodes of `item`.
    fn prefix_paths(&self, item: usize) -> Vec<(Vec<usize>, usize)> {
        let mut paths = Vec::new();
        for &node_idx in self.header.get(&item).into_iter().flatten() {
            let weight = self.nodes[node_idx].count;
            let mut path = Vec::new();
            let mut current = self.nodes[node_idx].parent;
            while current != ROOT {
                path.push(self.nodes[current].item);
                current = self.nodes[current].parent;
            }
            path.reverse();
            if !path.is_empty() {
                paths.push((path, weight));
            }
        }
        paths
    }
}

/// Mine all itemsets with support >= `min_support` (relative to the
/// transaction count). Returns itemsets keyed by their sorted items.
#[must_use]
pub fn frequent_itemsets(
    transactions: &[BTreeSet<String>],
    min_support: f64,
) -> ItemsetCounts {
    let total = transactions.len();
    if total == 0 {
        return HashMap::new();
    }
    let min_count = ((min_support * total as f64).ceil() as usize).max(1);

    // Pass 1: item frequencies
    let mut frequencies: HashMap<&str, usize> = HashMap::new();
    for tx in transactions {
        for item in tx {
            *frequencies.entry(item.as_str()).or_insert(0) += 1;
        }
    }

    // Rank surviving items by descending frequency, ties lexicographic
    let mut ranked: Vec<(&str, usize)> = frequencies
        .iter()
        .filter(|&(_, &count)| count >= min_count)
        .map(|(&item, &count)| (item, count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let rank_of: HashMap<&str, usize> = ranked
        .iter()
        .enumerate()
        .map(|(rank, (item, _))| (*item, rank))
        .collect();
    let names: Vec<String> = ranked.iter().map(|(item, _)| (*item).to_string()).collect();

    // Pass 2: build the tree from ranked transactions
    let mut tree = Tree::new();
    for tx in transactions {
        let mut path: Vec<usize> = tx
            .iter()
            .filter_map(|item| rank_of.get(item.as_str()).copied())
            .collect();
        path.sort_unstable();
        if !path.is_empty() {
            tree.insert(&path, 1);
        }
    }

    let mut found: HashMap<Vec<usize>, usize> = HashMap::new();
    mine_tree(&tree, &[], min_count, &mut found);

    found
        .into_iter()
        .map(|(ids, count)| {
            let mut items: Vec<String> = ids.iter().map(|&id| names[id].clone()).collect();
            items.sort();
            (items, count)
        })
        .collect()
}

/// Recursively mine a (conditional) tree.
fn mine_tree(
    tree: &Tree,
    suffix: &[usize],
    min_count: usize,
    found: &mut HashMap<Vec<usize>, usize>,
) {
    let mut items: Vec<usize> = tree.header.keys().copied().collect();
    items.sort_unstable();

    for item in items {
        let support: usize = tree.header[&item]
            .iter()
            .map(|&idx| tree.nodes[idx].count)
            .sum();
        if support < min_count {
            continue;
        }

        let mut itemset: Vec<usize> = suffix.to_vec();
        itemset.push(item);
        itemset.sort_unstable();
        found.insert(itemset.clone(), support);

        // Conditional tree over this item's prefix paths
        let paths = tree.prefix_paths(item);
        if paths.is_empty() {
            continue;
        }

        // Re-count items within the conditional base
        let mut conditional_counts: HashMap<usize, usize> = HashMap::new();
        for (path, weight) in &paths {
            for &p in path {
                *conditional_counts.entry(p).or_insert(0) += weight;
            }
        }

        let mut conditional = Tree::new();
        for (path, weight) in &paths {
            let filtered: Vec<usize> = path
                .iter()
                .copied()
                .filter(|p| conditional_counts[p] >= min_count)
                .collect();
            if !filtered.is_empty() {
                conditional.insert(&filtered, *weight);
            }
        }

        if !conditional.header.is_empty() {
            mine_tree(&conditional, &itemset, min_count, found);
        }
    }
}
