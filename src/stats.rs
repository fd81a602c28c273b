//! Aggregate counts over the loaded gene collection.

use crate::{GeneAggregate, GeneCollection};
use std::rc::{Rc, Weak};

/// Summed counts over every loaded gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VariantStats {
    pub gene_count: usize,
    pub variant_count: u64,
    pub pathogenic_count: u64,
    pub likely_pathogenic_count: u64,
    pub vus_count: u64,
    pub likely_benign_count: u64,
    pub benign_count: u64,
    /// Genes whose variant detail has been loaded.
    pub expanded_genes: usize,
}

pub fn compute_stats(genes: &[GeneAggregate]) -> VariantStats {
    genes.iter().fold(
        VariantStats {
            gene_count: genes.len(),
            ..Default::default()
        },
        |mut acc, gene| {
            acc.variant_count += gene.variant_count;
            acc.pathogenic_count += gene.pathogenic_count;
            acc.likely_pathogenic_count += gene.likely_pathogenic_count;
            acc.vus_count += gene.vus_count;
            acc.likely_benign_count += gene.likely_benign_count;
            acc.benign_count += gene.benign_count;
            if gene.is_expanded() {
                acc.expanded_genes += 1;
            }
            acc
        },
    )
}

/// Caches [`VariantStats`] for the last collection it was asked about.
///
/// Holds only a weak reference, so it never keeps a replaced collection
/// alive and never forces a copy when the live collection is patched.
#[derive(Debug, Default)]
pub struct StatsMemo {
    source: Weak<Vec<GeneAggregate>>,
    stats: VariantStats,
    computed: usize,
}

impl StatsMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, genes: &GeneCollection) -> VariantStats {
        let same = self
            .source
            .upgrade()
            .map_or(false, |cached| Rc::ptr_eq(&cached, genes));
        if !same {
            self.stats = compute_stats(genes);
            self.source = Rc::downgrade(genes);
            self.computed += 1;
        }
        self.stats
    }

    /// How many times the stats were actually recomputed.
    pub fn computed(&self) -> usize {
        self.computed
    }
}

/// Genes whose symbol equals `symbol` exactly.
pub fn filter_by_symbol<'a>(genes: &'a [GeneAggregate], symbol: &str) -> Vec<&'a GeneAggregate> {
    genes.iter().filter(|g| g.gene_symbol == symbol).collect()
}

/// Case-insensitive substring search on gene symbols. An empty or blank
/// query matches every gene.
pub fn search_genes<'a>(genes: &'a [GeneAggregate], query: &str) -> Vec<&'a GeneAggregate> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return genes.iter().collect();
    }
    genes
        .iter()
        .filter(|g| g.gene_symbol.to_lowercase().contains(&needle))
        .collect()
}
