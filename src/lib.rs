//! Client-side delivery of per-case variant results.
//!
//! Gene summaries for a session are streamed as NDJSON and committed into one
//! owned state object, per-gene variant detail is fetched lazily, and the
//! collections of recently viewed sessions are kept in a small LRU cache so
//! switching back to a case is instant.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

pub mod cache;
pub mod config;
pub mod expand;
pub mod export;
pub mod hooks;
pub mod loader;
pub mod source;
pub mod stats;
pub mod stream;

pub use cache::{SessionCache, SessionCacheEntry};
pub use config::ResultsConfig;
pub use expand::GeneLoadError;
pub use hooks::{use_variant_results, VariantResultsView};
pub use loader::{Activation, LoadOutcome, LoadState, LoadTicket, ResultsSnapshot, VariantResults};
pub use source::{HttpVariantSource, MemoryVariantSource, VariantSource};
pub use stats::VariantStats;

/// Opaque identifier of one case's variant-analysis result set.
pub type SessionId = String;

/// A session's gene collection. Replaced, never mutated in place, so that a
/// change of pointer identity means a change of content.
pub type GeneCollection = Rc<Vec<GeneAggregate>>;

/// One called variant within a gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    #[serde(default)]
    pub variant_idx: Option<u64>,
    #[serde(alias = "chrom")]
    pub chromosome: String,
    #[serde(alias = "pos")]
    pub position: u64,
    #[serde(alias = "ref")]
    pub reference_allele: String,
    #[serde(alias = "alt")]
    pub alternate_allele: String,
    // Passed through as produced, whatever their JSON shape.
    #[serde(default)]
    pub acmg_class: Option<serde_json::Value>,
    #[serde(default)]
    pub acmg_criteria: Option<serde_json::Value>,
    #[serde(default)]
    pub quality: Option<serde_json::Value>,
    #[serde(default)]
    pub consequence: Option<serde_json::Value>,
    /// Annotation fields this crate does not interpret.
    #[serde(flatten)]
    pub annotations: serde_json::Map<String, serde_json::Value>,
}

/// One gene's rollup within a session.
///
/// `variant_count` is the producer's total and may exceed `variants.len()`
/// until the gene has been expanded with [`VariantResults::load_gene`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneAggregate {
    pub gene_symbol: String,
    #[serde(default)]
    pub variant_count: u64,
    #[serde(default)]
    pub pathogenic_count: u64,
    #[serde(default)]
    pub likely_pathogenic_count: u64,
    #[serde(default)]
    pub vus_count: u64,
    #[serde(default)]
    pub likely_benign_count: u64,
    #[serde(default)]
    pub benign_count: u64,
    #[serde(default)]
    pub variants: Rc<Vec<VariantRecord>>,
    /// Summary fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GeneAggregate {
    /// Whether per-variant detail has been materialized for this gene.
    pub fn is_expanded(&self) -> bool {
        !self.variants.is_empty()
    }
}

/// Session-wide totals announced by the stream's `metadata` record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub total_genes: usize,
    pub total_variants: u64,
    /// Classification summary, passed through as produced.
    pub by_classification: serde_json::Map<String, serde_json::Value>,
}

impl SummaryTotals {
    /// Totals derived from the collection itself, used when the stream never
    /// carried a metadata record.
    pub fn from_genes(genes: &[GeneAggregate]) -> Self {
        Self {
            total_genes: genes.len(),
            total_variants: genes.iter().map(|g| g.variant_count).sum(),
            by_classification: serde_json::Map::new(),
        }
    }
}

/// Failure to obtain data from the results backend.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The request could not be issued or was rejected before a response.
    Request(String),
    /// The backend answered with a non-2xx status.
    Status(u16),
    /// The response carried no body to read.
    MissingBody,
    /// Reading the body failed part way through.
    Stream(String),
    /// A non-streamed body could not be decoded.
    Decode(String),
    /// A session id or gene symbol cannot form a URL path segment.
    InvalidIdentifier(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Request(msg) => write!(f, "Request failed: {}", msg),
            LoadError::Status(code) => write!(f, "Server responded with status {}", code),
            LoadError::MissingBody => write!(f, "Response has no body"),
            LoadError::Stream(msg) => write!(f, "Reading the response stream failed: {}", msg),
            LoadError::Decode(msg) => write!(f, "Could not decode response: {}", msg),
            LoadError::InvalidIdentifier(id) => write!(f, "Invalid identifier: {:?}", id),
        }
    }
}

impl std::error::Error for LoadError {}
