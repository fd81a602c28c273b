//! Incremental NDJSON parsing of the gene summary stream.
//!
//! Chunks arrive at arbitrary boundaries. [`NdjsonParser`] keeps the trailing,
//! not yet newline-terminated fragment between chunks and parses every complete
//! line on its own, so one corrupt line among millions only costs that line.
//! [`SummaryAccumulator`] folds the parsed records into a gene collection and
//! reports progress in fixed-size batches.

use crate::{GeneAggregate, SummaryTotals};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Leading record announcing session-wide totals.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SummaryMetadata {
    #[serde(default)]
    pub total_genes: usize,
    #[serde(default)]
    pub total_variants: u64,
    /// Classification summary. Only an object is kept; any other shape is
    /// read as empty.
    #[serde(default)]
    pub impact_by_acmg: Value,
}

impl From<SummaryMetadata> for SummaryTotals {
    fn from(meta: SummaryMetadata) -> Self {
        Self {
            total_genes: meta.total_genes,
            total_variants: meta.total_variants,
            by_classification: match meta.impact_by_acmg {
                Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        }
    }
}

/// One line of the summary stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRecord {
    Metadata(SummaryMetadata),
    Gene { data: GeneAggregate },
    Complete {
        #[serde(default)]
        total_streamed: Option<u64>,
    },
}

/// Parse one line. Returns `None` for blank or malformed lines.
pub fn parse_line(line: &[u8]) -> Option<StreamRecord> {
    let text = std::str::from_utf8(line).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

/// Splits a byte stream into lines and parses each one as a [`StreamRecord`].
#[derive(Debug, Default)]
pub struct NdjsonParser {
    buffer: Vec<u8>,
    parsed: usize,
    skipped: usize,
}

impl NdjsonParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the records of every line it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StreamRecord> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for line in self.buffer[..last_newline].split(|&b| b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match parse_line(line) {
                Some(record) => {
                    self.parsed += 1;
                    records.push(record);
                }
                None => {
                    self.skipped += 1;
                    debug!(
                        "Skipping malformed stream line ({} bytes, {} skipped so far)",
                        line.len(),
                        self.skipped
                    );
                }
            }
        }
        self.buffer.drain(..=last_newline);
        records
    }

    /// Number of lines parsed into records so far.
    pub fn parsed(&self) -> usize {
        self.parsed
    }

    /// Number of non-blank lines that failed to parse so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// End of stream. Any residual fragment is discarded; returns its length.
    pub fn finish(self) -> usize {
        let residual = self.buffer.len();
        if residual > 0 && !self.buffer.iter().all(u8::is_ascii_whitespace) {
            debug!("Discarding {} unterminated bytes at end of stream", residual);
        }
        residual
    }
}

/// Loaded/total pair reported every progress batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: usize,
    pub total: usize,
}

impl Progress {
    /// Percentage in `0..=99`; 100 is reserved for a completed load.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.loaded * 100 / self.total).min(99)) as u8
    }
}

/// Folds stream records, in arrival order, into a gene collection.
#[derive(Debug)]
pub struct SummaryAccumulator {
    batch_size: usize,
    metadata: Option<SummaryMetadata>,
    genes: Vec<GeneAggregate>,
    index: HashMap<String, usize>,
    gene_records: usize,
    completed: Option<Option<u64>>,
}

impl SummaryAccumulator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            metadata: None,
            genes: Vec::new(),
            index: HashMap::new(),
            gene_records: 0,
            completed: None,
        }
    }

    /// Take one record. Returns a progress report when it closes a batch.
    pub fn accept(&mut self, record: StreamRecord) -> Option<Progress> {
        match record {
            StreamRecord::Metadata(meta) => {
                if self.metadata.is_some() {
                    warn!("Stream carried a second metadata record; replacing the first");
                } else if !self.genes.is_empty() {
                    debug!("Metadata arrived after {} gene records", self.genes.len());
                }
                self.metadata = Some(meta);
                None
            }
            StreamRecord::Gene { data } => {
                self.gene_records += 1;
                match self.index.get(&data.gene_symbol) {
                    Some(&pos) => {
                        warn!("Duplicate gene record for {}; keeping the latest", data.gene_symbol);
                        self.genes[pos] = data;
                    }
                    None => {
                        self.index.insert(data.gene_symbol.clone(), self.genes.len());
                        self.genes.push(data);
                    }
                }
                if self.gene_records % self.batch_size == 0 {
                    Some(self.progress())
                } else {
                    None
                }
            }
            StreamRecord::Complete { total_streamed } => {
                if let Some(streamed) = total_streamed {
                    if streamed as usize != self.gene_records {
                        debug!(
                            "Producer reports {} streamed records, received {}",
                            streamed, self.gene_records
                        );
                    }
                }
                self.completed = Some(total_streamed);
                None
            }
        }
    }

    pub fn progress(&self) -> Progress {
        let declared = self.metadata.as_ref().map(|m| m.total_genes).unwrap_or(0);
        Progress {
            loaded: self.genes.len(),
            total: declared.max(self.genes.len()),
        }
    }

    pub fn metadata(&self) -> Option<&SummaryMetadata> {
        self.metadata.as_ref()
    }

    pub fn genes(&self) -> &[GeneAggregate] {
        &self.genes
    }

    /// Whether the producer sent its `complete` marker.
    pub fn saw_complete(&self) -> bool {
        self.completed.is_some()
    }

    /// Totals from the metadata record, or derived from the genes if none came.
    pub fn totals(&self) -> SummaryTotals {
        match &self.metadata {
            Some(meta) => meta.clone().into(),
            None => SummaryTotals::from_genes(&self.genes),
        }
    }

    pub fn into_parts(self) -> (Vec<GeneAggregate>, SummaryTotals) {
        let totals = self.totals();
        (self.genes, totals)
    }
}
