//! CSV export of the gene summary table.

use crate::GeneAggregate;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct GeneSummaryRow<'a> {
    gene_symbol: &'a str,
    variant_count: u64,
    pathogenic_count: u64,
    likely_pathogenic_count: u64,
    vus_count: u64,
    likely_benign_count: u64,
    benign_count: u64,
    loaded_variants: usize,
}

impl<'a> From<&'a GeneAggregate> for GeneSummaryRow<'a> {
    fn from(gene: &'a GeneAggregate) -> Self {
        Self {
            gene_symbol: &gene.gene_symbol,
            variant_count: gene.variant_count,
            pathogenic_count: gene.pathogenic_count,
            likely_pathogenic_count: gene.likely_pathogenic_count,
            vus_count: gene.vus_count,
            likely_benign_count: gene.likely_benign_count,
            benign_count: gene.benign_count,
            loaded_variants: gene.variants.len(),
        }
    }
}

/// Write one header row and one row per gene.
pub fn write_gene_summary_csv<W: Write>(genes: &[GeneAggregate], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for gene in genes {
        wtr.serialize(GeneSummaryRow::from(gene))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Render the gene summary table as a CSV string, e.g. for a download link.
pub fn gene_summary_csv_string(genes: &[GeneAggregate]) -> Result<String, String> {
    let mut buf = Vec::new();
    write_gene_summary_csv(genes, &mut buf).map_err(|e| format!("Failed to write CSV: {}", e))?;
    String::from_utf8(buf).map_err(|e| format!("CSV output is not UTF-8: {}", e))
}
