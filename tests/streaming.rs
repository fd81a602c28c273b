use futures::executor::block_on;
use std::collections::HashSet;
use variant_results::stats::{compute_stats, search_genes};
use variant_results::{
    Activation, LoadOutcome, MemoryVariantSource, ResultsConfig, VariantRecord, VariantResults,
    VariantStats,
};

fn gene_line(symbol: &str, pathogenic: u64, lp: u64, vus: u64) -> String {
    format!(
        r#"{{"type":"gene","data":{{"gene_symbol":"{}","variant_count":{},"pathogenic_count":{},"likely_pathogenic_count":{},"vus_count":{},"max_impact":"HIGH"}}}}"#,
        symbol,
        pathogenic + lp + vus,
        pathogenic,
        lp,
        vus
    )
}

fn variant(position: u64) -> VariantRecord {
    serde_json::from_str(&format!(
        r#"{{"chrom":"13","pos":{},"ref":"T","alt":"C"}}"#,
        position
    ))
    .unwrap()
}

fn load(body: String, chunk_size: usize) -> VariantResults {
    let source = MemoryVariantSource::new()
        .with_summaries("case-1", body)
        .chunk_size(chunk_size);
    let results = VariantResults::new(source);
    block_on(results.activate(Some("case-1".to_string())));
    results
}

#[test]
fn every_gene_record_lands_exactly_once() {
    let total = 1_234;
    let mut body = format!(r#"{{"type":"metadata","total_genes":{},"total_variants":0}}"#, total);
    body.push('\n');
    for i in 0..total {
        body.push_str(&gene_line(&format!("GENE{}", i), (i % 3) as u64, 0, 1));
        body.push('\n');
    }

    for chunk_size in [1, 13, 4096] {
        let results = load(body.clone(), chunk_size);
        let genes = results.genes();
        assert_eq!(genes.len(), total);
        let unique: HashSet<&str> = genes.iter().map(|g| g.gene_symbol.as_str()).collect();
        assert_eq!(unique.len(), total);
        assert_eq!(genes[0].gene_symbol, "GENE0");
        assert_eq!(genes[total - 1].gene_symbol, format!("GENE{}", total - 1));
    }
}

#[test]
fn malformed_line_between_genes_is_skipped() {
    let body = [
        r#"{"type":"metadata","total_genes":2,"total_variants":5}"#.to_string(),
        gene_line("BRCA1", 1, 0, 1),
        r#"{"type":"gene","data":{"gene_symbol":"#.to_string(),
        gene_line("TP53", 2, 1, 0),
        String::new(),
    ]
    .join("\n");

    let results = load(body, 16);
    let genes = results.genes();
    assert_eq!(genes.len(), 2);
    assert_eq!(genes[0].gene_symbol, "BRCA1");
    assert_eq!(genes[0].pathogenic_count, 1);
    assert_eq!(genes[0].vus_count, 1);
    assert_eq!(genes[1].gene_symbol, "TP53");
    assert_eq!(genes[1].likely_pathogenic_count, 1);
    assert_eq!(genes[1].extra.get("max_impact").and_then(|v| v.as_str()), Some("HIGH"));
}

#[test]
fn brca1_and_tp53_scenario() {
    let body = [
        r#"{"type":"metadata","total_genes":2,"total_variants":3,"impact_by_acmg":{"Pathogenic":3}}"#.to_string(),
        gene_line("BRCA1", 1, 0, 0),
        gene_line("TP53", 2, 0, 0),
        r#"{"type":"complete","total_streamed":2}"#.to_string(),
        String::new(),
    ]
    .join("\n");

    let results = load(body, 64);
    let stats = results.stats();
    assert_eq!(stats.pathogenic_count, 3);
    assert_eq!(stats.gene_count, 2);
    assert_eq!(results.totals().total_genes, 2);
    assert_eq!(stats, compute_stats(&results.genes()));
}

#[test]
fn nested_classification_summary_keeps_declared_totals() {
    let body = [
        r#"{"type":"metadata","total_genes":2,"total_variants":40,"impact_by_acmg":{"Pathogenic":{"HIGH":3},"VUS":null}}"#.to_string(),
        gene_line("BRCA1", 1, 0, 0),
        gene_line("TP53", 2, 0, 0),
        String::new(),
    ]
    .join("\n");

    let results = load(body, 16);
    let totals = results.totals();
    assert_eq!(totals.total_genes, 2);
    assert_eq!(totals.total_variants, 40);
    assert_eq!(totals.by_classification["Pathogenic"]["HIGH"], 3);
    assert_eq!(results.genes().len(), 2);
}

#[test]
fn unterminated_final_record_is_dropped() {
    let body = [
        r#"{"type":"metadata","total_genes":2,"total_variants":2}"#.to_string(),
        gene_line("BRCA1", 1, 0, 0),
        gene_line("TP53", 1, 0, 0),
    ]
    .join("\n");

    let results = load(body, 32);
    let symbols: Vec<String> = results.genes().iter().map(|g| g.gene_symbol.clone()).collect();
    assert_eq!(symbols, vec!["BRCA1"]);
    assert_eq!(results.totals().total_genes, 2);
}

#[test]
fn empty_stream_completes_with_zero_stats() {
    let results = load(String::new(), 8);
    assert_eq!(results.genes().len(), 0);
    assert_eq!(results.stats(), VariantStats::default());
    assert_eq!(results.load_state().progress, 100);
    assert!(results.cached_sessions().is_empty());
}

#[test]
fn stats_are_computed_once_per_collection() {
    let body = format!("{}\n{}\n", gene_line("BRCA1", 1, 0, 0), gene_line("BRCA2", 0, 1, 0));
    let source = MemoryVariantSource::new()
        .with_summaries("case-1", body)
        .with_gene("case-1", "BRCA2", vec![variant(7)]);
    let results = VariantResults::new(source);
    block_on(results.activate(Some("case-1".to_string())));

    let before = results.stats_computations();
    let first = results.stats();
    let second = results.stats();
    let _ = results.snapshot();
    assert_eq!(first, second);
    assert_eq!(results.stats_computations(), before + 1);
    assert_eq!(search_genes(&results.genes(), "brca").len(), 2);

    block_on(results.load_gene("case-1", "BRCA2")).unwrap();
    assert_eq!(results.stats().expanded_genes, 1);
    assert_eq!(results.stats_computations(), before + 2);
}

#[test]
fn missing_session_is_a_network_error() {
    let results = VariantResults::with_config(MemoryVariantSource::new(), ResultsConfig::default());
    match block_on(results.activate(Some("nope".to_string()))) {
        Activation::Fetched(LoadOutcome::Failed(e)) => {
            assert_eq!(e.to_string(), "Server responded with status 404")
        }
        other => panic!("unexpected activation: {:?}", other),
    }
    assert!(results.genes().is_empty());
}
