//! Lazy expansion of one gene into its full variant list.

use crate::loader::VariantResults;
use crate::LoadError;
use log::{debug, info, warn};
use std::fmt;
use std::rc::Rc;

/// Why a gene could not be expanded. Never affects the rest of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneLoadError {
    /// The session is not the active one.
    SessionNotActive(String),
    /// No gene with this symbol is in the active collection.
    UnknownGene(String),
    /// The request for the variant list failed.
    Fetch(LoadError),
    /// The session was switched or reloaded while the request was in flight.
    Superseded,
}

impl fmt::Display for GeneLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneLoadError::SessionNotActive(id) => write!(f, "Session {} is not active", id),
            GeneLoadError::UnknownGene(symbol) => write!(f, "Gene {} is not in the loaded collection", symbol),
            GeneLoadError::Fetch(e) => write!(f, "Loading gene variants failed: {}", e),
            GeneLoadError::Superseded => write!(f, "Session changed before the gene variants arrived"),
        }
    }
}

impl std::error::Error for GeneLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GeneLoadError::Fetch(e) => Some(e),
            _ => None,
        }
    }
}

impl VariantResults {
    /// Fetch the full variant list of `gene_symbol` and store it on that gene.
    ///
    /// Only the matching gene changes; repeated calls replace the list rather
    /// than append to it. On failure the gene keeps its previous list and the
    /// session's load state is left untouched. Returns the number of variants
    /// stored.
    pub async fn load_gene(&self, session_id: &str, gene_symbol: &str) -> Result<usize, GeneLoadError> {
        let ticket = {
            let mut state = self.state.borrow_mut();
            if state.active_session.as_deref() != Some(session_id) {
                return Err(GeneLoadError::SessionNotActive(session_id.to_string()));
            }
            if !state.genes.iter().any(|g| g.gene_symbol == gene_symbol) {
                return Err(GeneLoadError::UnknownGene(gene_symbol.to_string()));
            }
            *state
                .genes_in_flight
                .entry(gene_symbol.to_string())
                .or_insert(0) += 1;
            state
                .ticket()
                .ok_or_else(|| GeneLoadError::SessionNotActive(session_id.to_string()))?
        };
        self.notify();

        let fetched = self
            .source
            .fetch_gene_variants(session_id, gene_symbol)
            .await;

        let result = {
            let mut state = self.state.borrow_mut();
            if state.is_current(&ticket) {
                let settled = match state.genes_in_flight.get_mut(gene_symbol) {
                    Some(pending) => {
                        *pending -= 1;
                        *pending == 0
                    }
                    None => false,
                };
                if settled {
                    state.genes_in_flight.remove(gene_symbol);
                }
                match fetched {
                    Ok(variants) => {
                        let genes = Rc::make_mut(&mut state.genes);
                        match genes.iter_mut().find(|g| g.gene_symbol == gene_symbol) {
                            Some(gene) => {
                                let count = variants.len();
                                gene.variants = Rc::new(variants);
                                Ok(count)
                            }
                            None => Err(GeneLoadError::UnknownGene(gene_symbol.to_string())),
                        }
                    }
                    Err(e) => Err(GeneLoadError::Fetch(e)),
                }
            } else {
                Err(GeneLoadError::Superseded)
            }
        };

        match &result {
            Ok(count) => info!("Loaded {} variants for gene {}", count, gene_symbol),
            Err(GeneLoadError::Superseded) => {
                debug!("Discarding variants of {} for inactive session {}", gene_symbol, session_id)
            }
            Err(e) => warn!("Could not expand gene {}: {}", gene_symbol, e),
        }
        self.notify();
        result
    }

    /// Whether a variant request for `gene_symbol` is outstanding.
    pub fn is_gene_loading(&self, gene_symbol: &str) -> bool {
        self.state.borrow().genes_in_flight.contains_key(gene_symbol)
    }
}
