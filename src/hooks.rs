//! Yew binding for [`VariantResults`].
//!
//! [`use_variant_results`] re-renders the component on every state change and
//! runs the session switch whenever the requested session id changes.

use crate::loader::{LoadState, VariantResults};
use crate::stats::VariantStats;
use crate::{GeneCollection, SessionId, SummaryTotals};
use std::rc::Rc;
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

/// State of the active session as seen by a component, plus the actions it
/// can trigger.
#[derive(Clone, PartialEq)]
pub struct VariantResultsView {
    /// The session the data belongs to.
    pub session_id: Option<SessionId>,
    /// Gene summaries, with variant lists for expanded genes.
    pub genes: GeneCollection,
    pub totals: SummaryTotals,
    pub load: LoadState,
    /// Memoized counts over `genes`.
    pub stats: VariantStats,
    /// Expand one gene of the active session by symbol.
    pub load_gene: Callback<String>,
    /// Retry the summary load of the active session.
    pub reload: Callback<()>,
}

/// Bind a component to `results` and make `session_id` the active session.
///
/// The component re-renders on every state change of the controller. Each
/// time `session_id` changes the session-switch protocol runs on the browser
/// event loop.
#[hook]
pub fn use_variant_results(results: &VariantResults, session_id: Option<SessionId>) -> VariantResultsView {
    let force_update = use_force_update();

    // Re-render on every commit.
    {
        let results = results.clone();
        use_effect_with(results.clone(), move |_| {
            let id = results.subscribe(Rc::new(move || force_update.force_update()));
            move || results.unsubscribe(id)
        });
    }

    {
        let results = results.clone();
        use_effect_with(session_id, move |session_id| {
            let session_id = session_id.clone();
            spawn_local(async move {
                results.activate(session_id).await;
            });
            || ()
        });
    }

    let load_gene = {
        let results = results.clone();
        Callback::from(move |gene_symbol: String| {
            let results = results.clone();
            spawn_local(async move {
                if let Some(session_id) = results.active_session() {
                    // Failures are logged and leave the gene collapsed.
                    let _ = results.load_gene(&session_id, &gene_symbol).await;
                }
            });
        })
    };

    let reload = {
        let results = results.clone();
        Callback::from(move |_: ()| {
            let results = results.clone();
            spawn_local(async move {
                results.reload().await;
            });
        })
    };

    let snapshot = results.snapshot();
    VariantResultsView {
        session_id: snapshot.session_id,
        genes: snapshot.genes,
        totals: snapshot.totals,
        load: snapshot.load,
        stats: snapshot.stats,
        load_gene,
        reload,
    }
}
