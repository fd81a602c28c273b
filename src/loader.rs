//! Progressive loading of a session's gene summaries and the session-switch
//! protocol.
//!
//! All observable state lives in one [`ResultsState`] behind
//! `Rc<RefCell<_>>`. Each load carries a [`LoadTicket`]; every commit first
//! compares the ticket with the current active session and generation, so a
//! response that arrives after the user moved on is dropped instead of
//! overwriting the newer session.

use crate::cache::{SessionCache, SessionCacheEntry};
use crate::config::ResultsConfig;
use crate::source::{yield_now, VariantSource};
use crate::stats::{StatsMemo, VariantStats};
use crate::stream::{NdjsonParser, Progress, SummaryAccumulator};
use crate::{GeneAggregate, GeneCollection, LoadError, SessionId, SummaryTotals};
use futures::StreamExt;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Loading flag, progress percentage and last error of the active session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadState {
    pub loading: bool,
    /// 0 to 100. Only a completed load or a cache hit reaches 100.
    pub progress: u8,
    pub error: Option<LoadError>,
}

/// Identifies the load a result belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub session_id: SessionId,
    pub generation: u64,
}

/// How a summary load ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded { genes: usize },
    Failed(LoadError),
    /// Another session (or a newer load) became current first; nothing was
    /// committed.
    Superseded,
}

/// Result of running the session-switch protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    /// The requested session was already active.
    Unchanged,
    /// No session is active any more.
    Cleared,
    /// Served from the session cache without a request.
    Restored { genes: usize },
    /// Cache miss; the summary stream was loaded.
    Fetched(LoadOutcome),
}

enum Switch {
    Unchanged,
    Cleared,
    Restored(usize),
    Fetch(SessionId),
}

#[derive(Debug)]
pub(crate) struct ResultsState {
    pub(crate) active_session: Option<SessionId>,
    pub(crate) generation: u64,
    pub(crate) genes: GeneCollection,
    pub(crate) totals: SummaryTotals,
    pub(crate) load: LoadState,
    pub(crate) genes_in_flight: HashMap<String, usize>,
    pub(crate) cache: SessionCache,
    pub(crate) stats: StatsMemo,
}

impl ResultsState {
    fn new(config: &ResultsConfig) -> Self {
        Self {
            active_session: None,
            generation: 0,
            genes: Rc::new(Vec::new()),
            totals: SummaryTotals::default(),
            load: LoadState::default(),
            genes_in_flight: HashMap::new(),
            cache: SessionCache::new(config.max_cached_sessions),
            stats: StatsMemo::new(),
        }
    }

    pub(crate) fn ticket(&self) -> Option<LoadTicket> {
        self.active_session.as_ref().map(|id| LoadTicket {
            session_id: id.clone(),
            generation: self.generation,
        })
    }

    pub(crate) fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.generation == ticket.generation
            && self.active_session.as_deref() == Some(ticket.session_id.as_str())
    }

    fn reset_active(&mut self) {
        self.genes = Rc::new(Vec::new());
        self.totals = SummaryTotals::default();
        self.load = LoadState::default();
        self.genes_in_flight.clear();
    }

    /// Move the outgoing session's completed collection into the cache.
    fn stash_outgoing(&mut self) {
        let Some(session_id) = self.active_session.clone() else {
            return;
        };
        if self.load.loading || self.genes.is_empty() {
            return;
        }
        let entry = SessionCacheEntry::new(self.genes.clone(), self.totals.clone());
        if self.cache.save(&session_id, entry) {
            debug!(
                "Cached session {} ({} genes, {} sessions cached)",
                session_id,
                self.genes.len(),
                self.cache.len()
            );
        }
    }

    /// Replace the collection, keeping variant lists already expanded in the
    /// current one.
    fn replace_genes(&mut self, mut genes: Vec<GeneAggregate>) {
        let expanded: HashMap<&str, &Rc<Vec<_>>> = self
            .genes
            .iter()
            .filter(|g| g.is_expanded())
            .map(|g| (g.gene_symbol.as_str(), &g.variants))
            .collect();
        if !expanded.is_empty() {
            for gene in genes.iter_mut().filter(|g| !g.is_expanded()) {
                if let Some(variants) = expanded.get(gene.gene_symbol.as_str()) {
                    gene.variants = Rc::clone(variants);
                }
            }
        }
        self.genes = Rc::new(genes);
    }
}

/// Point-in-time view of the active session.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsSnapshot {
    pub session_id: Option<SessionId>,
    pub genes: GeneCollection,
    pub totals: SummaryTotals,
    pub load: LoadState,
    pub stats: VariantStats,
}

type Listener = Rc<dyn Fn()>;

#[derive(Default)]
struct Listeners {
    next_id: usize,
    entries: Vec<(usize, Listener)>,
}

/// Controller owning the variant results state of the active session and the
/// cache of recently viewed ones. Cloning shares the same state.
#[derive(Clone)]
pub struct VariantResults {
    pub(crate) state: Rc<RefCell<ResultsState>>,
    pub(crate) source: Rc<dyn VariantSource>,
    config: Rc<ResultsConfig>,
    listeners: Rc<RefCell<Listeners>>,
}

impl PartialEq for VariantResults {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl VariantResults {
    pub fn new(source: impl VariantSource + 'static) -> Self {
        Self::with_config(source, ResultsConfig::default())
    }

    pub fn with_config(source: impl VariantSource + 'static, config: ResultsConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(ResultsState::new(&config))),
            source: Rc::new(source),
            config: Rc::new(config),
            listeners: Rc::new(RefCell::new(Listeners::default())),
        }
    }

    /// Register a callback run after every state change. Returns an id for
    /// [`VariantResults::unsubscribe`].
    pub fn subscribe(&self, listener: Rc<dyn Fn()>) -> usize {
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: usize) {
        self.listeners
            .borrow_mut()
            .entries
            .retain(|(entry_id, _)| *entry_id != id);
    }

    pub(crate) fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.state.borrow().active_session.clone()
    }

    pub fn genes(&self) -> GeneCollection {
        Rc::clone(&self.state.borrow().genes)
    }

    pub fn totals(&self) -> SummaryTotals {
        self.state.borrow().totals.clone()
    }

    pub fn load_state(&self) -> LoadState {
        self.state.borrow().load.clone()
    }

    /// Memoized statistics over the current collection.
    pub fn stats(&self) -> VariantStats {
        let mut state = self.state.borrow_mut();
        let genes = Rc::clone(&state.genes);
        state.stats.get(&genes)
    }

    /// How many times the statistics have been recomputed.
    pub fn stats_computations(&self) -> usize {
        self.state.borrow().stats.computed()
    }

    pub fn snapshot(&self) -> ResultsSnapshot {
        let stats = self.stats();
        let state = self.state.borrow();
        ResultsSnapshot {
            session_id: state.active_session.clone(),
            genes: Rc::clone(&state.genes),
            totals: state.totals.clone(),
            load: state.load.clone(),
            stats,
        }
    }

    /// Cached session ids, least recently used first.
    pub fn cached_sessions(&self) -> Vec<SessionId> {
        self.state.borrow().cache.sessions()
    }

    pub fn clear_cache(&self) {
        self.state.borrow_mut().cache.clear();
        info!("Session cache cleared");
    }

    /// Make `next` the active session.
    ///
    /// The outgoing session's completed collection is cached first. A cached
    /// incoming session is restored at once; otherwise its summaries are
    /// streamed. `None` clears the active state but leaves the cache alone.
    pub async fn activate(&self, next: Option<SessionId>) -> Activation {
        let switch = self.switch_session(next);
        match switch {
            Switch::Unchanged => Activation::Unchanged,
            Switch::Cleared => {
                self.notify();
                Activation::Cleared
            }
            Switch::Restored(genes) => {
                self.notify();
                Activation::Restored { genes }
            }
            Switch::Fetch(session_id) => Activation::Fetched(self.load(&session_id).await),
        }
    }

    fn switch_session(&self, next: Option<SessionId>) -> Switch {
        let mut state = self.state.borrow_mut();
        if state.active_session == next {
            return Switch::Unchanged;
        }

        state.stash_outgoing();
        state.generation += 1;
        state.reset_active();
        state.active_session = next.clone();

        let Some(session_id) = next else {
            debug!("No active session");
            return Switch::Cleared;
        };
        match state.cache.get(&session_id).cloned() {
            Some(entry) => {
                let genes = entry.genes.len();
                info!("Restored session {} from cache ({} genes)", session_id, genes);
                state.genes = entry.genes;
                state.totals = entry.totals;
                state.load.progress = 100;
                Switch::Restored(genes)
            }
            None => Switch::Fetch(session_id),
        }
    }

    /// Stream the gene summaries of `session_id` into the active state.
    ///
    /// `session_id` becomes the active session. Large sessions are committed
    /// while streaming, each time the collection has doubled since the last
    /// commit; smaller ones once at the end.
    pub async fn load(&self, session_id: &str) -> LoadOutcome {
        let ticket = self.begin_load(session_id);
        self.notify();
        info!("Loading variant summaries for session {}", session_id);

        let mut chunks = match self.source.fetch_summaries(session_id).await {
            Ok(chunks) => chunks,
            Err(e) => return self.fail(&ticket, e),
        };

        let mut parser = NdjsonParser::new();
        let mut summaries = SummaryAccumulator::new(self.config.progress_batch_size);
        let mut committed = 0;
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return self.fail(&ticket, e),
            };
            for record in parser.push_chunk(&chunk) {
                if let Some(progress) = summaries.accept(record) {
                    if !self.commit_progress(&ticket, progress, &summaries, &mut committed) {
                        return self.superseded(&ticket);
                    }
                }
            }
            if !self.state.borrow().is_current(&ticket) {
                return self.superseded(&ticket);
            }
            yield_now().await;
        }

        let skipped = parser.skipped();
        parser.finish();
        if skipped > 0 {
            warn!("Skipped {} malformed lines for session {}", skipped, session_id);
        }
        if !summaries.saw_complete() {
            debug!("Stream for session {} ended without a complete marker", session_id);
        }
        self.commit_complete(&ticket, summaries)
    }

    /// Retry the summary load of the active session.
    pub async fn reload(&self) -> Option<LoadOutcome> {
        let session_id = self.active_session()?;
        Some(self.load(&session_id).await)
    }

    fn begin_load(&self, session_id: &str) -> LoadTicket {
        let mut state = self.state.borrow_mut();
        if state.active_session.as_deref() != Some(session_id) {
            state.stash_outgoing();
        }
        state.generation += 1;
        state.reset_active();
        state.active_session = Some(session_id.to_string());
        state.load.loading = true;
        LoadTicket {
            session_id: session_id.to_string(),
            generation: state.generation,
        }
    }

    /// Publish progress. `committed` is the collection size at the last
    /// partial commit; copies grow geometrically so the total copying stays
    /// linear in the session size.
    fn commit_progress(
        &self,
        ticket: &LoadTicket,
        progress: Progress,
        summaries: &SummaryAccumulator,
        committed: &mut usize,
    ) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if !state.is_current(ticket) {
                return false;
            }
            state.load.progress = progress.percent();
            let declared = summaries.metadata().map(|m| m.total_genes).unwrap_or(0);
            let due = progress.loaded >= (*committed * 2).max(1);
            if declared >= self.config.incremental_commit_threshold && due {
                state.replace_genes(summaries.genes().to_vec());
                state.totals = summaries.totals();
                *committed = progress.loaded;
            }
        }
        debug!(
            "Session {}: {}/{} genes streamed",
            ticket.session_id, progress.loaded, progress.total
        );
        self.notify();
        true
    }

    fn commit_complete(&self, ticket: &LoadTicket, summaries: SummaryAccumulator) -> LoadOutcome {
        let gene_count = {
            let mut state = self.state.borrow_mut();
            if !state.is_current(ticket) {
                drop(state);
                return self.superseded(ticket);
            }
            let (genes, totals) = summaries.into_parts();
            let gene_count = genes.len();
            state.replace_genes(genes);
            state.totals = totals;
            state.load = LoadState {
                loading: false,
                progress: 100,
                error: None,
            };
            gene_count
        };
        info!(
            "Loaded {} genes for session {}",
            gene_count, ticket.session_id
        );
        self.notify();
        LoadOutcome::Loaded { genes: gene_count }
    }

    fn fail(&self, ticket: &LoadTicket, error: LoadError) -> LoadOutcome {
        {
            let mut state = self.state.borrow_mut();
            if !state.is_current(ticket) {
                drop(state);
                return self.superseded(ticket);
            }
            state.reset_active();
            state.load.error = Some(error.clone());
        }
        warn!(
            "Loading summaries for session {} failed: {}",
            ticket.session_id, error
        );
        self.notify();
        LoadOutcome::Failed(error)
    }

    fn superseded(&self, ticket: &LoadTicket) -> LoadOutcome {
        debug!(
            "Discarding superseded load of session {} (generation {})",
            ticket.session_id, ticket.generation
        );
        LoadOutcome::Superseded
    }
}
