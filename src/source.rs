//! Transport for the results backend.
//!
//! [`VariantSource`] is the seam between the loaders and the network. The
//! browser implementation, [`HttpVariantSource`], issues Fetch API requests and
//! reads the summary body through a `ReadableStream` reader so records can be
//! parsed while the download is still running.

use crate::config::DEFAULT_API_BASE;
use crate::{LoadError, SessionId, VariantRecord};
use futures::future::LocalBoxFuture;
use futures::stream::{self, LocalBoxStream, StreamExt};
use futures::FutureExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{ReadableStreamDefaultReader, Response};

/// Raw body chunks of a summary response, in arrival order.
pub type ChunkStream = LocalBoxStream<'static, Result<Vec<u8>, LoadError>>;

// Anything outside the RFC 3986 unreserved set.
static RESERVED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._~-]").expect("reserved character pattern is valid"));

/// Percent-encode an opaque identifier as one URL path segment.
///
/// Every character outside the unreserved set is written as `%XX` per UTF-8
/// byte. Identifiers that cannot be a segment at all (empty, `.`, `..`) are
/// rejected.
pub fn encode_path_segment(id: &str) -> Result<String, LoadError> {
    if id.is_empty() || id == "." || id == ".." {
        return Err(LoadError::InvalidIdentifier(id.to_string()));
    }
    let encoded = RESERVED_REGEX.replace_all(id, |caps: &regex::Captures| {
        caps[0].bytes().map(|b| format!("%{:02X}", b)).collect::<String>()
    });
    Ok(encoded.into_owned())
}

/// Producer of summary streams and per-gene variant lists.
pub trait VariantSource {
    /// Open the NDJSON summary stream of a session.
    fn fetch_summaries(&self, session_id: &str) -> LocalBoxFuture<'static, Result<ChunkStream, LoadError>>;

    /// Fetch every variant of one gene.
    fn fetch_gene_variants(
        &self,
        session_id: &str,
        gene_symbol: &str,
    ) -> LocalBoxFuture<'static, Result<Vec<VariantRecord>, LoadError>>;
}

impl<S: VariantSource + ?Sized> VariantSource for Rc<S> {
    fn fetch_summaries(&self, session_id: &str) -> LocalBoxFuture<'static, Result<ChunkStream, LoadError>> {
        (**self).fetch_summaries(session_id)
    }

    fn fetch_gene_variants(
        &self,
        session_id: &str,
        gene_symbol: &str,
    ) -> LocalBoxFuture<'static, Result<Vec<VariantRecord>, LoadError>> {
        (**self).fetch_gene_variants(session_id, gene_symbol)
    }
}

/// Body of the by-gene endpoint.
#[derive(Debug, Deserialize)]
pub struct GeneVariantsResponse {
    #[serde(default)]
    pub variants: Vec<VariantRecord>,
}

/// Fetch API backed source rooted at `base_url`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpVariantSource {
    base_url: String,
}

impl HttpVariantSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn summaries_url(&self, session_id: &str) -> Result<String, LoadError> {
        Ok(format!(
            "{}/sessions/{}/variants/summaries",
            self.base_url,
            encode_path_segment(session_id)?
        ))
    }

    pub fn gene_url(&self, session_id: &str, gene_symbol: &str) -> Result<String, LoadError> {
        Ok(format!(
            "{}/sessions/{}/variants/by-gene/{}",
            self.base_url,
            encode_path_segment(session_id)?,
            encode_path_segment(gene_symbol)?
        ))
    }
}

impl Default for HttpVariantSource {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl VariantSource for HttpVariantSource {
    fn fetch_summaries(&self, session_id: &str) -> LocalBoxFuture<'static, Result<ChunkStream, LoadError>> {
        let url = self.summaries_url(session_id);
        async move {
            let response = fetch_ok(&url?).await?;
            let body = response.body().ok_or(LoadError::MissingBody)?;
            let reader: ReadableStreamDefaultReader = body
                .get_reader()
                .dyn_into()
                .map_err(|_| LoadError::Stream("body reader is not a default reader".to_string()))?;
            Ok(body_chunks(reader))
        }
        .boxed_local()
    }

    fn fetch_gene_variants(
        &self,
        session_id: &str,
        gene_symbol: &str,
    ) -> LocalBoxFuture<'static, Result<Vec<VariantRecord>, LoadError>> {
        let url = self.gene_url(session_id, gene_symbol);
        async move {
            let response = fetch_ok(&url?).await?;
            let text_promise = response
                .text()
                .map_err(|e| LoadError::Decode(js_error_message(&e)))?;
            let text = JsFuture::from(text_promise)
                .await
                .map_err(|e| LoadError::Stream(js_error_message(&e)))?
                .as_string()
                .ok_or_else(|| LoadError::Decode("body is not text".to_string()))?;
            let parsed: GeneVariantsResponse =
                serde_json::from_str(&text).map_err(|e| LoadError::Decode(e.to_string()))?;
            Ok(parsed.variants)
        }
        .boxed_local()
    }
}

/// Source serving prepared responses from memory, delivered in fixed-size
/// chunks. Every request is recorded and can be read back with `requests()`.
#[derive(Debug, Default)]
pub struct MemoryVariantSource {
    summaries: HashMap<SessionId, Result<String, LoadError>>,
    genes: HashMap<(SessionId, String), Result<Vec<VariantRecord>, LoadError>>,
    chunk_size: Option<usize>,
    requests: RefCell<Vec<String>>,
}

impl MemoryVariantSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summaries(mut self, session_id: &str, ndjson: impl Into<String>) -> Self {
        self.summaries.insert(session_id.to_string(), Ok(ndjson.into()));
        self
    }

    pub fn with_summaries_error(mut self, session_id: &str, error: LoadError) -> Self {
        self.summaries.insert(session_id.to_string(), Err(error));
        self
    }

    pub fn with_gene(mut self, session_id: &str, gene_symbol: &str, variants: Vec<VariantRecord>) -> Self {
        self.genes
            .insert((session_id.to_string(), gene_symbol.to_string()), Ok(variants));
        self
    }

    pub fn with_gene_error(mut self, session_id: &str, gene_symbol: &str, error: LoadError) -> Self {
        self.genes
            .insert((session_id.to_string(), gene_symbol.to_string()), Err(error));
        self
    }

    /// Split summary bodies into chunks of `size` bytes instead of one chunk.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Requests seen so far, as `summaries/<session>` or `by-gene/<session>/<gene>`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl VariantSource for MemoryVariantSource {
    fn fetch_summaries(&self, session_id: &str) -> LocalBoxFuture<'static, Result<ChunkStream, LoadError>> {
        self.requests
            .borrow_mut()
            .push(format!("summaries/{}", session_id));
        let body = self
            .summaries
            .get(session_id)
            .cloned()
            .unwrap_or(Err(LoadError::Status(404)));
        let chunk_size = self.chunk_size;
        async move {
            let body = body?.into_bytes();
            let chunks: Vec<Result<Vec<u8>, LoadError>> = match chunk_size {
                Some(size) => body.chunks(size).map(|c| Ok(c.to_vec())).collect(),
                None => vec![Ok(body)],
            };
            Ok(stream::iter(chunks).boxed_local())
        }
        .boxed_local()
    }

    fn fetch_gene_variants(
        &self,
        session_id: &str,
        gene_symbol: &str,
    ) -> LocalBoxFuture<'static, Result<Vec<VariantRecord>, LoadError>> {
        self.requests
            .borrow_mut()
            .push(format!("by-gene/{}/{}", session_id, gene_symbol));
        let variants = self
            .genes
            .get(&(session_id.to_string(), gene_symbol.to_string()))
            .cloned()
            .unwrap_or(Err(LoadError::Status(404)));
        futures::future::ready(variants).boxed_local()
    }
}

/// Issue a GET and require a 2xx status.
async fn fetch_ok(url: &str) -> Result<Response, LoadError> {
    let window = gloo_utils::window();
    let value = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|e| LoadError::Request(js_error_message(&e)))?;
    let response: Response = value
        .dyn_into()
        .map_err(|_| LoadError::Request("fetch did not resolve to a Response".to_string()))?;
    if !response.ok() {
        return Err(LoadError::Status(response.status()));
    }
    Ok(response)
}

/// Adapt a body reader into a stream of byte chunks. The stream ends after the
/// reader reports `done` or after the first read error.
fn body_chunks(reader: ReadableStreamDefaultReader) -> ChunkStream {
    stream::unfold(Some(reader), |reader| async move {
        let Some(reader) = reader else {
            return None;
        };
        match read_chunk(&reader).await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed_local()
}

async fn read_chunk(reader: &ReadableStreamDefaultReader) -> Result<Option<Vec<u8>>, LoadError> {
    let result = JsFuture::from(reader.read())
        .await
        .map_err(|e| LoadError::Stream(js_error_message(&e)))?;
    let done = js_sys::Reflect::get(&result, &JsValue::from_str("done"))
        .map_err(|e| LoadError::Stream(js_error_message(&e)))?
        .as_bool()
        .unwrap_or(false);
    if done {
        return Ok(None);
    }
    let value = js_sys::Reflect::get(&result, &JsValue::from_str("value"))
        .map_err(|e| LoadError::Stream(js_error_message(&e)))?;
    Ok(Some(js_sys::Uint8Array::new(&value).to_vec()))
}

fn js_error_message(value: &JsValue) -> String {
    value
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.message()))
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{:?}", value))
}

/// Hand control back to the browser event loop between chunks.
pub(crate) async fn yield_now() {
    #[cfg(target_arch = "wasm32")]
    gloo_timers::future::TimeoutFuture::new(0).await;
}
