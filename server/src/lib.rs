use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use postings::persist::{load_snapshot, IndexPaths, Snapshot};
use postings::search::{search_documents, Mode, QueryTerm, TfIdf};
use postings::{term_frequency, PostingsList};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: Mode,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: u32,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phrases: Option<usize>,
    pub title: String,
    pub url: Option<String>,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct PostingsResponse {
    pub term: String,
    pub docs_count: usize,
    pub positions_count: u64,
    pub postings: Vec<PostingEntry>,
}

#[derive(Serialize)]
pub struct PostingEntry {
    pub doc_id: u32,
    pub tf: u32,
    pub positions: Vec<u32>,
}

/// Index generation currently served. Swapped wholesale on reload; readers
/// keep the `Arc` they cloned for the rest of their request.
pub type SharedSnapshot = Arc<RwLock<Arc<Snapshot>>>;

#[derive(Clone)]
pub struct AppState {
    pub index_paths_root: PathBuf,
    pub snapshot: SharedSnapshot,
    pub admin_token: Option<String>,
}

impl AppState {
    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }
}

pub fn build_app(index_dir: String) -> Result<Router> {
    // Load index generation at startup
    let index_paths = IndexPaths::new(&index_dir);
    let snapshot = load_snapshot(&index_paths)?;
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let app_state = AppState {
        index_paths_root: PathBuf::from(&index_dir),
        snapshot: Arc::new(RwLock::new(Arc::new(snapshot))),
        admin_token,
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/lookup/:external_id", get(lookup_handler))
        .route("/postings/:term", get(postings_handler))
        .route("/index/reload", post(index_reload))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let snapshot = state.current();

    // Group query terms with every offset they take in the query
    let mut offsets: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for (term, pos) in snapshot.meta.analyzer.analyze_query(&params.q) {
        offsets.entry(term).or_default().push(pos);
    }
    if offsets.is_empty() {
        let elapsed = start.elapsed();
        return Json(SearchResponse { query: params.q, mode: params.mode, took_s: elapsed.as_secs_f64(), total_hits: 0, results: vec![] });
    }

    let empty = PostingsList::empty();
    let terms: Vec<QueryTerm<'_>> = offsets
        .into_iter()
        .map(|(term, offs)| {
            let list = snapshot.index.postings(&term).map(|l| l.as_ref()).unwrap_or(&empty);
            QueryTerm::new(list, offs)
        })
        .collect();
    let hits = search_documents(&terms, snapshot.index.num_docs(), params.mode, &TfIdf);
    let total_hits = hits.len();
    let k = params.k.max(1).min(100);

    // Build results with snippets
    let raw_terms: Vec<String> = params
        .q
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();
    let mut results: Vec<SearchHit> = Vec::new();
    for hit in hits.into_iter().take(k) {
        if let Some(meta) = snapshot.docs.get(&hit.document_id) {
            let snippet = meta
                .text_path
                .as_ref()
                .and_then(|rel| snippet_from_file(&state.index_paths_root.join(rel), &raw_terms));
            results.push(SearchHit {
                doc_id: hit.document_id,
                score: hit.score,
                phrases: hit.phrases,
                title: meta.title.clone(),
                url: meta.url.clone(),
                snippet,
            });
        }
    }

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits, took_s = elapsed.as_secs_f64(), "search served");
    Json(SearchResponse { query: params.q, mode: params.mode, took_s: elapsed.as_secs_f64(), total_hits, results })
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u32>) -> Result<Json<serde_json::Value>, StatusCode> {
    let snapshot = state.current();
    doc_json(&state, &snapshot, doc_id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Same as `/doc/:doc_id`, addressed by the id the document had in the input files.
pub async fn lookup_handler(State(state): State<AppState>, Path(external_id): Path<String>) -> Result<Json<serde_json::Value>, StatusCode> {
    let snapshot = state.current();
    let doc_id = *snapshot.doc_id_map.get(&external_id).ok_or(StatusCode::NOT_FOUND)?;
    doc_json(&state, &snapshot, doc_id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

fn doc_json(state: &AppState, snapshot: &Snapshot, doc_id: u32) -> Option<serde_json::Value> {
    let meta = snapshot.docs.get(&doc_id)?;
    let mut obj = serde_json::json!({
        "doc_id": doc_id,
        "external_id": meta.external_id,
        "title": meta.title,
        "url": meta.url,
    });
    if let Some(rel) = &meta.text_path {
        if let Ok(text) = std::fs::read_to_string(state.index_paths_root.join(rel)) {
            obj["text"] = serde_json::Value::String(text);
        }
    }
    Some(obj)
}

/// Raw postings of one already-analyzed term, for ranking and debugging.
pub async fn postings_handler(State(state): State<AppState>, Path(term): Path<String>) -> Result<Json<PostingsResponse>, StatusCode> {
    let snapshot = state.current();
    let list = snapshot.index.postings(&term).ok_or(StatusCode::NOT_FOUND)?;
    let postings = list
        .iter()
        .map(|p| PostingEntry { doc_id: p.document_id(), tf: term_frequency(p), positions: p.positions().to_vec() })
        .collect();
    Ok(Json(PostingsResponse { docs_count: list.len(), positions_count: list.positions_count(), term, postings }))
}

fn snippet_from_file(path: &PathBuf, raw_terms: &Vec<String>) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    if text.is_empty() { return None; }
    // find first match (case-insensitive) of any raw term
    let mut first_idx: Option<usize> = None;
    for term in raw_terms {
        if term.trim().is_empty() { continue; }
        if let Some(pos) = find_case_insensitive(&text, term) { first_idx = Some(pos); break; }
    }
    let snippet = match first_idx {
        Some(idx) => {
            let start = floor_char_boundary(&text, idx.saturating_sub(100));
            let end = floor_char_boundary(&text, (idx + 200).min(text.len()));
            text[start..end].to_string()
        }
        None => text.chars().take(200).collect(),
    };
    Some(highlight_terms(&snippet, raw_terms))
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) { idx -= 1; }
    idx
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.to_lowercase();
    let n = needle.to_lowercase();
    // lowercasing can shift byte offsets; only trust the index when lengths agree
    h.find(&n).filter(|_| h.len() == haystack.len())
}

fn highlight_terms(snippet: &str, terms: &Vec<String>) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else { continue };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

// --- Admin endpoints ---

/// Loads the snapshot on disk again and swaps it in as the served generation.
async fn index_reload(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let root = state.index_paths_root.clone();
    let loaded = tokio::task::spawn_blocking(move || load_snapshot(&IndexPaths::new(root)))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    let (num_docs, num_terms) = (loaded.index.num_docs(), loaded.index.num_terms());
    *state.snapshot.write() = Arc::new(loaded);
    tracing::info!(num_docs, num_terms, "index generation swapped");
    Ok(Json(serde_json::json!({ "num_docs": num_docs, "num_terms": num_terms })))
}

fn authorize(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
