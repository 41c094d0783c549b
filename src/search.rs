//! `vbr search`: run one query and print ranked passages.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use vector_bridge_core::models::{Metadata, RetrievalCandidate};
use vector_bridge_core::text::normalize_query;
use vector_bridge_core::BridgeError;

use crate::context::BridgeContext;

const EXCERPT_CHARS: usize = 240;

/// Options for one `vbr search` invocation; `None` falls back to configuration.
#[derive(Debug, Default)]
pub struct SearchOptions {
    pub top_k: Option<usize>,
    pub candidate_k: Option<usize>,
    pub source: Option<String>,
    pub filters: Vec<(String, String)>,
    pub min_score: Option<f32>,
    pub json: bool,
}

#[derive(Serialize)]
struct SearchHit<'a> {
    rank: usize,
    id: &'a str,
    score: f32,
    text: String,
    metadata: &'a Metadata,
}

pub async fn run_search(ctx: &BridgeContext, query: &str, opts: SearchOptions) -> Result<()> {
    // Rejected before the index is opened.
    if normalize_query(query).is_empty() {
        return Err(report(
            BridgeError::DegenerateInput("query text is empty".into()),
            opts.json,
        )?);
    }

    let mut request = ctx.request(query);
    if let Some(k) = opts.top_k {
        request.top_k = k.max(1);
    }
    if let Some(k) = opts.candidate_k {
        request.candidate_k = k.max(1);
    }
    if opts.min_score.is_some() {
        request.min_score = opts.min_score;
    }
    request.source_tag = opts.source;
    request.filters = parse_filters(&opts.filters);

    let results = match ctx.retrieve(&request).await {
        Ok(results) => results,
        Err(e) => return Err(report(e, opts.json)?),
    };

    if opts.json {
        let hits: Vec<SearchHit> = results
            .iter()
            .enumerate()
            .map(|(i, c)| SearchHit {
                rank: i + 1,
                id: &c.id,
                score: c.score,
                text: c.display_text(),
                metadata: &c.metadata,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    let tag_field = &ctx.config().retrieval.source_tag_field;
    for (i, c) in results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / {}",
            i + 1,
            c.score,
            c.metadata_str(tag_field).unwrap_or_else(|| "-".to_string()),
            title_of(c)
        );
        println!("    excerpt: \"{}\"", excerpt(&c.display_text()));
        println!("    id: {}", c.id);
        println!();
    }
    Ok(())
}

/// Print the structured failure for `--json` callers and hand the error back.
fn report(e: BridgeError, json: bool) -> Result<anyhow::Error> {
    if json {
        let failure = serde_json::json!({ "error": e.to_failure() });
        println!("{}", serde_json::to_string_pretty(&failure)?);
    }
    Ok(e.into())
}

/// `key=value` pairs as an equality filter. Values that parse as JSON
/// scalars (numbers, booleans) keep that type; everything else is a string.
fn parse_filters(pairs: &[(String, String)]) -> Option<Metadata> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(k, v)| {
                let value = match serde_json::from_str::<Value>(v) {
                    Ok(parsed @ (Value::Number(_) | Value::Bool(_))) => parsed,
                    _ => Value::String(v.clone()),
                };
                (k.clone(), value)
            })
            .collect(),
    )
}

fn title_of(c: &RetrievalCandidate) -> String {
    let title = c.metadata_str("title").unwrap_or_else(|| "(untitled)".to_string());
    match c.metadata_str("page") {
        Some(page) => format!("{title} (p.{page})"),
        None => title,
    }
}

fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    cut.push('…');
    cut
}
