//! Index diagnostics: `vbr stats` and `vbr inspect`.
//!
//! `inspect` answers "why does training find no text": it probes the index
//! with a random unit vector and prints what metadata the matches carry.

use std::collections::HashSet;

use anyhow::Result;
use rand::Rng;
use serde_json::Value;

use vector_bridge_core::index::{IndexQuery, IndexStats};
use vector_bridge_core::models::Metadata;
use vector_bridge_core::vector::l2_normalize;

use crate::context::BridgeContext;

const PREVIEW_CHARS: usize = 100;
/// Namespace some deployments use for the default partition.
const DEFAULT_NAMESPACE_ALIAS: &str = "__default__";

/// Print index dimension and per-namespace vector counts.
pub async fn run_stats(ctx: &BridgeContext) -> Result<()> {
    let index = ctx.index().await?;
    let stats = index.describe_stats().await?;

    println!("Vector Bridge: Index Stats");
    println!("==========================");
    println!();
    println!("  Index:       {}", ctx.config().index.name);
    println!(
        "  Dimension:   {}",
        stats
            .dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| format!("unreported (using {})", ctx.config().index.dimension))
    );
    println!("  Vectors:     {}", stats.total_vector_count);
    print_namespaces(&stats);
    println!();
    Ok(())
}

fn print_namespaces(stats: &IndexStats) {
    if stats.namespaces.is_empty() {
        return;
    }
    println!();
    println!("  By namespace:");
    println!("  {:<32} {:>10}", "NAMESPACE", "VECTORS");
    println!("  {}", "-".repeat(44));
    for (ns, count) in &stats.namespaces {
        let label = if ns.is_empty() { "(default)" } else { ns.as_str() };
        println!("  {:<32} {:>10}", label, count);
    }
}

/// Probe the index and print the metadata layout of the matches.
pub async fn run_inspect(ctx: &BridgeContext, top_k: usize) -> Result<()> {
    let index = ctx.index().await?;
    let stats = index.describe_stats().await?;
    print_namespaces(&stats);
    println!();

    let dim = ctx.descriptor().await?.target_dim;
    let mut probe: Vec<f32> = {
        let mut rng = rand::rng();
        (0..dim).map(|_| rng.random_range(-1.0f32..1.0)).collect()
    };
    l2_normalize(&mut probe);

    let configured = ctx.config().index.namespace();
    let mut attempts: Vec<Option<String>> = vec![configured.clone()];
    if configured.is_some() {
        attempts.push(None);
    }
    attempts.push(Some(DEFAULT_NAMESPACE_ALIAS.to_string()));

    for namespace in attempts {
        let label = namespace.clone().unwrap_or_else(|| "(default)".to_string());
        let matches = index
            .query(&IndexQuery {
                vector: probe.clone(),
                top_k: top_k.max(1),
                include_values: false,
                include_metadata: true,
                filter: None,
                namespace,
            })
            .await?;
        if matches.is_empty() {
            println!("Namespace {label}: no matches");
            continue;
        }

        println!("Namespace {label}: {} matches", matches.len());
        let mut seen = HashSet::new();
        for m in matches.iter().filter(|m| seen.insert(m.id.clone())) {
            println!();
            println!("  id: {}  score: {:.4}", m.id, m.score);
            for line in describe_metadata(&m.metadata) {
                println!("    {line}");
            }
        }
        return Ok(());
    }

    println!("No matches in any namespace; is the index empty?");
    Ok(())
}

/// One line per metadata key: string lengths with a preview, numeric values,
/// and the type of anything else.
pub fn describe_metadata(meta: &Metadata) -> Vec<String> {
    if meta.is_empty() {
        return vec!["(no metadata)".to_string()];
    }
    let mut keys: Vec<&String> = meta.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| match &meta[key] {
            Value::String(s) => {
                let preview: String = s.chars().take(PREVIEW_CHARS).collect();
                format!(
                    "{key}: str len={} preview={:?}",
                    s.chars().count(),
                    preview.replace('\n', " ")
                )
            }
            Value::Number(n) => format!("{key}: {n}"),
            Value::Bool(b) => format!("{key}: {b}"),
            Value::Array(a) => format!("{key}: list len={}", a.len()),
            Value::Object(_) => format!("{key}: object"),
            Value::Null => format!("{key}: null"),
        })
        .collect()
}
