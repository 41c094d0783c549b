//! `vbr adapter train` and `vbr adapter eval`.
//!
//! Training samples `(text, stored vector)` pairs from the live index, encodes
//! the texts with the local model and fits a ridge projection into the
//! index's space. Evaluation reports how closely projected vectors match the
//! stored ones, either on a fresh sample or on a JSONL file of known records.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use vector_bridge_core::models::TrainingPair;
use vector_bridge_core::train::{
    collect_pairs, collect_pairs_by_ids, evaluate_adapter, fit_adapter,
};

use crate::adapter_store::save_adapter;
use crate::context::BridgeContext;
use crate::embedding::create_local_encoder;

/// Cap on a default evaluation sample.
const DEFAULT_EVAL_SAMPLES: usize = 1000;

/// Sample pairs, fit an adapter and write it to `out` (or `adapter.path`).
pub async fn run_train(ctx: &BridgeContext, out: Option<PathBuf>) -> Result<()> {
    let config = ctx.config();
    let index = ctx.index().await?;
    let descriptor = ctx.descriptor().await?;

    println!(
        "Sampling up to {} pairs from '{}' (dim {})...",
        config.adapter.target_samples, config.index.name, descriptor.target_dim
    );
    let pairs = collect_pairs(index.as_ref(), descriptor, &config.adapter.sampling_params()).await?;
    println!("  collected {} pairs", pairs.len());

    let encoder = create_local_encoder(&config.embedding).await?;
    let fit = config.adapter.fit_params(&config.embedding);
    let adapter = fit_adapter(encoder.as_ref(), &pairs, &fit).await?;

    let path = out.unwrap_or_else(|| config.adapter.path.clone());
    save_adapter(&path, &adapter).await?;

    println!();
    println!("Space adapter written to {}", path.display());
    println!("  small model:  {} ({})", config.embedding.small_model, adapter.small_dim());
    println!("  target dim:   {}", adapter.target_dim());
    println!("  pairs:        {}", pairs.len());
    println!("  ridge alpha:  {}", fit.ridge_alpha);
    Ok(())
}

/// Report alignment of the configured adapter.
///
/// With `pairs_file`, evaluates on those records' stored vectors; otherwise
/// on a fresh index sample of `samples` pairs drawn with a different seed
/// from training.
pub async fn run_eval(
    ctx: &BridgeContext,
    pairs_file: Option<PathBuf>,
    samples: Option<usize>,
) -> Result<()> {
    let config = ctx.config();
    let index = ctx.index().await?;
    let descriptor = ctx.descriptor().await?;
    let adapter = ctx.adapter().await?;

    let pairs: Vec<TrainingPair> = match &pairs_file {
        Some(path) => {
            let records = read_records(path)?;
            collect_pairs_by_ids(
                index.as_ref(),
                descriptor,
                &records,
                config.adapter.fetch_batch,
            )
            .await?
        }
        None => {
            let mut params = config.adapter.sampling_params();
            params.target_samples =
                samples.unwrap_or_else(|| params.target_samples.min(DEFAULT_EVAL_SAMPLES));
            params.seed = params.seed.wrapping_add(1);
            collect_pairs(index.as_ref(), descriptor, &params).await?
        }
    };

    let encoder = create_local_encoder(&config.embedding).await?;
    let fit = config.adapter.fit_params(&config.embedding);
    let report = evaluate_adapter(encoder.as_ref(), &adapter, &pairs, &fit).await?;

    println!("Adapter alignment ({})", config.adapter.path.display());
    println!("  pairs:   {}", report.n);
    println!("  mean:    {:.4}", report.mean);
    println!("  median:  {:.4}", report.median);
    println!("  p10:     {:.4}", report.p10);
    println!("  p90:     {:.4}", report.p90);
    Ok(())
}

#[derive(Deserialize)]
struct Record {
    id: String,
    text: String,
}

/// Read `{"id": .., "text": ..}` lines; blank lines are ignored.
fn read_records(path: &Path) -> Result<Vec<(String, String)>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pairs file: {}", path.display()))?;
    let mut records = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), lineno + 1))?;
        records.push((record.id, record.text));
    }
    if records.is_empty() {
        bail!("No records in {}", path.display());
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "a", "text": "first"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": "b", "text": "second", "extra": 1}}"#).unwrap();

        let records = read_records(file.path()).unwrap();
        assert_eq!(
            records,
            vec![
                ("a".to_string(), "first".to_string()),
                ("b".to_string(), "second".to_string())
            ]
        );
    }

    #[test]
    fn test_read_records_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id": "a", "text": "ok"}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        let err = read_records(file.path()).unwrap_err();
        assert!(format!("{err}").contains(":2:"));
    }

    #[test]
    fn test_read_records_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(read_records(file.path()).is_err());
    }
}
