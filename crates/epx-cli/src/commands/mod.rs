//! Command handler modules for epx-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod replay;

use anyhow::{Context, Result};
use epx_config::{
    load_layered_yaml, report_unused_keys, ConfigMode, LoadedConfig, ProctorSettings,
    UnusedKeyPolicy,
};
use epx_integrity::AiDetection;
use epx_submission::{avg_ai_likelihood, final_score as compute_final_score, round_half_up};
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered config (defaults when `paths` is empty) and read settings
/// for `mode`. Unused keys warn, or fail under `strict`.
pub fn load_settings(
    paths: &[String],
    mode: ConfigMode,
    strict: bool,
) -> Result<(LoadedConfig, ProctorSettings)> {
    let loaded = if paths.is_empty() {
        LoadedConfig::defaults()?
    } else {
        let refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
        load_layered_yaml(&refs)?
    };

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(mode, &loaded.config_json, policy)?;
    if !report.is_clean() {
        warn!(mode = mode.as_str(), unused = ?report.unused_leaf_pointers, "unused config keys");
    }

    let settings =
        ProctorSettings::from_config_json(&loaded.config_json).context("invalid settings")?;
    Ok((loaded, settings))
}

// ---------------------------------------------------------------------------
// final-score
// ---------------------------------------------------------------------------

pub fn final_score(score: i64, likelihoods: &[f64]) {
    let analyses: Vec<AiDetection> = likelihoods
        .iter()
        .map(|&ai_likelihood| AiDetection {
            ai_likelihood,
            ..AiDetection::default()
        })
        .collect();
    let avg = avg_ai_likelihood(analyses.iter());
    println!("avg_ai_likelihood={}", round_half_up(avg));
    println!("final_score={}", compute_final_score(score, avg));
}
