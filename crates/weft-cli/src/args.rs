use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use weft_core::CancellationPolicy;

#[derive(Debug, Parser)]
#[command(name = "weft")]
#[command(about = "Run the order-product demo workflow on the weft task engine")]
#[command(version)]
pub struct Args {
    #[arg(long, env = "WEFT_LOG", default_value = "info", help = "Log level when RUST_LOG is unset")]
    pub log_level: String,

    #[arg(short, long, help = "Workflow configuration file (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Workflow name, overrides the configuration file")]
    pub name: Option<String>,

    #[arg(long, value_enum, help = "How failures spread, overrides the configuration file")]
    pub policy: Option<Policy>,

    #[arg(
        long,
        env = "WEFT_TIME_SCALE",
        default_value_t = 1.0,
        value_parser = parse_scale,
        help = "Multiplier applied to every task duration and condition delay"
    )]
    pub time_scale: f64,

    #[arg(
        long,
        env = "WEFT_FAILURE_SCALE",
        default_value_t = 1.0,
        value_parser = parse_scale,
        help = "Multiplier applied to every task's failure probability"
    )]
    pub failure_scale: f64,

    #[arg(
        long,
        env = "WEFT_MAX_RETRIES",
        default_value_t = 3,
        help = "Rounds of retrying failed tasks before giving up (0 disables)"
    )]
    pub max_retries: u32,

    #[arg(long, help = "Reject the second photo instead of providing it")]
    pub reject_photo: bool,
}

/// A finite, non-negative multiplier.
fn parse_scale(raw: &str) -> Result<f64, String> {
    let scale: f64 = raw
        .parse()
        .map_err(|err| format!("`{raw}` is not a number: {err}"))?;
    if !scale.is_finite() || scale < 0.0 {
        return Err(format!("`{raw}` must be a finite, non-negative number"));
    }
    Ok(scale)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Policy {
    /// Cancel every dependent of a failed task
    Strict,
    /// Leave external conditions waiting when a prerequisite fails
    ExemptConditions,
}

impl From<Policy> for CancellationPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Strict => CancellationPolicy::Strict,
            Policy::ExemptConditions => CancellationPolicy::ExemptExternalConditions,
        }
    }
}
