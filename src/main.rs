use ai_gateway::{telemetry, Config, OutputValidator};
use anyhow::{bail, Context};
use std::io::Read;
use tracing::info;

/// Validate a raw model response read from stdin
///
/// Usage: `ai-gateway <task_type> < response.txt`
fn main() -> anyhow::Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    telemetry::init_tracing(&config.logging);

    let Some(task_type) = std::env::args().nth(1) else {
        bail!("usage: ai-gateway <task_type> < response.txt");
    };

    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("Failed to read model response from stdin")?;

    let validator = OutputValidator::default();
    let result = validator.validate(&task_type, &raw);
    info!(
        "{} response validated: {} ({})",
        task_type, result.confidence_level, result.confidence
    );

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
