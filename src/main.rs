/// Evaluate one DGD iteration for 3D photoacoustic reconstruction.
///
/// Usage: dgd-pat <checkpoint> <output> <input>
///
/// Meant to be called once per outer iteration by the toolbox that computes
/// the physics gradient and writes it next to the current estimate.
use anyhow::{bail, Context};
use dgd_pat::{runner::run_iteration, DgdConfig};

/// Split the command line into `(checkpoint, output, input)`
fn parse_args(args: &[String]) -> anyhow::Result<(&str, &str, &str)> {
    let [checkpoint, output, input] = args else {
        bail!(
            "expected 3 arguments, got {}\nusage: dgd-pat <checkpoint> <output> <input>",
            args.len()
        );
    };
    Ok((checkpoint.as_str(), output.as_str(), input.as_str()))
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (checkpoint, output, input) = parse_args(&args)?;

    let config = DgdConfig::default();
    log::info!("=== DGD iteration ===");
    log::info!("  - Checkpoint: {}", checkpoint);
    log::info!("  - Input: {}", input);
    log::info!("  - Output: {}", output);

    let summary = run_iteration(checkpoint, output, input, &config)
        .with_context(|| format!("DGD iteration on {} failed", input))?;

    log::info!(
        "Updated {} volume(s), result shape {:?}, step length {}",
        summary.num_examples,
        summary.output_shape,
        summary.step_length
    );

    Ok(())
}
