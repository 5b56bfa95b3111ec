//! Command-line entry point for the all-gather GEMM tuning sweep.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use agtune_common::Topology;
use agtune_harness::{Destination, HarnessConfig, RunOptions, ensure_single_process, run_local};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(Parser)]
#[command(name = "agtune")]
#[command(about = "Autotune and validate the fused all-gather GEMM kernel")]
#[command(long_about = r#"
Sweeps every configuration of the tuning space across a tensor-parallel
group, checks each kernel result against a reference product and records
the fastest kernel variant per shape.

With --output-dir the generated source and the timing log are written as
<name>.cu and <name>.prof.log; otherwise both are printed to stdout.
"#)]
#[command(version)]
struct Cli {
    /// Directory for generated artifacts; must already exist
    #[arg(long, alias = "output_dir", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Number of ranks in the group (default: WORLD_SIZE)
    #[arg(long, value_name = "N")]
    world_size: Option<usize>,

    /// Ranks per node (default: LOCAL_WORLD_SIZE, or the world size when
    /// --world-size is given)
    #[arg(long, value_name = "N")]
    local_world_size: Option<usize>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_default_config: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref(), cli.log_format);

    if cli.print_default_config {
        let text = HarnessConfig::default_toml().context("Failed to serialize configuration")?;
        println!("{text}");
        return Ok(());
    }

    let destination = Destination::from_option(cli.output_dir.clone())?;
    let config = match &cli.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => HarnessConfig::from_env().context("Failed to load configuration")?,
    };

    let env = Topology::from_env().context("Failed to read group topology from environment")?;
    ensure_single_process(&env)?;
    let world_size = cli.world_size.unwrap_or(env.world_size);
    let local_world_size = match (cli.local_world_size, cli.world_size) {
        (Some(local), _) => local,
        (None, Some(world)) => world,
        (None, None) => env.local_world_size,
    };

    let options = RunOptions {
        config,
        destination,
        arch: agtune_kernels::get_arch(),
        world_size,
        local_world_size,
    };
    info!(
        name = %options.run_name(),
        configs = options.config.space.len(),
        "starting tuning run"
    );

    let stdout = Mutex::new(io::stdout());
    let outcomes = run_local(&options, &stdout).context("Tuning sweep failed")?;
    if let Some(artifacts) = outcomes.iter().find_map(|o| o.artifacts.as_ref()) {
        info!(code = %artifacts.code.display(), log = %artifacts.log.display(), "done");
    }
    Ok(())
}

fn setup_logging(level_override: Option<&str>, format: LogFormat) {
    let filter = match level_override {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => {
            subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).init();
        }
        LogFormat::Compact => {
            subscriber.compact().init();
        }
        LogFormat::Pretty => {
            subscriber.pretty().init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn underscore_alias_accepted() {
        let cli =
            Cli::try_parse_from(["agtune", "--output_dir", "/tmp", "--world-size", "4"]).unwrap();
        assert_eq!(cli.output_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(cli.world_size, Some(4));
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }
}
