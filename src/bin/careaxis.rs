#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use careaxis_harness::config::JudgeSettings;
use careaxis_harness::gateway::GeneratorRegistry;
use careaxis_harness::pipeline::{resolve_judge, Orchestrator};
use careaxis_harness::telemetry;

#[derive(Parser)]
#[command(
    name = "careaxis",
    version,
    about = "Collect PEG opinions from several LLMs and place them on the autonomy/care axis"
)]
struct Cli {
    /// Run name; loads configs/run_<name>.yaml
    #[arg(long)]
    run: String,
    /// Project root containing configs/, cases/ and outputs/
    #[arg(long, env = "CAREAXIS_ROOT", default_value = ".")]
    root: PathBuf,
    /// Models processed concurrently
    #[arg(long, default_value_t = 1)]
    parallel: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    telemetry::init_tracing(telemetry::json_logs_requested(), Level::INFO);

    let judge = resolve_judge(JudgeSettings::from_env());
    let orchestrator = Orchestrator::new(cli.root, GeneratorRegistry::standard(), judge)
        .with_parallelism(cli.parallel);

    let report = orchestrator.run(&cli.run).await?;
    println!("{}", report.results_csv.display());
    Ok(())
}
