use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use rig_provider::{context, dispatch};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rig-provider")]
#[command(about = "Simulated device provider speaking the framed stdio protocol", long_about = None)]
struct Cli {
    /// Path to the provider YAML configuration
    #[arg(long)]
    config: PathBuf,

    /// Address of an external simulation server (physics mode only)
    #[arg(long)]
    sim_server: Option<String>,

    /// Chaos testing: crash the process after this many seconds
    #[arg(long)]
    crash_after: Option<f64>,
}

fn main() -> ExitCode {
    // stdout carries protocol frames; all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let context = match context::startup(&cli.config, cli.sim_server.as_deref()) {
        Ok(context) => context,
        Err(err) => {
            error!("FATAL: failed to initialize: {err}");
            return ExitCode::from(1);
        }
    };

    if let Some(seconds) = cli.crash_after {
        if seconds > 0.0 {
            info!("CHAOS MODE: will crash after {seconds} seconds");
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_secs_f64(seconds));
                eprintln!("rig-provider: CRASHING NOW (exit 42)");
                std::process::exit(42);
            });
        }
    }

    info!("starting (transport=stdio+uint32_le)");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let code = dispatch::run_loop(&context, &mut stdin.lock(), &mut stdout.lock());
    ExitCode::from(code)
}
