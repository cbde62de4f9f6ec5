use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use actor_inspect::config::{
    DEFAULT_AGENT_NAME, DEFAULT_EXTENSION, DEFAULT_RESULTS_DIR, DEFAULT_ROUND_LABEL, DEFAULT_RUN_ID,
};
use actor_inspect::logging::setup_logging;
use actor_inspect::{
    DeviceChoice, InputShape, InspectError, InspectorConfig, ModelInspector, OutputFormat,
};

#[derive(Parser, Debug)]
#[command(name = "actor_inspect", version, about)]
struct Cli {
    /// Directory the results tree is resolved against (defaults to the current directory)
    #[arg(long)]
    working_dir: Option<PathBuf>,

    /// Results root below the working directory
    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    results_dir: String,

    /// Training round label
    #[arg(long, default_value = DEFAULT_ROUND_LABEL)]
    round: String,

    /// Agent / behavior name
    #[arg(long, default_value = DEFAULT_AGENT_NAME)]
    agent: String,

    /// Run identifier (checkpoint file stem)
    #[arg(long, default_value = DEFAULT_RUN_ID)]
    run_id: String,

    /// Checkpoint extension: pt/pth/ts for TorchScript, safetensors for actor checkpoints
    #[arg(long, default_value = DEFAULT_EXTENSION)]
    extension: String,

    /// Explicit checkpoint file, bypasses the results layout
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Input shape assumed by the summary, as C,H,W
    #[arg(long, default_value = "3,84,84")]
    input_shape: InputShape,

    /// Device the model is loaded onto
    #[arg(long, value_enum, default_value = "cpu")]
    device: DeviceChoice,

    /// Summary format on stdout
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Write logs to rotating files in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> InspectorConfig {
        let mut config = match self.working_dir {
            Some(dir) => InspectorConfig::in_dir(dir),
            None => InspectorConfig::default(),
        };
        config.results_dir = self.results_dir;
        config.round_label = self.round;
        config.agent_name = self.agent;
        config.run_id = self.run_id;
        config.extension = self.extension;
        config.checkpoint = self.checkpoint;
        config.input_shape = self.input_shape;
        config.device = self.device;
        config.output = self.output;
        config
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logger = match setup_logging(cli.log_dir.as_deref()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to start logging: {e}");
            None
        }
    };

    let config = cli.into_config();
    let output = config.output;

    match ModelInspector::new(config).run().and_then(|summary| summary.render(output)) {
        Ok(rendered) => {
            print!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            // stderr always gets the error, file logging only duplicates warnings there
            eprintln!("Error: {err}");
            if logger.is_some() {
                log::error!("❌ {err}");
                if let InspectError::CheckpointNotFound { available, .. } = &err {
                    for candidate in available {
                        log::info!("   available: {}", candidate.display());
                    }
                }
            }
            ExitCode::FAILURE
        }
    }
}
