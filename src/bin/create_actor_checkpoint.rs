//! Writes a freshly initialised actor checkpoint into the results layout, so
//! the inspector can be run without a finished training round.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tch::Device;

use actor_inspect::config::{DEFAULT_AGENT_NAME, DEFAULT_RESULTS_DIR, DEFAULT_ROUND_LABEL, DEFAULT_RUN_ID};
use actor_inspect::logging::setup_logging;
use actor_inspect::neural::{save_actor, ActorArchitecture, ActorNetwork, ActorSettings, VisualEncoder};
use actor_inspect::{CheckpointPath, InputShape, InspectorConfig};

#[derive(Parser, Debug)]
#[command(name = "create_actor_checkpoint")]
struct Args {
    #[arg(long)]
    working_dir: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    results_dir: String,

    #[arg(long, default_value = DEFAULT_ROUND_LABEL)]
    round: String,

    #[arg(long, default_value = DEFAULT_AGENT_NAME)]
    agent: String,

    #[arg(long, default_value = DEFAULT_RUN_ID)]
    run_id: String,

    /// Visual encoder preset
    #[arg(long, value_enum, default_value = "simple")]
    encoder: VisualEncoder,

    #[arg(long, default_value_t = 256)]
    hidden_units: i64,

    /// Dense layers after the encoder
    #[arg(long, default_value_t = 2)]
    num_layers: usize,

    /// Continuous actions (FoodCollector: forward, lateral, rotation)
    #[arg(long, default_value_t = 3)]
    action_size: i64,

    /// Observation the network is sized for, as C,H,W
    #[arg(long, default_value = "3,84,84")]
    input_shape: InputShape,

    #[arg(long, default_value_t = 42)]
    seed: i64,
}

fn run(args: Args) -> actor_inspect::Result<PathBuf> {
    let mut config = match args.working_dir {
        Some(dir) => InspectorConfig::in_dir(dir),
        None => InspectorConfig::default(),
    };
    config.results_dir = args.results_dir;
    config.round_label = args.round;
    config.agent_name = args.agent;
    config = config.with_run(args.run_id, "safetensors");
    let checkpoint = CheckpointPath::from_config(&config);

    let settings = ActorSettings {
        encoder: args.encoder,
        hidden_units: args.hidden_units,
        num_layers: args.num_layers,
        action_size: args.action_size,
    };
    tch::manual_seed(args.seed);
    let architecture = ActorArchitecture::visual(config.agent_name.clone(), args.input_shape, settings)?;
    let actor = ActorNetwork::new(architecture, Device::Cpu)?;
    log::info!(
        "🧠 {:?} actor for {} with {} parameters",
        settings.encoder,
        args.input_shape,
        actor.architecture().parameter_count()
    );

    if let Some(parent) = checkpoint.as_path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    save_actor(&actor, checkpoint.as_path())?;
    Ok(checkpoint.as_path().to_path_buf())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _logger = setup_logging(None).ok();

    match run(args) {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
