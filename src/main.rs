use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use floatlink::alerts::ConsoleAlertSink;
use floatlink::config::AlertConfig;
use floatlink::connection::ConnectionController;
use floatlink::errors::FloatlinkError;
use floatlink::link::{load_ride_log, LinkEvent, RideLogRecord, SimulatedLink};
use floatlink::persistence::{JsonlStateStore, LocalDataStore};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ride a built-in synthetic board and print the alerts it produces
    Demo {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replay a recorded ride log (JSON lines of raw notifications)
    Replay {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn ride_log_path(output: Option<PathBuf>) -> Result<PathBuf, FloatlinkError> {
    match output {
        Some(path) => Ok(path),
        None => {
            let dir = dirs::data_dir()
                .ok_or(FloatlinkError::NoConfigDir)?
                .join("floatlink");
            std::fs::create_dir_all(&dir)
                .map_err(|e| FloatlinkError::ConfigIOError { source: e })?;
            Ok(dir.join("ride.jsonl"))
        }
    }
}

fn run_session(script: Vec<RideLogRecord>, output: Option<PathBuf>) -> Result<(), FloatlinkError> {
    let config = AlertConfig::from_local_file().unwrap_or_default();
    // leave headroom for connection setup and trailing alerts
    let session_ms = script.last().map(|record| record.offset_ms).unwrap_or(0) + 2000;

    let (link_tx, link_rx) = mpsc::channel::<LinkEvent>();
    let link = SimulatedLink::new(link_tx, script);

    let store = JsonlStateStore::create(ride_log_path(output)?)?;
    let mut controller = ConnectionController::new(
        Box::new(link),
        link_rx,
        config,
        Arc::new(ConsoleAlertSink),
        Box::new(store),
        LocalDataStore::in_data_dir()?,
    );

    let handle = controller.handle();
    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        ctrlc_handle.stop();
    })
    .expect("Could not set Ctrl-C handler");

    let session = thread::spawn(move || controller.run());
    thread::sleep(Duration::from_millis(session_ms));
    handle.stop();
    session
        .join()
        .unwrap_or(Err(FloatlinkError::DeviceLinkError {
            description: "session thread panicked".to_string(),
        }))
}

fn main() {
    colog::init();

    let cli = Args::parse();
    let result = match cli.command {
        Commands::Demo { output } => run_session(SimulatedLink::synthetic_ride(), output),
        Commands::Replay { input, output } => {
            if !input.exists() {
                Err(FloatlinkError::InvalidRideLog {
                    path: format!("{:?}", input),
                })
            } else {
                load_ride_log(&input).and_then(|script| run_session(script, output))
            }
        }
    };
    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
