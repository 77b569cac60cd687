use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use env_logger::{Env, Target};
use log::error;

use crate::engine::FetchEngine;
use crate::engine::models::{BuildChannel, FetchConfig, Platform, RequestedVersion};
use crate::engine::state::Outcome;
use crate::env::Credentials;
use crate::error::{FetchError, Result};
use crate::ui::{ConsoleProgress, ProgressSink, SilentProgress};

mod engine;
mod env;
mod error;
mod networking;
mod storage;
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "factorio-fetch",
    author,
    about = "Download DRM-free Factorio archives from the official site",
    long_about = "Download DRM-free Factorio archives from the official site.\n\n\
        Set your Factorio username and token (see Token on https://factorio.com/profile) \
        as FACTORIO_USERNAME and FACTORIO_TOKEN. They may also be provided in a .env file."
)]
struct Cli {
    /// Build of the game to download. 'expansion' includes Space Age.
    #[arg(short, long, value_enum, default_value_t = BuildChannel::Expansion)]
    build: BuildChannel,

    /// Version to download: a triple such as 2.0.10, or 'latest'.
    #[arg(short = 'v', long = "version", default_value = "latest")]
    version: RequestedVersion,

    /// Platform to download. May be given multiple times. Defaults to all platforms.
    #[arg(short, long = "distro", value_enum)]
    distros: Vec<Platform>,

    /// Directory to save the archives into. Defaults to the current directory.
    #[arg(short, long)]
    outdir: Option<PathBuf>,

    /// Directory to stream downloads into before they are moved to --outdir.
    #[arg(short, long)]
    tempdir: Option<PathBuf>,

    /// Do not draw progress bars.
    #[arg(short, long)]
    quiet: bool,

    /// Print the tool version and exit.
    #[arg(short = 'V', long)]
    tool_version: bool,
}

impl Cli {
    fn into_config(self) -> Result<FetchConfig> {
        let output_dir = match self.outdir {
            Some(dir) => dir,
            None => std::env::current_dir()
                .map_err(|e| FetchError::io("unable to determine the current directory", e))?,
        };
        let mut config = FetchConfig::new(output_dir);
        config.build = self.build;
        config.requested = self.version;
        if !self.distros.is_empty() {
            config.platforms = self.distros;
        }
        if let Some(work_dir) = self.tempdir {
            config.work_dir = work_dir;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let console = (!cli.quiet && !cli.tool_version).then(|| Arc::new(ConsoleProgress::new()));
    init_logging(console.as_deref());

    if cli.tool_version {
        println!("factorio-fetch {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let progress: Arc<dyn ProgressSink> = match console {
        Some(console) => console,
        None => Arc::new(SilentProgress),
    };
    match run(cli, progress).await {
        Ok(outcome) => {
            match &outcome {
                Outcome::Anomaly { .. } => eprintln!("{}", outcome.message()),
                _ => println!("{}", outcome.message()),
            }
            outcome.exit_code()
        }
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// Log lines go above the progress bars when there are any, straight to stderr otherwise.
fn init_logging(console: Option<&ConsoleProgress>) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(console) = console {
        builder.target(Target::Pipe(Box::new(console.log_writer())));
    }
    builder.init();
}

async fn run(cli: Cli, progress: Arc<dyn ProgressSink>) -> Result<Outcome> {
    let config = cli.into_config()?;
    let credentials = Credentials::from_env()?;
    FetchEngine::new(config, credentials, progress).run().await
}

fn report(err: &FetchError) {
    error!("{err}");
    let mut source = err.source();
    while let Some(cause) = source {
        error!("  caused by: {cause}");
        source = cause.source();
    }
}
