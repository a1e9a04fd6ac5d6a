use std::{path::PathBuf, process};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};

use deezerdl::{
    arl::Arl,
    config::Config,
    download,
    error::{Error, Result},
    gateway::Gateway,
    protocol::media::Format,
    track::TrackId,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// Ensure that this file is kept secure and not shared publicly, as it
    /// contains the arl that grants access to your Deezer account.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("config.toml"), global = true)]
    config: String,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, conflicts_with = "verbose", global = true)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Save the arl session cookie to the configuration file
    ///
    /// Copy the value of the `arl` cookie from a browser that is logged in
    /// to deezer.com.
    Login {
        /// The arl cookie value (192 characters)
        arl: String,
    },

    /// Download and decrypt a track or a whole album
    Download {
        #[command(subcommand)]
        target: Target,

        /// Audio format: FLAC, MP3_320 or MP3_256
        ///
        /// [default: `default_format` from the configuration file]
        #[arg(short, long, global = true)]
        format: Option<Format>,

        /// Directory to write the files to
        #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath, default_value = ".", global = true)]
        output: PathBuf,
    },
}

#[derive(Clone, Debug, Subcommand)]
enum Target {
    /// Download a single track
    Track {
        /// Track ID, as in `deezer.com/track/<ID>`
        id: TrackId,
    },

    /// Download all tracks of an album into a directory named after it
    Album {
        /// Album ID, as in `deezer.com/album/<ID>`
        id: u64,
    },
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Validates the arl against the gateway and saves it.
async fn login(config_file: &str, arl: &str) -> Result<()> {
    let arl: Arl = arl.parse()?;

    let mut config = Config::load(config_file)?;
    config.arl = Some(arl);

    let mut gateway = Gateway::new(&config)?;
    gateway.refresh().await?;

    config.save(config_file)?;
    info!("saved arl to {config_file}");

    Ok(())
}

/// Runs the command of `args`.
///
/// # Errors
///
/// Returns an error when the command failed. Failures are not retried.
async fn run(args: Args) -> Result<()> {
    let Args {
        config: config_file,
        command,
        ..
    } = args;

    match command {
        Command::Login { arl } => login(&config_file, &arl).await,

        Command::Download {
            target,
            format,
            output,
        } => {
            let config = Config::load(&config_file)?;
            if config.arl.is_none() {
                return Err(Error::unauthenticated(format!(
                    "no arl in {config_file}; run `login` first"
                )));
            }

            let format = format.unwrap_or(config.default_format);
            let mut gateway = Gateway::new(&config)?;

            match target {
                Target::Track { id } => {
                    download::track(&mut gateway, id, format, &output).await?;
                }
                Target::Album { id } => {
                    let paths = download::album(&mut gateway, id, format, &output).await?;
                    info!("downloaded {} tracks", paths.len());
                }
            }

            Ok(())
        }
    }
}

/// Main entry point of the application.
///
/// Initializes the logger facade, parses the command line arguments, and
/// runs the command until it completes or is interrupted.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    // Dropping the command on interrupt removes partial downloads.
    let result = tokio::select! {
        biased;

        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            Err(Error::cancelled("interrupted by user"))
        }

        result = run(args) => result,
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}
