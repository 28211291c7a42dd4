mod config;
mod daemon;

use std::process::ExitCode;
use std::str::FromStr;

use structopt::StructOpt;

#[derive(StructOpt)]
enum Opt {
    /// Run the streaming engine against a loopback transport.
    Run(RunArgs),
}

#[derive(StructOpt)]
struct RunArgs {
    /// Sample rate in Hz.
    #[structopt(long, default_value = "48000")]
    sample_rate: u32,

    /// Audio channel count.
    #[structopt(long, default_value = "8")]
    channels: usize,

    /// Device wire protocol: "amdtp" or "motu".
    #[structopt(long, default_value = "amdtp")]
    protocol: ProtocolFamily,

    /// How long to run before stopping, in seconds.
    #[structopt(long, default_value = "5")]
    duration_secs: u64,
}

#[derive(Debug, Copy, Clone)]
pub enum ProtocolFamily {
    Amdtp,
    Motu,
}

impl FromStr for ProtocolFamily {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amdtp" => Ok(ProtocolFamily::Amdtp),
            "motu" => Ok(ProtocolFamily::Motu),
            _ => Err(UnknownProtocol),
        }
    }
}

impl std::fmt::Display for ProtocolFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolFamily::Amdtp => write!(f, "amdtp"),
            ProtocolFamily::Motu => write!(f, "motu"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown protocol, expected \"amdtp\" or \"motu\"")]
pub struct UnknownProtocol;

fn main() -> ExitCode {
    env_logger::init();

    let opt = Opt::from_args();

    let result = match opt {
        Opt::Run(args) => run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: RunArgs) -> Result<(), RunError> {
    let cfg = config::load()?;
    cfg.common.validate().map_err(RunError::InvalidConfig)?;

    let opt = daemon::RunOpt {
        sample_rate: args.sample_rate,
        channels: args.channels,
        protocol: args.protocol,
        duration_secs: args.duration_secs,
    };

    daemon::run(opt, cfg)?;
    Ok(())
}

#[derive(Debug, derive_more::From)]
enum RunError {
    Config(ffado_streaming_types::error::ConfigError),
    InvalidConfig(&'static str),
    Daemon(daemon::DaemonError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Config(e) => write!(f, "{e}"),
            RunError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            RunError::Daemon(e) => write!(f, "{e}"),
        }
    }
}
