use std::sync::Arc;
use std::time::Duration;

use agentwire_channel::{connect_with_config, Channel, ChannelConfig};
use agentwire_frame::CodecRegistry;
use agentwire_message::catalog_registry;
use agentwire_transport::Endpoint;
use clap::{Args, Subcommand};

use crate::exit::{channel_error, frame_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod ping;
pub mod props;
pub mod serve;
pub mod set_prop;
pub mod version;
pub mod watch;

const DEFAULT_ENDPOINT: &str = "tcp://127.0.0.1:25252";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a demo agent that answers the request catalog.
    Serve(ServeArgs),
    /// Ping an agent and report round-trip times.
    Ping(PingArgs),
    /// Print an agent's runtime properties.
    Props(ClientArgs),
    /// Set one runtime property on an agent.
    SetProp(SetPropArgs),
    /// Print broadcasts pushed by an agent.
    Watch(WatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format).await,
        Command::Ping(args) => ping::run(args, format).await,
        Command::Props(args) => props::run(args, format).await,
        Command::SetProp(args) => set_prop::run(args, format).await,
        Command::Watch(args) => watch::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Endpoint to listen on (tcp://host:port or unix:/path).
    #[arg(default_value = DEFAULT_ENDPOINT)]
    pub endpoint: Endpoint,
    /// Push a loader-discovered broadcast at this interval (e.g. 1s, 500ms).
    #[arg(long, value_name = "INTERVAL")]
    pub announce: Option<String>,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Agent endpoint (tcp://host:port or unix:/path).
    #[arg(default_value = DEFAULT_ENDPOINT)]
    pub endpoint: Endpoint,
    /// Reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub client: ClientArgs,
    /// Number of pings to send.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct SetPropArgs {
    /// Agent endpoint (tcp://host:port or unix:/path).
    pub endpoint: Endpoint,
    pub key: String,
    pub value: String,
    /// Reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub client: ClientArgs,
    /// Exit after printing N broadcasts.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn registry() -> CliResult<Arc<CodecRegistry>> {
    catalog_registry()
        .map(Arc::new)
        .map_err(|err| frame_error("catalog registration failed", err))
}

/// Connect to `endpoint` with `timeout` as the reply timeout.
pub(crate) async fn open_channel(endpoint: &Endpoint, timeout: &str) -> CliResult<Channel> {
    let timeout = parse_duration(timeout)?;
    let config = ChannelConfig::default().with_reply_timeout(timeout);
    connect_with_config(endpoint, registry()?, config)
        .await
        .map_err(|err| channel_error("connect failed", err))
}

/// Shortest reply timeout or announce interval accepted on the command line.
pub(crate) const MIN_WAIT: Duration = Duration::from_millis(10);

/// Unit suffixes, longest first so `ms` is not read as minutes.
const UNITS: [(&str, u64); 3] = [("ms", 1), ("s", 1_000), ("m", 60_000)];

/// Parse `500ms`, `5s`, `2m` or a bare number of seconds.
pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let (number, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, millis)| input.strip_suffix(suffix).map(|num| (num, *millis)))
        .unwrap_or((input, 1_000));

    let millis = number
        .parse::<u64>()
        .ok()
        .and_then(|value| value.checked_mul(millis_per_unit))
        .ok_or_else(|| CliError::new(USAGE, format!("invalid duration: {input:?}")))?;

    let wait = Duration::from_millis(millis);
    if wait < MIN_WAIT {
        return Err(CliError::new(
            USAGE,
            format!("duration {input:?} is below the {MIN_WAIT:?} minimum"),
        ));
    }
    Ok(wait)
}
