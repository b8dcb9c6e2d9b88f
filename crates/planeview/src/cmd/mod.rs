use std::future::Future;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use planeview_transport::DEFAULT_HOST;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod free_port;
pub mod request;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve planes of an image cube to display peers.
    Serve(ServeArgs),
    /// Send one request as a display and print the reply.
    Request(RequestArgs),
    /// Print an unused TCP port.
    FreePort(FreePortArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => block_on(serve::run(args, format)),
        Command::Request(args) => block_on(request::run(args, format)),
        Command::FreePort(args) => free_port::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

fn block_on<F>(future: F) -> CliResult<i32>
where
    F: Future<Output = CliResult<i32>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))?;
    runtime.block_on(future)
}

#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Host to bind or connect to.
    #[arg(long, env = "PLANEVIEW_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
    /// TCP port. 0 binds an ephemeral port.
    #[arg(long, env = "PLANEVIEW_PORT", default_value_t = 0)]
    pub port: u16,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Image cube to serve.
    pub image: PathBuf,
    /// Mask cube restricting statistics.
    #[arg(long, value_name = "PATH")]
    pub mask: Option<PathBuf>,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Pre-shared session token displays must present.
    #[arg(long, env = "PLANEVIEW_SESSION")]
    pub session: Option<String>,
    /// Exit after the first display disconnects.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Correlation id of the request (e.g. shape, plane, statistics).
    pub id: String,
    /// JSON message to send.
    #[arg(long, default_value = "{}")]
    pub json: String,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
    /// Session token. Defaults to a fresh token for this invocation.
    #[arg(long, env = "PLANEVIEW_SESSION")]
    pub session: Option<String>,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct FreePortArgs {
    /// Host to probe.
    #[arg(long, env = "PLANEVIEW_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
