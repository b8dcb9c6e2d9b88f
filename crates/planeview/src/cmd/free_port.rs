use planeview_transport::free_port;

use crate::cmd::FreePortArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_port, OutputFormat};

pub fn run(args: FreePortArgs, format: OutputFormat) -> CliResult<i32> {
    let port = free_port(&args.host).map_err(|err| transport_error("port lookup failed", err))?;
    print_port(port, format);
    Ok(SUCCESS)
}
