use std::process;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use planeview_channel::{connect, ChannelConfig};
use planeview_frame::unpack;
use planeview_transport::Endpoint;

use crate::cmd::RequestArgs;
use crate::exit::{channel_error, frame_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_reply, OutputFormat};

pub async fn run(args: RequestArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let json: serde_json::Value = serde_json::from_str(&args.json)
        .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
    let message = unpack(json).map_err(|err| frame_error("invalid message", err))?;

    let session = args.session.clone().unwrap_or_else(fresh_session);
    let config = ChannelConfig::default()
        .with_session(session)
        .with_request_timeout(timeout);

    let endpoint = Endpoint::new(args.endpoint.host.clone(), args.endpoint.port);
    if endpoint.port == 0 {
        return Err(CliError::new(USAGE, "--port is required to send a request"));
    }

    let connection = tokio::time::timeout(timeout, connect(&endpoint, config))
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("connect to {endpoint} timed out")))?
        .map_err(|err| channel_error("connect failed", err))?;

    let result = connection.channel().request(args.id.as_str(), message).await;
    connection.close("request complete");
    let reply = result.map_err(|err| channel_error("request failed", err))?;

    print_reply(&args.id, &reply, format);
    connection.join().await;
    Ok(SUCCESS)
}

fn fresh_session() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("cli-{}-{nanos:x}", process::id())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
