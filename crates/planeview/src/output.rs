use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use planeview_frame::{pack, Value};
use planeview_image::CubeShape;
use planeview_transport::Endpoint;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    event: &'static str,
    host: &'a str,
    port: u16,
    shape: [usize; 4],
    session_required: bool,
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    id: &'a str,
    reply: serde_json::Value,
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn table(header: Vec<&str>, row: Vec<String>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header)
        .add_row(row);
    table
}

/// Announce a listening server. Always a single line so callers can read it.
pub fn print_listening(
    endpoint: &Endpoint,
    shape: CubeShape,
    session_required: bool,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&ListeningOutput {
            event: "listening",
            host: &endpoint.host,
            port: endpoint.port,
            shape: [shape.x, shape.y, shape.stokes, shape.spectral],
            session_required,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("listening on {endpoint} shape={shape}");
        }
    }
}

pub fn print_reply(id: &str, reply: &Value, format: OutputFormat) {
    let json = pack(reply);
    match format {
        OutputFormat::Json => print_json(&ReplyOutput { id, reply: json }),
        OutputFormat::Table => {
            let rendered = serde_json::to_string_pretty(&json).unwrap_or_default();
            println!("{}", table(vec!["ID", "REPLY"], vec![id.to_string(), rendered]));
        }
        OutputFormat::Pretty => {
            println!("id={id} reply={json}");
        }
    }
}

pub fn print_port(port: u16, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "port": port })),
        OutputFormat::Table => println!("{}", table(vec!["PORT"], vec![port.to_string()])),
        OutputFormat::Pretty => println!("{port}"),
    }
}
