use std::io::{IsTerminal, Write};
use std::path::Path;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use forkwire_channel::Value;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }

    pub fn as_arg(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Table => "table",
            OutputFormat::Pretty => "pretty",
            OutputFormat::Raw => "raw",
        }
    }
}

pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", compact(value)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "VALUE"])
                .add_row(vec![value_kind(value).to_string(), compact(value)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| compact(value));
            println!("{} {}", value_kind(value), body);
        }
        OutputFormat::Raw => match value {
            Value::String(text) => print_raw(text.as_bytes()),
            other => print_raw(compact(other).as_bytes()),
        },
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

#[derive(Serialize, Debug)]
pub struct LaunchReport {
    pub medium: String,
    pub worker_id: Option<u32>,
    pub transport: Option<&'static str>,
    pub state: String,
    pub sent: usize,
    pub received: usize,
}

pub fn print_launch_report(report: &LaunchReport, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["MEDIUM", "WORKER", "TRANSPORT", "STATE", "SENT", "RECEIVED"])
                .add_row(vec![
                    report.medium.clone(),
                    optional(report.worker_id),
                    report.transport.unwrap_or("-").to_string(),
                    report.state.clone(),
                    report.sent.to_string(),
                    report.received.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "medium={} worker={} transport={} state={} sent={} received={}",
                report.medium,
                optional(report.worker_id),
                report.transport.unwrap_or("-"),
                report.state,
                report.sent,
                report.received
            );
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ProbeReport {
    pub medium: String,
    pub ready: bool,
    pub port: Option<u16>,
}

impl ProbeReport {
    pub fn new(medium: &Path, ready: bool, port: Option<u16>) -> Self {
        Self {
            medium: medium.display().to_string(),
            ready,
            port,
        }
    }
}

pub fn print_probe_report(report: &ProbeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["MEDIUM", "READY", "PORT"])
                .add_row(vec![
                    report.medium.clone(),
                    report.ready.to_string(),
                    optional(report.port),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "medium={} ready={} port={}",
                report.medium,
                report.ready,
                optional(report.port)
            );
        }
        OutputFormat::Raw => print_raw(optional(report.port).as_bytes()),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
