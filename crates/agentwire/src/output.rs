use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use agentwire_frame::AnyMessage;
use agentwire_message::{ClassUpdated, LoaderDiscovered, Properties};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Print one JSON document per line and flush, so readers of a pipe see it
/// immediately.
fn print_json<T: Serialize>(value: &T) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut out = std::io::stdout();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

#[derive(Serialize)]
struct Listening<'a> {
    event: &'static str,
    endpoint: &'a str,
}

pub fn print_listening(endpoint: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&Listening {
            event: "listening",
            endpoint,
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("listening on {endpoint}");
            let _ = std::io::stdout().flush();
        }
    }
}

#[derive(Serialize)]
struct PongOutput {
    seq: usize,
    rtt_us: u128,
}

pub fn print_pong(seq: usize, rtt: Duration, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PongOutput {
            seq,
            rtt_us: rtt.as_micros(),
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["SEQ", "RTT"]);
            table.add_row(vec![seq.to_string(), format!("{rtt:?}")]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("pong seq={seq} time={rtt:?}"),
    }
}

#[derive(Serialize)]
struct PropertiesOutput<'a> {
    count: usize,
    properties: &'a BTreeMap<String, String>,
}

pub fn print_properties(properties: &Properties, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&PropertiesOutput {
            count: properties.entries.len(),
            properties: &properties.entries,
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["KEY", "VALUE"]);
            for (key, value) in &properties.entries {
                table.add_row(vec![key.as_str(), value.as_str()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (key, value) in &properties.entries {
                println!("{key}={value}");
            }
        }
    }
}

#[derive(Serialize)]
struct AckOutput<'a> {
    ok: bool,
    action: &'a str,
    key: &'a str,
    value: &'a str,
}

pub fn print_set_property(key: &str, value: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&AckOutput {
            ok: true,
            action: "set-prop",
            key,
            value,
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["KEY", "VALUE", "STATUS"]);
            table.add_row(vec![key, value, "set"]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("set {key}={value}"),
    }
}

#[derive(Serialize)]
struct BroadcastOutput {
    kind: &'static str,
    data: Value,
    timestamp: String,
}

/// Short name and JSON body of a catalog broadcast.
pub fn describe_broadcast(message: &dyn AnyMessage) -> (&'static str, Value) {
    if let Some(discovered) = message.downcast_ref::<LoaderDiscovered>() {
        return (
            "loader-discovered",
            serde_json::to_value(discovered).unwrap_or(Value::Null),
        );
    }
    if let Some(updated) = message.downcast_ref::<ClassUpdated>() {
        let mut data = serde_json::to_value(updated).unwrap_or(Value::Null);
        if let Some(object) = data.get_mut("data").and_then(Value::as_object_mut) {
            object.insert("code_size".into(), updated.data.code.len().into());
        }
        return ("class-updated", data);
    }
    (message.type_name(), Value::Null)
}

pub fn print_broadcast(message: &dyn AnyMessage, format: OutputFormat) {
    let (kind, data) = describe_broadcast(message);
    match format {
        OutputFormat::Json => print_json(&BroadcastOutput {
            kind,
            data,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = table(vec!["KIND", "DATA"]);
            table.add_row(vec![kind.to_string(), data.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{kind} {data}"),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
