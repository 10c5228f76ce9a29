//! The plugin-host side of the process boundary: the task descriptor on
//! stdin, framed log/progress lines on stderr, one output document on
//! stdout.

use serde_json::Value;
use stash_contracts::PluginInput;
use tokio::io::AsyncReadExt;

const SOH: char = '\u{1}';
const STX: char = '\u{2}';

/// One framed log line. The host splits on newlines, so embedded newlines
/// must not survive.
fn encode(level: char, message: &str) -> String {
    let flat = message.replace(['\n', '\r'], " ");
    format!("{}{}{}{}", SOH, level, STX, flat)
}

pub fn log_progress(fraction: f64) {
    eprintln!("{}", encode('p', &format!("{}", fraction.clamp(0.0, 1.0))));
}

pub fn log_info(message: &str) {
    eprintln!("{}", encode('i', message));
}

pub fn log_error(message: &str) {
    eprintln!("{}", encode('e', message));
}

/// Reads the JSON task descriptor the host writes to stdin; a file path
/// stands in for stdin when running a task by hand.
pub async fn read_task_descriptor(path: Option<&str>) -> anyhow::Result<PluginInput> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

/// The single output document the host reads from stdout.
pub fn write_output(value: &Value) {
    println!("{}", value);
}
