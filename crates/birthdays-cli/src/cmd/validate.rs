use anyhow::{Context, Result};
use birthdays_core::config::Config;
use birthdays_core::{codec, record};
use serde_json::json;
use std::path::Path;

use crate::output::print_json;

pub fn run(config: &Config, file: Option<&Path>, json: bool) -> Result<()> {
    let path = file.unwrap_or(config.data_path.as_path());
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    if !codec::is_plausible_payload(&text) {
        anyhow::bail!("{}: {}", path.display(), birthdays_core::BirthdaysError::InvalidCsv);
    }
    let rows = codec::parse_csv(&text)?;
    record::validate_all(&rows).with_context(|| format!("{} is invalid", path.display()))?;

    if json {
        print_json(&json!({ "ok": true, "path": path, "count": rows.len() }))?;
    } else {
        println!("{}: {} records OK", path.display(), rows.len());
    }
    Ok(())
}
