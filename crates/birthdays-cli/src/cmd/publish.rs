use anyhow::{Context, Result};
use birthdays_core::config::Config;
use birthdays_core::github::{self, GitHubClient, PublishMessages};
use birthdays_core::{codec, record};
use std::path::Path;

use crate::output::print_json;

pub fn run(config: &Config, file: Option<&Path>, json: bool) -> Result<()> {
    let path = file.unwrap_or(config.data_path.as_path());
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let rows = codec::parse_csv(&text)?;
    record::validate_all(&rows).with_context(|| format!("{} is invalid", path.display()))?;
    let csv = codec::to_csv_file(&rows)?;

    let client = GitHubClient::new(github::http_client()?, config.github.clone());
    let messages = PublishMessages::for_file(&config.github.file_path);
    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt
        .block_on(client.publish_csv(&csv, &messages))
        .context("publish failed")?;

    if json {
        print_json(&outcome)?;
    } else {
        println!("Opened pull request #{}: {}", outcome.pr_number, outcome.pr_url);
        println!("Branch: {}", outcome.branch);
    }
    Ok(())
}
