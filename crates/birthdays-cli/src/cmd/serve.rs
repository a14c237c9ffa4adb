use anyhow::Result;
use birthdays_core::config::Config;
use birthdays_server::AppState;

pub fn run(mut config: Config, port: Option<u16>, open_browser: bool) -> Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    let port = config.port;
    let state = AppState::from_config(config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(birthdays_server::serve(state, port, open_browser))
}
