use anp_console::chat_repl::run_chat;
use anp_console::config::{load_config, Args, Mode};
use anp_console::logging::init_logging;
use anp_console::manager::run_manager;
use clap::Parser;
use std::error::Error;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config(Args::parse())?;
    let log_file = init_logging(&config);
    info!(
        event = "console_start",
        mode = config.mode.as_str(),
        log_file = ?log_file,
        launcher = %config.launcher_url,
        ws = %config.ws_url,
        chat = %config.chat_url
    );
    match config.mode {
        Mode::Manager => run_manager(config).await,
        Mode::Chat => run_chat(config).await,
    }
}
