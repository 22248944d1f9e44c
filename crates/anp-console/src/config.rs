use crate::error::ConsoleError;
use crate::poller::PollSettings;
use clap::{Parser, Subcommand};
use std::{env, time::Duration};
use url::Url;

pub const DEFAULT_LAUNCHER_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_CHAT_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_RECONNECT_SECS: u64 = 5;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_DIR: &str = ".anp/logs";

#[derive(Parser, Debug, Clone)]
#[command(name = "anp-console", about = "Console for ANP launcher instances and agent chat")]
pub struct Args {
    #[arg(long, default_value = "")]
    pub launcher_url: String,
    #[arg(long, default_value = "")]
    pub ws_url: String,
    #[arg(long, default_value = "")]
    pub chat_url: String,
    #[arg(long)]
    pub reconnect_secs: Option<u64>,
    #[arg(long)]
    pub poll_secs: Option<u64>,
    #[arg(long)]
    pub poll_max_ticks: Option<u32>,
    #[arg(long)]
    pub http_timeout_secs: Option<u64>,
    #[arg(long, default_value = "")]
    pub log_dir: String,
    #[command(subcommand)]
    pub mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Mirror launcher instances and their output in a terminal UI.
    Manager,
    /// Line-oriented chat with agent reply polling.
    Chat,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Manager => "manager",
            Mode::Chat => "chat",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub mode: Mode,
    pub launcher_url: Url,
    pub ws_url: Url,
    pub chat_url: Url,
    pub reconnect_delay: Duration,
    pub poll: PollSettings,
    pub http_timeout: Duration,
    pub log_dir: String,
    pub log_stdout: bool,
}

pub fn load_config(args: Args) -> Result<ConsoleConfig, ConsoleError> {
    let launcher_url = parse_url(&resolve_text(
        &args.launcher_url,
        "ANP_LAUNCHER_URL",
        DEFAULT_LAUNCHER_URL,
    ))?;
    let ws_url = match resolve_optional_text(&args.ws_url, "ANP_WS_URL") {
        Some(value) => parse_url(&value)?,
        None => derive_ws_url(&launcher_url)?,
    };
    let chat_url = parse_url(&resolve_text(&args.chat_url, "ANP_CHAT_URL", DEFAULT_CHAT_URL))?;
    let defaults = PollSettings::default();
    let poll = PollSettings {
        interval: Duration::from_secs(resolve_number(
            args.poll_secs,
            "ANP_POLL_SECS",
            defaults.interval.as_secs(),
        )),
        max_ticks: resolve_number(args.poll_max_ticks, "ANP_POLL_MAX_TICKS", defaults.max_ticks),
    };
    Ok(ConsoleConfig {
        mode: args.mode.unwrap_or(Mode::Manager),
        launcher_url,
        ws_url,
        chat_url,
        reconnect_delay: Duration::from_secs(resolve_number(
            args.reconnect_secs,
            "ANP_RECONNECT_SECS",
            DEFAULT_RECONNECT_SECS,
        )),
        poll,
        http_timeout: Duration::from_secs(resolve_number(
            args.http_timeout_secs,
            "ANP_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )),
        log_dir: resolve_text(&args.log_dir, "ANP_LOG_DIR", DEFAULT_LOG_DIR),
        log_stdout: resolve_log_stdout(),
    })
}

/// The event channel lives at `/ws` on the launcher host, on the websocket
/// flavour of the launcher's scheme.
pub fn derive_ws_url(launcher_url: &Url) -> Result<Url, ConsoleError> {
    let mut ws_url = launcher_url.clone();
    let scheme = match launcher_url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    ws_url
        .set_scheme(scheme)
        .map_err(|_| ConsoleError::InvalidUrl {
            value: launcher_url.to_string(),
            message: format!("cannot use scheme {scheme}"),
        })?;
    ws_url.set_path("/ws");
    ws_url.set_query(None);
    ws_url.set_fragment(None);
    Ok(ws_url)
}

pub fn parse_url(value: &str) -> Result<Url, ConsoleError> {
    Url::parse(value.trim()).map_err(|err| ConsoleError::InvalidUrl {
        value: value.to_string(),
        message: err.to_string(),
    })
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_optional_text(flag: &str, key: &str) -> Option<String> {
    if !flag.trim().is_empty() {
        return Some(flag.to_string());
    }
    if let Ok(value) = env::var(key) {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    None
}

fn resolve_text(flag: &str, key: &str, default: &str) -> String {
    resolve_optional_text(flag, key).unwrap_or_else(|| default.to_string())
}

fn resolve_number<T: std::str::FromStr>(flag: Option<T>, key: &str, default: T) -> T {
    if let Some(value) = flag {
        return value;
    }
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn resolve_log_stdout() -> bool {
    env::var("ANP_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_follows_launcher_scheme_and_host() {
        let plain = parse_url("http://127.0.0.1:8080/manager?tab=1").expect("url");
        assert_eq!(
            derive_ws_url(&plain).expect("ws").as_str(),
            "ws://127.0.0.1:8080/ws"
        );
        let secure = parse_url("https://launcher.example").expect("url");
        assert_eq!(
            derive_ws_url(&secure).expect("wss").as_str(),
            "wss://launcher.example/ws"
        );
    }

    #[test]
    fn flags_win_over_defaults() {
        let args = Args::parse_from([
            "anp-console",
            "--launcher-url",
            "http://10.0.0.2:9000",
            "--reconnect-secs",
            "7",
            "--poll-max-ticks",
            "3",
            "chat",
        ]);
        let config = load_config(args).expect("config");
        assert_eq!(config.mode, Mode::Chat);
        assert_eq!(config.ws_url.as_str(), "ws://10.0.0.2:9000/ws");
        assert_eq!(config.reconnect_delay, Duration::from_secs(7));
        assert_eq!(config.poll.max_ticks, 3);
    }

    #[test]
    fn invalid_url_is_reported_not_panicked() {
        let args = Args::parse_from(["anp-console", "--chat-url", "not a url"]);
        assert!(matches!(
            load_config(args),
            Err(ConsoleError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn parse_bool_flag_accepts_common_spellings() {
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag(" off "), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }
}
