use crate::config::ConsoleConfig;
use chrono::{Local, NaiveDate};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Where formatted events end up: an optional per-day file and, on request,
/// stdout. Neither sink is allowed to fail a log call.
pub struct LogSinks {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
    echo_stdout: bool,
}

impl LogSinks {
    pub fn discard() -> Self {
        Self {
            file: None,
            path: None,
            echo_stdout: false,
        }
    }

    /// Open `<log_dir>/<mode>-<day>.log` for appending. A blank directory
    /// means no file sink.
    pub fn open(log_dir: &str, mode: &str, day: NaiveDate) -> io::Result<Self> {
        let mut sinks = Self::discard();
        if log_dir.trim().is_empty() {
            return Ok(sinks);
        }
        let dir = PathBuf::from(log_dir.trim());
        fs::create_dir_all(&dir)?;
        let path = daily_log_path(&dir, mode, day);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        sinks.file = Some(Mutex::new(file));
        sinks.path = Some(path);
        Ok(sinks)
    }

    pub fn echo_stdout(mut self, enabled: bool) -> Self {
        self.echo_stdout = enabled;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Handle for one formatted event.
pub struct SinkWriter<'a> {
    sinks: &'a LogSinks,
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(Ok(mut file)) = self.sinks.file.as_ref().map(Mutex::lock) {
            let _ = file.write_all(buf);
        }
        if self.sinks.echo_stdout {
            let _ = io::stdout().write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(Ok(mut file)) = self.sinks.file.as_ref().map(Mutex::lock) {
            let _ = file.flush();
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSinks {
    type Writer = SinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter { sinks: self }
    }
}

/// Install the global subscriber and return the log file in use, if any.
/// Stdout only gets events when `ANP_LOG_STDOUT` asks for it; the manager's
/// TUI and the chat prompt own the terminal otherwise.
pub fn init_logging(config: &ConsoleConfig) -> Option<PathBuf> {
    let level = env::var("ANP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let today = Local::now().date_naive();
    let sinks = LogSinks::open(&config.log_dir, config.mode.as_str(), today)
        .unwrap_or_else(|err| {
            eprintln!("log_file_error: {err}");
            LogSinks::discard()
        })
        .echo_stdout(config.log_stdout);
    let path = sinks.path().map(Path::to_path_buf);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(sinks)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok()?;
    path
}

fn daily_log_path(dir: &Path, mode: &str, day: NaiveDate) -> PathBuf {
    let mode: String = mode
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
        .collect();
    dir.join(format!("{mode}-{}.log", day.format("%Y%m%d")))
}
