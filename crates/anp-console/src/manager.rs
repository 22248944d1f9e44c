use crate::api::LauncherApi;
use crate::command_line::{parse_manager_command, ManagerCommand, COMMAND_HELP};
use crate::config::ConsoleConfig;
use crate::console::{Console, COMMAND_QUEUE_CAPACITY};
use crate::event_stream::{event_stream_loop, StreamConfig};
use crate::ui::render_ui;
use crate::view::ViewSync;
use anp_core::DEFAULT_MAX_FRAME_BYTES;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::error::Error;
use std::io;
use tokio::sync::mpsc;
use tracing::{info, warn};

const PAGE_LINES: usize = 10;

/// Manager screen state: the console context plus input handling.
pub struct ManagerApp {
    pub console: Console<ViewSync>,
    pub prompt: Option<String>,
    pub help_open: bool,
}

impl ManagerApp {
    pub fn new(console: Console<ViewSync>) -> Self {
        Self {
            console,
            prompt: None,
            help_open: false,
        }
    }

    fn submit_prompt(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match parse_manager_command(line) {
            Ok(command) => {
                self.console.execute(command);
            }
            Err(message) => self.console.set_status_note(message),
        }
    }
}

/// Returns true when the user asked to quit.
pub fn handle_key(key: KeyEvent, app: &mut ManagerApp) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    if app.prompt.is_some() {
        handle_prompt_key(key, app);
        return false;
    }
    if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
        app.help_open = !app.help_open;
        return false;
    }
    if app.help_open {
        if key.code == KeyCode::Esc {
            app.help_open = false;
        }
        return false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char(':') => app.prompt = Some(String::new()),
        KeyCode::Up | KeyCode::Char('k') => app.console.move_selection(-1),
        KeyCode::Down | KeyCode::Char('j') => app.console.move_selection(1),
        KeyCode::Enter | KeyCode::Char('v') => {
            let selected = app.console.selected_id().map(str::to_string);
            app.console.view_instance(selected.as_deref());
        }
        KeyCode::Char('x') => {
            let selected = app.console.selected_id().map(str::to_string);
            app.console.stop_instance(selected.as_deref());
        }
        KeyCode::Char('c') => {
            app.console.execute(ManagerCommand::Clear);
        }
        KeyCode::Char('a') => {
            app.console.execute(ManagerCommand::ToggleScroll);
        }
        KeyCode::PageUp => app.console.view_mut().terminal_mut().scroll_up(PAGE_LINES),
        KeyCode::PageDown => app
            .console
            .view_mut()
            .terminal_mut()
            .scroll_down(PAGE_LINES),
        _ => {}
    }
    false
}

fn handle_prompt_key(key: KeyEvent, app: &mut ManagerApp) {
    match key.code {
        KeyCode::Esc => app.prompt = None,
        KeyCode::Enter => {
            let line = app.prompt.take().unwrap_or_default();
            app.submit_prompt(&line);
        }
        KeyCode::Backspace => {
            if let Some(prompt) = app.prompt.as_mut() {
                prompt.pop();
            }
        }
        KeyCode::Char(ch) => {
            if let Some(prompt) = app.prompt.as_mut() {
                prompt.push(ch);
            }
        }
        _ => {}
    }
}

pub async fn run_manager(config: ConsoleConfig) -> Result<(), Box<dyn Error>> {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (stream_tx, mut stream_rx) = mpsc::channel(256);
    let stream_config = StreamConfig {
        url: config.ws_url.clone(),
        reconnect_delay: config.reconnect_delay,
        max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
    };
    tokio::spawn(event_stream_loop(stream_config, stream_tx, command_rx));

    let mut app = ManagerApp::new(Console::new(command_tx, ViewSync::new()));
    let launcher = LauncherApi::new(config.launcher_url.clone(), config.http_timeout)?;
    match launcher.agents().await {
        Ok(agents) => {
            info!(event = "agent_catalog_loaded", count = agents.len());
            app.console.set_catalog(agents);
        }
        Err(err) => {
            warn!(event = "agent_catalog_error", error = %err);
            app.console
                .set_status_note(format!("agent catalog unavailable: {err}"));
        }
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| render_ui(frame, &app))?;
        tokio::select! {
            Some(event) = stream_rx.recv() => {
                app.console.apply_stream_event(event);
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) => {
                        if handle_key(key, &mut app) {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(event = "terminal_input_error", error = %err);
                    }
                    None => break,
                }
            }
        }
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

pub fn help_lines() -> Vec<&'static str> {
    vec![
        "Up/Down or j/k   select instance",
        "Enter or v       view output of selected instance",
        "x                stop selected instance",
        "c                clear terminal",
        "a                toggle auto-scroll",
        "PgUp/PgDn        scroll terminal",
        ":                command prompt",
        COMMAND_HELP,
        "q                quit",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_stream::StreamEvent;
    use anp_core::{InboundEvent, Instance, InstanceRole, OutboundCommand};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> (ManagerApp, mpsc::Receiver<OutboundCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let mut console = Console::new(tx, ViewSync::new());
        console.apply_stream_event(StreamEvent::Connected);
        console.apply_event(InboundEvent::Init {
            instances: vec![Instance {
                id: "i1".to_string(),
                command: InstanceRole::Server,
                status: "running".to_string(),
                name: None,
                port: Some(9000),
                did: None,
                url: None,
                start_time: String::new(),
                output: Vec::new(),
            }],
        });
        (ManagerApp::new(console), rx)
    }

    #[test]
    fn prompt_submits_parsed_command() {
        let (mut app, mut rx) = app();
        handle_key(key(KeyCode::Char(':')), &mut app);
        for ch in "stop i1".chars() {
            handle_key(key(KeyCode::Char(ch)), &mut app);
        }
        assert_eq!(app.prompt.as_deref(), Some("stop i1"));
        handle_key(key(KeyCode::Enter), &mut app);
        assert!(app.prompt.is_none());
        assert_eq!(
            rx.try_recv().expect("stop"),
            OutboundCommand::Stop {
                instance_id: "i1".to_string()
            }
        );
    }

    #[test]
    fn enter_views_selected_instance() {
        let (mut app, mut rx) = app();
        assert!(!handle_key(key(KeyCode::Enter), &mut app));
        assert_eq!(app.console.focused(), Some("i1"));
        assert_eq!(rx.try_recv().expect("get_output").kind(), "get_output");
    }

    #[test]
    fn bad_prompt_input_sets_note_and_q_quits() {
        let (mut app, _rx) = app();
        app.prompt = Some("launch rockets".to_string());
        handle_key(key(KeyCode::Enter), &mut app);
        assert_eq!(app.console.status_note(), Some("unknown command: launch"));
        assert!(handle_key(key(KeyCode::Char('q')), &mut app));
    }
}
