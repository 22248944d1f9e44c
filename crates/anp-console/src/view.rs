use anp_core::{Instance, InstanceRole};
use chrono::{DateTime, Local, NaiveDateTime};

pub const PLACEHOLDER: &str = "-";
pub const EMPTY_LIST_MESSAGE: &str = "No running instances.";
pub const TERMINAL_MAX_LINES: usize = 5000;

/// Everything the console context tells its view about. The context is the
/// only caller; a view never reaches back into the registry.
pub trait ViewHooks {
    fn render_all(&mut self, instances: &[&Instance]);
    fn upsert_row(&mut self, instance: &Instance);
    fn update_status(&mut self, id: &str, status: &str);
    fn remove_row(&mut self, id: &str);
    fn append_line(&mut self, kind: LineKind, text: &str);
    fn clear_terminal(&mut self);
    /// Returns the new auto-scroll setting.
    fn toggle_auto_scroll(&mut self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRow {
    pub id: String,
    pub role: InstanceRole,
    pub status: String,
    pub name: String,
    pub port: String,
    pub started: String,
}

impl InstanceRow {
    pub fn from_instance(instance: &Instance) -> Self {
        Self {
            id: instance.id.clone(),
            role: instance.command,
            status: instance.status.clone(),
            name: instance
                .name
                .clone()
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            port: instance
                .port
                .map(|port| port.to_string())
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            started: format_start_time(&instance.start_time),
        }
    }
}

/// Launcher stamps are either RFC 3339 or a naive ISO string without offset.
/// Anything else is shown as sent.
pub fn format_start_time(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return PLACEHOLDER.to_string();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return parsed
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return parsed.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    trimmed.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    System,
    Output,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalLine {
    pub at: String,
    pub kind: LineKind,
    pub text: String,
}

#[derive(Debug)]
pub struct TerminalBuffer {
    lines: Vec<TerminalLine>,
    auto_scroll: bool,
    offset_from_bottom: usize,
}

impl Default for TerminalBuffer {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            auto_scroll: true,
            offset_from_bottom: 0,
        }
    }
}

impl TerminalBuffer {
    pub fn lines(&self) -> &[TerminalLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    pub fn push(&mut self, kind: LineKind, text: &str) {
        self.lines.push(TerminalLine {
            at: Local::now().format("%H:%M:%S").to_string(),
            kind,
            text: text.to_string(),
        });
        if self.lines.len() > TERMINAL_MAX_LINES {
            let excess = self.lines.len() - TERMINAL_MAX_LINES;
            self.lines.drain(..excess);
        }
        if !self.auto_scroll {
            // Keep a user-anchored window still while lines land below it.
            self.offset_from_bottom = (self.offset_from_bottom + 1).min(self.max_offset());
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.offset_from_bottom = 0;
    }

    pub fn set_auto_scroll(&mut self, enabled: bool) {
        self.auto_scroll = enabled;
        if enabled {
            self.offset_from_bottom = 0;
        }
    }

    pub fn toggle_auto_scroll(&mut self) -> bool {
        self.set_auto_scroll(!self.auto_scroll);
        self.auto_scroll
    }

    pub fn scroll_up(&mut self, amount: usize) {
        self.auto_scroll = false;
        self.offset_from_bottom = (self.offset_from_bottom + amount).min(self.max_offset());
    }

    pub fn scroll_down(&mut self, amount: usize) {
        self.offset_from_bottom = self.offset_from_bottom.saturating_sub(amount);
    }

    /// The window of lines a viewport of `height` rows shows.
    pub fn visible(&self, height: usize) -> &[TerminalLine] {
        let end = self.lines.len().saturating_sub(self.offset_from_bottom);
        let start = end.saturating_sub(height);
        &self.lines[start..end]
    }

    fn max_offset(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }
}

/// Default projection of the console: instance rows plus the terminal pane.
#[derive(Debug, Default)]
pub struct ViewSync {
    rows: Vec<InstanceRow>,
    terminal: TerminalBuffer,
}

impl ViewSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[InstanceRow] {
        &self.rows
    }

    pub fn row(&self, id: &str) -> Option<&InstanceRow> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        self.rows.is_empty().then_some(EMPTY_LIST_MESSAGE)
    }

    pub fn terminal(&self) -> &TerminalBuffer {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut TerminalBuffer {
        &mut self.terminal
    }
}

impl ViewHooks for ViewSync {
    fn render_all(&mut self, instances: &[&Instance]) {
        self.rows = instances
            .iter()
            .map(|instance| InstanceRow::from_instance(instance))
            .collect();
    }

    fn upsert_row(&mut self, instance: &Instance) {
        let row = InstanceRow::from_instance(instance);
        match self.rows.iter_mut().find(|existing| existing.id == row.id) {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
    }

    fn update_status(&mut self, id: &str, status: &str) {
        if let Some(row) = self.rows.iter_mut().find(|row| row.id == id) {
            row.status = status.to_string();
        }
    }

    fn remove_row(&mut self, id: &str) {
        self.rows.retain(|row| row.id != id);
    }

    fn append_line(&mut self, kind: LineKind, text: &str) {
        self.terminal.push(kind, text);
    }

    fn clear_terminal(&mut self) {
        self.terminal.clear();
    }

    fn toggle_auto_scroll(&mut self) -> bool {
        self.terminal.toggle_auto_scroll()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> Instance {
        Instance {
            id: id.to_string(),
            command: InstanceRole::Agent,
            status: "running".to_string(),
            name: None,
            port: Some(9001),
            did: None,
            url: None,
            start_time: "2024-03-05T10:11:12.345678".to_string(),
            output: Vec::new(),
        }
    }

    #[test]
    fn rows_use_placeholders_for_missing_fields() {
        let row = InstanceRow::from_instance(&agent("i1"));
        assert_eq!(row.name, PLACEHOLDER);
        assert_eq!(row.port, "9001");
        assert_eq!(row.started, "2024-03-05 10:11:12");
    }

    #[test]
    fn start_time_falls_back_to_raw_text() {
        assert_eq!(format_start_time(""), PLACEHOLDER);
        assert_eq!(format_start_time("yesterday"), "yesterday");
        assert_eq!(format_start_time("2024-01-01T00:00:00Z").len(), 19);
    }

    #[test]
    fn row_hooks_insert_update_and_remove_in_place() {
        let mut view = ViewSync::new();
        assert_eq!(view.empty_message(), Some(EMPTY_LIST_MESSAGE));
        let first = agent("i1");
        let second = agent("i2");
        view.render_all(&[&first, &second]);
        assert!(view.empty_message().is_none());

        let mut renamed = agent("i1");
        renamed.name = Some("weather".to_string());
        view.upsert_row(&renamed);
        view.update_status("i2", "exited");
        assert_eq!(view.rows().len(), 2);
        assert_eq!(view.rows()[0].name, "weather");
        assert_eq!(view.row("i2").expect("row").status, "exited");

        view.remove_row("i1");
        view.remove_row("i2");
        assert!(view.rows().is_empty());
        assert_eq!(view.empty_message(), Some(EMPTY_LIST_MESSAGE));
    }

    #[test]
    fn auto_scroll_follows_tail_until_disabled() {
        let mut terminal = TerminalBuffer::default();
        for n in 0..10 {
            terminal.push(LineKind::Output, &format!("line {n}"));
        }
        assert_eq!(terminal.visible(3)[2].text, "line 9");

        terminal.set_auto_scroll(false);
        terminal.scroll_up(2);
        assert_eq!(terminal.visible(3)[2].text, "line 7");
        terminal.push(LineKind::Output, "line 10");
        assert_eq!(terminal.visible(3)[2].text, "line 7");

        assert!(terminal.toggle_auto_scroll());
        assert_eq!(terminal.visible(3)[2].text, "line 10");
    }

    #[test]
    fn clear_empties_terminal() {
        let mut view = ViewSync::new();
        view.append_line(LineKind::System, "hello");
        view.clear_terminal();
        assert!(view.terminal().is_empty());
        assert!(view.terminal().visible(5).is_empty());
    }
}
