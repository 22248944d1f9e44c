use crate::console::ConnectionState;
use crate::manager::{help_lines, ManagerApp};
use crate::view::{InstanceRow, LineKind, TerminalLine};
use chrono::Local;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

#[derive(Clone, Copy)]
struct Theme {
    bg: Color,
    surface: Color,
    border: Color,
    title: Color,
    text: Color,
    muted: Color,
    ok: Color,
    warn: Color,
    critical: Color,
}

fn theme() -> Theme {
    Theme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
    }
}

fn panel(title: &str, theme: Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(
            title.to_string(),
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

pub fn render_ui(frame: &mut Frame, app: &ManagerApp) {
    let size = frame.size();
    let theme = theme();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(size);
    frame.render_widget(render_header(app, theme), layout[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(layout[1]);
    render_instances(frame, app, theme, body[0]);
    render_terminal(frame, app, theme, body[1]);
    frame.render_widget(render_footer(app, theme), layout[2]);

    if app.help_open {
        render_help(frame, theme);
    }
}

fn connection_color(state: ConnectionState, theme: Theme) -> Color {
    match state {
        ConnectionState::Connected => theme.ok,
        ConnectionState::Connecting => theme.warn,
        ConnectionState::Disconnected => theme.critical,
    }
}

fn render_header(app: &ManagerApp, theme: Theme) -> Paragraph<'static> {
    let console = &app.console;
    let state = console.connection();
    let focus = console.focused().unwrap_or("-").to_string();
    let mut label = state.label().to_string();
    if let (ConnectionState::Disconnected, Some(since)) = (state, console.disconnected_at()) {
        label.push_str(&format!(" since {}", since.with_timezone(&Local).format("%H:%M:%S")));
    }
    let status_line = Line::from(vec![
        Span::styled("Launcher: ", Style::default().fg(theme.muted)),
        Span::styled(label, Style::default().fg(connection_color(state, theme))),
        Span::styled(
            format!(
                "  Instances: {}  Focus: {focus}  Agents known: {}",
                console.registry().len(),
                console.catalog_len()
            ),
            Style::default().fg(theme.text),
        ),
    ]);
    let note = console
        .status_note()
        .map(|note| format!("Last action: {note}"))
        .unwrap_or_else(|| "Last action: ready (: command, ? help)".to_string());
    Paragraph::new(Text::from(vec![
        status_line,
        Line::from(Span::styled(note, Style::default().fg(theme.muted))),
    ]))
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(panel("ANP Launcher", theme).style(Style::default().bg(theme.bg)))
}

fn status_color(status: &str, theme: Theme) -> Color {
    match status {
        "running" => theme.ok,
        "starting" | "stopping" => theme.warn,
        _ => theme.critical,
    }
}

fn row_line(row: &InstanceRow, theme: Theme) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("{:<7}", row.role.as_str()),
            Style::default().fg(theme.title),
        ),
        Span::styled(
            format!(" {:<9}", row.status),
            Style::default().fg(status_color(&row.status, theme)),
        ),
        Span::styled(
            format!(" {} :{} ", row.name, row.port),
            Style::default().fg(theme.text),
        ),
        Span::styled(row.started.clone(), Style::default().fg(theme.muted)),
    ])
}

fn render_instances(frame: &mut Frame, app: &ManagerApp, theme: Theme, area: Rect) {
    let view = app.console.view();
    if let Some(message) = view.empty_message() {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            message,
            Style::default().fg(theme.muted),
        )))
        .block(panel("Instances", theme));
        frame.render_widget(paragraph, area);
        return;
    }
    let items: Vec<ListItem> = view
        .rows()
        .iter()
        .map(|row| ListItem::new(row_line(row, theme)))
        .collect();
    let mut state = ListState::default();
    state.select(Some(app.console.selected_index()));
    let list = List::new(items)
        .highlight_symbol(">> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(panel("Instances", theme));
    frame.render_stateful_widget(list, area, &mut state);
}

fn terminal_line(line: &TerminalLine, theme: Theme) -> Line<'static> {
    let color = match line.kind {
        LineKind::System => theme.muted,
        LineKind::Output => theme.text,
        LineKind::Error => theme.critical,
    };
    Line::from(vec![
        Span::styled(format!("[{}] ", line.at), Style::default().fg(theme.border)),
        Span::styled(line.text.clone(), Style::default().fg(color)),
    ])
}

fn render_terminal(frame: &mut Frame, app: &ManagerApp, theme: Theme, area: Rect) {
    let terminal = app.console.view().terminal();
    let height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = terminal
        .visible(height)
        .iter()
        .map(|line| terminal_line(line, theme))
        .collect();
    let title = match (app.console.focused(), terminal.auto_scroll()) {
        (Some(id), true) => format!("Output: {id}"),
        (Some(id), false) => format!("Output: {id} (scroll locked)"),
        (None, true) => "Output".to_string(),
        (None, false) => "Output (scroll locked)".to_string(),
    };
    frame.render_widget(Paragraph::new(Text::from(lines)).block(panel(&title, theme)), area);
}

fn render_footer(app: &ManagerApp, theme: Theme) -> Paragraph<'static> {
    let line = match app.prompt.as_deref() {
        Some(prompt) => Line::from(vec![
            Span::styled(":", Style::default().fg(theme.title)),
            Span::styled(prompt.to_string(), Style::default().fg(theme.text)),
        ]),
        None => Line::from(Span::styled(
            "Enter view  x stop  c clear  a auto-scroll  : command  ? help  q quit",
            Style::default().fg(theme.muted),
        )),
    };
    Paragraph::new(line).block(panel("Command", theme))
}

fn render_help(frame: &mut Frame, theme: Theme) {
    let area = centered(frame.size(), 80, 14);
    let lines: Vec<Line> = help_lines()
        .into_iter()
        .map(|text| Line::from(Span::styled(text, Style::default().fg(theme.text))))
        .collect();
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(Text::from(lines)).block(panel("Help", theme)), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
