use crate::api::ChatApi;
use crate::error::ConsoleError;
use crate::poller::{PollGeneration, PollOutcome, PollSettings, ReplyPoller};
use anp_core::chat_contracts::{DiscoverRequest, SendRequest};
use anp_core::{AgentInfo, Bookmark, ChatRole, HistoryEntry};
use tracing::{info, warn};

pub const AGENT_WAITING: &str = "Waiting for agent reply...";
pub const LOCAL_WAITING: &str = "Waiting for local assistant...";
pub const DISCOVERY_WAITING: &str = "Discovering agent...";
pub const RECOMMEND_WAITING: &str = "Picking a bookmarked agent for your need...";
pub const REPLY_RECEIVED: &str = "Agent reply received.";
pub const REPLY_TIMED_OUT: &str =
    "Agent reply timed out; it may still arrive, reload with /history.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatLineKind {
    User,
    Assistant,
    AgentReply,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub kind: ChatLineKind,
    pub text: String,
}

impl ChatLine {
    fn from_history(entry: &HistoryEntry) -> Self {
        let kind = match entry.role {
            ChatRole::User => ChatLineKind::User,
            ChatRole::Assistant if entry.from_agent => ChatLineKind::AgentReply,
            ChatRole::Assistant => ChatLineKind::Assistant,
            ChatRole::System | ChatRole::Other => ChatLineKind::System,
        };
        Self {
            kind,
            text: entry.message.clone(),
        }
    }
}

/// Incremental changes to the transcript, drained by whatever renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptUpdate {
    Line(ChatLine),
    Reset,
    Waiting(String),
    WaitingCleared,
}

#[derive(Debug, Default)]
pub struct ChatTranscript {
    lines: Vec<ChatLine>,
    waiting: Option<String>,
    updates: Vec<TranscriptUpdate>,
}

impl ChatTranscript {
    pub fn lines(&self) -> &[ChatLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn waiting(&self) -> Option<&str> {
        self.waiting.as_deref()
    }

    pub fn push(&mut self, kind: ChatLineKind, text: impl Into<String>) {
        let line = ChatLine {
            kind,
            text: text.into(),
        };
        self.updates.push(TranscriptUpdate::Line(line.clone()));
        self.lines.push(line);
    }

    pub fn system(&mut self, text: impl Into<String>) {
        self.push(ChatLineKind::System, text);
    }

    pub fn replace(&mut self, lines: Vec<ChatLine>) {
        self.lines.clear();
        self.updates.push(TranscriptUpdate::Reset);
        for line in lines {
            self.push(line.kind, line.text);
        }
    }

    pub fn set_waiting(&mut self, text: &str) {
        if self.waiting.as_deref() == Some(text) {
            return;
        }
        self.waiting = Some(text.to_string());
        self.updates.push(TranscriptUpdate::Waiting(text.to_string()));
    }

    pub fn clear_waiting(&mut self) {
        if self.waiting.take().is_some() {
            self.updates.push(TranscriptUpdate::WaitingCleared);
        }
    }

    pub fn take_updates(&mut self) -> Vec<TranscriptUpdate> {
        std::mem::take(&mut self.updates)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatInput<'a> {
    Empty,
    Message(&'a str),
    /// `@name text`: routed to a remote agent, answered asynchronously.
    AgentCommand { agent: &'a str, text: &'a str },
}

pub fn classify_input(input: &str) -> ChatInput<'_> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return ChatInput::Empty;
    }
    if let Some(rest) = trimmed.strip_prefix('@') {
        if let Some((agent, text)) = rest.split_once(' ') {
            return ChatInput::AgentCommand {
                agent,
                text: text.trim(),
            };
        }
    }
    ChatInput::Message(trimmed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send(String),
    ToggleServer,
    ToggleChat,
    Status,
    History,
    ClearHistory,
    Bookmarks(Option<String>),
    AddBookmark(String),
    DeleteBookmark(String),
    UseBookmark(String),
    Discover(String),
    Recommend(String),
    Help,
    Quit,
}

pub const CHAT_HELP: &str = "/server /chat /status /history /clear /bookmarks [URL] /add NAME /delete ID /use ID /discover ID /recommend NEED /help /quit; anything else is sent, '@agent text' goes to an agent";

pub fn parse_chat_line(line: &str) -> Result<ChatCommand, String> {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(ChatCommand::Send(trimmed.to_string()));
    };
    let (verb, arg) = match command.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (command, ""),
    };
    let required = |what: &str| -> Result<String, String> {
        if arg.is_empty() {
            Err(format!("/{verb} needs {what}"))
        } else {
            Ok(arg.to_string())
        }
    };
    match verb {
        "server" => Ok(ChatCommand::ToggleServer),
        "chat" => Ok(ChatCommand::ToggleChat),
        "status" => Ok(ChatCommand::Status),
        "history" => Ok(ChatCommand::History),
        "clear" => Ok(ChatCommand::ClearHistory),
        "bookmarks" => Ok(ChatCommand::Bookmarks(
            (!arg.is_empty()).then(|| arg.to_string()),
        )),
        "add" => required("a name").map(ChatCommand::AddBookmark),
        "delete" => required("a bookmark id").map(ChatCommand::DeleteBookmark),
        "use" => required("a bookmark id").map(ChatCommand::UseBookmark),
        "discover" => required("a bookmark id").map(ChatCommand::Discover),
        "recommend" => required("a description of the need").map(ChatCommand::Recommend),
        "help" => Ok(ChatCommand::Help),
        "quit" | "exit" => Ok(ChatCommand::Quit),
        other => Err(format!("unknown command /{other}")),
    }
}

/// Chat backend state mirrored client side: toggles, bookmarks, the selected
/// agent, the transcript and the reply poller.
pub struct ChatSession {
    api: ChatApi,
    server_running: bool,
    chat_running: bool,
    bookmarks: Vec<Bookmark>,
    selected_agent: Option<AgentInfo>,
    transcript: ChatTranscript,
    poller: ReplyPoller,
}

impl ChatSession {
    pub fn new(api: ChatApi, poll: PollSettings) -> Self {
        Self {
            api,
            server_running: false,
            chat_running: false,
            bookmarks: Vec::new(),
            selected_agent: None,
            transcript: ChatTranscript::default(),
            poller: ReplyPoller::new(poll),
        }
    }

    pub fn server_running(&self) -> bool {
        self.server_running
    }

    pub fn chat_running(&self) -> bool {
        self.chat_running
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn selected_agent(&self) -> Option<&AgentInfo> {
        self.selected_agent.as_ref()
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut ChatTranscript {
        &mut self.transcript
    }

    pub fn poller(&self) -> &ReplyPoller {
        &self.poller
    }

    pub fn poll_generation(&self) -> PollGeneration {
        self.poller.generation()
    }

    pub async fn refresh_status(&mut self) {
        self.server_running = match self.api.server_status().await {
            Ok(running) => running,
            Err(err) => {
                self.report("Server status check", err);
                false
            }
        };
        if !self.server_running {
            self.chat_running = false;
            return;
        }
        self.chat_running = match self.api.chat_status().await {
            Ok(running) => running,
            Err(err) => {
                self.report("Chat status check", err);
                false
            }
        };
    }

    pub async fn toggle_server(&mut self) {
        let result = if self.server_running {
            self.api.stop_server().await
        } else {
            self.api.start_server().await
        };
        if let Err(err) = result {
            self.report("Server action", err);
            return;
        }
        self.server_running = !self.server_running;
        info!(event = "chat_server_toggled", running = self.server_running);
        if self.server_running {
            self.transcript.system("Server started.");
            self.chat_running = match self.api.chat_status().await {
                Ok(running) => running,
                Err(err) => {
                    self.report("Chat status check", err);
                    false
                }
            };
        } else {
            self.chat_running = false;
            self.transcript.system("Server stopped.");
        }
    }

    pub async fn toggle_chat(&mut self) {
        if !self.server_running {
            self.transcript.system("Start the server first (/server).");
            return;
        }
        let result = if self.chat_running {
            self.api.stop_chat().await
        } else {
            self.api.start_chat().await
        };
        if let Err(err) = result {
            self.report("Chat action", err);
            return;
        }
        self.chat_running = !self.chat_running;
        info!(event = "chat_session_toggled", running = self.chat_running);
        self.transcript.system(if self.chat_running {
            "Chat started."
        } else {
            "Chat stopped."
        });
    }

    pub async fn send(&mut self, input: &str) {
        let input = input.trim();
        let classified = classify_input(input);
        if classified == ChatInput::Empty {
            return;
        }
        if !self.chat_running {
            self.transcript.system("Start the chat first (/chat).");
            return;
        }
        self.transcript.push(ChatLineKind::User, input);
        match classified {
            ChatInput::Empty => {}
            ChatInput::Message(message) => {
                self.transcript.set_waiting(LOCAL_WAITING);
                let request = SendRequest {
                    message: message.to_string(),
                    is_agent_command: false,
                    agent_info: None,
                    is_recommendation: false,
                };
                let result = self.api.send(&request).await;
                self.settle_waiting();
                match result {
                    Ok(reply) => self
                        .transcript
                        .push(ChatLineKind::Assistant, reply.response.unwrap_or_default()),
                    Err(err) => self.report("Send", err),
                }
            }
            ChatInput::AgentCommand { agent, .. } => {
                let agent_info = self
                    .selected_agent
                    .as_ref()
                    .filter(|selected| selected.name == agent)
                    .cloned();
                let request = SendRequest {
                    message: input.to_string(),
                    is_agent_command: true,
                    agent_info,
                    is_recommendation: false,
                };
                match self.api.send(&request).await {
                    Ok(reply) => {
                        if let Some(ack) = reply.response.filter(|text| !text.trim().is_empty()) {
                            self.transcript.push(ChatLineKind::Assistant, ack);
                        }
                        self.arm_poller();
                    }
                    Err(err) => self.report("Agent message", err),
                }
            }
        }
    }

    fn arm_poller(&mut self) {
        let generation = self.poller.arm(self.transcript.len());
        info!(event = "reply_poll_armed", generation = ?generation);
        self.transcript.set_waiting(AGENT_WAITING);
    }

    /// One poll interval elapsed: fetch history and feed it to the poller.
    pub async fn poll_tick(&mut self) {
        if !self.poller.is_armed() {
            return;
        }
        let generation = self.poller.generation();
        let outcome = match self.api.history().await {
            Ok(history) => self.poller.on_tick(generation, &history),
            Err(err) => {
                warn!(event = "reply_poll_fetch_error", error = %err);
                self.poller.on_tick_failed(generation)
            }
        };
        self.apply_poll_outcome(outcome);
    }

    fn apply_poll_outcome(&mut self, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Stale | PollOutcome::Pending { .. } => {}
            PollOutcome::Satisfied { replies } => {
                self.transcript.clear_waiting();
                for reply in &replies {
                    self.transcript
                        .push(ChatLineKind::AgentReply, reply.message.clone());
                }
                info!(event = "reply_poll_satisfied", replies = replies.len());
                self.transcript.system(REPLY_RECEIVED);
            }
            PollOutcome::TimedOut { ticks } => {
                self.transcript.clear_waiting();
                warn!(event = "reply_poll_timeout", ticks);
                self.transcript.system(REPLY_TIMED_OUT);
            }
        }
    }

    pub async fn load_history(&mut self) {
        match self.api.history().await {
            Ok(history) => self.apply_history(&history),
            Err(err) => self.report("History load", err),
        }
    }

    fn apply_history(&mut self, history: &[HistoryEntry]) {
        self.transcript
            .replace(history.iter().map(ChatLine::from_history).collect());
        // The reload already rendered any reply, so a win here only needs the
        // indicator and notice.
        if let PollOutcome::Satisfied { .. } = self.poller.offer(history) {
            self.transcript.clear_waiting();
            self.transcript.system(REPLY_RECEIVED);
        }
    }

    pub async fn clear_history(&mut self) {
        match self.api.clear_history().await {
            Ok(_) => {
                // An armed reply poll keeps running; its indicator is shown
                // again below the reset.
                self.transcript.clear_waiting();
                self.transcript.replace(Vec::new());
                self.transcript.system("Chat history cleared.");
                self.settle_waiting();
            }
            Err(err) => self.report("Clear history", err),
        }
    }

    pub async fn load_bookmarks(&mut self, agent_url: Option<&str>) {
        match self.api.bookmarks(agent_url).await {
            Ok(bookmarks) => {
                self.bookmarks = bookmarks;
                self.transcript
                    .system(format!("{} bookmark(s) loaded.", self.bookmarks.len()));
            }
            Err(err) => self.report("Bookmark load", err),
        }
    }

    pub async fn add_bookmark(&mut self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        match self.api.add_bookmark(name).await {
            Ok(Some(bookmark)) => {
                self.bookmarks.push(bookmark);
                self.transcript.system(format!("Bookmark added: {name}"));
            }
            Ok(None) => self.transcript.system(format!("Bookmark added: {name}")),
            Err(err) => self.report("Add bookmark", err),
        }
    }

    pub async fn delete_bookmark(&mut self, id: &str) {
        match self.api.delete_bookmark(id).await {
            Ok(_) => {
                let removed = self
                    .bookmarks
                    .iter()
                    .position(|bookmark| bookmark.id == id)
                    .map(|index| self.bookmarks.remove(index));
                if let Some(removed) = removed {
                    if self
                        .selected_agent
                        .as_ref()
                        .is_some_and(|agent| agent.name == removed.name)
                    {
                        self.selected_agent = None;
                    }
                }
                self.transcript.system("Bookmark deleted.");
            }
            Err(err) => self.report("Delete bookmark", err),
        }
    }

    /// Select a bookmarked agent. Returns the input prefix that addresses it.
    pub fn use_bookmark(&mut self, id: &str) -> Option<String> {
        if !self.chat_running {
            self.transcript.system("Start the chat first (/chat).");
            return None;
        }
        let Some(bookmark) = self.bookmarks.iter().find(|bookmark| bookmark.id == id) else {
            self.transcript.system(format!("No bookmark with id {id}."));
            return None;
        };
        if !bookmark.has_connection_info() {
            self.transcript.system(format!(
                "Bookmark {id} has no connection details; the backend resolves it by name."
            ));
        }
        let agent = AgentInfo::from(bookmark);
        let prefix = format!("@{} ", agent.name);
        self.selected_agent = Some(agent);
        Some(prefix)
    }

    pub async fn discover(&mut self, id: &str) {
        if !self.chat_running {
            self.transcript.system("Start the chat first (/chat).");
            return;
        }
        let Some(bookmark) = self.bookmarks.iter().find(|bookmark| bookmark.id == id) else {
            self.transcript.system(format!("No bookmark with id {id}."));
            return;
        };
        let Some(url) = bookmark.url.clone() else {
            self.transcript
                .system("This bookmark has no url; nothing to discover.");
            return;
        };
        let request = DiscoverRequest {
            bookmark_id: bookmark.id.clone(),
            url,
            port: bookmark.port,
        };
        self.transcript.set_waiting(DISCOVERY_WAITING);
        let result = self.api.discover(&request).await;
        self.settle_waiting();
        match result {
            Ok(summary) => {
                if let Some(bookmark) = self.bookmarks.iter_mut().find(|bookmark| bookmark.id == id) {
                    bookmark.discovery = (!summary.trim().is_empty()).then(|| summary.clone());
                }
                self.transcript.system(format!("Discovery finished for {id}."));
                if !summary.trim().is_empty() {
                    self.transcript.system(summary);
                }
            }
            Err(err) => self.report("Discovery", err),
        }
    }

    /// Ask the backend model which bookmarked agent fits `need` and select it.
    /// Returns the input prefix of the chosen agent.
    pub async fn recommend(&mut self, need: &str) -> Option<String> {
        let need = need.trim();
        if need.is_empty() {
            self.transcript.system("Describe what you need first.");
            return None;
        }
        if !self.chat_running {
            self.transcript.system("Start the chat first (/chat).");
            return None;
        }
        if self.bookmarks.is_empty() {
            self.transcript
                .system("No bookmarks loaded; nothing to recommend from (/bookmarks).");
            return None;
        }
        self.transcript.push(ChatLineKind::User, format!("Need: {need}"));
        let catalog = match serde_json::to_string(&self.bookmarks) {
            Ok(catalog) => catalog,
            Err(err) => {
                self.report("Recommendation", err.into());
                return None;
            }
        };
        let request = SendRequest {
            message: format!(
                "Based on the user's need \"{need}\", recommend the most suitable agent from the following list and reply with its name only: {catalog}"
            ),
            is_agent_command: false,
            agent_info: None,
            is_recommendation: true,
        };
        self.transcript.set_waiting(RECOMMEND_WAITING);
        let result = self.api.send(&request).await;
        self.settle_waiting();
        let answer = match result {
            Ok(reply) => reply.response.unwrap_or_default(),
            Err(err) => {
                self.report("Recommendation", err);
                return None;
            }
        };
        let answer = answer.trim();
        let chosen = match_recommendation(&self.bookmarks, answer)
            .map(|bookmark| (bookmark.id.clone(), bookmark.name.clone()));
        let Some((id, name)) = chosen else {
            self.transcript.system(format!(
                "No bookmarked agent matches the recommendation: {answer}"
            ));
            return None;
        };
        info!(event = "agent_recommended", bookmark_id = %id);
        self.transcript.system(format!("Recommended agent: {name}"));
        self.use_bookmark(&id)
    }

    /// Drop a transient indicator, falling back to the agent indicator while a
    /// reply poll is still running.
    fn settle_waiting(&mut self) {
        if self.poller.is_armed() {
            self.transcript.set_waiting(AGENT_WAITING);
        } else {
            self.transcript.clear_waiting();
        }
    }

    fn report(&mut self, action: &str, err: ConsoleError) {
        warn!(event = "chat_action_failed", action, error = %err);
        self.transcript.system(format!("{action} failed: {err}"));
    }
}

/// Pick the bookmark a model answer names: an exact name, ignoring case, or
/// the first bookmark whose name appears inside the answer.
pub fn match_recommendation<'a>(bookmarks: &'a [Bookmark], answer: &str) -> Option<&'a Bookmark> {
    let answer = answer.trim().to_lowercase();
    if answer.is_empty() {
        return None;
    }
    bookmarks.iter().find(|bookmark| {
        let name = bookmark.name.trim().to_lowercase();
        !name.is_empty() && (name == answer || answer.contains(&name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anp_core::ReplyKey;
    use std::time::Duration;
    use url::Url;

    fn session() -> ChatSession {
        let api = ChatApi::new(
            Url::parse("http://127.0.0.1:9").expect("url"),
            Duration::from_millis(200),
        )
        .expect("client");
        ChatSession::new(api, PollSettings::default())
    }

    fn agent_reply(message: &str, stamp: &str) -> HistoryEntry {
        HistoryEntry {
            role: ChatRole::Assistant,
            message: message.to_string(),
            from_agent: true,
            timestamp: ReplyKey::from(stamp),
        }
    }

    fn system_lines(session: &ChatSession) -> Vec<String> {
        session
            .transcript()
            .lines()
            .iter()
            .filter(|line| line.kind == ChatLineKind::System)
            .map(|line| line.text.clone())
            .collect()
    }

    #[test]
    fn classifies_agent_commands_by_at_and_space() {
        assert_eq!(
            classify_input("@weather what now"),
            ChatInput::AgentCommand {
                agent: "weather",
                text: "what now"
            }
        );
        assert_eq!(classify_input("@weather"), ChatInput::Message("@weather"));
        assert_eq!(classify_input("  hi  "), ChatInput::Message("hi"));
        assert_eq!(classify_input("   "), ChatInput::Empty);
    }

    #[test]
    fn parses_repl_commands() {
        assert_eq!(parse_chat_line("hello"), Ok(ChatCommand::Send("hello".to_string())));
        assert_eq!(
            parse_chat_line("/bookmarks http://h:1"),
            Ok(ChatCommand::Bookmarks(Some("http://h:1".to_string())))
        );
        assert_eq!(parse_chat_line("/bookmarks"), Ok(ChatCommand::Bookmarks(None)));
        assert!(parse_chat_line("/use").is_err());
        assert_eq!(
            parse_chat_line("/recommend  forecast for tomorrow "),
            Ok(ChatCommand::Recommend("forecast for tomorrow".to_string()))
        );
        assert_eq!(
            parse_chat_line("/recommend"),
            Err("/recommend needs a description of the need".to_string())
        );
        assert!(parse_chat_line("/frobnicate").is_err());
    }

    #[test]
    fn timeout_emits_one_notice_and_nothing_else() {
        let mut session = session();
        session.transcript.push(ChatLineKind::User, "@w hi");
        session.arm_poller();
        assert_eq!(session.transcript().waiting(), Some(AGENT_WAITING));
        let lines_before = session.transcript().len();
        let generation = session.poll_generation();

        for _ in 0..15 {
            let outcome = session.poller.on_tick(generation, &[]);
            session.apply_poll_outcome(outcome);
        }
        let outcome = session.poller.on_tick(generation, &[]);
        session.apply_poll_outcome(outcome);

        assert_eq!(session.transcript().len(), lines_before + 1);
        assert_eq!(system_lines(&session), vec![REPLY_TIMED_OUT]);
        assert_eq!(session.transcript().waiting(), None);
        assert!(!session.chat_running());
    }

    #[test]
    fn reply_on_tick_renders_and_stops_polling() {
        let mut session = session();
        session.arm_poller();
        let generation = session.poll_generation();
        for _ in 0..2 {
            let outcome = session.poller.on_tick(generation, &[]);
            session.apply_poll_outcome(outcome);
        }
        let history = vec![agent_reply("sunny", "10.5")];
        let outcome = session.poller.on_tick(generation, &history);
        session.apply_poll_outcome(outcome);
        for _ in 0..20 {
            let outcome = session.poller.on_tick(generation, &[]);
            session.apply_poll_outcome(outcome);
        }

        let kinds: Vec<_> = session.transcript().lines().iter().map(|line| line.kind).collect();
        assert_eq!(kinds, vec![ChatLineKind::AgentReply, ChatLineKind::System]);
        assert_eq!(system_lines(&session), vec![REPLY_RECEIVED]);
        assert_eq!(session.transcript().waiting(), None);
    }

    #[test]
    fn history_reload_wins_the_race_without_duplicate_render() {
        let mut session = session();
        session.arm_poller();
        let generation = session.poll_generation();
        let history = vec![
            HistoryEntry {
                role: ChatRole::User,
                message: "@w hi".to_string(),
                from_agent: false,
                timestamp: ReplyKey::from("1"),
            },
            agent_reply("pushed", "2"),
        ];
        session.apply_history(&history);
        let outcome = session.poller.on_tick(generation, &history);
        assert_eq!(outcome, PollOutcome::Stale);
        session.apply_poll_outcome(outcome);

        let replies = session
            .transcript()
            .lines()
            .iter()
            .filter(|line| line.kind == ChatLineKind::AgentReply)
            .count();
        assert_eq!(replies, 1);
        assert_eq!(session.transcript().waiting(), None);
    }

    #[test]
    fn use_bookmark_requires_running_chat() {
        let mut session = session();
        session.bookmarks.push(Bookmark {
            id: "b1".to_string(),
            name: "weather".to_string(),
            did: None,
            url: Some("http://127.0.0.1:9010".to_string()),
            port: Some(9010),
            discovery: None,
        });
        assert_eq!(session.use_bookmark("b1"), None);
        session.chat_running = true;
        assert_eq!(session.use_bookmark("b1"), Some("@weather ".to_string()));
        assert_eq!(
            session.selected_agent().map(|agent| agent.name.as_str()),
            Some("weather")
        );
        assert_eq!(session.use_bookmark("missing"), None);
    }

    fn bookmark(id: &str, name: &str) -> Bookmark {
        Bookmark {
            id: id.to_string(),
            name: name.to_string(),
            did: None,
            url: None,
            port: None,
            discovery: None,
        }
    }

    #[test]
    fn recommendation_matches_exact_name_or_mention() {
        let bookmarks = vec![bookmark("b1", "Weather"), bookmark("b2", "translator")];
        let id = |answer: &str| {
            match_recommendation(&bookmarks, answer).map(|bookmark| bookmark.id.as_str())
        };
        assert_eq!(id("weather"), Some("b1"));
        assert_eq!(id("  TRANSLATOR "), Some("b2"));
        assert_eq!(id("I would use the translator agent."), Some("b2"));
        assert_eq!(id("none of them"), None);
        assert_eq!(id(""), None);
        assert_eq!(match_recommendation(&[bookmark("b3", " ")], "anything"), None);
    }

    #[tokio::test]
    async fn recommend_refuses_without_chat_or_bookmarks() {
        let mut session = session();
        assert_eq!(session.recommend("forecast").await, None);
        assert_eq!(system_lines(&session), vec!["Start the chat first (/chat)."]);

        session.chat_running = true;
        assert_eq!(session.recommend("forecast").await, None);
        assert_eq!(session.recommend("   ").await, None);
        assert!(session.transcript().lines().iter().all(|line| line.kind == ChatLineKind::System));
        assert_eq!(session.transcript().waiting(), None);
    }

    #[test]
    fn transcript_updates_are_drained_once() {
        let mut transcript = ChatTranscript::default();
        transcript.set_waiting(AGENT_WAITING);
        transcript.set_waiting(AGENT_WAITING);
        transcript.system("hello");
        transcript.clear_waiting();
        transcript.clear_waiting();
        assert_eq!(
            transcript.take_updates(),
            vec![
                TranscriptUpdate::Waiting(AGENT_WAITING.to_string()),
                TranscriptUpdate::Line(ChatLine {
                    kind: ChatLineKind::System,
                    text: "hello".to_string()
                }),
                TranscriptUpdate::WaitingCleared,
            ]
        );
        assert!(transcript.take_updates().is_empty());
    }
}
