use crate::command_line::ManagerCommand;
use crate::event_stream::StreamEvent;
use crate::registry::{InstanceRegistry, UpsertOutcome};
use crate::view::{format_start_time, LineKind, ViewHooks, ViewSync, PLACEHOLDER};
use anp_core::{ActionResult, AgentProfile, InboundEvent, InstanceRole, LaunchParams, OutboundCommand};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const COMMAND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "online",
            ConnectionState::Disconnected => "offline",
        }
    }
}

/// Application state for the instance manager. The only writer of the
/// registry; every change it makes is pushed to the view through [`ViewHooks`].
pub struct Console<V: ViewHooks = ViewSync> {
    registry: InstanceRegistry,
    view: V,
    focused: Option<String>,
    connection: ConnectionState,
    disconnected_at: Option<DateTime<Utc>>,
    command_tx: mpsc::Sender<OutboundCommand>,
    catalog: HashMap<String, AgentProfile>,
    status_note: Option<String>,
    selected: usize,
}

impl<V: ViewHooks> Console<V> {
    pub fn new(command_tx: mpsc::Sender<OutboundCommand>, view: V) -> Self {
        Self {
            registry: InstanceRegistry::new(),
            view,
            focused: None,
            connection: ConnectionState::Connecting,
            disconnected_at: None,
            command_tx,
            catalog: HashMap::new(),
            status_note: None,
            selected: 0,
        }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    pub fn disconnected_at(&self) -> Option<DateTime<Utc>> {
        self.disconnected_at
    }

    pub fn status_note(&self) -> Option<&str> {
        self.status_note.as_deref()
    }

    pub fn set_status_note(&mut self, note: impl Into<String>) {
        self.status_note = Some(note.into());
    }

    pub fn set_catalog(&mut self, agents: Vec<AgentProfile>) {
        self.catalog = agents
            .into_iter()
            .map(|agent| (agent.name.clone(), agent))
            .collect();
    }

    pub fn catalog_len(&self) -> usize {
        self.catalog.len()
    }

    pub fn selected_index(&self) -> usize {
        self.selected.min(self.registry.len().saturating_sub(1))
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.registry.ids().nth(self.selected_index())
    }

    pub fn move_selection(&mut self, step: isize) {
        let len = self.registry.len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let current = self.selected_index() as isize;
        self.selected = (current + step).clamp(0, len as isize - 1) as usize;
    }

    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => {
                self.connection = ConnectionState::Connected;
                self.disconnected_at = None;
                self.status_note = Some("launcher connected".to_string());
                self.view.append_line(LineKind::System, "Connected to launcher.");
            }
            StreamEvent::Disconnected { reason, retry_in } => {
                let previous = self.connection;
                self.connection = ConnectionState::Disconnected;
                let retry = retry_in.as_secs_f32();
                self.status_note = Some(format!("launcher offline; retrying in {retry}s"));
                // Repeated failed attempts only refresh the note.
                match previous {
                    ConnectionState::Connected => {
                        self.disconnected_at = Some(Utc::now());
                        self.view.append_line(
                            LineKind::Error,
                            &format!("Connection lost ({reason}); reconnecting in {retry}s."),
                        );
                    }
                    ConnectionState::Connecting => {
                        self.disconnected_at = Some(Utc::now());
                        self.view.append_line(
                            LineKind::Error,
                            &format!("Cannot reach launcher ({reason}); retrying in {retry}s."),
                        );
                    }
                    ConnectionState::Disconnected => {}
                }
            }
            StreamEvent::Event(event) => self.apply_event(event),
        }
    }

    pub fn apply_event(&mut self, event: InboundEvent) {
        debug!(event = "console_apply", kind = event.kind());
        match event {
            InboundEvent::Init { instances } => {
                self.registry.replace_all(instances);
                if self
                    .focused
                    .as_deref()
                    .is_some_and(|id| !self.registry.contains(id))
                {
                    self.focused = None;
                }
                self.render_all();
            }
            InboundEvent::InstanceAdded { instance } => {
                let id = instance.id.clone();
                let outcome = self.registry.upsert(instance);
                if let Some(instance) = self.registry.get(&id) {
                    self.view.upsert_row(instance);
                }
                if outcome == UpsertOutcome::Merged {
                    debug!(event = "console_instance_merged", instance_id = %id);
                }
            }
            InboundEvent::Output { instance_id, line } => {
                if self.registry.append_output(&instance_id, &line)
                    && self.is_focused(&instance_id)
                {
                    self.view.append_line(LineKind::Output, &line);
                }
            }
            InboundEvent::OutputComplete { instance_id } => {
                if self.is_focused(&instance_id) {
                    self.view.append_line(LineKind::System, "--- end of buffered output ---");
                }
            }
            InboundEvent::Status {
                instance_id,
                status,
            } => {
                if !self.registry.set_status(&instance_id, &status) {
                    debug!(event = "console_status_unknown_instance", instance_id = %instance_id);
                    return;
                }
                self.view.update_status(&instance_id, &status);
                if self.is_focused(&instance_id) {
                    self.view
                        .append_line(LineKind::System, &format!("Status changed: {status}"));
                }
            }
            InboundEvent::StartResult(result) => self.apply_start_result(result),
            InboundEvent::StopResult(result) => self.apply_stop_result(result),
            InboundEvent::Error {
                message,
                instance_id,
            } => {
                warn!(
                    event = "launcher_error",
                    instance_id = instance_id.as_deref().unwrap_or(""),
                    message = %message
                );
                self.view
                    .append_line(LineKind::Error, &format!("Error: {message}"));
            }
            InboundEvent::OutputResult {
                success,
                output,
                error,
            } => {
                if success {
                    self.view.clear_terminal();
                    for line in &output {
                        self.view.append_line(LineKind::Output, line);
                    }
                } else {
                    let message = error.unwrap_or_else(|| "unknown error".to_string());
                    self.view.append_line(
                        LineKind::Error,
                        &format!("Failed to fetch output: {message}"),
                    );
                }
            }
            InboundEvent::Unrecognized { kind } => {
                debug!(event = "console_event_ignored", kind = %kind);
            }
        }
    }

    fn apply_start_result(&mut self, result: ActionResult) {
        if result.success {
            let id = result.instance_id.unwrap_or_default();
            info!(event = "instance_started", instance_id = %id);
            self.status_note = Some(format!("started {id}"));
            self.view
                .append_line(LineKind::System, &format!("Instance started: {id}"));
        } else {
            let message = result.error.unwrap_or_else(|| "unknown error".to_string());
            self.status_note = Some("start failed".to_string());
            self.view
                .append_line(LineKind::Error, &format!("Start failed: {message}"));
        }
    }

    fn apply_stop_result(&mut self, result: ActionResult) {
        if !result.success {
            let message = result.error.unwrap_or_else(|| "unknown error".to_string());
            self.status_note = Some("stop failed".to_string());
            self.view
                .append_line(LineKind::Error, &format!("Stop failed: {message}"));
            return;
        }
        let Some(id) = result.instance_id else {
            self.view.append_line(LineKind::System, "Instance stopped.");
            return;
        };
        info!(event = "instance_stopped", instance_id = %id);
        self.registry.remove(&id);
        self.view.remove_row(&id);
        self.status_note = Some(format!("stopped {id}"));
        self.view
            .append_line(LineKind::System, &format!("Instance stopped: {id}"));
        if self.is_focused(&id) {
            self.focused = None;
            self.view
                .append_line(LineKind::System, "Focused instance is gone.");
        }
    }

    fn render_all(&mut self) {
        let instances: Vec<_> = self.registry.iter().collect();
        self.view.render_all(&instances);
    }

    fn is_focused(&self, id: &str) -> bool {
        self.focused.as_deref() == Some(id)
    }

    pub fn execute(&mut self, command: ManagerCommand) -> bool {
        match command {
            ManagerCommand::Start(params) => self.start_instance(params),
            ManagerCommand::Stop(id) => self.stop_instance(id.as_deref()),
            ManagerCommand::View(id) => self.view_instance(id.as_deref()),
            ManagerCommand::Clear => {
                self.view.clear_terminal();
                true
            }
            ManagerCommand::ToggleScroll => {
                let enabled = self.view.toggle_auto_scroll();
                self.status_note = Some(format!(
                    "auto-scroll {}",
                    if enabled { "on" } else { "off" }
                ));
                true
            }
        }
    }

    pub fn start_instance(&mut self, mut params: LaunchParams) -> bool {
        if params.command == InstanceRole::Agent {
            let Some(name) = params.name.clone() else {
                self.reject("agent name is required");
                return false;
            };
            if let Some(profile) = self.catalog.get(&name) {
                params.did = params.did.or_else(|| profile.did.clone());
                params.url = params.url.or_else(|| profile.url.clone());
                params.port = params.port.or(profile.port);
            }
        }
        let role = params.command;
        if self.queue_command(OutboundCommand::Start(params)) {
            self.view
                .append_line(LineKind::System, &format!("Starting {role} instance..."));
            return true;
        }
        false
    }

    pub fn stop_instance(&mut self, id: Option<&str>) -> bool {
        let Some(id) = self.resolve_target(id) else {
            self.reject("no instance selected");
            return false;
        };
        if self.queue_command(OutboundCommand::Stop {
            instance_id: id.clone(),
        }) {
            self.view
                .append_line(LineKind::System, &format!("Stopping instance {id}..."));
            return true;
        }
        false
    }

    /// Focus an instance and ask the launcher to replay its buffer. The replay
    /// arrives as ordinary `output` events, so the local copy is reset once the
    /// request is queued. A refused request leaves focus and terminal alone.
    pub fn view_instance(&mut self, id: Option<&str>) -> bool {
        let Some(id) = self.resolve_target(id) else {
            self.reject("no instance selected");
            return false;
        };
        if !self.is_connected() {
            self.reject("launcher offline; command unavailable");
            return false;
        }
        let Some(instance) = self.registry.get(&id) else {
            self.reject(&format!("unknown instance {id}"));
            return false;
        };
        let info = [
            format!("Command: {}", instance.command),
            format!("Name: {}", instance.name.as_deref().unwrap_or(PLACEHOLDER)),
            format!(
                "Port: {}",
                instance
                    .port
                    .map(|port| port.to_string())
                    .unwrap_or_else(|| PLACEHOLDER.to_string())
            ),
            format!("Status: {}", instance.status),
            format!("Started: {}", format_start_time(&instance.start_time)),
        ];
        if !self.queue_command(OutboundCommand::GetOutput {
            instance_id: id.clone(),
        }) {
            return false;
        }
        self.registry.reset_output(&id);
        self.view.clear_terminal();
        for line in &info {
            self.view.append_line(LineKind::System, line);
        }
        self.view.append_line(LineKind::System, "--- output ---");
        self.focused = Some(id);
        true
    }

    fn resolve_target(&self, id: Option<&str>) -> Option<String> {
        id.or(self.focused.as_deref())
            .or_else(|| self.selected_id())
            .map(str::to_string)
    }

    fn reject(&mut self, message: &str) {
        self.status_note = Some(message.to_string());
        self.view.append_line(LineKind::Error, message);
    }

    fn queue_command(&mut self, command: OutboundCommand) -> bool {
        if !self.is_connected() {
            self.reject("launcher offline; command unavailable");
            return false;
        }
        let kind = command.kind();
        match self.command_tx.try_send(command) {
            Ok(()) => {
                self.status_note = Some(format!("{kind} queued"));
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    event = "launcher_command_queue_drop",
                    reason = "queue_full",
                    kind,
                    capacity = COMMAND_QUEUE_CAPACITY
                );
                self.reject("launcher command queue full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(
                    event = "launcher_command_queue_drop",
                    reason = "queue_closed",
                    kind
                );
                self.reject("launcher command channel closed");
                false
            }
        }
    }
}
