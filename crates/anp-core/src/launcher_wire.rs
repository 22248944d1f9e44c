use crate::fields::{deserialize_lines, deserialize_optional_text, deserialize_port};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

pub const KNOWN_EVENT_TYPES: &[&str] = &[
    "init",
    "instance_added",
    "output",
    "output_complete",
    "status",
    "start_result",
    "stop_result",
    "error",
    "output_result",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceRole {
    Server,
    Client,
    Agent,
}

impl InstanceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceRole::Server => "server",
            InstanceRole::Client => "client",
            InstanceRole::Agent => "agent",
        }
    }
}

impl fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceRole {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(InstanceRole::Server),
            "client" => Ok(InstanceRole::Client),
            "agent" => Ok(InstanceRole::Agent),
            other => Err(format!("unknown instance role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub command: InstanceRole,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub start_time: String,
    #[serde(default, deserialize_with = "deserialize_lines")]
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Init {
        #[serde(default, deserialize_with = "deserialize_instances")]
        instances: Vec<Instance>,
    },
    InstanceAdded {
        instance: Instance,
    },
    Output {
        instance_id: String,
        line: String,
    },
    OutputComplete {
        instance_id: String,
    },
    Status {
        instance_id: String,
        status: String,
    },
    StartResult(ActionResult),
    StopResult(ActionResult),
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        #[serde(skip_serializing_if = "Option::is_none")]
        instance_id: Option<String>,
    },
    OutputResult {
        success: bool,
        #[serde(default, deserialize_with = "deserialize_lines")]
        output: Vec<String>,
        #[serde(default)]
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(skip)]
    Unrecognized { kind: String },
}

impl InboundEvent {
    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::Init { .. } => "init",
            InboundEvent::InstanceAdded { .. } => "instance_added",
            InboundEvent::Output { .. } => "output",
            InboundEvent::OutputComplete { .. } => "output_complete",
            InboundEvent::Status { .. } => "status",
            InboundEvent::StartResult(_) => "start_result",
            InboundEvent::StopResult(_) => "stop_result",
            InboundEvent::Error { .. } => "error",
            InboundEvent::OutputResult { .. } => "output_result",
            InboundEvent::Unrecognized { kind } => kind,
        }
    }
}

fn deserialize_instances<'de, D>(deserializer: D) -> Result<Vec<Instance>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    let mut instances = Vec::new();
    for (index, value) in raw.unwrap_or_default().into_iter().enumerate() {
        match serde_json::from_value::<Instance>(value) {
            Ok(instance) => instances.push(instance),
            // One bad entry must not blank the whole registry.
            Err(err) => warn!(event = "init_instance_skipped", index, error = %err),
        }
    }
    Ok(instances)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchParams {
    pub command: InstanceRole,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LaunchParams {
    pub fn new(command: InstanceRole) -> Self {
        Self {
            command,
            name: None,
            port: None,
            did: None,
            url: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    Start(LaunchParams),
    Stop { instance_id: String },
    GetOutput { instance_id: String },
}

impl OutboundCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundCommand::Start(_) => "start",
            OutboundCommand::Stop { .. } => "stop",
            OutboundCommand::GetOutput { .. } => "get_output",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("frame decode failed ({kind}): {message}")]
    Decode { kind: String, message: String },
}

/// Decode one text frame from the event channel. Frames with a tag this client
/// does not know decode to [`InboundEvent::Unrecognized`] so newer backends can
/// add event types without breaking older consoles.
pub fn decode_event(raw: &str, max_frame_bytes: usize) -> Result<InboundEvent, WireError> {
    if raw.len() > max_frame_bytes {
        return Err(WireError::OversizedFrame {
            size: raw.len(),
            max: max_frame_bytes,
        });
    }
    let value: Value = serde_json::from_str(raw).map_err(|err| WireError::Decode {
        kind: "json".to_string(),
        message: err.to_string(),
    })?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(WireError::MissingType)?
        .to_string();
    if !KNOWN_EVENT_TYPES.contains(&kind.as_str()) {
        return Ok(InboundEvent::Unrecognized { kind });
    }
    serde_json::from_value(value).map_err(|err| WireError::Decode {
        kind,
        message: err.to_string(),
    })
}

pub fn encode_command(
    command: &OutboundCommand,
    max_frame_bytes: usize,
) -> Result<String, WireError> {
    let encoded =
        serde_json::to_string(command).map_err(|err| WireError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(WireError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}
