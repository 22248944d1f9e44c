pub mod chat_contracts;
pub mod fields;
pub mod launcher_wire;

pub use chat_contracts::{AgentInfo, AgentProfile, ApiReply, Bookmark, ChatRole, HistoryEntry};
pub use fields::ReplyKey;
pub use launcher_wire::{
    decode_event, encode_command, ActionResult, InboundEvent, Instance, InstanceRole,
    LaunchParams, OutboundCommand, WireError, DEFAULT_MAX_FRAME_BYTES,
};
