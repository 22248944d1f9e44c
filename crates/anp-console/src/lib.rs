pub mod api;
pub mod chat;
pub mod chat_repl;
pub mod command_line;
pub mod config;
pub mod console;
pub mod error;
pub mod event_stream;
pub mod logging;
pub mod manager;
pub mod poller;
pub mod registry;
pub mod ui;
pub mod view;

pub use api::{ChatApi, LauncherApi};
pub use chat::{ChatSession, ChatTranscript};
pub use console::{Console, ConnectionState};
pub use error::ConsoleError;
pub use event_stream::{event_stream_loop, StreamConfig, StreamEvent};
pub use poller::{PollOutcome, PollSettings, ReplyPoller};
pub use registry::InstanceRegistry;
pub use view::{InstanceRow, ViewHooks, ViewSync};
