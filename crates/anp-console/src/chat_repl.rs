use crate::api::ChatApi;
use crate::chat::{
    parse_chat_line, ChatCommand, ChatLine, ChatLineKind, ChatSession, TranscriptUpdate, CHAT_HELP,
};
use crate::config::ConsoleConfig;
use std::error::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

fn format_line(line: &ChatLine) -> String {
    let tag = match line.kind {
        ChatLineKind::User => "you",
        ChatLineKind::Assistant => "assistant",
        ChatLineKind::AgentReply => "agent",
        ChatLineKind::System => "system",
    };
    format!("[{tag}] {}", line.text)
}

pub fn format_update(update: &TranscriptUpdate) -> String {
    match update {
        TranscriptUpdate::Line(line) => format_line(line),
        TranscriptUpdate::Reset => "----- history -----".to_string(),
        TranscriptUpdate::Waiting(text) => format!("... {text}"),
        TranscriptUpdate::WaitingCleared => "... done".to_string(),
    }
}

async fn flush_updates(
    session: &mut ChatSession,
    stdout: &mut tokio::io::Stdout,
) -> std::io::Result<()> {
    for update in session.transcript_mut().take_updates() {
        // Indicator removal is implied by whatever line follows it.
        if update == TranscriptUpdate::WaitingCleared {
            continue;
        }
        stdout.write_all(format_update(&update).as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await
}

async fn dispatch(session: &mut ChatSession, command: ChatCommand) -> bool {
    match command {
        ChatCommand::Send(text) => session.send(&text).await,
        ChatCommand::ToggleServer => session.toggle_server().await,
        ChatCommand::ToggleChat => session.toggle_chat().await,
        ChatCommand::Status => {
            session.refresh_status().await;
            let server = session.server_running();
            let chat = session.chat_running();
            session
                .transcript_mut()
                .system(format!("server: {}, chat: {}", on_off(server), on_off(chat)));
        }
        ChatCommand::History => session.load_history().await,
        ChatCommand::ClearHistory => session.clear_history().await,
        ChatCommand::Bookmarks(url) => {
            session.load_bookmarks(url.as_deref()).await;
            let listing: Vec<String> = session
                .bookmarks()
                .iter()
                .map(|bookmark| {
                    let discovered = if bookmark.discovery.is_some() { " (discovered)" } else { "" };
                    format!(
                        "  {}  {}  {}{discovered}",
                        bookmark.id,
                        bookmark.name,
                        bookmark.url.as_deref().unwrap_or("-")
                    )
                })
                .collect();
            for line in listing {
                session.transcript_mut().system(line);
            }
        }
        ChatCommand::AddBookmark(name) => session.add_bookmark(&name).await,
        ChatCommand::DeleteBookmark(id) => session.delete_bookmark(&id).await,
        ChatCommand::UseBookmark(id) => {
            if let Some(prefix) = session.use_bookmark(&id) {
                session
                    .transcript_mut()
                    .system(format!("Agent selected; address it with '{prefix}<message>'."));
            }
        }
        ChatCommand::Discover(id) => session.discover(&id).await,
        ChatCommand::Recommend(need) => {
            if let Some(prefix) = session.recommend(&need).await {
                session
                    .transcript_mut()
                    .system(format!("Agent selected; address it with '{prefix}<message>'."));
            }
        }
        ChatCommand::Help => session.transcript_mut().system(CHAT_HELP),
        ChatCommand::Quit => return true,
    }
    false
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

pub async fn run_chat(config: ConsoleConfig) -> Result<(), Box<dyn Error>> {
    let api = ChatApi::new(config.chat_url.clone(), config.http_timeout)?;
    let mut session = ChatSession::new(api, config.poll);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    session.refresh_status().await;
    session.load_bookmarks(None).await;
    session.load_history().await;
    session.transcript_mut().system(CHAT_HELP);
    flush_updates(&mut session, &mut stdout).await?;

    let period = config.poll.interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let generation = session.poll_generation();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick(), if session.poller().is_armed() => {
                session.poll_tick().await;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_chat_line(&line) {
                    Ok(command) => {
                        if dispatch(&mut session, command).await {
                            break;
                        }
                    }
                    Err(message) => session.transcript_mut().system(message),
                }
            }
        }
        if session.poll_generation() != generation {
            // Freshly armed: the first tick is a full interval away.
            ticker.reset();
        }
        flush_updates(&mut session, &mut stdout).await?;
    }
    info!(event = "chat_repl_exit");
    Ok(())
}
