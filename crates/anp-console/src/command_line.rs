use anp_core::{InstanceRole, LaunchParams};

pub const COMMAND_HELP: &str = "start server [port=..] | start client [port=..] [name=..] [message=..] | start agent name=.. [port=..] [did=..] [url=..] | stop [ID] | view [ID] | clear | scroll";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCommand {
    Start(LaunchParams),
    Stop(Option<String>),
    View(Option<String>),
    Clear,
    ToggleScroll,
}

/// Parse one line typed at the manager's `:` prompt. `message=` swallows the
/// rest of the line so client greetings can contain spaces.
pub fn parse_manager_command(input: &str) -> Result<ManagerCommand, String> {
    let mut tokens = input.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Err("empty command".to_string());
    };
    match verb.to_ascii_lowercase().as_str() {
        "start" => {
            let role: InstanceRole = tokens
                .next()
                .ok_or_else(|| "start needs a role: server, client or agent".to_string())?
                .parse()?;
            let rest: Vec<&str> = tokens.collect();
            parse_launch_params(role, &rest).map(ManagerCommand::Start)
        }
        "stop" => Ok(ManagerCommand::Stop(single_optional_id(tokens)?)),
        "view" => Ok(ManagerCommand::View(single_optional_id(tokens)?)),
        "clear" => Ok(ManagerCommand::Clear),
        "scroll" => Ok(ManagerCommand::ToggleScroll),
        other => Err(format!("unknown command: {other}")),
    }
}

fn single_optional_id<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Result<Option<String>, String> {
    let id = tokens.next().map(str::to_string);
    if tokens.next().is_some() {
        return Err("expected at most one instance id".to_string());
    }
    Ok(id)
}

/// Parameter keys the launcher understands for each role.
fn allowed_keys(role: InstanceRole) -> &'static [&'static str] {
    match role {
        InstanceRole::Server => &["port"],
        InstanceRole::Client => &["port", "name", "message"],
        InstanceRole::Agent => &["name", "port", "did", "url"],
    }
}

fn parse_launch_params(role: InstanceRole, tokens: &[&str]) -> Result<LaunchParams, String> {
    let mut params = LaunchParams::new(role);
    let allowed = allowed_keys(role);
    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index];
        let Some((key, value)) = token.split_once('=') else {
            return Err(format!("expected key=value, got '{token}'"));
        };
        if !allowed.contains(&key) {
            return Err(format!(
                "{role} does not take '{key}' (allowed: {})",
                allowed.join(", ")
            ));
        }
        match key {
            "message" => {
                let mut text = value.to_string();
                for extra in &tokens[index + 1..] {
                    text.push(' ');
                    text.push_str(extra);
                }
                params.message = non_empty(&text);
                break;
            }
            "name" => params.name = non_empty(value),
            "did" => params.did = non_empty(value),
            "url" => params.url = non_empty(value),
            "port" => {
                let port = value
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port '{value}'"))?;
                params.port = Some(port);
            }
            other => return Err(format!("unknown parameter '{other}'")),
        }
        index += 1;
    }
    Ok(params)
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
