/// Parsing of chat input and rendering of replies.
///
/// Kept free of I/O so the router rules can be tested directly.
use crate::action::{ActionDefinition, ActionError, ActionRegistry, RunOutcome};

/// A chat line, split into what the router needs.
#[derive(Debug, PartialEq)]
pub enum Request<'a> {
    Help,
    Run { action: &'a str, rest: &'a str },
}

pub fn parse_request(body: &str) -> Option<Request<'_>> {
    let body = body.trim();
    let (head, rest) = match body.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (body, ""),
    };
    match head {
        "" => None,
        "help" => Some(Request::Help),
        action => Some(Request::Run { action, rest }),
    }
}

/// Caller values for an action, `None` if a declared param is missing.
///
/// The rest of the line is split on whitespace and every word becomes a
/// value, in order. There must be at least one word per declared param;
/// extra words are passed along too. An action without params gets no
/// values.
pub fn parse_args(def: &ActionDefinition, rest: &str) -> Option<Vec<String>> {
    if def.params.is_empty() {
        return Some(Vec::new());
    }
    let words: Vec<String> = rest.split_whitespace().map(String::from).collect();
    (words.len() >= def.params.len()).then_some(words)
}

/// One line per action: `` `name` `<param>` - _description_ ``
pub fn help_text(registry: &ActionRegistry) -> String {
    if registry.is_empty() {
        return "No actions are configured.".to_string();
    }
    registry
        .iter()
        .map(|def| {
            let description = if def.description.is_empty() {
                &def.name
            } else {
                &def.description
            };
            format!("{} - _{description}_", def.usage())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reply for an invocation that was turned down before running.
pub fn rejection_text(def: &ActionDefinition, error: &ActionError) -> String {
    match error {
        ActionError::Unauthorized { .. } => {
            format!("You are not authorized to run `{}`.", def.name)
        }
        ActionError::Busy => "Busy with another action. Please wait...".to_string(),
        other => format!("_Error:_\n{other}"),
    }
}

/// Replies for a finished run, in the order they are sent.
pub fn result_messages(outcome: &RunOutcome) -> Vec<String> {
    let result = &outcome.result;
    let mut messages = vec![
        format!("*ExitCode: {}*", result.exit_code),
        format!("_Output:_\n{}", result.stdout),
    ];

    if let Some(error) = &outcome.error {
        let error = error.to_string();
        let stderr = result.stderr.trim();
        if stderr.is_empty() || error.contains(stderr) {
            messages.push(format!("_Error:_\n{error}"));
        } else {
            messages.push(format!("_Error:_\n{error}\n{stderr}"));
        }
    }
    messages
}
