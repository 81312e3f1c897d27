pub mod registry;
pub mod runner;
pub mod template;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use registry::ActionRegistry;

/// A named, authorized, parameterized command template.
///
/// Loaded once from the `[[actions]]` tables of the config file and
/// never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ActionDefinition {
    /// Identifier used for dispatch ("ls", "deploy", ...)
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Executable path, or a name resolved through `PATH`
    pub command: String,
    /// Child working directory, a leading `~` is expanded at run time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Names of the values the caller supplies, indexed `{0}`, `{1}`, ...
    #[serde(default)]
    pub params: Vec<String>,
    /// Argument template; each entry may contain `{i}` tokens
    #[serde(default)]
    pub args: Vec<String>,
    /// File artifact produced by the command, surfaced after the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    /// Caller identities allowed to run this action. Empty = anyone.
    #[serde(default)]
    pub authorized_users: Vec<String>,
}

impl ActionDefinition {
    /// Checks if a caller may invoke this action.
    pub fn is_authorized(&self, caller: &str) -> bool {
        self.authorized_users.is_empty() || self.authorized_users.iter().any(|u| u == caller)
    }

    /// Working directory with `~` expanded, `None` when unset or empty.
    pub fn resolved_working_dir(&self) -> Option<PathBuf> {
        self.working_dir
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .map(expand_home)
    }

    /// Output file with `~` expanded. The transport checks existence,
    /// uploads and deletes it.
    pub fn output_path(&self) -> Option<PathBuf> {
        self.output_file
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(expand_home)
    }

    /// Usage line shown in help and error replies, e.g. `` `ls` `<dir>` ``
    pub fn usage(&self) -> String {
        let mut usage = format!("`{}`", self.name);
        for param in &self.params {
            usage.push_str(&format!(" `<{param}>`"));
        }
        usage
    }
}

/// Expands a leading `~` to the home directory of the invoking user.
fn expand_home(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Captured outcome of one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// 0 means success for the wrapped command's convention
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// What `run` hands back: the result is always populated, `error`
/// tells "ran with non-zero status" apart from "could not run".
#[derive(Debug)]
pub struct RunOutcome {
    pub result: ExecutionResult,
    pub error: Option<ActionError>,
}

#[derive(Debug, Error)]
pub enum ActionError {
    /// A declared parameter has no `{i}` token in the args template.
    #[error("Action {action} is missing argument {token} for parameter {param}")]
    MissingArgumentToken {
        action: String,
        token: String,
        param: String,
    },

    /// A `{i}` token survives expansion with the declared parameters.
    #[error("Action {action} has too many tokenized arguments. {token} is not used")]
    UnusedOrOverNumberedToken { action: String, token: String },

    #[error("Action {action} is defined more than once")]
    DuplicateAction { action: String },

    #[error("{caller} is not authorized to run {action}")]
    Unauthorized { action: String, caller: String },

    #[error("Busy with another action")]
    Busy,

    #[error("Could not start {command} for action {action}: {source}")]
    LaunchFailure {
        action: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Action {action} exited with status {code}")]
    NonZeroExit { action: String, code: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_with_users(users: Vec<&str>) -> ActionDefinition {
        ActionDefinition {
            name: "deploy".to_string(),
            command: "deploy.sh".to_string(),
            authorized_users: users.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    // ── is_authorized tests ─────────────────────────────

    #[test]
    fn test_is_authorized_empty_list_allows_anyone() {
        let action = action_with_users(vec![]);
        assert!(action.is_authorized("U111"));
        assert!(action.is_authorized(""));
    }

    #[test]
    fn test_is_authorized_listed_only() {
        let action = action_with_users(vec!["U111", "U222"]);
        assert!(action.is_authorized("U111"));
        assert!(action.is_authorized("U222"));
        assert!(!action.is_authorized("U333"));
        // Exact match, no prefix or case folding
        assert!(!action.is_authorized("u111"));
        assert!(!action.is_authorized("U11"));
    }

    // ── path expansion tests ────────────────────────────

    #[test]
    fn test_output_path_absolute_unchanged() {
        let action = ActionDefinition {
            output_file: Some("/tmp/report.html".to_string()),
            ..Default::default()
        };
        assert_eq!(action.output_path(), Some(PathBuf::from("/tmp/report.html")));
    }

    #[test]
    fn test_output_path_expands_tilde() {
        let action = ActionDefinition {
            output_file: Some("~/report.html".to_string()),
            ..Default::default()
        };
        let path = action.output_path().unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with("report.html"));
    }

    #[test]
    fn test_empty_paths_are_none() {
        let action = ActionDefinition {
            working_dir: Some(String::new()),
            output_file: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(action.resolved_working_dir(), None);
        assert_eq!(action.output_path(), None);
        assert_eq!(ActionDefinition::default().output_path(), None);
    }

    #[test]
    fn test_usage_lists_params() {
        let action = ActionDefinition {
            name: "grep".to_string(),
            params: vec!["pattern".to_string(), "file".to_string()],
            ..Default::default()
        };
        assert_eq!(action.usage(), "`grep` `<pattern>` `<file>`");
    }

    #[test]
    fn test_error_messages_name_action_and_token() {
        let err = ActionError::MissingArgumentToken {
            action: "Foo".to_string(),
            token: "{0}".to_string(),
            param: "id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Action Foo is missing argument {0} for parameter id"
        );
    }

    #[test]
    fn test_deserialize_defaults() {
        let action: ActionDefinition = toml::from_str(
            r#"
            name = "ip"
            command = "ifconfig"
            "#,
        )
        .unwrap();
        assert_eq!(action.name, "ip");
        assert!(action.params.is_empty());
        assert!(action.args.is_empty());
        assert!(action.authorized_users.is_empty());
        assert_eq!(action.working_dir, None);
    }
}
