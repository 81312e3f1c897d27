use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::action::ActionDefinition;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Only messages from this channel are answered. Unset = every channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConsoleConfig {
    /// Identity of whoever types on the console, matched against
    /// `authorized_users`
    #[serde(default = "default_console_user")]
    pub user: String,
}

fn default_name() -> String {
    "chatops".to_string()
}

fn default_console_user() -> String {
    "console".to_string()
}

/// Unknown variables are left as written.
fn expand_env_vars(value: &str) -> String {
    shellexpand::env_with_context_no_errors(value, |var| std::env::var(var).ok()).into_owned()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            channel: None,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            user: default_console_user(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parses TOML, then expands `${VAR}` references in the bot settings.
    ///
    /// Action fields are kept as written: `$PWD` or `$1` in an argument
    /// belongs to the command, not to the bot's environment.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.chat.name = expand_env_vars(&config.chat.name);
        config.chat.channel = config.chat.channel.as_deref().map(expand_env_vars);
        config.console.user = expand_env_vars(&config.console.user);
        Ok(config)
    }

    /// Starter configuration with a few sample actions for this OS.
    pub fn sample() -> Self {
        let actions = if cfg!(windows) {
            vec![
                ActionDefinition {
                    name: "ip".to_string(),
                    description: "Show your IP address(s)".to_string(),
                    command: "cmd".to_string(),
                    args: vec!["/C".to_string(), "ipconfig".to_string()],
                    ..Default::default()
                },
                ActionDefinition {
                    name: "dir".to_string(),
                    description: "List directory content".to_string(),
                    command: "cmd".to_string(),
                    args: vec!["/C".to_string(), "dir".to_string()],
                    authorized_users: vec!["UC1111111".to_string()],
                    ..Default::default()
                },
            ]
        } else {
            vec![
                ActionDefinition {
                    name: "ip".to_string(),
                    description: "Show your IP address(s)".to_string(),
                    command: "ifconfig".to_string(),
                    ..Default::default()
                },
                ActionDefinition {
                    name: "ls".to_string(),
                    description: "List directory content".to_string(),
                    command: "ls".to_string(),
                    args: vec!["-la".to_string()],
                    authorized_users: vec!["UC1111111".to_string()],
                    ..Default::default()
                },
                ActionDefinition {
                    name: "grep".to_string(),
                    description: "Search a file in your home directory".to_string(),
                    command: "grep".to_string(),
                    working_dir: Some("~".to_string()),
                    params: vec!["pattern".to_string(), "file".to_string()],
                    args: vec!["-n".to_string(), "{0}".to_string(), "{1}".to_string()],
                    ..Default::default()
                },
            ]
        };

        Self {
            chat: ChatConfig {
                name: default_name(),
                channel: Some("<CHAT CHANNEL>".to_string()),
            },
            console: ConsoleConfig::default(),
            actions,
        }
    }

    /// Serializes the configuration back to TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn write(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
