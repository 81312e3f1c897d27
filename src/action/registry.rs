/// Registry of the actions the bot accepts.
///
/// Every action is validated on the way in, so a malformed template is
/// refused at startup instead of failing when somebody calls it.
/// Lookup is by name; iteration keeps the config file order (help text).
use std::collections::HashMap;

use tracing::{info, warn};

use super::template;
use super::{ActionDefinition, ActionError};

#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: Vec<ActionDefinition>,
    by_name: HashMap<String, usize>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from config, skipping (and returning) the
    /// actions that fail validation.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = ActionDefinition>,
    ) -> (Self, Vec<ActionError>) {
        let mut registry = Self::new();
        let mut rejected = Vec::new();
        for def in definitions {
            if let Err(e) = registry.register(def) {
                warn!("Refusing action: {e}");
                rejected.push(e);
            }
        }
        (registry, rejected)
    }

    /// Validates and adds an action. Names must be unique.
    pub fn register(&mut self, def: ActionDefinition) -> Result<(), ActionError> {
        if self.by_name.contains_key(&def.name) {
            return Err(ActionError::DuplicateAction { action: def.name });
        }
        template::validate(&def)?;

        info!("Registered action: {}", def.name);
        self.by_name.insert(def.name.clone(), self.actions.len());
        self.actions.push(def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.by_name.get(name).map(|&i| &self.actions[i])
    }

    /// Registered actions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
