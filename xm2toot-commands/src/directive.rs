//! Directive trait and registry

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Directive errors
#[derive(Debug, thiserror::Error)]
pub enum DirectiveError {
    #[error("Lookup failed: {0}")]
    LookupFailed(String),
}

pub type Result<T> = std::result::Result<T, DirectiveError>;

/// A command the bot answers in the room
#[async_trait]
pub trait Directive: Send + Sync {
    /// Word that selects the directive
    fn name(&self) -> &str;

    /// Run the directive and produce the reply text
    async fn execute(&self) -> Result<String>;

    /// Reply sent to the room when `execute` fails
    fn failure_reply(&self) -> String {
        format!("Sorry, the {} lookup failed.", self.name())
    }
}

/// Registry of available directives
pub struct DirectiveRegistry {
    directives: HashMap<String, Arc<dyn Directive>>,
}

impl DirectiveRegistry {
    pub fn new() -> Self {
        Self {
            directives: HashMap::new(),
        }
    }

    /// Register a directive, replacing one with the same name
    pub fn register(&mut self, directive: Arc<dyn Directive>) {
        let name = directive.name().to_string();
        self.directives.insert(name, directive);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Directive>> {
        self.directives.get(name).cloned()
    }

    /// Registered directive names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.directives.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}
