// src/commands/registry.rs
use std::collections::HashMap;
use std::sync::Arc;

use super::types::Command;

pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// All stock command implementations.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::add_var::AddVar));
        registry.register(Arc::new(super::add_result::AddResult));
        registry.register(Arc::new(super::add_param::AddParam));
        registry.register(Arc::new(super::cond_if::IfCommand));
        registry.register(Arc::new(super::start_loop::StartLoop));
        registry.register(Arc::new(super::request_get::RequestGet));
        registry.register(Arc::new(super::try_cmd::TryCommand));
        registry.register(Arc::new(super::exception_cmd::ExceptionCommand));
        registry.register(Arc::new(super::block_markers::End));
        registry.register(Arc::new(super::block_markers::Else));
        registry.register(Arc::new(super::block_markers::EndLoop));
        registry
    }

    pub fn register(&mut self, cmd: Arc<dyn Command>) {
        self.commands.insert(cmd.name().to_string(), cmd);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(|s| s.as_str()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Arc<dyn Command>)> {
        self.commands.iter()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_set() {
        let registry = CommandRegistry::builtin();
        for name in [
            "addVar",
            "addResult",
            "addParam",
            "if",
            "startLoop",
            "RequestGet",
            "try",
            "exception",
            "end",
            "else",
            "endLoop",
        ] {
            assert!(registry.contains(name), "missing builtin {}", name);
        }
    }
}
