//! Program Registry
//!
//! Maps program names to the bodies processes run. Built once through
//! [`RegistryBuilder`] and read-only afterwards; the simulator shares it
//! with every process thread behind an `Arc`.

use crate::env::{ProcEnv, ProcResult};
use crate::{ProcError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A program body
pub type Program = Arc<dyn Fn(&mut ProcEnv) -> ProcResult + Send + Sync>;

/// Program Registry
#[derive(Clone, Default)]
pub struct ProgramRegistry {
    programs: BTreeMap<String, Program>,
}

impl ProgramRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Lookup a program by name
    pub fn get(&self, name: &str) -> Option<Program> {
        self.programs.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl fmt::Debug for ProgramRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Collects programs before the registry is frozen
#[derive(Default)]
pub struct RegistryBuilder {
    programs: BTreeMap<String, Program>,
}

impl RegistryBuilder {
    /// Register a program
    ///
    /// # Errors
    /// [`ProcError::DuplicateProgram`] if `name` is taken, or
    /// [`ProcError::InvalidArgument`] for an empty name.
    pub fn register<F>(mut self, name: &str, program: F) -> Result<Self>
    where
        F: Fn(&mut ProcEnv) -> ProcResult + Send + Sync + 'static,
    {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ProcError::InvalidArgument {
                program: name.to_string(),
                reason: "program names must be non-empty and contain no whitespace".into(),
            });
        }
        if self.programs.contains_key(name) {
            return Err(ProcError::DuplicateProgram { name: name.to_string() });
        }

        self.programs.insert(name.to_string(), Arc::new(program));
        Ok(self)
    }

    pub fn build(self) -> ProgramRegistry {
        ProgramRegistry { programs: self.programs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = ProgramRegistry::builder()
            .register("b", |_| Ok(()))
            .unwrap()
            .register("a", |_| Ok(()))
            .unwrap()
            .build();

        assert!(registry.contains("a"));
        assert!(registry.get("b").is_some());
        assert!(registry.get("c").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_rejected() {
        let result = ProgramRegistry::builder()
            .register("a", |_| Ok(()))
            .unwrap()
            .register("a", |_| Ok(()));
        assert!(matches!(result, Err(ProcError::DuplicateProgram { name }) if name == "a"));
    }

    #[test]
    fn test_bad_name_rejected() {
        assert!(ProgramRegistry::builder().register("", |_| Ok(())).is_err());
        assert!(ProgramRegistry::builder().register("two words", |_| Ok(())).is_err());
    }
}
