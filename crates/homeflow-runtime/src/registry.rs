use homeflow_core::Operator;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available operators, keyed by lower-cased name
#[derive(Default)]
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn Operator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator, returning the one it replaced
    pub fn register(&mut self, operator: Arc<dyn Operator>) -> Option<Arc<dyn Operator>> {
        let name = operator.name().to_lowercase();
        tracing::debug!("Registering operator: {}", name);
        let replaced = self.operators.insert(name, operator);
        if let Some(old) = &replaced {
            tracing::warn!("Operator \"{}\" was already registered and has been replaced", old.name());
        }
        replaced
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operator>> {
        self.operators.get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operators.keys().cloned().collect();
        names.sort();
        names
    }

    /// All operators, for calls that must not hold the registry lock
    pub fn snapshot(&self) -> Vec<Arc<dyn Operator>> {
        self.operators.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}
