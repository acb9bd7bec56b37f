//! Exported variables.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

type Producer = Arc<dyn Fn() -> Value + Send + Sync>;

/// A registry of named values rendered at `/debug/vars`.
///
/// Each variable is a closure evaluated on every read, so published values
/// are always current. Clones share the registry.
#[derive(Clone)]
pub struct Vars {
    entries: Arc<RwLock<BTreeMap<String, Producer>>>,
}

impl Vars {
    /// A registry that already exports the process command line as
    /// `cmdline`.
    pub fn new() -> Self {
        let vars = Self { entries: Arc::default() };
        vars.publish("cmdline", || {
            Value::from(std::env::args().collect::<Vec<_>>())
        });
        vars
    }

    /// Publishes `name`, replacing any variable already published under it.
    pub fn publish<F>(&self, name: &str, producer: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.entries.write().insert(name.to_owned(), Arc::new(producer));
    }

    /// Evaluates every variable into one JSON object, sorted by name.
    pub fn to_json(&self) -> Value {
        // Clone the producers out so none runs under the lock.
        let entries: Vec<(String, Producer)> = self
            .entries
            .read()
            .iter()
            .map(|(name, producer)| (name.clone(), Arc::clone(producer)))
            .collect();

        Value::Object(
            entries
                .into_iter()
                .map(|(name, producer)| (name, producer()))
                .collect(),
        )
    }
}

impl Default for Vars {
    fn default() -> Self {
        Self::new()
    }
}
