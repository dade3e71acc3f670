//! Registry of named exchanges

use crate::exchange::Exchange;
use crate::matcher::ExchangeMode;
use crate::sink::{DiagnosticSink, TracingSink};
use crate::{ExchangeError, Result};
use courier_config::Config;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Named exchanges sharing one diagnostic sink
#[derive(Clone)]
pub struct ExchangeRegistry {
    exchanges: Arc<DashMap<String, Arc<Exchange>>>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ExchangeRegistry {
    /// Create an empty registry logging handler failures through `tracing`
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Create an empty registry whose exchanges report to `sink`
    pub fn with_sink(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            exchanges: Arc::new(DashMap::new()),
            sink,
        }
    }

    /// Declare every exchange listed in the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Self::new();
        registry.declare_all(config)?;
        Ok(registry)
    }

    /// Declare every exchange listed in the configuration on this registry
    pub fn declare_all(&self, config: &Config) -> Result<()> {
        for settings in &config.exchanges {
            let mode: ExchangeMode = settings.mode.parse()?;
            self.declare(&settings.name, mode)?;
        }
        Ok(())
    }

    /// Declare an exchange.
    ///
    /// Declaring an existing name with the same mode returns the existing
    /// exchange; a different mode fails with `ModeMismatch`.
    pub fn declare(&self, name: &str, mode: ExchangeMode) -> Result<Arc<Exchange>> {
        match self.exchanges.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let existing = Arc::clone(entry.get());
                if existing.mode() != mode {
                    return Err(ExchangeError::ModeMismatch {
                        name: name.to_string(),
                        existing: existing.mode(),
                        requested: mode,
                    });
                }
                Ok(existing)
            }
            Entry::Vacant(entry) => {
                let exchange = Arc::new(
                    Exchange::builder()
                        .name(name)
                        .mode(mode)
                        .shared_sink(Arc::clone(&self.sink))
                        .build(),
                );
                entry.insert(Arc::clone(&exchange));
                info!(exchange = %name, mode = %mode, "Exchange declared");
                Ok(exchange)
            }
        }
    }

    /// Get an exchange by name
    pub fn get(&self, name: &str) -> Option<Arc<Exchange>> {
        self.exchanges.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove an exchange; handles already held keep working
    pub fn remove(&self, name: &str) -> Option<Arc<Exchange>> {
        let removed = self.exchanges.remove(name).map(|(_, exchange)| exchange);
        if removed.is_some() {
            info!(exchange = %name, "Exchange removed");
        }
        removed
    }

    /// Sorted exchange names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .exchanges
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.exchanges.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeRegistry")
            .field("exchanges", &self.names())
            .finish()
    }
}
