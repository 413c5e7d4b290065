use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ferry_api::plugin::{PluginRole, ReaderPlugin, WriterPlugin};

use crate::error::EngineError;

/// Reader and writer plugins addressed by their `name`.
///
/// Built explicitly and handed to the scheduler; tests build their own.
#[derive(Default)]
pub struct PluginRegistry {
    readers: HashMap<String, Arc<dyn ReaderPlugin>>,
    writers: HashMap<String, Arc<dyn WriterPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_reader(&mut self, plugin: Arc<dyn ReaderPlugin>) -> Result<(), EngineError> {
        let name = plugin.plugin_conf().get_string("name")?;
        if self.readers.contains_key(&name) {
            return Err(EngineError::Config(format!("reader '{name}' registered twice")));
        }
        tracing::debug!(reader = %name, "registered reader plugin");
        self.readers.insert(name, plugin);
        Ok(())
    }

    pub fn register_writer(&mut self, plugin: Arc<dyn WriterPlugin>) -> Result<(), EngineError> {
        let name = plugin.plugin_conf().get_string("name")?;
        if self.writers.contains_key(&name) {
            return Err(EngineError::Config(format!("writer '{name}' registered twice")));
        }
        tracing::debug!(writer = %name, "registered writer plugin");
        self.writers.insert(name, plugin);
        Ok(())
    }

    pub fn reader(&self, name: &str) -> Result<Arc<dyn ReaderPlugin>, EngineError> {
        self.readers
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::PluginNotFound {
                role: PluginRole::Reader,
                name: name.to_string(),
            })
    }

    pub fn writer(&self, name: &str) -> Result<Arc<dyn WriterPlugin>, EngineError> {
        self.writers
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::PluginNotFound {
                role: PluginRole::Writer,
                name: name.to_string(),
            })
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("readers", &self.readers.keys().collect::<Vec<_>>())
            .field("writers", &self.writers.keys().collect::<Vec<_>>())
            .finish()
    }
}
