use std::collections::HashMap;

use log::debug;

use crate::config::BlockConfig;
use crate::error::{Error, Result};
use crate::models::mmcf::MmcfModel;
use crate::problem::Problem;

/// Creates a model of some kind out of problem data and block defaults
pub type Factory = fn(Problem, BlockConfig) -> MmcfModel;

/// The model kinds that can be created by name. Nothing is registered until asked to.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    factories: HashMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// A registry holding the models of this crate
    pub fn with_defaults() -> Registry {
        let mut registry = Registry::new();
        registry.register("mmcf", MmcfModel::with_config);
        registry
    }

    /// Registers `factory` under `name`, returning the factory it replaces
    pub fn register(&mut self, name: &str, factory: Factory) -> Option<Factory> {
        debug!("registering model kind {}", name);
        self.factories.insert(name.to_string(), factory)
    }

    pub fn create(
        &self,
        name: &str,
        problem: Problem,
        block_config: BlockConfig,
    ) -> Result<MmcfModel> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown model kind {}", name)))?;
        Ok(factory(problem, block_config))
    }

    /// The registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names = self.factories.keys().map(|s| s.as_str()).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}
