//! # Config Prefabs for Well-Known Model Configurations

use crate::cache::weights::{PretrainedWeightsMap, StaticPretrainedWeightsMap};
use anyhow::bail;
use burn::config::Config;
use std::fmt::Debug;

/// Static builder for a well-known config.
pub struct StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: &'static str,

    /// Description of the model config pre-fab.
    pub description: &'static str,

    /// Builder function for the config.
    pub builder: fn() -> C,

    /// Optional pretrained weights for this config.
    pub weights: Option<&'static StaticPretrainedWeightsMap<'static>>,
}

impl<C> StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Build a new config.
    pub fn new_config(&self) -> C {
        (self.builder)()
    }

    /// The pretrained weights directory; empty when there are none.
    pub fn weights_directory(&self) -> PretrainedWeightsMap {
        self.weights
            .map(|w| w.to_directory())
            .unwrap_or_default()
    }
}

impl<C> Debug for StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let type_name = std::any::type_name::<C>();
        let alternate = f.alternate();
        let mut handle = f.debug_struct(&format!("StaticPreFabConfig<{type_name}>"));

        handle
            .field("name", &self.name)
            .field("description", &self.description);

        if alternate {
            handle.field("config", &self.new_config());
        }

        handle.finish()
    }
}

/// A named table of [`StaticPreFabConfig`]s.
#[derive(Debug)]
pub struct StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the family.
    pub name: &'static str,

    /// Description of the family.
    pub description: &'static str,

    /// Members.
    pub items: &'static [&'static StaticPreFabConfig<C>],
}

impl<C> StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Names of every member.
    pub fn names(&self) -> Vec<&'static str> {
        self.items.iter().map(|p| p.name).collect()
    }

    /// Lookup a member by name.
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<&'static StaticPreFabConfig<C>> {
        self.items.iter().copied().find(|p| p.name == name)
    }

    /// Lookup a member by name.
    pub fn try_lookup(
        &self,
        name: &str,
    ) -> anyhow::Result<&'static StaticPreFabConfig<C>> {
        match self.lookup(name) {
            Some(p) => Ok(p),
            None => bail!(
                "no {} prefab named {name:?}; expected one of {:?}",
                self.name,
                self.names()
            ),
        }
    }
}
