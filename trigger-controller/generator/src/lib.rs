//! Gateway Configuration Generator
//!
//! Builds the configuration for every accepted gateway owned by this
//! controller from the objects observed so far. Alongside the configuration,
//! each generation reports the references it followed: every gateway, route,
//! listener filter and policy it emitted, with the objects each one pulled
//! in. The scheduler commits those references to the index that decides
//! which future events warrant a rebuild.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
mod emit;


pub use self::{
    config::{
        BackendConfig, Configuration, FilterConfig, GatewayConfig, ListenerConfig, PolicyConfig,
        RouteConfig,
    },
    emit::emit,
};

use gateway_trigger_k8s_index::Store;
use gateway_trigger_scheduler::{Generate, Generation};

/// Generates configuration from a snapshot of the object store.
#[derive(Clone, Debug)]
pub struct ConfigGenerator {
    store: Store,
    controller_name: String,
}

impl ConfigGenerator {
    pub fn new(store: Store, controller_name: impl Into<String>) -> Self {
        Self {
            store,
            controller_name: controller_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl Generate for ConfigGenerator {
    type Artifact = Configuration;

    /// Emits on the blocking pool, so a slow emission holds neither a
    /// runtime worker nor the scheduler's deadline.
    async fn generate(&self) -> anyhow::Result<Generation<Configuration>> {
        let store = self.store.clone();
        let controller_name = self.controller_name.clone();
        tokio::task::spawn_blocking(move || emit(&store.snapshot(), &controller_name)).await?
    }
}
