//! Kernel spec registry.
//!
//! A host registers each kernel it offers under its spec name, together with
//! a factory that starts one. Front-ends list specs and start kernels by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use hashi_types::KernelSpec;

use crate::config::HashiConfig;
use crate::engine::EngineLoader;
use crate::kernel::{KernelHandle, spawn_kernel_boxed};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("kernel spec already registered: {0}")]
    Duplicate(String),
    #[error("no kernel spec named {0}")]
    Unknown(String),
}

/// Starts kernels of one kind.
///
/// `create` spawns onto the current tokio runtime.
pub trait KernelFactory: Send + Sync {
    fn create(&self) -> KernelHandle;
}

/// Factory for hashi kernels: a config plus a way to build a fresh engine
/// loader for each kernel.
pub struct HashiKernelFactory<F> {
    config: HashiConfig,
    loader: F,
}

impl<F> HashiKernelFactory<F>
where
    F: Fn() -> Box<dyn EngineLoader> + Send + Sync,
{
    pub fn new(config: HashiConfig, loader: F) -> Self {
        Self { config, loader }
    }

    pub fn config(&self) -> &HashiConfig {
        &self.config
    }
}

impl<F> KernelFactory for HashiKernelFactory<F>
where
    F: Fn() -> Box<dyn EngineLoader> + Send + Sync,
{
    fn create(&self) -> KernelHandle {
        spawn_kernel_boxed((self.loader)(), &self.config)
    }
}

struct Registered {
    spec: KernelSpec,
    factory: Arc<dyn KernelFactory>,
}

/// Specs by name.
#[derive(Default)]
pub struct KernelSpecs {
    specs: BTreeMap<String, Registered>,
}

impl KernelSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        spec: KernelSpec,
        factory: Arc<dyn KernelFactory>,
    ) -> Result<(), SpecError> {
        if self.specs.contains_key(&spec.name) {
            return Err(SpecError::Duplicate(spec.name));
        }
        tracing::info!(name = %spec.name, display_name = %spec.display_name, "kernel spec registered");
        self.specs.insert(spec.name.clone(), Registered { spec, factory });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&KernelSpec> {
        self.specs.get(name).map(|r| &r.spec)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Start a kernel by spec name.
    pub fn create(&self, name: &str) -> Result<KernelHandle, SpecError> {
        let registered = self
            .specs
            .get(name)
            .ok_or_else(|| SpecError::Unknown(name.to_string()))?;
        tracing::debug!(name, "starting kernel");
        Ok(registered.factory.create())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
