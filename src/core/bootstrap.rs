use bytes::Bytes;

/// Initialization ordering for registered entry points, from earliest to
/// latest. Entries in the same class run in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadOrder {
    SubsystemRegistration,
    AfterModulesLoaded,
    BeforeSplash,
    BeforeBoot,
    AfterBoot,
}

pub type EntryFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

pub struct EntryPoint {
    pub name: String,
    pub order: LoadOrder,
    pub run: EntryFn,
}

/// Ordered registry of module entry points. Modules register explicitly at
/// load time; nothing is discovered by introspection.
#[derive(Default)]
pub struct EntryPointRegistry {
    entries: Vec<EntryPoint>,
}

impl EntryPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, order: LoadOrder, run: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.entries.push(EntryPoint {
            name: name.into(),
            order,
            run: Box::new(run),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stable sort: order class first, registration order within a class.
    pub fn into_ordered(self) -> Vec<EntryPoint> {
        let mut entries = self.entries;
        entries.sort_by_key(|e| e.order);
        entries
    }
}

/// Runtime-specific loading of hot-update modules and stripped AOT metadata.
/// The launcher only calls this after both load stages have succeeded.
pub trait ModuleBootstrap: Send + Sync {
    /// Load the module blobs and register their entry points.
    fn load_modules(&self, modules: &[Bytes], registry: &mut EntryPointRegistry) -> anyhow::Result<()>;

    /// Feed the stripped AOT metadata blobs to the runtime.
    fn load_aot_metadata(&self, blobs: &[Bytes]) -> anyhow::Result<()>;
}

/// Inventory-only bootstrap used by the CLI: checks the blobs are plausible
/// and registers nothing, so a launch can be rehearsed without a runtime.
pub struct ManifestBootstrap;

impl ModuleBootstrap for ManifestBootstrap {
    fn load_modules(&self, modules: &[Bytes], _registry: &mut EntryPointRegistry) -> anyhow::Result<()> {
        for (idx, module) in modules.iter().enumerate() {
            if module.is_empty() {
                anyhow::bail!("hot-update module #{idx} is empty");
            }
        }
        Ok(())
    }

    fn load_aot_metadata(&self, blobs: &[Bytes]) -> anyhow::Result<()> {
        for (idx, blob) in blobs.iter().enumerate() {
            if blob.is_empty() {
                anyhow::bail!("aot metadata blob #{idx} is empty");
            }
        }
        Ok(())
    }
}
