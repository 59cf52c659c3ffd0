//! Module Registry
//!
//! Maps api names to module types. A registry is built once at startup and
//! then shared (behind an `Arc`) by every Host created afterwards, so each
//! name is written exactly once.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use hostrpc_common::connection::Handler;
use hostrpc_common::{HostRpcError, Result};

use crate::context::ModuleContext;
use crate::module::{HookFuture, Module, ModuleRef};

/// Type-erased module instance as stored by a Host.
pub type AnyModule = Arc<dyn Any + Send + Sync>;

/// Everything a Host needs to build and drive one registered module type.
pub struct ModuleDescriptor {
    api_name: String,
    type_id: TypeId,
    type_name: &'static str,
    construct: fn(ModuleContext) -> Result<AnyModule>,
    bind: fn(&AnyModule) -> Vec<(String, Handler)>,
    did_mount: fn(&AnyModule) -> HookFuture,
    will_unmount: fn(&AnyModule) -> HookFuture,
}

impl ModuleDescriptor {
    fn of<M: Module>(api_name: String) -> Self {
        Self {
            api_name,
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            construct: construct::<M>,
            bind: bind::<M>,
            did_mount: did_mount::<M>,
            will_unmount: will_unmount::<M>,
        }
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn construct(&self, ctx: ModuleContext) -> Result<AnyModule> {
        (self.construct)(ctx)
    }

    pub(crate) fn bind(&self, module: &AnyModule) -> Vec<(String, Handler)> {
        (self.bind)(module)
    }

    pub(crate) fn did_mount(&self, module: &AnyModule) -> HookFuture {
        (self.did_mount)(module)
    }

    pub(crate) fn will_unmount(&self, module: &AnyModule) -> HookFuture {
        (self.will_unmount)(module)
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("api_name", &self.api_name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn construct<M: Module>(ctx: ModuleContext) -> Result<AnyModule> {
    Ok(Arc::new(M::create(ctx)?))
}

fn bind<M: Module>(module: &AnyModule) -> Vec<(String, Handler)> {
    match module.clone().downcast::<M>() {
        Ok(instance) => M::exposed_methods().bind(&instance),
        Err(_) => Vec::new(),
    }
}

fn did_mount<M: Module>(module: &AnyModule) -> HookFuture {
    match module.clone().downcast::<M>() {
        Ok(instance) => M::api_did_mount(instance),
        Err(_) => Box::pin(async { Ok(()) }),
    }
}

fn will_unmount<M: Module>(module: &AnyModule) -> HookFuture {
    match module.clone().downcast::<M>() {
        Ok(instance) => M::api_will_unmount(instance),
        Err(_) => Box::pin(async { Ok(()) }),
    }
}

/// Registered module types, by api name and by type.
///
/// # Example
///
/// ```
/// use hostrpc_common::{HostRpcError, Result};
/// use hostrpc_server::{Module, ModuleContext, Registry};
///
/// struct Echo;
/// impl Module for Echo {
///     fn create(_ctx: ModuleContext) -> Result<Self> {
///         Ok(Echo)
///     }
/// }
///
/// let mut registry = Registry::new();
/// registry.register::<Echo>("Echo").unwrap();
///
/// assert!(matches!(
///     registry.register::<Echo>("Echo"),
///     Err(HostRpcError::DuplicateRegistration(_))
/// ));
/// assert_eq!(registry.name_of::<Echo>(), Some("Echo"));
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    by_name: HashMap<String, Arc<ModuleDescriptor>>,
    by_type: HashMap<TypeId, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers module type `M` under `api_name`.
    ///
    /// # Errors
    ///
    /// Returns [`HostRpcError::DuplicateRegistration`] if the name is taken or
    /// `M` is already registered under another name; the existing
    /// registration stays valid. Returns [`HostRpcError::InvalidParams`] for
    /// an empty name or one containing `.`, which would break namespacing.
    pub fn register<M: Module>(&mut self, api_name: impl Into<String>) -> Result<()> {
        let api_name = api_name.into();

        if api_name.is_empty() || api_name.contains('.') {
            return Err(HostRpcError::InvalidParams(format!(
                "invalid module name {:?}",
                api_name
            )));
        }
        if self.by_name.contains_key(&api_name) {
            return Err(HostRpcError::DuplicateRegistration(api_name));
        }
        if let Some(existing) = self.by_type.get(&TypeId::of::<M>()) {
            return Err(HostRpcError::DuplicateRegistration(format!(
                "{} (already registered as {})",
                std::any::type_name::<M>(),
                existing
            )));
        }

        tracing::debug!(module = %api_name, "registering module");
        self.by_type.insert(TypeId::of::<M>(), api_name.clone());
        self.by_name
            .insert(api_name.clone(), Arc::new(ModuleDescriptor::of::<M>(api_name)));
        Ok(())
    }

    /// Builder-style [`Registry::register`].
    pub fn with<M: Module>(mut self, api_name: impl Into<String>) -> Result<Self> {
        self.register::<M>(api_name)?;
        Ok(self)
    }

    pub fn lookup(&self, api_name: &str) -> Option<&Arc<ModuleDescriptor>> {
        self.by_name.get(api_name)
    }

    /// Api name `M` was registered under.
    pub fn name_of<M: Module>(&self) -> Option<&str> {
        self.name_of_type(TypeId::of::<M>())
    }

    pub fn name_of_type(&self, type_id: TypeId) -> Option<&str> {
        self.by_type.get(&type_id).map(String::as_str)
    }

    /// Resolves a [`ModuleRef`] to its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`HostRpcError::UnregisteredModule`] if nothing matches.
    pub fn resolve(&self, module: &ModuleRef) -> Result<Arc<ModuleDescriptor>> {
        let name = match module {
            ModuleRef::ByName(name) => Some(name.as_str()),
            ModuleRef::ByType(type_id) => self.name_of_type(*type_id),
        };

        name.and_then(|name| self.lookup(name))
            .cloned()
            .ok_or_else(|| HostRpcError::UnregisteredModule(module.to_string()))
    }

    pub fn contains(&self, api_name: &str) -> bool {
        self.by_name.contains_key(api_name)
    }

    /// Registered api names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
