//! # Provider Registry
//!
//! Explicit, ordered list of providers, invokers and supplied values.
//!
//! Registration never fails; structural problems (duplicate producers,
//! cycles, missing inputs) are detected when a resolution is planned, before
//! any provider runs. Registration order is significant: it fixes the order
//! in which independent invokers run and the order cycle detection walks the
//! graph, so two resolutions over the same registry behave identically.
//!
//! Registries compose: a base configuration (the application's module set)
//! is extended with caller overrides (supplied global config, extra
//! providers) to form the registry that is finally resolved.

use std::any::Any;
use std::sync::Arc;

use crate::error::InjectError;
use crate::key::{TypeKey, Value};
use crate::provider::{Invoker, Provider};
use crate::resolver::{ResolvedValues, Resolver};

/// A concrete value handed to the resolver as a zero-input leaf.
#[derive(Clone)]
pub struct Supply {
    pub(crate) key: TypeKey,
    pub(crate) value: Value,
}

impl Supply {
    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }
}

/// Ordered set of providers, invokers and supplied values.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<Provider>>,
    invokers: Vec<Arc<Invoker>>,
    supplies: Vec<Supply>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider.
    pub fn provide(&mut self, provider: Provider) -> &mut Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Register an invoker.
    pub fn invoke(&mut self, invoker: Invoker) -> &mut Self {
        self.invokers.push(Arc::new(invoker));
        self
    }

    /// Supply a concrete value for `T`.
    ///
    /// A supplied value takes precedence over any provider of `T`; that
    /// provider is then never invoked for it.
    pub fn supply<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.supply_arc(Arc::new(value))
    }

    /// Supply an already shared value for `T`.
    pub fn supply_arc<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> &mut Self {
        self.supplies.push(Supply {
            key: TypeKey::of::<T>(),
            value,
        });
        self
    }

    /// Append everything registered in `other`, after this registry's entries.
    pub fn extend(&mut self, other: &ProviderRegistry) -> &mut Self {
        self.providers.extend(other.providers.iter().cloned());
        self.invokers.extend(other.invokers.iter().cloned());
        self.supplies.extend(other.supplies.iter().cloned());
        self
    }

    #[must_use]
    pub fn providers(&self) -> &[Arc<Provider>] {
        &self.providers
    }

    #[must_use]
    pub fn invokers(&self) -> &[Arc<Invoker>] {
        &self.invokers
    }

    #[must_use]
    pub fn supplies(&self) -> &[Supply] {
        &self.supplies
    }

    /// Materialize `requested` (and run every invoker).
    pub fn resolve(&self, requested: &[TypeKey]) -> Result<ResolvedValues, InjectError> {
        Resolver::new(self).resolve(requested)
    }
}

/// Compose registries in order, later entries after earlier ones.
#[must_use]
pub fn configs<'a>(registries: impl IntoIterator<Item = &'a ProviderRegistry>) -> ProviderRegistry {
    let mut merged = ProviderRegistry::new();
    for registry in registries {
        merged.extend(registry);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::provide0;

    #[test]
    fn test_extend_preserves_order() {
        let mut base = ProviderRegistry::new();
        base.provide(provide0("first", || Ok(1u8)));

        let mut overrides = ProviderRegistry::new();
        overrides
            .provide(provide0("second", || Ok(2u16)))
            .supply(3u32);

        let merged = configs([&base, &overrides]);
        let ids: Vec<&str> = merged.providers().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(merged.supplies().len(), 1);
        assert_eq!(merged.supplies()[0].key(), TypeKey::of::<u32>());
    }
}
