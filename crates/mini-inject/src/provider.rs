//! # Providers and Invokers
//!
//! A [`Provider`] is a named construction function with declared input and
//! output types. An [`Invoker`] declares inputs only and runs for its side
//! effects. Both receive their inputs through [`Inputs`], which refuses any
//! type the record did not declare, so the declared graph is the real graph.
//!
//! ## Declaring providers
//!
//! ```rust,ignore
//! let provider = Provider::new("app.store")
//!     .input::<StoreConfig>()
//!     .output::<Store>()
//!     .build(|inputs| {
//!         let config = inputs.get::<StoreConfig>()?;
//!         Ok(Outputs::new().with(Store::open(&config)?))
//!     });
//!
//! // Single-output shorthand
//! let same = provide1("app.store", |config: &StoreConfig| Store::open(config));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::InjectError;
use crate::key::{TypeKey, Value};

type ProviderFn = Box<dyn Fn(&Inputs<'_>) -> anyhow::Result<Outputs> + Send + Sync>;
type InvokerFn = Box<dyn Fn(&Inputs<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Read-only view of the values a provider declared as inputs.
pub struct Inputs<'a> {
    owner: &'a str,
    declared: &'a [TypeKey],
    values: &'a HashMap<TypeKey, Value>,
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(
        owner: &'a str,
        declared: &'a [TypeKey],
        values: &'a HashMap<TypeKey, Value>,
    ) -> Self {
        Self {
            owner,
            declared,
            values,
        }
    }

    /// Shared handle to a declared input.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, InjectError> {
        let key = TypeKey::of::<T>();
        if !self.declared.contains(&key) {
            return Err(InjectError::UndeclaredInput {
                provider: self.owner.to_string(),
                type_name: key.name(),
            });
        }
        let value = self.values.get(&key).ok_or(InjectError::NotResolved {
            type_name: key.name(),
        })?;
        Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| InjectError::NotResolved {
                type_name: key.name(),
            })
    }

    /// Owned copy of a declared input.
    pub fn cloned<T: Any + Send + Sync + Clone>(&self) -> Result<T, InjectError> {
        self.get::<T>().map(|value| (*value).clone())
    }
}

/// Values produced by one provider invocation.
#[derive(Default)]
pub struct Outputs {
    values: Vec<(TypeKey, Value)>,
}

impl Outputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output, builder style.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.put(value);
        self
    }

    /// Add an output.
    pub fn put<T: Any + Send + Sync>(&mut self, value: T) {
        self.put_arc(Arc::new(value));
    }

    /// Add an output that is already shared.
    pub fn put_arc<T: Any + Send + Sync>(&mut self, value: Arc<T>) {
        self.values.push((TypeKey::of::<T>(), value));
    }

    pub(crate) fn into_values(self) -> Vec<(TypeKey, Value)> {
        self.values
    }
}

/// A named construction function with typed inputs and outputs.
pub struct Provider {
    id: String,
    inputs: Vec<TypeKey>,
    outputs: Vec<TypeKey>,
    func: ProviderFn,
}

impl Provider {
    /// Start declaring a provider.
    pub fn new(id: impl Into<String>) -> ProviderBuilder {
        ProviderBuilder {
            id: id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn inputs(&self) -> &[TypeKey] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[TypeKey] {
        &self.outputs
    }

    pub(crate) fn call(&self, inputs: &Inputs<'_>) -> anyhow::Result<Outputs> {
        (self.func)(inputs)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`Provider::new`].
pub struct ProviderBuilder {
    id: String,
    inputs: Vec<TypeKey>,
    outputs: Vec<TypeKey>,
}

impl ProviderBuilder {
    #[must_use]
    pub fn input<T: Any>(mut self) -> Self {
        self.inputs.push(TypeKey::of::<T>());
        self
    }

    #[must_use]
    pub fn output<T: Any>(mut self) -> Self {
        self.outputs.push(TypeKey::of::<T>());
        self
    }

    pub fn build<F>(self, func: F) -> Provider
    where
        F: Fn(&Inputs<'_>) -> anyhow::Result<Outputs> + Send + Sync + 'static,
    {
        Provider {
            id: self.id,
            inputs: self.inputs,
            outputs: self.outputs,
            func: Box::new(func),
        }
    }
}

/// A side-effect-only function run once its inputs are resolved.
pub struct Invoker {
    id: String,
    inputs: Vec<TypeKey>,
    func: InvokerFn,
}

impl Invoker {
    /// Start declaring an invoker.
    pub fn new(id: impl Into<String>) -> InvokerBuilder {
        InvokerBuilder {
            id: id.into(),
            inputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn inputs(&self) -> &[TypeKey] {
        &self.inputs
    }

    pub(crate) fn call(&self, inputs: &Inputs<'_>) -> anyhow::Result<()> {
        (self.func)(inputs)
    }
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`Invoker::new`].
pub struct InvokerBuilder {
    id: String,
    inputs: Vec<TypeKey>,
}

impl InvokerBuilder {
    #[must_use]
    pub fn input<T: Any>(mut self) -> Self {
        self.inputs.push(TypeKey::of::<T>());
        self
    }

    pub fn build<F>(self, func: F) -> Invoker
    where
        F: Fn(&Inputs<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Invoker {
            id: self.id,
            inputs: self.inputs,
            func: Box::new(func),
        }
    }
}

/// Provider with no inputs and a single output.
pub fn provide0<R, F>(id: impl Into<String>, func: F) -> Provider
where
    R: Any + Send + Sync,
    F: Fn() -> anyhow::Result<R> + Send + Sync + 'static,
{
    Provider::new(id)
        .output::<R>()
        .build(move |_| Ok(Outputs::new().with(func()?)))
}

/// Provider with one input and a single output.
pub fn provide1<A, R, F>(id: impl Into<String>, func: F) -> Provider
where
    A: Any + Send + Sync,
    R: Any + Send + Sync,
    F: Fn(&A) -> anyhow::Result<R> + Send + Sync + 'static,
{
    Provider::new(id)
        .input::<A>()
        .output::<R>()
        .build(move |inputs| {
            let a = inputs.get::<A>()?;
            Ok(Outputs::new().with(func(&*a)?))
        })
}

/// Provider with two inputs and a single output.
pub fn provide2<A, B, R, F>(id: impl Into<String>, func: F) -> Provider
where
    A: Any + Send + Sync,
    B: Any + Send + Sync,
    R: Any + Send + Sync,
    F: Fn(&A, &B) -> anyhow::Result<R> + Send + Sync + 'static,
{
    Provider::new(id)
        .input::<A>()
        .input::<B>()
        .output::<R>()
        .build(move |inputs| {
            let a = inputs.get::<A>()?;
            let b = inputs.get::<B>()?;
            Ok(Outputs::new().with(func(&*a, &*b)?))
        })
}

/// Provider with three inputs and a single output.
pub fn provide3<A, B, C, R, F>(id: impl Into<String>, func: F) -> Provider
where
    A: Any + Send + Sync,
    B: Any + Send + Sync,
    C: Any + Send + Sync,
    R: Any + Send + Sync,
    F: Fn(&A, &B, &C) -> anyhow::Result<R> + Send + Sync + 'static,
{
    Provider::new(id)
        .input::<A>()
        .input::<B>()
        .input::<C>()
        .output::<R>()
        .build(move |inputs| {
            let a = inputs.get::<A>()?;
            let b = inputs.get::<B>()?;
            let c = inputs.get::<C>()?;
            Ok(Outputs::new().with(func(&*a, &*b, &*c)?))
        })
}

/// Invoker with a single input.
pub fn invoke1<A, F>(id: impl Into<String>, func: F) -> Invoker
where
    A: Any + Send + Sync,
    F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Invoker::new(id).input::<A>().build(move |inputs| {
        let a = inputs.get::<A>()?;
        func(&*a)
    })
}

/// Invoker with two inputs.
pub fn invoke2<A, B, F>(id: impl Into<String>, func: F) -> Invoker
where
    A: Any + Send + Sync,
    B: Any + Send + Sync,
    F: Fn(&A, &B) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Invoker::new(id).input::<A>().input::<B>().build(move |inputs| {
        let a = inputs.get::<A>()?;
        let b = inputs.get::<B>()?;
        func(&*a, &*b)
    })
}
