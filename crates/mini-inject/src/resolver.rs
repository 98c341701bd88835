//! # Dependency Resolver
//!
//! Turns a [`ProviderRegistry`] into concrete values in two phases.
//!
//! ## Planning (no provider runs)
//!
//! 1. Index supplied values and producers; a type with two producers is a
//!    `DuplicateProvider`.
//! 2. Walk the whole provider graph for cycles (`CycleDetected`).
//! 3. Depth-first from every requested type and every invoker input, in
//!    registration order, collecting providers in post-order. A type with
//!    neither a supply nor a producer is a `MissingProvider`.
//!
//! ## Execution
//!
//! ```text
//!   supplies ──► values
//!                  │
//!   for provider in post-order:
//!       invoke(inputs) ──► outputs ──► values
//!       run every pending invoker whose inputs are now present
//! ```
//!
//! Each planned provider is invoked exactly once per resolution regardless of
//! how many consumers declare its outputs. The first failure aborts the
//! resolution and nothing computed so far is returned.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::InjectError;
use crate::key::{TypeKey, Value};
use crate::provider::{Inputs, Invoker, Provider};
use crate::registry::ProviderRegistry;

const REQUESTED_BY_CALLER: &str = "resolve request";

/// Values materialized by one resolution.
pub struct ResolvedValues {
    values: HashMap<TypeKey, Value>,
    invoked: Vec<String>,
}

impl std::fmt::Debug for ResolvedValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedValues")
            .field("invoked", &self.invoked)
            .finish_non_exhaustive()
    }
}

impl ResolvedValues {
    /// Shared handle to a resolved value.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, InjectError> {
        let key = TypeKey::of::<T>();
        self.values
            .get(&key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or(InjectError::NotResolved {
                type_name: key.name(),
            })
    }

    /// Owned copy of a resolved value.
    pub fn cloned<T: Any + Send + Sync + Clone>(&self) -> Result<T, InjectError> {
        self.get::<T>().map(|value| (*value).clone())
    }

    #[must_use]
    pub fn contains(&self, key: TypeKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Provider and invoker ids in the order they ran.
    #[must_use]
    pub fn invocation_order(&self) -> &[String] {
        &self.invoked
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Plan {
    supplied: HashMap<TypeKey, Value>,
    order: Vec<usize>,
}

/// Resolves requested types against a registry.
pub struct Resolver<'r> {
    providers: &'r [Arc<Provider>],
    invokers: &'r [Arc<Invoker>],
    registry: &'r ProviderRegistry,
}

impl<'r> Resolver<'r> {
    #[must_use]
    pub fn new(registry: &'r ProviderRegistry) -> Self {
        Self {
            providers: registry.providers(),
            invokers: registry.invokers(),
            registry,
        }
    }

    /// Plan and execute a resolution of `requested`.
    pub fn resolve(&self, requested: &[TypeKey]) -> Result<ResolvedValues, InjectError> {
        let plan = self.plan(requested)?;
        debug!(
            planned = plan.order.len(),
            requested = requested.len(),
            "resolution planned"
        );
        self.execute(plan)
    }

    fn plan(&self, requested: &[TypeKey]) -> Result<Plan, InjectError> {
        let supplied = self.index_supplies()?;
        let producers = self.index_producers()?;
        self.detect_cycles(&producers, &supplied)?;

        let mut visited = vec![false; self.providers.len()];
        let mut order = Vec::new();

        for key in requested {
            self.visit(*key, REQUESTED_BY_CALLER, &producers, &supplied, &mut visited, &mut order)?;
        }
        for invoker in self.invokers {
            for key in invoker.inputs() {
                self.visit(*key, invoker.id(), &producers, &supplied, &mut visited, &mut order)?;
            }
        }

        Ok(Plan { supplied, order })
    }

    fn index_supplies(&self) -> Result<HashMap<TypeKey, Value>, InjectError> {
        let mut supplied = HashMap::new();
        for supply in self.registry.supplies() {
            if supplied
                .insert(supply.key, Arc::clone(&supply.value))
                .is_some()
            {
                return Err(InjectError::DuplicateProvider {
                    type_name: supply.key.name(),
                    first: "supplied value".to_string(),
                    second: "supplied value".to_string(),
                });
            }
        }
        Ok(supplied)
    }

    fn index_producers(&self) -> Result<HashMap<TypeKey, usize>, InjectError> {
        let mut producers: HashMap<TypeKey, usize> = HashMap::new();
        for (idx, provider) in self.providers.iter().enumerate() {
            for output in provider.outputs() {
                if let Some(&first) = producers.get(output) {
                    return Err(InjectError::DuplicateProvider {
                        type_name: output.name(),
                        first: self.providers[first].id().to_string(),
                        second: provider.id().to_string(),
                    });
                }
                producers.insert(*output, idx);
            }
        }
        Ok(producers)
    }

    fn detect_cycles(
        &self,
        producers: &HashMap<TypeKey, usize>,
        supplied: &HashMap<TypeKey, Value>,
    ) -> Result<(), InjectError> {
        let mut marks = vec![Mark::Unvisited; self.providers.len()];
        let mut stack = Vec::new();
        for start in 0..self.providers.len() {
            if marks[start] == Mark::Unvisited {
                self.walk(start, producers, supplied, &mut marks, &mut stack)?;
            }
        }
        Ok(())
    }

    fn walk(
        &self,
        idx: usize,
        producers: &HashMap<TypeKey, usize>,
        supplied: &HashMap<TypeKey, Value>,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Result<(), InjectError> {
        marks[idx] = Mark::InProgress;
        stack.push(idx);

        for input in self.providers[idx].inputs() {
            // supplied values are leaves and break any edge through them
            if supplied.contains_key(input) {
                continue;
            }
            let Some(&dep) = producers.get(input) else {
                continue;
            };
            match marks[dep] {
                Mark::InProgress => {
                    let start = stack.iter().position(|&i| i == dep).unwrap_or(0);
                    let mut path: Vec<String> = stack[start..]
                        .iter()
                        .map(|&i| self.providers[i].id().to_string())
                        .collect();
                    path.push(self.providers[dep].id().to_string());
                    return Err(InjectError::CycleDetected { path });
                }
                Mark::Unvisited => self.walk(dep, producers, supplied, marks, stack)?,
                Mark::Done => {}
            }
        }

        stack.pop();
        marks[idx] = Mark::Done;
        Ok(())
    }

    fn visit(
        &self,
        key: TypeKey,
        required_by: &str,
        producers: &HashMap<TypeKey, usize>,
        supplied: &HashMap<TypeKey, Value>,
        visited: &mut [bool],
        order: &mut Vec<usize>,
    ) -> Result<(), InjectError> {
        if supplied.contains_key(&key) {
            return Ok(());
        }
        let Some(&idx) = producers.get(&key) else {
            return Err(InjectError::MissingProvider {
                type_name: key.name(),
                required_by: required_by.to_string(),
            });
        };
        if visited[idx] {
            return Ok(());
        }
        visited[idx] = true;

        let provider = &self.providers[idx];
        for input in provider.inputs() {
            self.visit(*input, provider.id(), producers, supplied, visited, order)?;
        }
        order.push(idx);
        Ok(())
    }

    fn execute(&self, plan: Plan) -> Result<ResolvedValues, InjectError> {
        let Plan { supplied, order } = plan;
        let mut values = supplied.clone();
        let mut invoked = Vec::with_capacity(order.len() + self.invokers.len());
        let mut pending: Vec<&Arc<Invoker>> = self.invokers.iter().collect();

        run_ready_invokers(&mut pending, &values, &mut invoked)?;

        for idx in order {
            let provider = &self.providers[idx];
            debug!(provider = provider.id(), "invoking provider");

            let outputs = {
                let inputs = Inputs::new(provider.id(), provider.inputs(), &values);
                provider
                    .call(&inputs)
                    .map_err(|source| InjectError::ProviderFailed {
                        provider: provider.id().to_string(),
                        source,
                    })?
            };
            let produced = outputs.into_values();
            check_outputs(provider, &produced)?;

            for (key, value) in produced {
                if !supplied.contains_key(&key) {
                    values.insert(key, value);
                }
            }
            invoked.push(provider.id().to_string());

            run_ready_invokers(&mut pending, &values, &mut invoked)?;
        }

        if let Some(invoker) = pending.first() {
            let missing = invoker
                .inputs()
                .iter()
                .find(|key| !values.contains_key(*key))
                .map_or("unknown", TypeKey::name);
            return Err(InjectError::NotResolved { type_name: missing });
        }

        info!(
            invoked = invoked.len(),
            values = values.len(),
            "dependency resolution complete"
        );
        Ok(ResolvedValues { values, invoked })
    }
}

fn run_ready_invokers(
    pending: &mut Vec<&Arc<Invoker>>,
    values: &HashMap<TypeKey, Value>,
    invoked: &mut Vec<String>,
) -> Result<(), InjectError> {
    let mut idx = 0;
    while idx < pending.len() {
        let invoker = pending[idx];
        if !invoker.inputs().iter().all(|key| values.contains_key(key)) {
            idx += 1;
            continue;
        }
        debug!(invoker = invoker.id(), "running invoker");
        let inputs = Inputs::new(invoker.id(), invoker.inputs(), values);
        invoker
            .call(&inputs)
            .map_err(|source| InjectError::ProviderFailed {
                provider: invoker.id().to_string(),
                source,
            })?;
        invoked.push(invoker.id().to_string());
        pending.remove(idx);
    }
    Ok(())
}

fn check_outputs(provider: &Provider, produced: &[(TypeKey, Value)]) -> Result<(), InjectError> {
    let failed = |message: String| InjectError::ProviderFailed {
        provider: provider.id().to_string(),
        source: anyhow::anyhow!(message),
    };

    if let Some((key, _)) = produced
        .iter()
        .find(|(key, _)| !provider.outputs().contains(key))
    {
        return Err(failed(format!("returned undeclared output {key}")));
    }
    for declared in provider.outputs() {
        match produced.iter().filter(|(key, _)| key == declared).count() {
            1 => {}
            0 => return Err(failed(format!("did not return declared output {declared}"))),
            _ => return Err(failed(format!("returned {declared} more than once"))),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{invoke1, provide0, provide1, provide2, Invoker, Outputs};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Config(u64);

    #[derive(Debug, Clone, PartialEq)]
    struct Store {
        keep_recent: u64,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct App {
        keep_recent: u64,
        label: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Left(u64);

    #[derive(Debug, Clone, PartialEq)]
    struct Right(u64);

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn chain_registry(store_fails: bool, app_calls: Arc<AtomicUsize>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry
            .provide(provide0("produce_config", || Ok(Config(100))))
            .provide(provide1("produce_store", move |config: &Config| {
                if store_fails {
                    anyhow::bail!("disk unavailable");
                }
                Ok(Store {
                    keep_recent: config.0,
                })
            }))
            .provide(provide2("produce_app", move |store: &Store, config: &Config| {
                app_calls.fetch_add(1, Ordering::SeqCst);
                Ok(App {
                    keep_recent: store.keep_recent,
                    label: format!("app-{}", config.0),
                })
            }));
        registry
    }

    #[test]
    fn test_chain_resolves_in_dependency_order() {
        let app_calls = counter();
        let registry = chain_registry(false, Arc::clone(&app_calls));

        let resolved = registry.resolve(&[TypeKey::of::<App>()]).unwrap();

        assert_eq!(
            resolved.invocation_order(),
            &["produce_config", "produce_store", "produce_app"]
        );
        assert_eq!(app_calls.load(Ordering::SeqCst), 1);
        let app = resolved.get::<App>().unwrap();
        assert_eq!(app.keep_recent, 100);
        assert_eq!(app.label, "app-100");
    }

    #[test]
    fn test_provider_failure_aborts_dependents() {
        let app_calls = counter();
        let registry = chain_registry(true, Arc::clone(&app_calls));

        let err = registry
            .resolve(&[TypeKey::of::<App>()])
            .err()
            .expect("store failure must abort");

        assert!(matches!(err, InjectError::ProviderFailed { .. }));
        assert_eq!(err.failed_provider(), Some("produce_store"));
        assert_eq!(err.to_string(), "provider produce_store failed");
        let cause = std::error::Error::source(&err).expect("failure cause");
        assert!(cause.to_string().contains("disk unavailable"));
        assert_eq!(app_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fan_in_invokes_shared_provider_once() {
        let config_calls = counter();
        let calls = Arc::clone(&config_calls);

        let mut registry = ProviderRegistry::new();
        registry
            .provide(provide0("config", move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Config(7))
            }))
            .provide(provide1("left", |c: &Config| Ok(Left(c.0 + 1))))
            .provide(provide1("right", |c: &Config| Ok(Right(c.0 + 2))))
            .provide(
                Provider::new("app")
                    .input::<Left>()
                    .input::<Right>()
                    .input::<Config>()
                    .output::<App>()
                    .build(|inputs| {
                        let left = inputs.get::<Left>()?;
                        let right = inputs.get::<Right>()?;
                        let config = inputs.get::<Config>()?;
                        Ok(Outputs::new().with(App {
                            keep_recent: left.0 + right.0 + config.0,
                            label: "fan-in".to_string(),
                        }))
                    }),
            );

        let resolved = registry
            .resolve(&[TypeKey::of::<App>(), TypeKey::of::<Left>()])
            .unwrap();

        assert_eq!(config_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolved.get::<App>().unwrap().keep_recent, 8 + 9 + 7);
        assert_eq!(resolved.invocation_order().len(), 4);
    }

    #[test]
    fn test_cycle_detected_before_any_invocation() {
        let calls = counter();
        let unrelated = Arc::clone(&calls);

        let mut registry = ProviderRegistry::new();
        registry
            .provide(provide0("unrelated", move || {
                unrelated.fetch_add(1, Ordering::SeqCst);
                Ok(Config(1))
            }))
            .provide(provide1("left_from_right", |r: &Right| Ok(Left(r.0))))
            .provide(provide1("right_from_left", |l: &Left| Ok(Right(l.0))));

        let err = registry
            .resolve(&[TypeKey::of::<Config>()])
            .err()
            .expect("cycle must be reported");

        match err {
            InjectError::CycleDetected { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"left_from_right".to_string()));
                assert!(path.contains(&"right_from_left".to_string()));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_provider_detected_before_any_invocation() {
        let calls = counter();
        let first = Arc::clone(&calls);
        let second = Arc::clone(&calls);

        let mut registry = ProviderRegistry::new();
        registry
            .provide(provide0("config_a", move || {
                first.fetch_add(1, Ordering::SeqCst);
                Ok(Config(1))
            }))
            .provide(provide0("config_b", move || {
                second.fetch_add(1, Ordering::SeqCst);
                Ok(Config(2))
            }));

        let err = registry.resolve(&[TypeKey::of::<Config>()]).err().unwrap();
        match err {
            InjectError::DuplicateProvider { first, second, .. } => {
                assert_eq!(first, "config_a");
                assert_eq!(second, "config_b");
            }
            other => panic!("expected DuplicateProvider, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_provider_names_consumer() {
        let mut registry = ProviderRegistry::new();
        registry.provide(provide1("produce_app", |s: &Store| {
            Ok(App {
                keep_recent: s.keep_recent,
                label: String::new(),
            })
        }));

        let err = registry.resolve(&[TypeKey::of::<App>()]).err().unwrap();
        match err {
            InjectError::MissingProvider {
                type_name,
                required_by,
            } => {
                assert!(type_name.ends_with("Store"));
                assert_eq!(required_by, "produce_app");
            }
            other => panic!("expected MissingProvider, got {other:?}"),
        }
    }

    #[test]
    fn test_supplied_value_short_circuits_provider() {
        let mut registry = chain_registry(false, counter());
        registry.supply(Config(42));

        let resolved = registry.resolve(&[TypeKey::of::<App>()]).unwrap();

        assert_eq!(resolved.get::<App>().unwrap().keep_recent, 42);
        assert_eq!(
            resolved.invocation_order(),
            &["produce_store", "produce_app"]
        );
    }

    #[test]
    fn test_repeated_resolution_is_value_equal() {
        let registry = chain_registry(false, counter());

        let first = registry.resolve(&[TypeKey::of::<App>()]).unwrap();
        let second = registry.resolve(&[TypeKey::of::<App>()]).unwrap();

        assert_eq!(*first.get::<App>().unwrap(), *second.get::<App>().unwrap());
        assert_eq!(first.invocation_order(), second.invocation_order());
    }

    #[test]
    fn test_independent_invokers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut registry = chain_registry(false, counter());
        for name in ["register_c", "register_a", "register_b"] {
            let log = Arc::clone(&log);
            registry.invoke(invoke1(name, move |_: &Config| {
                log.lock().unwrap().push(name);
                Ok(())
            }));
        }

        registry.resolve(&[TypeKey::of::<Store>()]).unwrap();
        registry.resolve(&[TypeKey::of::<Store>()]).unwrap();

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                "register_c", "register_a", "register_b", "register_c", "register_a", "register_b"
            ]
        );
    }

    #[test]
    fn test_invoker_runs_once_inputs_exist() {
        let mut registry = chain_registry(false, counter());
        registry.invoke(invoke1("check_store", |_: &Store| Ok(())));

        let resolved = registry.resolve(&[TypeKey::of::<Config>()]).unwrap();

        assert_eq!(
            resolved.invocation_order(),
            &["produce_config", "produce_store", "check_store"]
        );
    }

    #[test]
    fn test_invoker_failure_aborts_resolution() {
        let mut registry = chain_registry(false, counter());
        registry.invoke(
            Invoker::new("reject_config")
                .input::<Config>()
                .build(|_| anyhow::bail!("config rejected")),
        );

        let err = registry.resolve(&[TypeKey::of::<App>()]).err().unwrap();
        assert_eq!(err.failed_provider(), Some("reject_config"));
    }

    #[test]
    fn test_undeclared_output_is_provider_failure() {
        let mut registry = ProviderRegistry::new();
        registry.provide(
            Provider::new("liar")
                .output::<Config>()
                .build(|_| Ok(Outputs::new().with(Left(1)))),
        );

        let err = registry.resolve(&[TypeKey::of::<Config>()]).err().unwrap();
        assert_eq!(err.failed_provider(), Some("liar"));
    }
}
