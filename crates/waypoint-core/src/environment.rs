//! Service environments
//!
//! An [`Environment`] is an immutable, type-keyed map of services. Routers
//! do not hold environments directly; they hold an [`EnvBuilder`], an
//! ordered list of steps that each extend an environment with one
//! service. Steps run when a router is turned into a dispatcher, so a
//! failing effect is a build error rather than a per-request error.
//!
//! When routers are combined, the outer router's steps run before the
//! inner router's, so the innermost provision of a service wins.

use crate::error::BoxError;
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone)]
struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    name: &'static str,
}

/// Type-keyed service map
///
/// Cloning is cheap; inserting copies the map only when it is shared.
#[derive(Clone, Default)]
pub struct Environment {
    services: Arc<HashMap<TypeId, Entry>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a service, replacing any previous service of the same type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.insert_arc(Arc::new(value));
    }

    pub fn insert_arc<T: Send + Sync + 'static>(&mut self, value: Arc<T>) {
        Arc::make_mut(&mut self.services).insert(
            TypeId::of::<T>(),
            Entry {
                value,
                name: std::any::type_name::<T>(),
            },
        );
    }

    /// Builder-style [`insert`](Environment::insert)
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(&entry.value).downcast::<T>().ok())
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Names of the services held, in no particular order
    pub fn service_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.services.values().map(|entry| entry.name)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.service_names()).finish()
    }
}

/// A service type a handler needs from its environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

impl Requirement {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Failure of an effectful service construction
#[derive(Debug, Error)]
#[error("failed to build service `{service}`: {source}")]
pub struct EnvError {
    pub service: &'static str,
    #[source]
    pub source: BoxError,
}

type StepFuture = BoxFuture<'static, Result<Environment, EnvError>>;
type StepFn = dyn Fn(Environment) -> StepFuture + Send + Sync;

#[derive(Clone)]
struct Step {
    provides: Requirement,
    run: Arc<StepFn>,
}

impl Step {
    /// Identity of the step, shared by every clone of the router holding it
    fn id(&self) -> usize {
        Arc::as_ptr(&self.run) as *const () as usize
    }
}

/// Ordered recipe for building an [`Environment`]
#[derive(Clone, Default)]
pub struct EnvBuilder {
    steps: Vec<Step>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step providing an already constructed service
    pub fn provide<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        let value = Arc::new(value);
        self.steps.push(Step {
            provides: Requirement::of::<T>(),
            run: Arc::new(move |mut env: Environment| -> StepFuture {
                env.insert_arc(Arc::clone(&value));
                Box::pin(async move { Ok(env) })
            }),
        });
        self
    }

    /// Add a step constructing a service from the environment built so far
    pub fn provide_effect<T, F, Fut, E>(mut self, effect: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Environment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let effect = Arc::new(effect);
        self.steps.push(Step {
            provides: Requirement::of::<T>(),
            run: Arc::new(move |mut env: Environment| -> StepFuture {
                let effect = Arc::clone(&effect);
                Box::pin(async move {
                    let value = effect(env.clone()).await.map_err(|err| EnvError {
                        service: std::any::type_name::<T>(),
                        source: err.into(),
                    })?;
                    env.insert(value);
                    Ok(env)
                })
            }),
        });
        self
    }

    /// Builder running `outer`'s steps, then `inner`'s
    pub fn layered(outer: &EnvBuilder, inner: &EnvBuilder) -> EnvBuilder {
        let mut steps = Vec::with_capacity(outer.steps.len() + inner.steps.len());
        steps.extend(outer.steps.iter().cloned());
        steps.extend(inner.steps.iter().cloned());
        EnvBuilder { steps }
    }

    /// Whether some step provides the service `requirement` names
    pub fn provides(&self, requirement: &Requirement) -> bool {
        self.steps
            .iter()
            .any(|step| step.provides.type_id == requirement.type_id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step against `base`
    pub async fn build(&self, base: Environment) -> Result<Environment, EnvError> {
        let mut env = base;
        for step in &self.steps {
            env = (step.run)(env).await?;
        }
        Ok(env)
    }
}

impl std::fmt::Debug for EnvBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|step| step.provides.name))
            .finish()
    }
}

/// Memoizes built environments by step chain
///
/// Routes sharing a chain prefix share the environments built for it, so
/// each effect runs once per distinct chain.
#[derive(Default)]
pub(crate) struct EnvCache {
    built: HashMap<Vec<usize>, Environment>,
    runs: usize,
}

impl EnvCache {
    pub(crate) async fn resolve(&mut self, builder: &EnvBuilder) -> Result<Environment, EnvError> {
        let mut env = Environment::new();
        let mut key = Vec::with_capacity(builder.steps.len());
        for step in &builder.steps {
            key.push(step.id());
            if let Some(cached) = self.built.get(&key) {
                env = cached.clone();
                continue;
            }
            env = (step.run)(env).await?;
            self.runs += 1;
            self.built.insert(key.clone(), env.clone());
        }
        Ok(env)
    }

    /// Number of steps executed so far
    pub(crate) fn runs(&self) -> usize {
        self.runs
    }
}
