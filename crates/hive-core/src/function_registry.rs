//! Function Registry (spec.md §4.4.5): `name -> callable<map -> map>`.
//!
//! Function nodes are in-process code paths, not external collaborators in
//! the same sense as an LLM vendor or tool catalogue, so the registry is a
//! concrete struct rather than a trait — callers register closures the way
//! the teacher's `tooling` crate registers built-in tool implementations.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FunctionError {
    pub message: String,
}

impl std::fmt::Display for FunctionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FunctionError {}

#[async_trait]
pub trait Function: Send + Sync {
    async fn call(&self, input: IndexMap<String, Value>) -> Result<IndexMap<String, Value>, FunctionError>;
}

/// Adapts any `Fn(map) -> Result<map, FunctionError>` future-returning
/// closure into a `Function`, so callers rarely need to implement the trait
/// by hand.
pub struct FnFunction<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Function for FnFunction<F>
where
    F: Fn(IndexMap<String, Value>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<IndexMap<String, Value>, FunctionError>> + Send,
{
    async fn call(&self, input: IndexMap<String, Value>) -> Result<IndexMap<String, Value>, FunctionError> {
        (self.f)(input).await
    }
}

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, function: Arc<dyn Function>) {
        self.functions.insert(name.into(), function);
    }

    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(IndexMap<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<IndexMap<String, Value>, FunctionError>> + Send + 'static,
    {
        self.register(name, Arc::new(FnFunction { f }));
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn register_fn_and_lookup_round_trips() {
        let mut registry = FunctionRegistry::new();
        registry.register_fn("double", |input| async move {
            let x = input.get("x").and_then(Value::as_i64).unwrap_or(0);
            Ok(IndexMap::from([("doubled".to_string(), json!(x * 2))]))
        });

        let f = registry.lookup("double").unwrap();
        let out = f
            .call(IndexMap::from([("x".to_string(), json!(21))]))
            .await
            .unwrap();
        assert_eq!(out.get("doubled"), Some(&json!(42)));
    }

    #[test]
    fn lookup_of_unknown_name_is_none() {
        let registry = FunctionRegistry::new();
        assert!(registry.lookup("nope").is_none());
    }
}
