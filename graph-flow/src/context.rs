use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt, marker::PhantomData, sync::Arc};

use crate::error::{GraphError, Result};

/// Typed address of a value stored in a [`Context`].
///
/// Tasks declare their keys as constants, so a stage can only read a value
/// under the type it was written with.
pub struct StateKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

/// Context for sharing data between tasks in a graph execution
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    /// Store `value` under `key`, replacing whatever was there.
    pub async fn put<T: Serialize>(&self, key: &StateKey<T>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| {
            GraphError::ContextError(format!("failed to serialize {}: {}", key.name(), e))
        })?;
        self.data.insert(key.name().to_string(), value);
        Ok(())
    }

    /// Read the value under `key`, or `None` if it is absent or was stored with another shape.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Option<T> {
        self.data
            .get(key.name())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Like [`Context::fetch`], but a missing value is an error.
    pub async fn require<T: DeserializeOwned>(&self, key: &StateKey<T>) -> Result<T> {
        let value = self
            .data
            .get(key.name())
            .map(|v| v.clone())
            .ok_or_else(|| {
                GraphError::ContextError(format!("{} has not been produced yet", key.name()))
            })?;

        serde_json::from_value(value).map_err(|e| {
            GraphError::ContextError(format!("failed to deserialize {}: {}", key.name(), e))
        })
    }

    pub fn contains<T>(&self, key: &StateKey<T>) -> bool {
        self.data.contains_key(key.name())
    }

    /// Atomically read-modify-write the value under `key`, starting from
    /// `T::default()` when nothing has been stored yet.
    pub async fn update<T, F>(&self, key: &StateKey<T>, f: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T),
    {
        let mut entry = self
            .data
            .entry(key.name().to_string())
            .or_insert(Value::Null);

        let mut current: T = if entry.is_null() {
            T::default()
        } else {
            serde_json::from_value(entry.clone()).map_err(|e| {
                GraphError::ContextError(format!("failed to deserialize {}: {}", key.name(), e))
            })?
        };

        f(&mut current);

        *entry = serde_json::to_value(current).map_err(|e| {
            GraphError::ContextError(format!("failed to serialize {}: {}", key.name(), e))
        })?;
        Ok(())
    }

    /// Push onto a list value. Lists written this way are append-only.
    pub async fn append<T>(&self, key: &StateKey<Vec<T>>, item: T) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.update(key, |items| items.push(item)).await
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
