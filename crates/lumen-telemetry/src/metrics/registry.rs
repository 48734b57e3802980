// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Registry for managing metrics.

use super::{Metric, MetricId, MetricType, MetricValue, MetricsError, MetricsResult};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

type Storage = Arc<RwLock<BTreeMap<MetricId, Metric>>>;

fn poisoned<T>(_: T) -> MetricsError {
    MetricsError::StorageError("metrics storage lock poisoned".to_string())
}

/// Central registry for renderer metrics.
///
/// Metrics are registered once and then updated through the returned handles,
/// which share the registry's storage and can be moved to other threads.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    storage: Storage,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a counter starting at zero.
    ///
    /// Registering an id that already holds a counter returns a handle to the
    /// existing value.
    pub fn register_counter(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> MetricsResult<CounterHandle> {
        let id = MetricId::new(namespace, name);
        self.register(&id, description.into(), String::new(), MetricValue::Counter(0))?;
        Ok(CounterHandle {
            id,
            storage: self.storage.clone(),
        })
    }

    /// Registers a gauge starting at zero.
    ///
    /// Registering an id that already holds a gauge returns a handle to the
    /// existing value.
    pub fn register_gauge(
        &self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> MetricsResult<GaugeHandle> {
        let id = MetricId::new(namespace, name);
        self.register(&id, description.into(), unit.into(), MetricValue::Gauge(0.0))?;
        Ok(GaugeHandle {
            id,
            storage: self.storage.clone(),
        })
    }

    fn register(
        &self,
        id: &MetricId,
        description: String,
        unit: String,
        initial: MetricValue,
    ) -> MetricsResult<()> {
        let mut storage = self.storage.write().map_err(poisoned)?;
        if let Some(existing) = storage.get(id) {
            let found = existing.value.metric_type();
            let expected = initial.metric_type();
            if found != expected {
                return Err(MetricsError::TypeMismatch { expected, found });
            }
            return Ok(());
        }
        storage.insert(
            id.clone(),
            Metric {
                id: id.clone(),
                description,
                unit,
                value: initial,
            },
        );
        Ok(())
    }

    /// Returns a copy of the metric.
    pub fn get_metric(&self, id: &MetricId) -> MetricsResult<Metric> {
        let storage = self.storage.read().map_err(poisoned)?;
        storage
            .get(id)
            .cloned()
            .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))
    }

    /// Returns `true` if the metric was registered.
    pub fn contains_metric(&self, id: &MetricId) -> bool {
        self.storage
            .read()
            .map(|storage| storage.contains_key(id))
            .unwrap_or(false)
    }

    /// Returns every metric of a namespace, ordered by name.
    pub fn get_namespace_metrics(&self, namespace: &str) -> MetricsResult<Vec<Metric>> {
        let storage = self.storage.read().map_err(poisoned)?;
        Ok(storage
            .values()
            .filter(|m| m.id.namespace == namespace)
            .cloned()
            .collect())
    }

    /// Returns every metric, ordered by id.
    pub fn snapshot(&self) -> MetricsResult<Vec<Metric>> {
        let storage = self.storage.read().map_err(poisoned)?;
        Ok(storage.values().cloned().collect())
    }

    /// Serializes the current snapshot as a JSON array.
    pub fn to_json(&self) -> MetricsResult<String> {
        let snapshot = self.snapshot()?;
        serde_json::to_string(&snapshot).map_err(|e| MetricsError::StorageError(e.to_string()))
    }

    /// The number of registered metrics.
    pub fn metric_count(&self) -> usize {
        self.storage.read().map(|s| s.len()).unwrap_or(0)
    }
}

fn update<T>(
    storage: &Storage,
    id: &MetricId,
    f: impl FnOnce(&mut MetricValue) -> MetricsResult<T>,
) -> MetricsResult<T> {
    let mut storage = storage.write().map_err(poisoned)?;
    let metric = storage
        .get_mut(id)
        .ok_or_else(|| MetricsError::MetricNotFound(id.clone()))?;
    f(&mut metric.value)
}

/// Handle for counter operations.
#[derive(Debug, Clone)]
pub struct CounterHandle {
    id: MetricId,
    storage: Storage,
}

impl CounterHandle {
    /// Increments the counter by 1.
    pub fn increment(&self) -> MetricsResult<u64> {
        self.increment_by(1)
    }

    /// Increments the counter by `amount` and returns the new value.
    pub fn increment_by(&self, amount: u64) -> MetricsResult<u64> {
        update(&self.storage, &self.id, |value| match value {
            MetricValue::Counter(v) => {
                *v = v.saturating_add(amount);
                Ok(*v)
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: other.metric_type(),
            }),
        })
    }

    /// Returns the current value.
    pub fn get(&self) -> MetricsResult<u64> {
        update(&self.storage, &self.id, |value| match value {
            MetricValue::Counter(v) => Ok(*v),
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Counter,
                found: other.metric_type(),
            }),
        })
    }

    /// The metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

/// Handle for gauge operations.
#[derive(Debug, Clone)]
pub struct GaugeHandle {
    id: MetricId,
    storage: Storage,
}

impl GaugeHandle {
    /// Sets the gauge.
    pub fn set(&self, new_value: f64) -> MetricsResult<()> {
        update(&self.storage, &self.id, |value| match value {
            MetricValue::Gauge(v) => {
                *v = new_value;
                Ok(())
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: other.metric_type(),
            }),
        })
    }

    /// Adds `delta` to the gauge and returns the new value.
    pub fn add(&self, delta: f64) -> MetricsResult<f64> {
        update(&self.storage, &self.id, |value| match value {
            MetricValue::Gauge(v) => {
                *v += delta;
                Ok(*v)
            }
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: other.metric_type(),
            }),
        })
    }

    /// Returns the current value.
    pub fn get(&self) -> MetricsResult<f64> {
        update(&self.storage, &self.id, |value| match value {
            MetricValue::Gauge(v) => Ok(*v),
            other => Err(MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: other.metric_type(),
            }),
        })
    }

    /// The metric id.
    pub fn id(&self) -> &MetricId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.metric_count(), 0);
    }

    #[test]
    fn test_counter_registration_and_operations() {
        let registry = MetricsRegistry::new();
        let counter = registry
            .register_counter("renderer", "frames", "Frames rendered")
            .unwrap();

        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(counter.increment_by(5).unwrap(), 6);
        assert_eq!(counter.get().unwrap(), 6);
        assert!(registry.contains_metric(counter.id()));
        assert_eq!(registry.metric_count(), 1);
    }

    #[test]
    fn test_gauge_registration_and_operations() {
        let registry = MetricsRegistry::new();
        let gauge = registry
            .register_gauge("geometry", "vertex_capacity", "Vertex pool size", "bytes")
            .unwrap();

        gauge.set(100.5).unwrap();
        assert_eq!(gauge.get().unwrap(), 100.5);
        assert_eq!(gauge.add(50.0).unwrap(), 150.5);
        assert_eq!(gauge.add(-25.0).unwrap(), 125.5);
    }

    #[test]
    fn test_reregistration_keeps_value() {
        let registry = MetricsRegistry::new();
        let first = registry.register_counter("renderer", "frames", "").unwrap();
        first.increment_by(3).unwrap();
        let second = registry.register_counter("renderer", "frames", "").unwrap();
        assert_eq!(second.get().unwrap(), 3);
        assert_eq!(registry.metric_count(), 1);
    }

    #[test]
    fn test_reregistration_with_other_kind_fails() {
        let registry = MetricsRegistry::new();
        registry.register_counter("renderer", "frames", "").unwrap();
        let err = registry
            .register_gauge("renderer", "frames", "", "")
            .unwrap_err();
        assert_eq!(
            err,
            MetricsError::TypeMismatch {
                expected: MetricType::Gauge,
                found: MetricType::Counter
            }
        );
    }

    #[test]
    fn test_namespace_filtering() {
        let registry = MetricsRegistry::new();
        registry.register_counter("renderer", "frames", "").unwrap();
        registry.register_counter("renderer", "draws", "").unwrap();
        registry
            .register_gauge("geometry", "meshes", "", "")
            .unwrap();

        let renderer = registry.get_namespace_metrics("renderer").unwrap();
        assert_eq!(renderer.len(), 2);
        assert_eq!(renderer[0].id.name, "draws");
        assert_eq!(registry.get_namespace_metrics("geometry").unwrap().len(), 1);
    }

    #[test]
    fn test_json_snapshot() {
        let registry = MetricsRegistry::new();
        let counter = registry.register_counter("renderer", "frames", "").unwrap();
        counter.increment_by(2).unwrap();

        let json = registry.to_json().unwrap();
        assert!(json.contains("\"namespace\":\"renderer\""));
        assert!(json.contains("\"value\":2"));
    }

    #[test]
    fn test_handles_are_shared_across_threads() {
        let registry = MetricsRegistry::new();
        let counter = registry.register_counter("renderer", "frames", "").unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        counter.increment().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get().unwrap(), 400);
    }
}
