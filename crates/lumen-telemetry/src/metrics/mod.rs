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

//! Metric identifiers, values, and the registry that stores them.

pub mod registry;

use serde::Serialize;
use std::fmt::{self, Display};

/// A structured identifier for a metric: a namespace plus a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricId {
    /// The broad category of the metric (e.g. "renderer", "geometry").
    pub namespace: String,
    /// The specific name of the metric (e.g. "frame_time_ms").
    pub name: String,
}

impl MetricId {
    /// Creates a new `MetricId`.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// The kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricType {
    /// Monotonically increasing.
    Counter,
    /// Goes up and down.
    Gauge,
}

/// The current value of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// A counter value.
    Counter(u64),
    /// A gauge value.
    Gauge(f64),
}

impl MetricValue {
    /// Returns the [`MetricType`] of this value.
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricValue::Counter(_) => MetricType::Counter,
            MetricValue::Gauge(_) => MetricType::Gauge,
        }
    }
}

/// A stored metric with its description and unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    /// The metric's identifier.
    pub id: MetricId,
    /// Human readable description.
    pub description: String,
    /// Unit of the value, empty for plain counts.
    pub unit: String,
    /// The current value.
    pub value: MetricValue,
}

/// A specialized `Result` type for metric operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// An error raised by the metrics system.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// The metric was never registered.
    MetricNotFound(MetricId),
    /// An operation targeted a metric of the other kind.
    TypeMismatch {
        /// The kind the operation expected.
        expected: MetricType,
        /// The kind actually stored.
        found: MetricType,
    },
    /// The storage lock was poisoned by a panicking writer.
    StorageError(String),
}

impl Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsError::MetricNotFound(id) => write!(f, "Metric not found: {id}"),
            MetricsError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {expected:?}, found {found:?}")
            }
            MetricsError::StorageError(msg) => write!(f, "Storage error: {msg}"),
        }
    }
}

impl std::error::Error for MetricsError {}
