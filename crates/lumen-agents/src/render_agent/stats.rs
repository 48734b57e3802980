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

//! Per-frame statistics of the render agent and their telemetry export.

use lumen_data::geometry::GeometryStats;
use lumen_telemetry::metrics::MetricsResult;
use lumen_telemetry::{CounterHandle, GaugeHandle, MetricsRegistry};
use std::time::Duration;

/// What the last rendered frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderStats {
    /// Number of the frame these statistics describe.
    pub frame_index: u64,
    /// Draw batches issued.
    pub batches: u32,
    /// Indexed-indirect commands issued.
    pub commands: u32,
    /// Instances drawn.
    pub drawn_instances: u32,
    /// Renderables left out because something was not resident or the list was full.
    pub excluded_instances: u32,
    /// Geometry arena occupancy.
    pub geometry: GeometryStats,
    /// Material instances ready to draw.
    pub resident_materials: usize,
    /// Textures resident in the bindless table.
    pub resident_textures: usize,
    /// CPU time spent in `render_frame`.
    pub cpu_frame_time: Duration,
}

/// Telemetry handles fed once per presented frame.
#[derive(Debug)]
pub(crate) struct RenderMetrics {
    frames: CounterHandle,
    frame_time_ms: GaugeHandle,
    batches: GaugeHandle,
    commands: GaugeHandle,
    drawn_instances: GaugeHandle,
    excluded_instances: GaugeHandle,
    vertex_capacity_bytes: GaugeHandle,
    vertex_live_bytes: GaugeHandle,
    index_capacity_bytes: GaugeHandle,
    index_live_bytes: GaugeHandle,
    arena_grows: GaugeHandle,
    resident_meshes: GaugeHandle,
    resident_materials: GaugeHandle,
    resident_textures: GaugeHandle,
}

impl RenderMetrics {
    pub(crate) fn register(registry: &MetricsRegistry) -> MetricsResult<Self> {
        let count = |name: &str, description: &str| {
            registry.register_gauge("renderer", name, description, "count")
        };
        let bytes = |name: &str, description: &str| {
            registry.register_gauge("geometry", name, description, "bytes")
        };
        Ok(Self {
            frames: registry.register_counter("renderer", "frames", "Frames presented")?,
            frame_time_ms: registry.register_gauge(
                "renderer",
                "cpu_frame_time_ms",
                "CPU time spent preparing and submitting the frame",
                "ms",
            )?,
            batches: count("batches", "Draw batches issued")?,
            commands: count("commands", "Indirect commands issued")?,
            drawn_instances: count("drawn_instances", "Instances drawn")?,
            excluded_instances: count("excluded_instances", "Renderables not drawn")?,
            vertex_capacity_bytes: bytes("vertex_capacity", "Allocated vertex pool size")?,
            vertex_live_bytes: bytes("vertex_live", "Vertex bytes owned by resident meshes")?,
            index_capacity_bytes: bytes("index_capacity", "Allocated index pool size")?,
            index_live_bytes: bytes("index_live", "Index bytes owned by resident meshes")?,
            arena_grows: registry.register_gauge("geometry", "grows", "Arena grow operations", "count")?,
            resident_meshes: registry.register_gauge("geometry", "resident_meshes", "Resident meshes", "count")?,
            resident_materials: registry.register_gauge(
                "materials",
                "resident_materials",
                "Material instances ready to draw",
                "count",
            )?,
            resident_textures: registry.register_gauge(
                "materials",
                "resident_textures",
                "Textures in the bindless table",
                "count",
            )?,
        })
    }

    pub(crate) fn publish(&self, stats: &RenderStats) {
        let results = [
            self.frames.increment().map(|_| ()),
            self.frame_time_ms.set(stats.cpu_frame_time.as_secs_f64() * 1000.0),
            self.batches.set(f64::from(stats.batches)),
            self.commands.set(f64::from(stats.commands)),
            self.drawn_instances.set(f64::from(stats.drawn_instances)),
            self.excluded_instances.set(f64::from(stats.excluded_instances)),
            self.vertex_capacity_bytes.set(stats.geometry.vertex_capacity_bytes as f64),
            self.vertex_live_bytes.set(stats.geometry.vertex_live_bytes as f64),
            self.index_capacity_bytes.set(stats.geometry.index_capacity_bytes as f64),
            self.index_live_bytes.set(stats.geometry.index_live_bytes as f64),
            self.arena_grows.set(stats.geometry.grows as f64),
            self.resident_meshes.set(stats.geometry.resident_meshes as f64),
            self.resident_materials.set(stats.resident_materials as f64),
            self.resident_textures.set(stats.resident_textures as f64),
        ];
        if let Some(Err(e)) = results.into_iter().find(Result::is_err) {
            log::warn!("Failed to publish render metrics: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_telemetry::metrics::MetricId;

    #[test]
    fn test_publish_updates_registry() {
        let registry = MetricsRegistry::new();
        let metrics = RenderMetrics::register(&registry).unwrap();
        let stats = RenderStats {
            batches: 3,
            drawn_instances: 42,
            cpu_frame_time: Duration::from_millis(4),
            ..Default::default()
        };

        metrics.publish(&stats);
        metrics.publish(&stats);

        let frames = registry
            .get_metric(&MetricId::new("renderer", "frames"))
            .unwrap();
        assert_eq!(frames.value, lumen_telemetry::metrics::MetricValue::Counter(2));
        let drawn = registry
            .get_metric(&MetricId::new("renderer", "drawn_instances"))
            .unwrap();
        assert_eq!(drawn.value, lumen_telemetry::metrics::MetricValue::Gauge(42.0));
        assert_eq!(registry.get_namespace_metrics("geometry").unwrap().len(), 6);
    }
}
