use criterion::{criterion_group, criterion_main, Criterion};
use lumen_core::asset::AssetUUID;
use lumen_core::renderer::{RenderPipelineId, ResourceError, VertexFormat};
use lumen_core::scene::EntityId;
use lumen_data::geometry::GeometryRegion;
use lumen_data::materials::MaterialBinding;
use lumen_lanes::render_lane::{
    BatchLimits, DrawBatchLane, DrawList, GeometryLookup, MaterialLookup, Renderable,
};
use std::hint::black_box;

struct Geometry;

impl GeometryLookup for Geometry {
    fn region(&self, mesh: AssetUUID, _sub_mesh: u32) -> Result<GeometryRegion, ResourceError> {
        let index = (mesh.as_uuid().as_u128() % 64) as u32;
        Ok(GeometryRegion {
            vertex_offset: index * 24,
            vertex_count: 24,
            index_offset: index * 36,
            index_count: 36,
            format: VertexFormat::PositionNormalUv,
            active: true,
        })
    }
}

struct Materials;

impl MaterialLookup for Materials {
    fn binding(&self, material: AssetUUID) -> Result<MaterialBinding, ResourceError> {
        Ok(MaterialBinding {
            index: (material.as_uuid().as_u128() % 16) as u32,
            pipeline: RenderPipelineId(1),
            vertex_format: VertexFormat::PositionNormalUv,
        })
    }
}

fn bench_batching(c: &mut Criterion) {
    // 10,000 renderables over 64 meshes and 16 materials, in scrambled order.
    let renderables: Vec<Renderable> = (0..10_000u32)
        .map(|i| Renderable {
            entity: EntityId::new(i, 0),
            mesh: AssetUUID::from_u128(u128::from(i.wrapping_mul(2_654_435_761) % 64)),
            material: AssetUUID::from_u128(u128::from(i.wrapping_mul(40_503) % 16)),
            sub_mesh: 0,
        })
        .collect();

    let mut group = c.benchmark_group("Draw Batching");

    group.bench_function("10k renderables, uncapped", |b| {
        let lane = DrawBatchLane::new(BatchLimits::new(10_000, 10_000, 10_000).unwrap());
        let mut out = DrawList::new();
        b.iter(|| {
            lane.run(black_box(&renderables), &Geometry, &Materials, &mut out);
            black_box(out.commands.len());
        });
    });

    group.bench_function("10k renderables, 32 instances per command", |b| {
        let lane = DrawBatchLane::new(BatchLimits::new(32, 64, 10_000).unwrap());
        let mut out = DrawList::new();
        b.iter(|| {
            lane.run(black_box(&renderables), &Geometry, &Materials, &mut out);
            black_box(out.commands.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_batching);
criterion_main!(benches);
