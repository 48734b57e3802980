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


//! The animated demo scene: a grid of spinning cubes, a few sliding ones and an
//! orbiting point light above a ground plane.

use crate::assets::ids;
use crossbeam_channel::Sender;
use lumen_core::asset::AssetUUID;
use lumen_core::math::{Mat4, Quat, Transform, Vec3};
use lumen_core::scene::{
    CameraView, EntityId, LightDesc, LightKind, RenderableDesc, SceneEvent, SceneSource,
};

const GRID: i32 = 5;
const SPACING: f32 = 2.0;
const SLIDE_LIMIT: f32 = 6.0;
/// Seconds between two material swaps of the swapping cube.
const SWAP_PERIOD: f32 = 3.0;

#[derive(Debug, Clone)]
struct DemoEntity {
    id: EntityId,
    mesh: AssetUUID,
    material: AssetUUID,
    transform: Transform,
    spin: f32,
    velocity: Vec3,
}

/// Scene state advanced at a fixed step by the sandbox loop.
#[derive(Debug)]
pub struct DemoScene {
    entities: Vec<DemoEntity>,
    aspect: f32,
    time: f32,
    next_swap: f32,
    swapping: usize,
}

impl DemoScene {
    /// Lays out the ground, the cube grid and the sliding cubes.
    pub fn new(aspect: f32) -> Self {
        let mut entities = Vec::new();
        let mut spawn = |mesh, material, transform, spin, velocity| {
            let id = EntityId::new(entities.len() as u32, 0);
            entities.push(DemoEntity {
                id,
                mesh,
                material,
                transform,
                spin,
                velocity,
            });
        };

        spawn(
            ids::ground(),
            ids::floor(),
            Transform {
                translation: Vec3::new(0.0, -1.0, 0.0),
                scale: Vec3::new(14.0, 1.0, 14.0),
                ..Transform::IDENTITY
            },
            0.0,
            Vec3::ZERO,
        );
        for x in 0..GRID {
            for z in 0..GRID {
                let offset = (GRID - 1) as f32 * 0.5;
                let material = if (x + z) % 2 == 0 {
                    ids::checker()
                } else {
                    ids::stripes()
                };
                spawn(
                    ids::cube(),
                    material,
                    Transform::from_translation(Vec3::new(
                        (x as f32 - offset) * SPACING,
                        0.0,
                        (z as f32 - offset) * SPACING,
                    )),
                    0.5 + 0.15 * (x + z) as f32,
                    Vec3::ZERO,
                );
            }
        }
        for (lane, speed) in [(-1.0, 2.5), (1.0, -1.5)] {
            spawn(
                ids::cube(),
                ids::stripes(),
                Transform {
                    translation: Vec3::new(0.0, 1.5, lane * 3.0),
                    scale: Vec3::splat(0.6),
                    ..Transform::IDENTITY
                },
                0.0,
                Vec3::new(speed, 0.0, 0.0),
            );
        }

        let swapping = entities.len() / 2;
        Self {
            entities,
            aspect,
            time: 0.0,
            next_swap: SWAP_PERIOD,
            swapping,
        }
    }

    /// Updates the projection after a resize.
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    /// Advances the simulation by one fixed step and reports what changed.
    pub fn step(&mut self, dt: f32, events: &Sender<SceneEvent>) {
        self.time += dt;
        let mut changed = Vec::new();
        for entity in &mut self.entities {
            let mut moved = false;
            if entity.spin != 0.0 {
                entity.transform.rotation =
                    Quat::from_rotation_y(entity.spin * dt) * entity.transform.rotation;
                moved = true;
            }
            if entity.velocity != Vec3::ZERO {
                entity.transform.translation += entity.velocity * dt;
                if entity.transform.translation.x.abs() > SLIDE_LIMIT {
                    entity.velocity.x = -entity.velocity.x;
                    entity.transform.translation.x =
                        entity.transform.translation.x.clamp(-SLIDE_LIMIT, SLIDE_LIMIT);
                }
                moved = true;
            }
            if moved {
                changed.push(SceneEvent::TransformChanged(entity.id));
            }
        }

        if self.time >= self.next_swap {
            self.next_swap += SWAP_PERIOD;
            let entity = &mut self.entities[self.swapping];
            entity.material = if entity.material == ids::checker() {
                ids::stripes()
            } else {
                ids::checker()
            };
            log::debug!("Entity {} now draws material {}", entity.id, entity.material);
            changed.push(SceneEvent::RenderableUpdated(entity.id));
        }

        for event in changed {
            // The render agent may already be gone during shutdown.
            if events.send(event).is_err() {
                break;
            }
        }
    }

    fn entity(&self, id: EntityId) -> Option<&DemoEntity> {
        self.entities
            .get(id.index as usize)
            .filter(|entity| entity.id == id)
    }
}

impl SceneSource for DemoScene {
    fn renderables(&self) -> Vec<RenderableDesc> {
        self.entities
            .iter()
            .map(|entity| RenderableDesc {
                entity: entity.id,
                mesh: entity.mesh,
                material: entity.material,
                sub_mesh: 0,
            })
            .collect()
    }

    fn local_transform(&self, entity: EntityId) -> Option<Transform> {
        self.entity(entity).map(|entity| entity.transform)
    }

    fn parent(&self, _entity: EntityId) -> Option<EntityId> {
        None
    }

    fn linear_velocity(&self, entity: EntityId) -> Option<Vec3> {
        self.entity(entity)
            .map(|entity| entity.velocity)
            .filter(|velocity| *velocity != Vec3::ZERO)
    }

    fn active_camera(&self) -> Option<CameraView> {
        let position = Vec3::new(0.0, 7.0, 13.0);
        Some(CameraView {
            view: Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y),
            projection: Mat4::perspective_rh(60f32.to_radians(), self.aspect, 0.1, 100.0),
            position,
        })
    }

    fn lights(&self) -> Vec<LightDesc> {
        let orbit = self.time * 0.7;
        vec![
            LightDesc {
                kind: LightKind::Directional,
                position: Vec3::ZERO,
                direction: Vec3::new(-0.4, -1.0, -0.3),
                color: Vec3::new(1.0, 0.97, 0.9),
                intensity: 0.8,
                range: 0.0,
                cone_angle: 0.0,
            },
            LightDesc {
                kind: LightKind::Point,
                position: Vec3::new(orbit.cos() * 5.0, 2.5, orbit.sin() * 5.0),
                direction: Vec3::ZERO,
                color: Vec3::new(0.3, 0.6, 1.0),
                intensity: 1.5,
                range: 9.0,
                cone_angle: 0.0,
            },
        ]
    }
}
