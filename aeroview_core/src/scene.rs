//! The pose hierarchy.
//!
//! Entities live in an arena owned by `SceneGraph` and refer to each other
//! by `EntityId`. Ids are generational: once an entity is despawned, every
//! copy of its id stops resolving, which is what lets the follow camera and
//! the renderer hold ids without owning anything.
//!
//! Each entity stores an authoritative body-frame `Pose`. Its render-frame
//! transform is re-derived from that pose on every mutation and then
//! multiplied by an independent local spin:
//!
//! ```text
//! render_rotation = to_render_rotation(pose.rpy_deg) * spin
//! ```
//!
//! so a rotor can spin forever without its mount pose drifting, and a pose
//! write never resets the spin.

use crate::frame::{self, RenderTarget};
use crate::pose::Pose;
use crate::render::{CameraPayload, LightParams, VisualHandle};
use nalgebra::{Similarity3, Translation3, UnitQuaternion, Vector3};

/// Generational handle to an entity in a `SceneGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// What an entity carries besides its transform.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Payload {
    /// Pure transform node
    #[default]
    None,
    VisualMesh(VisualHandle),
    Camera(CameraPayload),
    Light(LightParams),
}

/// A node of the pose hierarchy.
#[derive(Debug, Clone)]
pub struct PoseEntity {
    name: String,
    pose: Pose,

    /// Accumulated local spin, render frame
    spin: UnitQuaternion<f64>,

    render_position: Vector3<f64>,
    render_rotation: UnitQuaternion<f64>,
    scale: f64,

    parent: Option<EntityId>,
    children: Vec<EntityId>,
    payload: Payload,

    /// Child that aligns the visual asset with the logical pivot
    model_offset: Option<EntityId>,
}

impl PoseEntity {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pose: Pose::identity(),
            spin: UnitQuaternion::identity(),
            render_position: Vector3::zeros(),
            render_rotation: UnitQuaternion::identity(),
            scale: 1.0,
            parent: None,
            children: Vec::new(),
            payload: Payload::None,
            model_offset: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The authoritative body-frame pose.
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Replaces the pose wholesale and re-derives the render transform.
    pub fn set_absolute_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.refresh();
    }

    /// Adds a body-frame position delta.
    pub fn translate(&mut self, delta: &Vector3<f64>) {
        self.pose = self.pose.translated(delta);
        self.refresh();
    }

    /// Adds a roll/pitch/yaw delta in degrees.
    pub fn rotate(&mut self, delta_deg: &Vector3<f64>) {
        self.pose = self.pose.rotated(delta_deg);
        self.refresh();
    }

    /// Adds a render-frame Euler increment (radians, local axes) on top of
    /// the pose rotation. The pose itself is untouched.
    pub fn spin_local(&mut self, delta: &Vector3<f64>) {
        let step = UnitQuaternion::from_euler_angles(delta.x, delta.y, delta.z);
        self.spin = UnitQuaternion::new_normalize((self.spin * step).into_inner());
        self.render_rotation = self.pose.render_rotation() * self.spin;
    }

    /// Clears the accumulated spin.
    pub fn reset_spin(&mut self) {
        self.spin = UnitQuaternion::identity();
        self.refresh();
    }

    pub fn spin(&self) -> &UnitQuaternion<f64> {
        &self.spin
    }

    /// Local render-frame position (relative to the parent).
    pub fn render_position(&self) -> &Vector3<f64> {
        &self.render_position
    }

    /// Local render-frame rotation, spin included.
    pub fn render_rotation(&self) -> &UnitQuaternion<f64> {
        &self.render_rotation
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Sets a uniform render scale. Non-positive or non-finite values are ignored.
    pub fn set_scale(&mut self, scale: f64) {
        if scale.is_finite() && scale > 0.0 {
            self.scale = scale;
        }
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    pub fn clear_payload(&mut self) {
        self.payload = Payload::None;
    }

    pub fn model_offset(&self) -> Option<EntityId> {
        self.model_offset
    }

    /// Local transform relative to the parent.
    pub fn local_transform(&self) -> Similarity3<f64> {
        Similarity3::from_parts(
            Translation3::from(self.render_position),
            self.render_rotation,
            self.scale,
        )
    }

    fn refresh(&mut self) {
        let pose = self.pose;
        frame::apply_pose(self, &pose);
    }
}

impl RenderTarget for PoseEntity {
    fn set_render_position(&mut self, position: Vector3<f64>) {
        self.render_position = position;
    }

    fn set_render_rotation(&mut self, rotation: UnitQuaternion<f64>) {
        self.render_rotation = rotation * self.spin;
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entity: Option<PoseEntity>,
}

/// Arena of pose entities.
#[derive(Debug, Default)]
pub struct SceneGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root-level entity with an identity pose.
    pub fn spawn(&mut self, name: &str) -> EntityId {
        let entity = PoseEntity::new(name);
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            return EntityId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entity: Some(entity),
        });
        EntityId { index, generation: 0 }
    }

    /// Creates an entity directly under `parent`. Returns `None` if the
    /// parent id is stale.
    pub fn spawn_child(&mut self, parent: EntityId, name: &str) -> Option<EntityId> {
        if !self.contains(parent) {
            return None;
        }
        let child = self.spawn(name);
        self.add_child(parent, child);
        Some(child)
    }

    /// Spawns the model-offset child of `parent` and records it.
    pub fn spawn_model_offset(&mut self, parent: EntityId, offset: Pose) -> Option<EntityId> {
        let name = format!("{}_model", self.get(parent)?.name());
        let child = self.spawn_child(parent, &name)?;
        if let Some(entity) = self.get_mut(child) {
            entity.set_absolute_pose(offset);
        }
        if let Some(entity) = self.get_mut(parent) {
            entity.model_offset = Some(child);
        }
        Some(child)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&PoseEntity> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entity.as_ref())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut PoseEntity> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entity.as_mut())
    }

    /// Makes `child` a child of `parent`, detaching it from any previous
    /// parent. The child's transform becomes relative to the parent.
    ///
    /// Returns `false` (and changes nothing) when either id is stale or the
    /// link would create a cycle.
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if self.is_ancestor(child, parent) {
            return false;
        }

        self.detach(child);
        if let Some(p) = self.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
        true
    }

    /// Removes an entity and its whole subtree. Returns how many entities
    /// were removed.
    pub fn despawn(&mut self, id: EntityId) -> usize {
        if !self.contains(id) {
            return 0;
        }
        self.detach(id);

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let slot = &mut self.slots[next.index as usize];
            if let Some(entity) = slot.entity.take() {
                stack.extend(entity.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(next.index);
                removed += 1;
            }
        }

        self.live -= removed;
        removed
    }

    /// World transform, composing every ancestor.
    pub fn world_transform(&self, id: EntityId) -> Option<Similarity3<f64>> {
        let mut entity = self.get(id)?;
        let mut world = entity.local_transform();
        while let Some(parent) = entity.parent {
            entity = self.get(parent)?;
            world = entity.local_transform() * world;
        }
        Some(world)
    }

    /// World position in the render frame.
    pub fn world_position(&self, id: EntityId) -> Option<Vector3<f64>> {
        self.world_transform(id)
            .map(|world| world.isometry.translation.vector)
    }

    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.iter().find(|(_, e)| e.name == name).map(|(id, _)| id)
    }

    /// Entities without a parent.
    pub fn roots(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter()
            .filter(|(_, e)| e.parent.is_none())
            .map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &PoseEntity)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entity.as_ref().map(|entity| {
                (
                    EntityId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entity,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    fn detach(&mut self, child: EntityId) {
        let parent = match self.get_mut(child) {
            Some(c) => c.parent.take(),
            None => return,
        };
        if let Some(p) = parent.and_then(|p| self.get_mut(p)) {
            p.children.retain(|c| *c != child);
            if p.model_offset == Some(child) {
                p.model_offset = None;
            }
        }
    }

    fn is_ancestor(&self, ancestor: EntityId, of: EntityId) -> bool {
        let mut cursor = self.get(of).and_then(|e| e.parent);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.get(id).and_then(|e| e.parent);
        }
        false
    }
}
