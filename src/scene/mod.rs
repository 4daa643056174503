// Scene - drawable objects and the node tree that places them
//
// Drawables live in a slot-map arena; nodes refer to them by id. The closed
// set of drawable kinds is an enum so the renderer can match on it.

mod camera;
mod mesh;
mod skybox;

pub use camera::{Camera, CameraInput};
pub use mesh::{MaterialUniform, StaticMesh};
pub use skybox::Skybox;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use slotmap::{new_key_type, SlotMap};
use std::path::PathBuf;
use std::sync::Arc;

use crate::assets::ImageData;
use crate::backend::command::{self, CommandBuffer, CommandPool};
use crate::backend::{Image, ResourceAllocator, VulkanDevice};
use crate::error::BuildError;
use crate::resource::{BufferUsage, TextureFormat, TextureUsage};

new_key_type! {
    pub struct DrawableId;
}

pub enum Drawable {
    StaticMesh(StaticMesh),
    Skybox(Skybox),
    Camera(Camera),
}

impl Drawable {
    pub fn kind(&self) -> &'static str {
        match self {
            Drawable::StaticMesh(_) => "static mesh",
            Drawable::Skybox(_) => "skybox",
            Drawable::Camera(_) => "camera",
        }
    }
}

pub type NodeId = usize;

pub struct SceneNode {
    pub local: Mat4,
    pub drawable: Option<DrawableId>,
    pub children: Vec<NodeId>,
    parent: Option<NodeId>,
}

pub struct Scene {
    drawables: SlotMap<DrawableId, Drawable>,
    nodes: Vec<SceneNode>,
    last_built: Option<DrawableId>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub const ROOT: NodeId = 0;

    pub fn new() -> Self {
        Self {
            drawables: SlotMap::with_key(),
            nodes: vec![SceneNode {
                local: Mat4::IDENTITY,
                drawable: None,
                children: Vec::new(),
                parent: None,
            }],
            last_built: None,
        }
    }

    pub fn add_drawable(&mut self, drawable: Drawable) -> DrawableId {
        let id = self.drawables.insert(drawable);
        self.last_built = Some(id);
        id
    }

    /// Most recently added drawable
    pub fn last_built(&self) -> Option<DrawableId> {
        self.last_built
    }

    /// Attach a node under `parent`. Returns `None` if `parent` does not exist.
    pub fn add_node(&mut self, parent: NodeId, drawable: Option<DrawableId>, local: Mat4) -> Option<NodeId> {
        if parent >= self.nodes.len() {
            return None;
        }
        let id = self.nodes.len();
        self.nodes.push(SceneNode {
            local,
            drawable,
            children: Vec::new(),
            parent: Some(parent),
        });
        self.nodes[parent].children.push(id);
        Some(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[], |node| &node.children)
    }

    /// Product of the local transforms from the root down to `id`
    pub fn world_transform(&self, id: NodeId) -> Option<Mat4> {
        let mut node = self.nodes.get(id)?;
        let mut world = node.local;
        while let Some(parent) = node.parent {
            node = &self.nodes[parent];
            world = node.local * world;
        }
        Some(world)
    }

    pub fn get(&self, id: DrawableId) -> Option<&Drawable> {
        self.drawables.get(id)
    }

    pub fn get_mut(&mut self, id: DrawableId) -> Option<&mut Drawable> {
        self.drawables.get_mut(id)
    }

    pub fn drawables_mut(&mut self) -> impl Iterator<Item = &mut Drawable> {
        self.drawables.values_mut()
    }

    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    /// Depth-first pre-order of every placed drawable with its world
    /// transform; skyboxes come first so everything else draws over them
    pub fn draw_order(&self) -> Vec<(DrawableId, Mat4)> {
        let mut order = Vec::new();
        let mut stack = vec![(Self::ROOT, Mat4::IDENTITY)];
        while let Some((id, parent)) = stack.pop() {
            let node = &self.nodes[id];
            let world = parent * node.local;
            if let Some(drawable) = node.drawable.filter(|d| self.drawables.contains_key(*d)) {
                order.push((drawable, world));
            }
            // Reversed so the first child is visited first
            stack.extend(node.children.iter().rev().map(|&child| (child, world)));
        }
        skyboxes_first(order, |(id, _)| matches!(self.drawables.get(*id), Some(Drawable::Skybox(_))))
    }

    /// The first camera in draw order
    pub fn camera(&self) -> Option<&Camera> {
        self.draw_order().into_iter().find_map(|(id, _)| match self.drawables.get(id) {
            Some(Drawable::Camera(camera)) => Some(camera),
            _ => None,
        })
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        let id = self
            .draw_order()
            .into_iter()
            .map(|(id, _)| id)
            .find(|id| matches!(self.drawables.get(*id), Some(Drawable::Camera(_))))?;
        match self.drawables.get_mut(id) {
            Some(Drawable::Camera(camera)) => Some(camera),
            _ => None,
        }
    }
}

/// Stable partition: items matching `first` keep their order and move ahead
fn skyboxes_first<T>(items: Vec<T>, first: impl Fn(&T) -> bool) -> Vec<T> {
    let (mut front, back): (Vec<T>, Vec<T>) = items.into_iter().partition(|item| first(item));
    front.extend(back);
    front
}

/// Everything GPU-side scene objects need to build themselves
pub struct BuildContext<'a> {
    pub device: &'a Arc<VulkanDevice>,
    pub allocator: &'a Arc<ResourceAllocator>,
    pub pool: &'a CommandPool,
}

impl BuildContext<'_> {
    /// Upload `layers` into one image, generate mips if asked, and leave it in
    /// `ShaderReadOnly`
    pub fn upload_texture(&self, name: &str, layers: &[&ImageData], mipmapped: bool) -> Result<Image, BuildError> {
        let Some(first) = layers.first() else {
            return Err(BuildError::Alloc(crate::error::AllocError::InvalidExtent {
                name: name.to_string(),
                width: 0,
                height: 0,
                layers: 0,
            }));
        };

        let mut staging = Vec::with_capacity(layers.len());
        for (index, layer) in layers.iter().enumerate() {
            let mut buffer = self.allocator.allocate_buffer(
                &format!("{name} staging {index}"),
                BufferUsage::TRANSFER_SRC,
                layer.rgba.len() as u64,
            )?;
            buffer.fill(&layer.rgba)?;
            staging.push(buffer);
        }

        let usage = TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST;
        let mut image = if layers.len() == 1 {
            self.allocator
                .allocate_image_2d(name, TextureFormat::Rgba8Srgb, usage, first.width, first.height, mipmapped)?
        } else {
            self.allocator.allocate_image_layered(
                name,
                TextureFormat::Rgba8Srgb,
                usage,
                first.width,
                first.height,
                layers.len() as u32,
            )?
        };

        command::submit_immediate(self.pool, |cmd: &mut CommandBuffer| -> Result<(), BuildError> {
            for (layer, buffer) in staging.iter().enumerate() {
                image.upload(cmd, buffer, layer as u32)?;
            }
            image.generate_mipmaps(cmd);
            Ok(())
        })?;
        Ok(image)
    }
}

/// Source files of one vertex + fragment shader pair
#[derive(Debug, Clone)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPaths {
    /// `<dir>/<name>.vert.spv` and `<dir>/<name>.frag.spv`
    pub fn in_dir(dir: impl Into<PathBuf>, name: &str) -> Self {
        let dir = dir.into();
        Self {
            vertex: dir.join(format!("{name}.vert.spv")),
            fragment: dir.join(format!("{name}.frag.spv")),
        }
    }
}

/// Push constants shared by the mesh and skybox shaders
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct PushConstants {
    pub view_proj: Mat4,
    pub model: Mat4,
}

/// One recorded draw, made of plain handles so it can be moved into a render
/// graph pass
#[derive(Debug, Clone, Copy)]
pub struct DrawCall {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub push_stages: vk::ShaderStageFlags,
    pub descriptor_set: vk::DescriptorSet,
    /// Vertex and index buffer; `None` draws `count` generated vertices
    pub geometry: Option<(vk::Buffer, vk::Buffer)>,
    pub count: u32,
    pub push_constants: PushConstants,
}

impl DrawCall {
    pub fn record(&self, cmd: &CommandBuffer) {
        cmd.bind_pipeline(self.pipeline);
        cmd.bind_descriptor_set(self.layout, self.descriptor_set);
        if !self.push_stages.is_empty() {
            cmd.push_constants(self.layout, self.push_stages, bytemuck::bytes_of(&self.push_constants));
        }
        match self.geometry {
            Some((vertices, indices)) => {
                cmd.bind_vertex_buffer(vertices);
                cmd.bind_index_buffer(indices);
                cmd.draw_indexed(self.count);
            }
            None => cmd.draw(self.count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn camera_at(z: f32) -> Drawable {
        Drawable::Camera(Camera::new(Vec3::new(0.0, 0.0, z), 1.0))
    }

    #[test]
    fn world_transform_composes_parents() {
        let mut scene = Scene::new();
        let parent = scene
            .add_node(Scene::ROOT, None, Mat4::from_translation(Vec3::X))
            .unwrap();
        let child = scene
            .add_node(parent, None, Mat4::from_translation(Vec3::Y))
            .unwrap();
        let world = scene.world_transform(child).unwrap();
        assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(scene.children(parent), &[child]);
        assert!(scene.world_transform(99).is_none());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut scene = Scene::new();
        assert!(scene.add_node(5, None, Mat4::IDENTITY).is_none());
    }

    #[test]
    fn draw_order_is_depth_first_pre_order() {
        let mut scene = Scene::new();
        let a = scene.add_drawable(camera_at(1.0));
        let b = scene.add_drawable(camera_at(2.0));
        let c = scene.add_drawable(camera_at(3.0));
        assert_eq!(scene.last_built(), Some(c));

        let node_a = scene.add_node(Scene::ROOT, Some(a), Mat4::IDENTITY).unwrap();
        scene.add_node(Scene::ROOT, Some(c), Mat4::IDENTITY).unwrap();
        scene
            .add_node(node_a, Some(b), Mat4::from_translation(Vec3::Z))
            .unwrap();

        let order: Vec<_> = scene.draw_order().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn unplaced_drawables_are_not_drawn() {
        let mut scene = Scene::new();
        scene.add_drawable(camera_at(0.0));
        assert!(scene.draw_order().is_empty());
        assert!(scene.camera().is_none());
        assert_eq!(scene.drawable_count(), 1);
    }

    #[test]
    fn first_camera_in_draw_order_is_active() {
        let mut scene = Scene::new();
        let far = scene.add_drawable(camera_at(10.0));
        let near = scene.add_drawable(camera_at(1.0));
        scene.add_node(Scene::ROOT, Some(near), Mat4::IDENTITY);
        scene.add_node(Scene::ROOT, Some(far), Mat4::IDENTITY);
        assert_eq!(scene.camera().unwrap().position.z, 1.0);

        scene.camera_mut().unwrap().position.z = 4.0;
        match scene.get(near) {
            Some(Drawable::Camera(camera)) => assert_eq!(camera.position.z, 4.0),
            _ => panic!("camera expected"),
        }
    }

    #[test]
    fn partition_keeps_relative_order() {
        let items = vec![1, 2, 3, 4, 5, 6];
        assert_eq!(skyboxes_first(items, |n| n % 3 == 0), vec![3, 6, 1, 2, 4, 5]);
    }

    #[test]
    fn push_constants_are_two_matrices() {
        assert_eq!(std::mem::size_of::<PushConstants>(), 128);
    }

    #[test]
    fn shader_paths_follow_naming() {
        let paths = ShaderPaths::in_dir("shaders", "mesh");
        assert_eq!(paths.vertex, PathBuf::from("shaders/mesh.vert.spv"));
        assert_eq!(paths.fragment, PathBuf::from("shaders/mesh.frag.spv"));
    }
}
