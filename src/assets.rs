// Asset loading - images, glTF models and skybox faces
//
// Everything here is CPU-side decoding. Results are plain data that the scene
// layer uploads. Procedural fallbacks let the editor run with no asset files.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use std::path::{Path, PathBuf};

use crate::error::AssetError;

/// Interleaved vertex shared by every mesh pipeline (48 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;
}

/// Tightly packed RGBA8 pixels
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl ImageData {
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, AssetError> {
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(AssetError::PixelCount {
                width,
                height,
                len: rgba.len(),
            });
        }
        Ok(Self { width, height, rgba })
    }

    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            width,
            height,
            rgba: color.repeat(width as usize * height as usize),
        }
    }

    /// `size` x `size` pixels, alternating colors every `cell` pixels
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut rgba = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let color = if (x / cell + y / cell) % 2 == 0 { a } else { b };
                rgba.extend_from_slice(&color);
            }
        }
        Self {
            width: size,
            height: size,
            rgba,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Model-space transform composed from the node hierarchy
    pub transform: Mat4,
    pub base_color: Option<ImageData>,
}

impl MeshData {
    /// Unit cube centred on the origin, counter-clockwise faces, outward normals
    pub fn cube() -> Self {
        // (normal, u axis, v axis) with u x v = normal
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let base = vertices.len() as u32;
            let corners = [
                (-1.0, -1.0, [0.0, 1.0]),
                (1.0, -1.0, [1.0, 1.0]),
                (1.0, 1.0, [1.0, 0.0]),
                (-1.0, 1.0, [0.0, 0.0]),
            ];
            for (su, sv, uv) in corners {
                let position = (normal + u * su + v * sv) * 0.5;
                vertices.push(Vertex {
                    position: position.to_array(),
                    normal: normal.to_array(),
                    uv,
                    color: [1.0; 4],
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self {
            vertices,
            indices,
            transform: Mat4::IDENTITY,
            base_color: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelData {
    pub meshes: Vec<MeshData>,
}

/// World transform of a child node given its parent's
pub fn compose_transforms(parent: Mat4, local: Mat4) -> Mat4 {
    parent * local
}

/// Widen 8-bit pixels with `channels` components to RGBA8. Missing color
/// channels are zero, missing alpha is opaque; one channel is treated as gray.
pub fn expand_to_rgba(channels: usize, width: u32, height: u32, pixels: &[u8]) -> Result<ImageData, AssetError> {
    if !(1..=4).contains(&channels) {
        return Err(AssetError::UnsupportedTextureFormat(format!("{channels} channels")));
    }
    let count = width as usize * height as usize;
    if pixels.len() != count * channels {
        return Err(AssetError::PixelCount {
            width,
            height,
            len: pixels.len(),
        });
    }

    let mut rgba = Vec::with_capacity(count * 4);
    for texel in pixels.chunks_exact(channels) {
        let pixel = match *texel {
            [l] => [l, l, l, 255],
            [r, g] => [r, g, 0, 255],
            [r, g, b] => [r, g, b, 255],
            [r, g, b, a, ..] => [r, g, b, a],
            [] => [0, 0, 0, 255],
        };
        rgba.extend_from_slice(&pixel);
    }
    Ok(ImageData { width, height, rgba })
}

fn gltf_image_to_rgba(data: &gltf::image::Data) -> Result<ImageData, AssetError> {
    use gltf::image::Format;
    let channels = match data.format {
        Format::R8 => 1,
        Format::R8G8 => 2,
        Format::R8G8B8 => 3,
        Format::R8G8B8A8 => 4,
        other => return Err(AssetError::UnsupportedTextureFormat(format!("{other:?}"))),
    };
    expand_to_rgba(channels, data.width, data.height, &data.pixels)
}

pub fn load_image(path: impl AsRef<Path>) -> Result<ImageData, AssetError> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|source| AssetError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let rgba = image.to_rgba8();
    Ok(ImageData {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

/// Load every triangle mesh of the default scene of a glTF file
pub fn load_model(path: impl AsRef<Path>) -> Result<ModelData, AssetError> {
    let path = path.as_ref();
    let (document, buffers, images) = gltf::import(path).map_err(|source| AssetError::Gltf {
        path: path.to_path_buf(),
        source,
    })?;

    let loader = ModelLoader {
        path,
        buffers: &buffers,
        images: &images,
    };
    let mut meshes = Vec::new();
    let scene = document.default_scene().or_else(|| document.scenes().next());
    match scene {
        Some(scene) => {
            for node in scene.nodes() {
                loader.visit(&node, Mat4::IDENTITY, &mut meshes)?;
            }
        }
        // No scene: meshes sit at the origin
        None => {
            for mesh in document.meshes() {
                loader.load_mesh(&mesh, Mat4::IDENTITY, &mut meshes)?;
            }
        }
    }

    if meshes.is_empty() {
        return Err(AssetError::NoMeshes(path.to_path_buf()));
    }
    log::info!("Loaded {} mesh(es) from {}", meshes.len(), path.display());
    Ok(ModelData { meshes })
}

struct ModelLoader<'a> {
    path: &'a Path,
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
}

impl ModelLoader<'_> {
    fn visit(&self, node: &gltf::Node<'_>, parent: Mat4, out: &mut Vec<MeshData>) -> Result<(), AssetError> {
        let local = Mat4::from_cols_array_2d(&node.transform().matrix());
        let world = compose_transforms(parent, local);
        if let Some(mesh) = node.mesh() {
            self.load_mesh(&mesh, world, out)?;
        }
        for child in node.children() {
            self.visit(&child, world, out)?;
        }
        Ok(())
    }

    fn load_mesh(&self, mesh: &gltf::Mesh<'_>, transform: Mat4, out: &mut Vec<MeshData>) -> Result<(), AssetError> {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!("Skipping non-triangle primitive in {}", self.path.display());
                continue;
            }

            let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or_else(|| AssetError::MissingPositions(self.path.to_path_buf()))?
                .collect();
            let count = positions.len();

            let mut normals = reader.read_normals().map(|n| n.collect::<Vec<_>>()).unwrap_or_default();
            normals.resize(count, [0.0, 1.0, 0.0]);
            let mut uvs = reader
                .read_tex_coords(0)
                .map(|t| t.into_f32().collect::<Vec<_>>())
                .unwrap_or_default();
            uvs.resize(count, [0.0, 0.0]);

            let pbr = primitive.material().pbr_metallic_roughness();
            let mut colors = reader
                .read_colors(0)
                .map(|c| c.into_rgba_f32().collect::<Vec<_>>())
                .unwrap_or_default();
            colors.resize(count, pbr.base_color_factor());

            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..count as u32).collect(),
            };

            let base_color = match pbr.base_color_texture() {
                Some(info) => {
                    let index = info.texture().source().index();
                    self.images.get(index).map(gltf_image_to_rgba).transpose()?
                }
                None => None,
            };

            let vertices = (0..count)
                .map(|i| Vertex {
                    position: positions[i],
                    normal: normals[i],
                    uv: uvs[i],
                    color: colors[i],
                })
                .collect();
            out.push(MeshData {
                vertices,
                indices,
                transform,
                base_color,
            });
        }
        Ok(())
    }
}

/// Face file stems in cube-map layer order
pub const CUBE_FACES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

fn face_path(dir: &Path, stem: &str) -> PathBuf {
    ["png", "jpg", "jpeg"]
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.exists())
        .unwrap_or_else(|| dir.join(format!("{stem}.png")))
}

/// All faces must share the size of the first
pub fn check_cube_faces(faces: &[ImageData; 6]) -> Result<(), AssetError> {
    let expected = faces[0].size();
    for (face, image) in CUBE_FACES.iter().zip(faces.iter()) {
        if image.size() != expected {
            return Err(AssetError::MismatchedCubeFaces {
                face: *face,
                expected,
                found: image.size(),
            });
        }
    }
    Ok(())
}

/// Load `px, nx, py, ny, pz, nz` (png or jpg) from `dir`
pub fn load_cube_faces(dir: impl AsRef<Path>) -> Result<[ImageData; 6], AssetError> {
    let dir = dir.as_ref();
    let [px, nx, py, ny, pz, nz] = CUBE_FACES.map(|stem| load_image(face_path(dir, stem)));
    let faces = [px?, nx?, py?, ny?, pz?, nz?];
    check_cube_faces(&faces)?;
    Ok(faces)
}

/// Vertical gradient sky: horizon faces fade from `zenith` to `horizon`
pub fn procedural_sky(size: u32, zenith: [u8; 4], horizon: [u8; 4]) -> [ImageData; 6] {
    let side = || {
        let mut rgba = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            let t = y as f32 / size.saturating_sub(1).max(1) as f32;
            let pixel: [u8; 4] =
                std::array::from_fn(|i| (zenith[i] as f32 + (horizon[i] as f32 - zenith[i] as f32) * t) as u8);
            for _ in 0..size {
                rgba.extend_from_slice(&pixel);
            }
        }
        ImageData {
            width: size,
            height: size,
            rgba,
        }
    };
    [
        side(),
        side(),
        ImageData::solid(size, size, zenith),
        ImageData::solid(size, size, horizon),
        side(),
        side(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_48_bytes() {
        assert_eq!(Vertex::STRIDE, 48);
    }

    #[test]
    fn cube_faces_wind_counter_clockwise_outwards() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for triangle in cube.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from(cube.vertices[triangle[i] as usize].position));
            let normal = Vec3::from(cube.vertices[triangle[0] as usize].normal);
            assert!((b - a).cross(c - a).dot(normal) > 0.0);
        }
        for vertex in &cube.vertices {
            assert!(vertex.position.iter().all(|c| c.abs() == 0.5));
        }
    }

    #[test]
    fn transforms_compose_root_to_leaf() {
        let parent = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let local = Mat4::from_scale(Vec3::splat(2.0));
        let world = compose_transforms(parent, local);
        // Scale first, then the parent's translation
        assert_eq!(world.transform_point3(Vec3::ONE), Vec3::new(3.0, 2.0, 2.0));
    }

    #[test]
    fn rgb_expands_with_opaque_alpha() {
        let image = expand_to_rgba(3, 2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(image.rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn gray_expands_to_all_channels() {
        let image = expand_to_rgba(1, 1, 1, &[9]).unwrap();
        assert_eq!(image.rgba, vec![9, 9, 9, 255]);
    }

    #[test]
    fn wrong_pixel_count_is_rejected() {
        assert!(matches!(
            expand_to_rgba(4, 2, 2, &[0; 12]),
            Err(AssetError::PixelCount { len: 12, .. })
        ));
        assert!(matches!(
            expand_to_rgba(5, 1, 1, &[0; 5]),
            Err(AssetError::UnsupportedTextureFormat(_))
        ));
        assert!(ImageData::from_rgba(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn checkerboard_alternates() {
        let white = [255; 4];
        let black = [0, 0, 0, 255];
        let image = ImageData::checkerboard(4, 2, white, black);
        let pixel = |x: usize, y: usize| &image.rgba[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(pixel(0, 0), white);
        assert_eq!(pixel(2, 0), black);
        assert_eq!(pixel(2, 2), white);
    }

    #[test]
    fn mismatched_cube_faces_name_the_face() {
        let mut faces: [ImageData; 6] = std::array::from_fn(|_| ImageData::solid(4, 4, [0; 4]));
        faces[3] = ImageData::solid(8, 8, [0; 4]);
        let err = check_cube_faces(&faces).unwrap_err();
        assert!(matches!(
            err,
            AssetError::MismatchedCubeFaces {
                face: "ny",
                expected: (4, 4),
                found: (8, 8)
            }
        ));
    }

    #[test]
    fn cube_faces_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        for (i, stem) in CUBE_FACES.iter().enumerate() {
            let face = image::RgbaImage::from_pixel(2, 2, image::Rgba([i as u8, 0, 0, 255]));
            face.save(dir.path().join(format!("{stem}.png"))).unwrap();
        }
        let faces = load_cube_faces(dir.path()).unwrap();
        assert_eq!(faces[4].rgba[0], 4);
    }

    #[test]
    fn missing_face_is_an_image_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_cube_faces(dir.path()), Err(AssetError::Image { .. })));
    }

    #[test]
    fn procedural_sky_faces_share_a_size() {
        let faces = procedural_sky(8, [40, 80, 160, 255], [200, 220, 255, 255]);
        assert!(check_cube_faces(&faces).is_ok());
        assert_eq!(&faces[0].rgba[..4], &[40, 80, 160, 255]);
    }
}
