// Copyright 2017 The Gfx-rs Developers.
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

//! Native objects of the emulated immediate-context device.

use bitflags::bitflags;
use parking_lot::RwLock;
use rhi_core::pso::PrimitiveTopology;
use rhi_core::{BufferUsage, ShaderStages, TextureUsage};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::state::StateId;

/// Identity of a native object, unique for the lifetime of the process.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ResourceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

bitflags!(
    /// Pipeline stages a resource may be bound to.
    pub struct BindFlags: u16 {
        const VERTEX_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const CONSTANT_BUFFER = 0x4;
        const SHADER_RESOURCE = 0x8;
        const UNORDERED_ACCESS = 0x10;
        const RENDER_TARGET = 0x20;
        const DEPTH_STENCIL = 0x40;
    }
);

impl BindFlags {
    pub fn from_buffer_usage(usage: BufferUsage) -> Self {
        let mut flags = BindFlags::empty();
        if usage.contains(BufferUsage::VERTEX) {
            flags |= BindFlags::VERTEX_BUFFER;
        }
        if usage.contains(BufferUsage::INDEX) {
            flags |= BindFlags::INDEX_BUFFER;
        }
        if usage.contains(BufferUsage::CONSTANT) {
            flags |= BindFlags::CONSTANT_BUFFER;
        }
        if usage.intersects(BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE) {
            flags |= BindFlags::SHADER_RESOURCE;
        }
        if usage.contains(BufferUsage::STRUCTURED_READ_WRITE) {
            flags |= BindFlags::UNORDERED_ACCESS;
        }
        flags
    }

    pub fn from_texture_usage(usage: TextureUsage) -> Self {
        let mut flags = BindFlags::empty();
        if usage.intersects(TextureUsage::SAMPLED | TextureUsage::GENERATE_MIPMAPS) {
            flags |= BindFlags::SHADER_RESOURCE;
        }
        if usage.contains(TextureUsage::STORAGE) {
            flags |= BindFlags::UNORDERED_ACCESS;
        }
        if usage.intersects(TextureUsage::RENDER_TARGET | TextureUsage::GENERATE_MIPMAPS) {
            flags |= BindFlags::RENDER_TARGET;
        }
        if usage.contains(TextureUsage::DEPTH_STENCIL) {
            flags |= BindFlags::DEPTH_STENCIL;
        }
        flags
    }
}

/// How the CPU may reach a resource.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CpuAccess {
    /// GPU only; written through `UpdateSubresource` or copies.
    None,
    /// Rewritten whole through a discarding map.
    WriteDiscard,
    /// Mappable in both directions, never bound.
    Staging,
}

pub struct Buffer {
    pub(crate) id: ResourceId,
    pub(crate) bind: BindFlags,
    pub(crate) access: CpuAccess,
    pub(crate) memory: RwLock<Vec<u8>>,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("bind", &self.bind)
            .field("access", &self.access)
            .finish()
    }
}

impl Buffer {
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

pub struct Texture {
    pub(crate) id: ResourceId,
    pub(crate) bind: BindFlags,
    pub(crate) access: CpuAccess,
    pub(crate) memory: RwLock<Vec<u8>>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("bind", &self.bind)
            .field("access", &self.access)
            .finish()
    }
}

impl Texture {
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

/// A view bound to a shader resource or unordered access slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum View {
    /// A range of a structured buffer.
    Buffer { resource: ResourceId, offset: u32, size: u32 },
    /// A texture view.
    Texture { view: ResourceId, resource: ResourceId },
}

impl View {
    /// The viewed resource.
    pub fn resource(&self) -> ResourceId {
        match *self {
            View::Buffer { resource, .. } | View::Texture { resource, .. } => resource,
        }
    }
}

#[derive(Debug)]
pub struct TextureView {
    pub(crate) srv: Option<View>,
    pub(crate) uav: Option<View>,
}

#[derive(Debug)]
pub struct Sampler {
    pub(crate) id: ResourceId,
}

/// A render target or depth-stencil view.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TargetView {
    pub resource: ResourceId,
    pub mip_level: u32,
    pub array_layer: u32,
}

#[derive(Debug)]
pub struct Framebuffer {
    pub(crate) rtvs: SmallVec<[TargetView; 8]>,
    pub(crate) dsv: Option<TargetView>,
}

/// Shader stages of the native pipeline, each with its own binding tables.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Stage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}

impl Stage {
    pub const GRAPHICS: [Stage; 5] = [Stage::Vertex, Stage::Hull, Stage::Domain, Stage::Geometry, Stage::Pixel];

    /// Native stages named by `stages`, in pipeline order.
    pub fn iter(stages: ShaderStages) -> impl Iterator<Item = Stage> {
        [
            (ShaderStages::VERTEX, Stage::Vertex),
            (ShaderStages::TESSELLATION_CONTROL, Stage::Hull),
            (ShaderStages::TESSELLATION_EVALUATION, Stage::Domain),
            (ShaderStages::GEOMETRY, Stage::Geometry),
            (ShaderStages::PIXEL, Stage::Pixel),
            (ShaderStages::COMPUTE, Stage::Compute),
        ]
        .iter()
        .filter(move |&&(flag, _)| stages.contains(flag))
        .map(|&(_, stage)| stage)
        .collect::<SmallVec<[Stage; 6]>>()
        .into_iter()
    }
}

#[derive(Debug)]
pub struct GraphicPipeline {
    pub(crate) blend: StateId,
    pub(crate) blend_factor: [f32; 4],
    pub(crate) depth_stencil: StateId,
    pub(crate) stencil_reference: u32,
    pub(crate) rasterizer: StateId,
    pub(crate) topology: PrimitiveTopology,
    pub(crate) input_layout: StateId,
    /// One shader per graphic stage, indexed like [`Stage::GRAPHICS`].
    pub(crate) shaders: [Option<StateId>; 5],
}

#[derive(Debug)]
pub struct ComputePipeline {
    pub(crate) shader: StateId,
}
