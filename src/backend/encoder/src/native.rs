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

//! Native objects of the emulated encoder device.

use bitflags::bitflags;
use parking_lot::RwLock;
use rhi_core::pso::{FaceCullMode, FrontFace, PolygonFillMode, PrimitiveTopology};
use rhi_core::ShaderStages;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::soft::RenderPassDescriptor;

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
    /// Stages of a render encoder with their own argument tables.
    pub struct RenderStages: u8 {
        const VERTEX = 0x1;
        const FRAGMENT = 0x2;
    }
);

impl RenderStages {
    pub fn from_shader_stages(stages: ShaderStages) -> Self {
        let mut out = RenderStages::empty();
        if stages.contains(ShaderStages::VERTEX) {
            out |= RenderStages::VERTEX;
        }
        if stages.contains(ShaderStages::PIXEL) {
            out |= RenderStages::FRAGMENT;
        }
        out
    }
}

/// Where the memory of a resource lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageMode {
    /// GPU only.
    Private,
    /// Visible to the CPU. Staging textures are linear buffers in this mode.
    Shared,
}

pub struct Buffer {
    pub(crate) id: ResourceId,
    pub(crate) storage: StorageMode,
    pub(crate) memory: RwLock<Vec<u8>>,
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("storage", &self.storage)
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
    pub(crate) storage: StorageMode,
    pub(crate) memory: RwLock<Vec<u8>>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Texture {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Staging textures have no texture object, only a linear buffer.
    pub fn is_buffer_backed(&self) -> bool {
        self.storage == StorageMode::Shared
    }
}

#[derive(Debug)]
pub struct TextureView {
    pub(crate) id: ResourceId,
    pub(crate) texture: ResourceId,
}

#[derive(Debug)]
pub struct Sampler {
    pub(crate) id: ResourceId,
}

/// Fixed-function state applied when a render pipeline becomes current.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterState {
    pub cull_mode: FaceCullMode,
    pub front_face: FrontFace,
    pub fill_mode: PolygonFillMode,
    pub depth_clip: bool,
    pub scissor_test: bool,
    pub depth_bias: f32,
    pub slope_scale: f32,
    pub depth_bias_clamp: f32,
}

#[derive(Debug)]
pub struct GraphicPipeline {
    pub(crate) id: ResourceId,
    pub(crate) primitive: PrimitiveTopology,
    pub(crate) raster: RasterState,
    pub(crate) blend_color: [f32; 4],
    pub(crate) depth_stencil: ResourceId,
    pub(crate) stencil_reference: u32,
    pub(crate) push_constants: bool,
}

/// What a compute pipeline does when dispatched on the emulated queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kernel {
    /// A user shader; dispatches are only traced.
    Shader,
    /// Byte copy between the buffers at indices 0 and 1, parameters at index 2.
    CopyBuffer,
}

#[derive(Debug)]
pub struct ComputePipeline {
    pub(crate) id: ResourceId,
    pub(crate) kernel: Kernel,
    pub(crate) threads_per_group: [u32; 3],
    pub(crate) push_constants: bool,
}

/// Render pass template of a framebuffer: every attachment loads and stores.
#[derive(Debug)]
pub struct Framebuffer {
    pub(crate) descriptor: RenderPassDescriptor,
}
