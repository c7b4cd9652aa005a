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

#![deny(missing_docs)]

//! Low-level, backend-agnostic GPU command recording.
//!
//! A [`Device`] creates resources through its [`ResourceFactory`] and hands out
//! generation-checked [`Handle`]s to them. A [`CommandList`] records draws, dispatches and
//! copies against those handles, validates every call and filters redundant state changes
//! before forwarding to the backend's [`RawCommandList`].
//!
//! Backends plug in by implementing [`Backend`], [`RawDevice`] and [`RawCommandList`].

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

use std::fmt;

pub mod buffer;
pub mod command;
pub mod device;
pub mod dummy;
pub mod factory;
pub mod fence;
pub mod format;
pub mod framebuffer;
pub mod handle;
pub mod manager;
pub mod pso;
pub mod sampler;
pub mod staging;
pub mod swapchain;
pub mod texture;

pub use crate::buffer::{Buffer, BufferDescription, BufferRange, BufferUsage};
pub use crate::command::{CommandError, CommandList, RawCommandList, RecordingState, Rect, TextureCopy, Viewport};
pub use crate::device::{
    Api, ApiVersion, Completion, Device, DeviceDescription, DeviceError, HardwareInfo, MapAccess, MapError,
    MapTarget, MappedResource, RawDevice, SubmitError,
};
pub use crate::factory::{CreationError, ResourceFactory};
pub use crate::fence::{Fence, FenceState};
pub use crate::format::{IndexFormat, PixelFormat, VertexFormat};
pub use crate::framebuffer::{Attachment, AttachmentDescription, Framebuffer, FramebufferDescription};
pub use crate::handle::{kind, Handle, HandleError};
pub use crate::manager::ResourceManager;
pub use crate::pso::{
    BindingResource, BoundResource, ComputePipeline, ComputePipelineDescription, GraphicPipeline,
    GraphicPipelineDescription, OutputDescription, ResourceKind, ResourceLayout, ResourceLayoutDescription,
    ResourceLayoutElement, ResourceSet, ResourceSetDescription, ShaderStages,
};
pub use crate::sampler::{Sampler, SamplerDescription};
pub use crate::staging::StagingBufferPool;
pub use crate::swapchain::{Swapchain, SwapchainDescription};
pub use crate::texture::{
    Extent, Offset, SampleCount, SubresourceLayout, Texture, TextureDescription, TextureDimension, TextureRegion,
    TextureUsage, TextureView,
    TextureViewDescription,
};

/// Number of vertex buffer slots.
pub const MAX_VERTEX_BUFFERS: usize = 16;
/// Number of viewports and scissor rects.
pub const MAX_VIEWPORTS: usize = pso::MAX_COLOR_TARGETS;

/// Optional features a device may support.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Capabilities {
    pub depth_range_zero_to_one: bool,
    pub uv_origin_top_left: bool,
    pub clip_space_y_inverted: bool,
    pub compute_shader: bool,
    pub geometry_shader: bool,
    pub tessellation_shaders: bool,
    pub multiple_viewports: bool,
    pub sampler_lod_bias: bool,
    pub draw_base_vertex: bool,
    pub draw_base_instance: bool,
    pub draw_indirect: bool,
    pub draw_indirect_base_instance: bool,
    pub fill_mode_wireframe: bool,
    pub sampler_anisotropy: bool,
    pub depth_clip_disable: bool,
    pub texture_1d: bool,
    pub independent_blend: bool,
    pub structured_buffer: bool,
    pub subset_texture_view: bool,
    pub command_list_debug_markers: bool,
    pub buffer_range_binding: bool,
    pub shader_float64: bool,
    pub shader_float16: bool,
    pub conservative_rasterization: bool,
    pub command_lists: bool,
    pub concurrent_resources: bool,
}

/// Numeric limits of a device.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Limits {
    /// Alignment of dynamic offsets and ranges of constant buffers.
    pub constant_buffer_min_offset_alignment: u32,
    /// Alignment of dynamic offsets and ranges of structured buffers.
    pub structured_buffer_min_offset_alignment: u32,
    /// Largest texture edge.
    pub max_texture_dimension: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            constant_buffer_min_offset_alignment: 256,
            structured_buffer_min_offset_alignment: 16,
            max_texture_dimension: 16384,
        }
    }
}

/// The set of native types a backend provides.
pub trait Backend: 'static + Sized + Eq + Clone + fmt::Debug + Send + Sync {
    /// Native device.
    type Device: RawDevice<Self>;
    /// Native command recorder.
    type CommandList: RawCommandList<Self>;
    #[allow(missing_docs)]
    type Buffer: fmt::Debug + Send + Sync;
    #[allow(missing_docs)]
    type Texture: fmt::Debug + Send + Sync;
    #[allow(missing_docs)]
    type TextureView: fmt::Debug + Send + Sync;
    #[allow(missing_docs)]
    type Sampler: fmt::Debug + Send + Sync;
    #[allow(missing_docs)]
    type GraphicPipeline: fmt::Debug + Send + Sync;
    #[allow(missing_docs)]
    type ComputePipeline: fmt::Debug + Send + Sync;
    #[allow(missing_docs)]
    type Framebuffer: fmt::Debug + Send + Sync;
}
