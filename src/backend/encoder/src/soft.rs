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

//! Software command buffers: passes of encoded render, compute and blit commands.

use rhi_core::pso::{FaceCullMode, FrontFace, PolygonFillMode, PrimitiveTopology};
use rhi_core::{Buffer, Extent, IndexFormat, Offset, Rect, Texture, Viewport};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::native::{Kernel, RenderStages, ResourceId};
use crate::Backend;

/// Linear memory taking part in a byte copy. Staging textures are addressed like buffers.
#[derive(Clone, Debug)]
pub enum Resource {
    Buffer(Arc<Buffer<Backend>>),
    Texture(Arc<Texture<Backend>>),
}

impl Resource {
    pub fn id(&self) -> ResourceId {
        match *self {
            Resource::Buffer(ref buffer) => buffer.raw().id,
            Resource::Texture(ref texture) => texture.raw().id,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadAction {
    DontCare,
    Load,
    Clear,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreAction {
    DontCare,
    Store,
    MultisampleResolve,
}

#[derive(Clone, Debug)]
pub struct ColorAttachment {
    pub texture: Arc<Texture<Backend>>,
    pub mip_level: u32,
    pub array_layer: u32,
    pub load: LoadAction,
    pub store: StoreAction,
    pub clear_color: [f32; 4],
    pub resolve_texture: Option<Arc<Texture<Backend>>>,
}

#[derive(Clone, Debug)]
pub struct DepthAttachment {
    pub texture: Arc<Texture<Backend>>,
    pub mip_level: u32,
    pub array_layer: u32,
    pub load: LoadAction,
    pub store: StoreAction,
    pub clear_depth: f32,
}

/// The stencil aspect of the depth attachment's texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StencilAttachment {
    pub load: LoadAction,
    pub store: StoreAction,
    pub clear_stencil: u8,
}

#[derive(Clone, Debug, Default)]
pub struct RenderPassDescriptor {
    pub colors: SmallVec<[ColorAttachment; 8]>,
    pub depth: Option<DepthAttachment>,
    pub stencil: Option<StencilAttachment>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DebugCommand {
    PushGroup(String),
    PopGroup,
    Signpost(String),
}

/// The index buffer a draw reads, with its byte offset already applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexBinding {
    pub buffer: ResourceId,
    pub format: IndexFormat,
    pub offset: u32,
}

#[derive(Clone, Debug)]
pub enum RenderCommand {
    SetViewports(SmallVec<[Viewport; 8]>),
    SetScissorRects(SmallVec<[Rect; 8]>),
    SetRenderPipelineState(ResourceId),
    SetCullMode(FaceCullMode),
    SetFrontFacing(FrontFace),
    SetTriangleFillMode(PolygonFillMode),
    SetDepthBias {
        bias: f32,
        slope_scale: f32,
        clamp: f32,
    },
    SetBlendColor([f32; 4]),
    SetDepthStencilState(ResourceId),
    SetDepthClipMode(bool),
    SetStencilReference(u32),
    BindBuffer {
        stages: RenderStages,
        index: u32,
        buffer: ResourceId,
        offset: u32,
    },
    BindBufferData {
        stages: RenderStages,
        index: u32,
        bytes: SmallVec<[u8; 128]>,
    },
    BindTexture {
        stages: RenderStages,
        index: u32,
        view: ResourceId,
    },
    BindSampler {
        stages: RenderStages,
        index: u32,
        sampler: ResourceId,
    },
    Draw {
        primitive: PrimitiveTopology,
        vertex_start: u32,
        vertex_count: u32,
        instance_count: u32,
        instance_start: u32,
    },
    DrawIndexed {
        primitive: PrimitiveTopology,
        index: IndexBinding,
        index_count: u32,
        instance_count: u32,
        base_vertex: i32,
        instance_start: u32,
    },
    DrawIndirect {
        primitive: PrimitiveTopology,
        buffer: Arc<Buffer<Backend>>,
        offset: u32,
    },
    DrawIndexedIndirect {
        primitive: PrimitiveTopology,
        index: IndexBinding,
        buffer: Arc<Buffer<Backend>>,
        offset: u32,
    },
    Debug(DebugCommand),
}

#[derive(Clone, Debug)]
pub enum ComputeCommand {
    SetComputePipelineState {
        pipeline: ResourceId,
        kernel: Kernel,
        threads_per_group: [u32; 3],
    },
    BindBuffer {
        index: u32,
        buffer: Arc<Buffer<Backend>>,
        offset: u32,
    },
    BindBufferData {
        index: u32,
        bytes: SmallVec<[u8; 128]>,
    },
    BindTexture {
        index: u32,
        view: ResourceId,
    },
    BindSampler {
        index: u32,
        sampler: ResourceId,
    },
    Dispatch {
        groups: [u32; 3],
    },
    DispatchIndirect {
        buffer: Arc<Buffer<Backend>>,
        offset: u32,
    },
    Debug(DebugCommand),
}

/// Placement of texel data inside linear memory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinearLayout {
    pub offset: u64,
    pub bytes_per_row: u32,
    pub bytes_per_image: u32,
}

#[derive(Clone, Debug)]
pub enum BlitCommand {
    CopyBuffer {
        source: Resource,
        source_offset: u64,
        destination: Resource,
        destination_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        source: Arc<Texture<Backend>>,
        source_layout: LinearLayout,
        destination: Arc<Texture<Backend>>,
        mip_level: u32,
        array_layer: u32,
        origin: Offset,
        extent: Extent,
    },
    CopyTextureToBuffer {
        source: Arc<Texture<Backend>>,
        mip_level: u32,
        array_layer: u32,
        origin: Offset,
        extent: Extent,
        destination: Arc<Texture<Backend>>,
        destination_layout: LinearLayout,
    },
    CopyTexture {
        source: Arc<Texture<Backend>>,
        source_mip_level: u32,
        source_layer: u32,
        source_origin: Offset,
        destination: Arc<Texture<Backend>>,
        destination_mip_level: u32,
        destination_layer: u32,
        destination_origin: Offset,
        extent: Extent,
    },
    GenerateMipmaps(Arc<Texture<Backend>>),
    Debug(DebugCommand),
}

#[derive(Clone, Debug)]
pub enum Pass {
    Render {
        descriptor: RenderPassDescriptor,
        commands: Vec<RenderCommand>,
    },
    Compute(Vec<ComputeCommand>),
    Blit(Vec<BlitCommand>),
}

impl Pass {
    pub fn is_render(&self) -> bool {
        match *self {
            Pass::Render { .. } => true,
            _ => false,
        }
    }
}

/// A finished recording, executed pass by pass on the queue.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    pub passes: Vec<Pass>,
}

impl CommandBuffer {
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }
}
