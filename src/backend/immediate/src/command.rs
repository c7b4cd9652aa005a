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

//! Serialized device commands and the deferred context recording them.

use rhi_core::pso::PrimitiveTopology;
use rhi_core::{Buffer, IndexFormat, Offset, Rect, Texture, Viewport};
use smallvec::SmallVec;
use std::mem;
use std::sync::Arc;

use crate::native::{ResourceId, Stage, TargetView, View};
use crate::state::StateId;
use crate::Backend;

/// A resource taking part in a copy or update.
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

/// A box of a subresource, end exclusive. Buffers only use `left..right`, in bytes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CopyBox {
    pub left: u32,
    pub top: u32,
    pub front: u32,
    pub right: u32,
    pub bottom: u32,
    pub back: u32,
}

impl CopyBox {
    pub fn bytes(offset: u32, size: u32) -> Self {
        CopyBox {
            left: offset,
            top: 0,
            front: 0,
            right: offset + size,
            bottom: 1,
            back: 1,
        }
    }
}

/// A vertex buffer binding: buffer, stride and offset.
pub type VertexBinding = Option<(ResourceId, u32, u32)>;

///Serialized device command.
#[derive(Clone, Debug)]
pub enum Command {
    /// Unbind everything and restore default state.
    ClearState,
    // states
    SetInputLayout(StateId),
    SetPrimitiveTopology(PrimitiveTopology),
    SetShader(Stage, Option<StateId>),
    SetBlendState(StateId, [f32; 4]),
    SetDepthStencilState(StateId, u32),
    SetRasterizerState(StateId),
    SetViewports(SmallVec<[Viewport; 8]>),
    SetScissorRects(SmallVec<[Rect; 8]>),
    SetVertexBuffers {
        start: u32,
        buffers: SmallVec<[VertexBinding; 16]>,
    },
    SetIndexBuffer {
        buffer: Option<ResourceId>,
        format: IndexFormat,
        offset: u32,
    },
    SetRenderTargets {
        rtvs: SmallVec<[TargetView; 8]>,
        dsv: Option<TargetView>,
    },
    /// Unordered access views of the graphic stages, after the render targets.
    SetGraphicUnorderedAccessViews {
        start: u32,
        views: SmallVec<[Option<View>; 8]>,
    },
    SetComputeUnorderedAccessViews {
        start: u32,
        views: SmallVec<[Option<View>; 8]>,
    },
    SetConstantBuffers {
        stage: Stage,
        start: u32,
        buffers: SmallVec<[Option<ResourceId>; 4]>,
    },
    /// Constant buffers bound from a 16 byte constant onwards.
    SetConstantBuffers1 {
        stage: Stage,
        start: u32,
        buffers: SmallVec<[Option<ResourceId>; 4]>,
        first_constant: SmallVec<[u32; 4]>,
        constant_count: SmallVec<[u32; 4]>,
    },
    SetShaderResources {
        stage: Stage,
        start: u32,
        views: SmallVec<[Option<View>; 4]>,
    },
    SetSamplers {
        stage: Stage,
        start: u32,
        samplers: SmallVec<[Option<ResourceId>; 4]>,
    },
    // drawing
    ClearRenderTargetView {
        texture: Arc<Texture<Backend>>,
        mip_level: u32,
        array_layer: u32,
        color: [f32; 4],
    },
    ClearDepthStencilView {
        texture: Arc<Texture<Backend>>,
        mip_level: u32,
        array_layer: u32,
        depth: f32,
        stencil: Option<u8>,
    },
    Draw {
        vertex_count: u32,
        vertex_start: u32,
    },
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        vertex_start: u32,
        instance_start: u32,
    },
    DrawIndexed {
        index_count: u32,
        index_start: u32,
        vertex_offset: i32,
    },
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        index_start: u32,
        vertex_offset: i32,
        instance_start: u32,
    },
    DrawInstancedIndirect {
        buffer: Arc<Buffer<Backend>>,
        offset: u32,
    },
    DrawIndexedInstancedIndirect {
        buffer: Arc<Buffer<Backend>>,
        offset: u32,
    },
    Dispatch(u32, u32, u32),
    DispatchIndirect {
        buffer: Arc<Buffer<Backend>>,
        offset: u32,
    },
    // resource updates
    UpdateSubresource {
        resource: Resource,
        subresource: u32,
        region: Option<CopyBox>,
        data: Vec<u8>,
    },
    /// Replace a dynamic buffer's whole contents.
    MapDiscard {
        buffer: Arc<Buffer<Backend>>,
        data: Vec<u8>,
    },
    CopySubresourceRegion {
        destination: Resource,
        destination_subresource: u32,
        destination_origin: Offset,
        source: Resource,
        source_subresource: u32,
        region: Option<CopyBox>,
    },
    GenerateMips(Arc<Texture<Backend>>),
    ResolveSubresource {
        destination: Arc<Texture<Backend>>,
        source: Arc<Texture<Backend>>,
    },
    // annotations
    BeginEvent(String),
    EndEvent,
    SetMarker(String),
}

/// A finished list of commands, replayed as a whole on the immediate context.
#[derive(Debug, Default)]
pub struct NativeCommandList {
    pub(crate) commands: Vec<Command>,
}

impl NativeCommandList {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

/// Records commands for later execution.
#[derive(Debug, Default)]
pub struct DeferredContext {
    commands: Vec<Command>,
}

impl DeferredContext {
    pub fn new() -> Self {
        DeferredContext { commands: Vec::new() }
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn clear_state(&mut self) {
        self.commands.push(Command::ClearState);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Move everything recorded so far into a command list.
    pub fn finish_command_list(&mut self) -> NativeCommandList {
        NativeCommandList {
            commands: mem::replace(&mut self.commands, Vec::new()),
        }
    }
}
