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

//! A backend that executes nothing and records every call it receives.
//!
//! Device and command list tests run against it to observe exactly what the validation and
//! caching layers forward.

#![allow(missing_docs)]

use crate::buffer::{Buffer, BufferDescription};
use crate::command::{RawCommandList, Rect, TextureCopy, Viewport};
use crate::device::{Api, ApiVersion, Completion, DeviceDescription, DeviceError, HardwareInfo, RawDevice, SubmitError};
use crate::factory::CreationError;
use crate::format::{IndexFormat, PixelFormat};
use crate::framebuffer::{Attachment, Framebuffer};
use crate::pso::{
    ComputePipeline, ComputePipelineDescription, GraphicPipeline, GraphicPipelineDescription, ResourceLayout,
    ResourceSet, ShaderStages,
};
use crate::sampler::SamplerDescription;
use crate::staging::StagingBufferPool;
use crate::texture::{SampleCount, Texture, TextureDescription, TextureRegion, TextureViewDescription};
use crate::{Backend, Capabilities, Limits};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum DummyBackend {}

impl Backend for DummyBackend {
    type Device = DummyDevice;
    type CommandList = DummyCommandList;
    type Buffer = DummyBuffer;
    type Texture = DummyTexture;
    type TextureView = ();
    type Sampler = ();
    type GraphicPipeline = ();
    type ComputePipeline = ();
    type Framebuffer = ();
}

/// CPU memory standing in for a buffer.
#[derive(Debug)]
pub struct DummyBuffer {
    data: RwLock<Vec<u8>>,
}

impl DummyBuffer {
    pub fn new(desc: &BufferDescription) -> Self {
        DummyBuffer {
            data: RwLock::new(vec![0; desc.size as usize]),
        }
    }
}

/// CPU memory standing in for a texture, in linear layout.
#[derive(Debug)]
pub struct DummyTexture {
    data: RwLock<Vec<u8>>,
}

#[derive(Debug)]
pub struct DummyDevice {
    capabilities: Capabilities,
}

impl DummyDevice {
    pub const ADAPTER: &'static str = "Dummy Adapter";
}

impl RawDevice<DummyBackend> for DummyDevice {
    fn open(desc: &DeviceDescription, _staging: Arc<StagingBufferPool<DummyBackend>>) -> Result<Self, DeviceError> {
        match desc.adapter {
            Some(ref name) if name != Self::ADAPTER => Err(DeviceError::AdapterUnavailable(name.clone())),
            _ => Ok(DummyDevice {
                capabilities: Capabilities {
                    depth_range_zero_to_one: true,
                    uv_origin_top_left: true,
                    compute_shader: true,
                    multiple_viewports: true,
                    draw_base_vertex: true,
                    draw_base_instance: true,
                    draw_indirect: true,
                    fill_mode_wireframe: true,
                    depth_clip_disable: true,
                    texture_1d: true,
                    independent_blend: true,
                    structured_buffer: true,
                    subset_texture_view: true,
                    command_list_debug_markers: true,
                    buffer_range_binding: true,
                    command_lists: true,
                    ..Capabilities::default()
                },
            }),
        }
    }

    fn api(&self) -> Api {
        Api::Dummy
    }

    fn api_version(&self) -> ApiVersion {
        ApiVersion::default()
    }

    fn hardware_info(&self) -> HardwareInfo {
        HardwareInfo {
            name: Self::ADAPTER.into(),
            ..HardwareInfo::default()
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn limits(&self) -> Limits {
        Limits::default()
    }

    fn texture_sample_count_limit(&self, _format: PixelFormat, _is_depth: bool) -> SampleCount {
        SampleCount::X8
    }

    fn create_buffer(&self, desc: &BufferDescription) -> Result<DummyBuffer, CreationError> {
        Ok(DummyBuffer::new(desc))
    }

    fn create_texture(&self, desc: &TextureDescription) -> Result<DummyTexture, CreationError> {
        Ok(DummyTexture {
            data: RwLock::new(vec![0; desc.total_size() as usize]),
        })
    }

    fn create_texture_view(
        &self,
        _texture: &Arc<Texture<DummyBackend>>,
        _desc: &TextureViewDescription,
    ) -> Result<(), CreationError> {
        Ok(())
    }

    fn create_sampler(&self, _desc: &SamplerDescription) -> Result<(), CreationError> {
        Ok(())
    }

    fn create_graphic_pipeline(
        &self,
        _desc: &GraphicPipelineDescription,
        _layouts: &[Arc<ResourceLayout>],
    ) -> Result<(), CreationError> {
        Ok(())
    }

    fn create_compute_pipeline(
        &self,
        _desc: &ComputePipelineDescription,
        _layouts: &[Arc<ResourceLayout>],
    ) -> Result<(), CreationError> {
        Ok(())
    }

    fn create_framebuffer(
        &self,
        _colors: &[Attachment<DummyBackend>],
        _depth: Option<&Attachment<DummyBackend>>,
    ) -> Result<(), CreationError> {
        Ok(())
    }

    fn create_command_list(&self) -> DummyCommandList {
        DummyCommandList::default()
    }

    fn submit(&self, list: &mut DummyCommandList, completion: Completion<DummyBackend>) -> Result<(), SubmitError> {
        if list.reject_submissions {
            return Err(SubmitError::Rejected("rejected by the dummy backend".to_owned()));
        }
        list.submissions += 1;
        completion.complete();
        Ok(())
    }

    fn wait_for_idle(&self) {}

    fn read_buffer(&self, buffer: &Buffer<DummyBackend>, offset: u32, size: u32) -> Vec<u8> {
        let start = offset as usize;
        buffer.raw().data.read()[start..start + size as usize].to_vec()
    }

    fn write_buffer(&self, buffer: &Buffer<DummyBackend>, offset: u32, data: &[u8]) {
        let start = offset as usize;
        buffer.raw().data.write()[start..start + data.len()].copy_from_slice(data);
    }

    fn read_texture(&self, texture: &Texture<DummyBackend>, mip_level: u32, array_layer: u32) -> Vec<u8> {
        let layout = texture.desc().subresource_layout(mip_level, array_layer);
        let start = layout.offset as usize;
        texture.raw().data.read()[start..start + layout.size as usize].to_vec()
    }

    fn write_texture(&self, texture: &Texture<DummyBackend>, mip_level: u32, array_layer: u32, data: &[u8]) {
        let layout = texture.desc().subresource_layout(mip_level, array_layer);
        let start = layout.offset as usize;
        texture.raw().data.write()[start..start + layout.size as usize].copy_from_slice(&data[..layout.size as usize]);
    }

    fn update_buffer(&self, buffer: &Arc<Buffer<DummyBackend>>, offset: u32, data: &[u8]) -> Result<(), CreationError> {
        self.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn update_texture(
        &self,
        texture: &Arc<Texture<DummyBackend>>,
        data: &[u8],
        region: &TextureRegion,
    ) -> Result<(), CreationError> {
        let desc = texture.desc();
        let format = desc.format;
        let layout = desc.subresource_layout(region.mip_level, region.array_layer);
        let edge = format.unit_edge();
        let row_size = format.row_pitch(region.extent.width) as usize;
        let rows = format.num_rows(region.extent.height);
        let x = (region.origin.x / edge * format.unit_size_in_bytes()) as usize;
        let y = region.origin.y / edge;
        let mut memory = texture.raw().data.write();
        for z in 0..region.extent.depth {
            for row in 0..rows {
                let src = (z * rows + row) as usize * row_size;
                let dst = layout.offset as usize
                    + ((region.origin.z + z) * layout.depth_pitch) as usize
                    + ((y + row) * layout.row_pitch) as usize
                    + x;
                memory[dst..dst + row_size].copy_from_slice(&data[src..src + row_size]);
            }
        }
        Ok(())
    }
}

/// One raw call observed by a [`DummyCommandList`].
#[derive(Clone, Debug, PartialEq)]
pub enum DummyCall {
    Begin,
    End,
    ClearCachedState,
    SetFramebuffer,
    SetViewport(u32, Viewport),
    SetScissorRect(u32, Rect),
    SetGraphicPipeline,
    SetComputePipeline,
    SetVertexBuffer { index: u32, offset: u32 },
    SetIndexBuffer { format: IndexFormat, offset: u32 },
    SetGraphicResourceSet { slot: u32, offsets: Vec<u32> },
    SetComputeResourceSet { slot: u32, offsets: Vec<u32> },
    PushConstants { stages: ShaderStages, size: usize },
    ClearColorTarget(u32, [f32; 4]),
    ClearDepthStencilTarget(f32, u8),
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32 },
    DrawIndirect { offset: u32, draw_count: u32 },
    DrawIndexedIndirect { offset: u32, draw_count: u32 },
    Dispatch(u32, u32, u32),
    DispatchIndirect { offset: u32 },
    UpdateBuffer { offset: u32, size: usize },
    CopyBuffer { source_offset: u32, destination_offset: u32, size: u32 },
    CopyTexture(TextureCopy),
    GenerateMipmaps,
    ResolveTexture,
    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
}

#[derive(Debug, Default)]
pub struct DummyCommandList {
    calls: Vec<DummyCall>,
    submissions: usize,
    /// Make the next submissions fail with [`SubmitError::Rejected`].
    pub reject_submissions: bool,
}

impl DummyCommandList {
    /// Calls since the last begin or reset.
    pub fn calls(&self) -> &[DummyCall] {
        &self.calls
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count<F: Fn(&DummyCall) -> bool>(&self, predicate: F) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// Number of times the list was submitted.
    pub fn submissions(&self) -> usize {
        self.submissions
    }
}

impl RawCommandList<DummyBackend> for DummyCommandList {
    fn begin(&mut self) {
        self.calls.clear();
        self.calls.push(DummyCall::Begin);
    }

    fn end(&mut self) {
        self.calls.push(DummyCall::End);
    }

    fn reset(&mut self) {
        self.calls.clear();
    }

    fn clear_cached_state(&mut self) {
        self.calls.push(DummyCall::ClearCachedState);
    }

    fn set_framebuffer(&mut self, _framebuffer: &Arc<Framebuffer<DummyBackend>>) {
        self.calls.push(DummyCall::SetFramebuffer);
    }

    fn set_viewport(&mut self, index: u32, viewport: &Viewport) {
        self.calls.push(DummyCall::SetViewport(index, *viewport));
    }

    fn set_scissor_rect(&mut self, index: u32, rect: &Rect) {
        self.calls.push(DummyCall::SetScissorRect(index, *rect));
    }

    fn set_graphic_pipeline(&mut self, _pipeline: &Arc<GraphicPipeline<DummyBackend>>) {
        self.calls.push(DummyCall::SetGraphicPipeline);
    }

    fn set_compute_pipeline(&mut self, _pipeline: &Arc<ComputePipeline<DummyBackend>>) {
        self.calls.push(DummyCall::SetComputePipeline);
    }

    fn set_vertex_buffer(&mut self, index: u32, _buffer: &Arc<Buffer<DummyBackend>>, offset: u32) {
        self.calls.push(DummyCall::SetVertexBuffer { index, offset });
    }

    fn set_index_buffer(&mut self, _buffer: &Arc<Buffer<DummyBackend>>, format: IndexFormat, offset: u32) {
        self.calls.push(DummyCall::SetIndexBuffer { format, offset });
    }

    fn set_graphic_resource_set(&mut self, slot: u32, _set: &Arc<ResourceSet<DummyBackend>>, dynamic_offsets: &[u32]) {
        self.calls.push(DummyCall::SetGraphicResourceSet {
            slot,
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn set_compute_resource_set(&mut self, slot: u32, _set: &Arc<ResourceSet<DummyBackend>>, dynamic_offsets: &[u32]) {
        self.calls.push(DummyCall::SetComputeResourceSet {
            slot,
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn push_constants(&mut self, stages: ShaderStages, data: &[u8]) {
        self.calls.push(DummyCall::PushConstants {
            stages,
            size: data.len(),
        });
    }

    fn clear_color_target(&mut self, index: u32, color: [f32; 4]) {
        self.calls.push(DummyCall::ClearColorTarget(index, color));
    }

    fn clear_depth_stencil_target(&mut self, depth: f32, stencil: u8) {
        self.calls.push(DummyCall::ClearDepthStencilTarget(depth, stencil));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _vertex_start: u32, _instance_start: u32) {
        self.calls.push(DummyCall::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _index_start: u32,
        _vertex_offset: i32,
        _instance_start: u32,
    ) {
        self.calls.push(DummyCall::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn draw_indirect(&mut self, _buffer: &Arc<Buffer<DummyBackend>>, offset: u32, draw_count: u32, _stride: u32) {
        self.calls.push(DummyCall::DrawIndirect { offset, draw_count });
    }

    fn draw_indexed_indirect(&mut self, _buffer: &Arc<Buffer<DummyBackend>>, offset: u32, draw_count: u32, _stride: u32) {
        self.calls.push(DummyCall::DrawIndexedIndirect { offset, draw_count });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.calls.push(DummyCall::Dispatch(x, y, z));
    }

    fn dispatch_indirect(&mut self, _buffer: &Arc<Buffer<DummyBackend>>, offset: u32) {
        self.calls.push(DummyCall::DispatchIndirect { offset });
    }

    fn update_buffer(&mut self, _buffer: &Arc<Buffer<DummyBackend>>, offset: u32, data: &[u8]) -> Result<(), CreationError> {
        self.calls.push(DummyCall::UpdateBuffer {
            offset,
            size: data.len(),
        });
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        _source: &Arc<Buffer<DummyBackend>>,
        source_offset: u32,
        _destination: &Arc<Buffer<DummyBackend>>,
        destination_offset: u32,
        size: u32,
    ) {
        self.calls.push(DummyCall::CopyBuffer {
            source_offset,
            destination_offset,
            size,
        });
    }

    fn copy_texture(
        &mut self,
        _source: &Arc<Texture<DummyBackend>>,
        _destination: &Arc<Texture<DummyBackend>>,
        copy: &TextureCopy,
    ) {
        self.calls.push(DummyCall::CopyTexture(*copy));
    }

    fn generate_mipmaps(&mut self, _texture: &Arc<Texture<DummyBackend>>) {
        self.calls.push(DummyCall::GenerateMipmaps);
    }

    fn resolve_texture(&mut self, _source: &Arc<Texture<DummyBackend>>, _destination: &Arc<Texture<DummyBackend>>) {
        self.calls.push(DummyCall::ResolveTexture);
    }

    fn push_debug_group(&mut self, name: &str) {
        self.calls.push(DummyCall::PushDebugGroup(name.into()));
    }

    fn pop_debug_group(&mut self) {
        self.calls.push(DummyCall::PopDebugGroup);
    }

    fn insert_debug_marker(&mut self, name: &str) {
        self.calls.push(DummyCall::InsertDebugMarker(name.into()));
    }
}
