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

//! Execution of command buffers on the emulated queue.
//!
//! Memory effects of passes run for real: load and store actions, blits and the copy kernel.
//! Draws and user kernels are traced.

use fxhash::FxHashMap;
use parking_lot::RwLock;
use rhi_core::buffer::{DispatchIndirectCommand, DrawIndexedIndirectCommand, DrawIndirectCommand};
use rhi_core::{Buffer, Offset, SubresourceLayout, Texture};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::internal::CopyParams;
use crate::native::Kernel;
use crate::soft::{
    BlitCommand, CommandBuffer, ComputeCommand, LinearLayout, LoadAction, Pass, RenderCommand, RenderPassDescriptor,
    Resource, StoreAction,
};
use crate::texels;
use crate::Backend;

pub fn execute(buffer: &CommandBuffer) {
    for pass in buffer.passes() {
        match *pass {
            Pass::Render {
                ref descriptor,
                ref commands,
            } => render_pass(descriptor, commands),
            Pass::Compute(ref commands) => compute_pass(commands),
            Pass::Blit(ref commands) => {
                for command in commands {
                    blit(command);
                }
            }
        }
    }
}

fn memory(resource: &Resource) -> &RwLock<Vec<u8>> {
    match *resource {
        Resource::Buffer(ref buffer) => &buffer.raw().memory,
        Resource::Texture(ref texture) => &texture.raw().memory,
    }
}

fn linear(layout: &LinearLayout, depth: u32) -> SubresourceLayout {
    SubresourceLayout {
        offset: layout.offset,
        size: u64::from(layout.bytes_per_image) * u64::from(depth),
        row_pitch: layout.bytes_per_row,
        depth_pitch: layout.bytes_per_image,
    }
}

/// Copy `size` bytes between two pieces of linear memory, which may be the same.
pub fn copy_bytes(source: &Resource, source_offset: u64, destination: &Resource, destination_offset: u64, size: u64) {
    let (start, end, at) = (
        source_offset as usize,
        (source_offset + size) as usize,
        destination_offset as usize,
    );
    if source.id() == destination.id() {
        memory(destination).write().copy_within(start..end, at);
    } else {
        let src = memory(source).read();
        memory(destination).write()[at..at + end - start].copy_from_slice(&src[start..end]);
    }
}

fn load_attachments(descriptor: &RenderPassDescriptor) {
    for color in &descriptor.colors {
        if color.load != LoadAction::Clear {
            continue;
        }
        let desc = color.texture.desc();
        match texels::encode_color(desc.format, color.clear_color) {
            Some(value) => {
                let layout = desc.subresource_layout(color.mip_level, color.array_layer);
                texels::fill(&mut color.texture.raw().memory.write(), &layout, &value);
            }
            None => warn!("Clearing {:?} attachments is not emulated", desc.format),
        }
    }
    if let Some(ref depth) = descriptor.depth {
        if depth.load == LoadAction::Clear {
            let desc = depth.texture.desc();
            let stencil = descriptor
                .stencil
                .filter(|stencil| stencil.load == LoadAction::Clear)
                .map_or(0, |stencil| stencil.clear_stencil);
            if let Some(value) = texels::encode_depth_stencil(desc.format, depth.clear_depth, stencil) {
                let layout = desc.subresource_layout(depth.mip_level, depth.array_layer);
                texels::fill(&mut depth.texture.raw().memory.write(), &layout, &value);
            }
        }
    }
}

fn store_attachments(descriptor: &RenderPassDescriptor) {
    for color in &descriptor.colors {
        let target = match (color.store, color.resolve_texture.as_ref()) {
            (StoreAction::MultisampleResolve, Some(target)) => target,
            _ => continue,
        };
        // Samples are stored as one value per texel, so resolving is a plain copy.
        let (src_desc, dst_desc) = (color.texture.desc(), target.desc());
        let src_layout = src_desc.subresource_layout(color.mip_level, color.array_layer);
        let dst_layout = dst_desc.subresource_layout(0, 0);
        let extent = src_desc.mip_extent(color.mip_level);
        let src = color.texture.raw().memory.read();
        texels::copy_region(
            src_desc.format,
            &src,
            &src_layout,
            Offset::ZERO,
            &mut target.raw().memory.write(),
            &dst_layout,
            Offset::ZERO,
            extent,
        );
    }
}

fn indirect_args(buffer: &Buffer<Backend>, offset: u32, size: usize) -> Vec<u8> {
    let start = offset as usize;
    buffer.raw().memory.read()[start..start + size].to_vec()
}

fn render_pass(descriptor: &RenderPassDescriptor, commands: &[RenderCommand]) {
    load_attachments(descriptor);
    for command in commands {
        match *command {
            RenderCommand::DrawIndirect {
                ref buffer, offset, ..
            } => {
                let args = DrawIndirectCommand::from_bytes(&indirect_args(buffer, offset, 16));
                trace!("DrawIndirect {:?}", args);
            }
            RenderCommand::DrawIndexedIndirect {
                ref buffer, offset, ..
            } => {
                let args = DrawIndexedIndirectCommand::from_bytes(&indirect_args(buffer, offset, 20));
                trace!("DrawIndexedIndirect {:?}", args);
            }
            ref other => trace!("{:?}", other),
        }
    }
    store_attachments(descriptor);
}

#[derive(Default)]
struct ComputeState {
    kernel: Option<Kernel>,
    buffers: FxHashMap<u32, (Arc<Buffer<Backend>>, u32)>,
    data: FxHashMap<u32, SmallVec<[u8; 128]>>,
}

impl ComputeState {
    fn copy_buffer(&self) {
        let params = self.data.get(&2).and_then(|bytes| CopyParams::from_bytes(bytes));
        match (self.buffers.get(&0), self.buffers.get(&1), params) {
            (Some(&(ref src, src_base)), Some(&(ref dst, dst_base)), Some(params)) => copy_bytes(
                &Resource::Buffer(Arc::clone(src)),
                u64::from(src_base + params.source_offset),
                &Resource::Buffer(Arc::clone(dst)),
                u64::from(dst_base + params.destination_offset),
                u64::from(params.size),
            ),
            _ => error!("Copy kernel dispatched without its arguments"),
        }
    }
}

fn compute_pass(commands: &[ComputeCommand]) {
    let mut state = ComputeState::default();
    for command in commands {
        match *command {
            ComputeCommand::SetComputePipelineState { kernel, .. } => state.kernel = Some(kernel),
            ComputeCommand::BindBuffer {
                index,
                ref buffer,
                offset,
            } => {
                state.data.remove(&index);
                state.buffers.insert(index, (Arc::clone(buffer), offset));
            }
            ComputeCommand::BindBufferData { index, ref bytes } => {
                state.buffers.remove(&index);
                state.data.insert(index, bytes.clone());
            }
            ComputeCommand::Dispatch { groups } => match state.kernel {
                Some(Kernel::CopyBuffer) => state.copy_buffer(),
                _ => trace!("Dispatch {:?}", groups),
            },
            ComputeCommand::DispatchIndirect { ref buffer, offset } => {
                let args = DispatchIndirectCommand::from_bytes(&indirect_args(buffer, offset, 12));
                trace!("DispatchIndirect {:?}", args);
            }
            ref other => trace!("{:?}", other),
        }
    }
}

fn copy_textures(
    source: &Texture<Backend>,
    source_layout: &SubresourceLayout,
    source_origin: Offset,
    destination: &Texture<Backend>,
    destination_layout: &SubresourceLayout,
    destination_origin: Offset,
    extent: rhi_core::Extent,
) {
    let format = source.desc().format;
    if source.raw().id == destination.raw().id {
        let snapshot = source.raw().memory.read().clone();
        texels::copy_region(
            format,
            &snapshot,
            source_layout,
            source_origin,
            &mut destination.raw().memory.write(),
            destination_layout,
            destination_origin,
            extent,
        );
    } else {
        let src = source.raw().memory.read();
        texels::copy_region(
            format,
            &src,
            source_layout,
            source_origin,
            &mut destination.raw().memory.write(),
            destination_layout,
            destination_origin,
            extent,
        );
    }
}

pub fn blit(command: &BlitCommand) {
    match *command {
        BlitCommand::CopyBuffer {
            ref source,
            source_offset,
            ref destination,
            destination_offset,
            size,
        } => copy_bytes(source, source_offset, destination, destination_offset, size),
        BlitCommand::CopyBufferToTexture {
            ref source,
            ref source_layout,
            ref destination,
            mip_level,
            array_layer,
            origin,
            extent,
        } => copy_textures(
            source,
            &linear(source_layout, extent.depth),
            Offset::ZERO,
            destination,
            &destination.desc().subresource_layout(mip_level, array_layer),
            origin,
            extent,
        ),
        BlitCommand::CopyTextureToBuffer {
            ref source,
            mip_level,
            array_layer,
            origin,
            extent,
            ref destination,
            ref destination_layout,
        } => copy_textures(
            source,
            &source.desc().subresource_layout(mip_level, array_layer),
            origin,
            destination,
            &linear(destination_layout, extent.depth),
            Offset::ZERO,
            extent,
        ),
        BlitCommand::CopyTexture {
            ref source,
            source_mip_level,
            source_layer,
            source_origin,
            ref destination,
            destination_mip_level,
            destination_layer,
            destination_origin,
            extent,
        } => copy_textures(
            source,
            &source.desc().subresource_layout(source_mip_level, source_layer),
            source_origin,
            destination,
            &destination.desc().subresource_layout(destination_mip_level, destination_layer),
            destination_origin,
            extent,
        ),
        BlitCommand::GenerateMipmaps(ref texture) => {
            texels::generate_mips(texture.desc(), &mut texture.raw().memory.write());
        }
        BlitCommand::Debug(ref debug) => trace!("{:?}", debug),
    }
}
