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

//! Replay of finished command lists on the immediate context.
//!
//! Only memory effects are emulated; pipeline state, bindings and draws are traced.

use rhi_core::buffer::{DispatchIndirectCommand, DrawIndexedIndirectCommand, DrawIndirectCommand};
use rhi_core::{Extent, Offset, Texture, TextureDescription};

use crate::command::{Command, CopyBox, NativeCommandList, Resource};
use crate::texels;
use crate::Backend;

pub fn execute(list: &NativeCommandList) {
    for command in &list.commands {
        process(command);
    }
}

fn region_extent(desc: &TextureDescription, mip_level: u32, region: Option<CopyBox>) -> (Offset, Extent) {
    match region {
        Some(b) => (
            Offset {
                x: b.left,
                y: b.top,
                z: b.front,
            },
            Extent {
                width: b.right - b.left,
                height: b.bottom - b.top,
                depth: b.back - b.front,
            },
        ),
        None => (Offset::ZERO, desc.mip_extent(mip_level)),
    }
}

fn update_texture(texture: &Texture<Backend>, subresource: u32, region: Option<CopyBox>, data: &[u8]) {
    let desc = texture.desc();
    let (mip_level, array_layer) = desc.mip_level_and_layer(subresource);
    let layout = desc.subresource_layout(mip_level, array_layer);
    let (origin, extent) = region_extent(desc, mip_level, region);
    let row_pitch = desc.format.row_pitch(extent.width);
    let source = rhi_core::SubresourceLayout {
        offset: 0,
        size: data.len() as u64,
        row_pitch,
        depth_pitch: desc.format.depth_pitch(row_pitch, extent.height),
    };
    let mut memory = texture.raw().memory.write();
    texels::copy_region(desc.format, data, &source, Offset::ZERO, &mut memory, &layout, origin, extent);
}

fn copy_buffers(destination: &Resource, offset: u32, source: &Resource, region: Option<CopyBox>) {
    let (dst, src) = match (destination, source) {
        (&Resource::Buffer(ref dst), &Resource::Buffer(ref src)) => (dst, src),
        _ => {
            error!("Copy between a buffer and a texture");
            return;
        }
    };
    let range = region.unwrap_or_else(|| CopyBox::bytes(0, src.size()));
    let (start, end) = (range.left as usize, range.right as usize);
    let offset = offset as usize;
    if dst.raw().id == src.raw().id {
        dst.raw().memory.write().copy_within(start..end, offset);
    } else {
        let src = src.raw().memory.read();
        dst.raw().memory.write()[offset..offset + end - start].copy_from_slice(&src[start..end]);
    }
}

fn copy_textures(
    destination: &Texture<Backend>,
    destination_subresource: u32,
    destination_origin: Offset,
    source: &Texture<Backend>,
    source_subresource: u32,
    region: Option<CopyBox>,
) {
    let (src_desc, dst_desc) = (source.desc(), destination.desc());
    let (src_mip, src_layer) = src_desc.mip_level_and_layer(source_subresource);
    let (dst_mip, dst_layer) = dst_desc.mip_level_and_layer(destination_subresource);
    let (src_origin, extent) = region_extent(src_desc, src_mip, region);
    let src_layout = src_desc.subresource_layout(src_mip, src_layer);
    let dst_layout = dst_desc.subresource_layout(dst_mip, dst_layer);
    if source.raw().id == destination.raw().id {
        let snapshot = source.raw().memory.read().clone();
        let mut memory = destination.raw().memory.write();
        texels::copy_region(
            src_desc.format,
            &snapshot,
            &src_layout,
            src_origin,
            &mut memory,
            &dst_layout,
            destination_origin,
            extent,
        );
    } else {
        let src = source.raw().memory.read();
        let mut dst = destination.raw().memory.write();
        texels::copy_region(
            src_desc.format,
            &src,
            &src_layout,
            src_origin,
            &mut dst,
            &dst_layout,
            destination_origin,
            extent,
        );
    }
}

fn indirect_args(resource: &rhi_core::Buffer<Backend>, offset: u32, size: usize) -> Vec<u8> {
    let start = offset as usize;
    resource.raw().memory.read()[start..start + size].to_vec()
}

pub fn process(command: &Command) {
    match *command {
        Command::ClearRenderTargetView {
            ref texture,
            mip_level,
            array_layer,
            color,
        } => {
            let desc = texture.desc();
            match texels::encode_color(desc.format, color) {
                Some(value) => {
                    let layout = desc.subresource_layout(mip_level, array_layer);
                    texels::fill(&mut texture.raw().memory.write(), &layout, &value);
                }
                None => warn!("Clearing {:?} targets is not emulated", desc.format),
            }
        }
        Command::ClearDepthStencilView {
            ref texture,
            mip_level,
            array_layer,
            depth,
            stencil,
        } => {
            let desc = texture.desc();
            if let Some(value) = texels::encode_depth_stencil(desc.format, depth, stencil.unwrap_or(0)) {
                let layout = desc.subresource_layout(mip_level, array_layer);
                texels::fill(&mut texture.raw().memory.write(), &layout, &value);
            }
        }
        Command::UpdateSubresource {
            ref resource,
            subresource,
            region,
            ref data,
        } => match *resource {
            Resource::Buffer(ref buffer) => {
                let start = region.map_or(0, |b| b.left) as usize;
                buffer.raw().memory.write()[start..start + data.len()].copy_from_slice(data);
            }
            Resource::Texture(ref texture) => update_texture(texture, subresource, region, data),
        },
        Command::MapDiscard { ref buffer, ref data } => {
            let mut memory = buffer.raw().memory.write();
            memory.iter_mut().for_each(|byte| *byte = 0);
            memory[..data.len()].copy_from_slice(data);
        }
        Command::CopySubresourceRegion {
            ref destination,
            destination_subresource,
            destination_origin,
            ref source,
            source_subresource,
            region,
        } => match (destination, source) {
            (&Resource::Texture(ref dst), &Resource::Texture(ref src)) => copy_textures(
                dst,
                destination_subresource,
                destination_origin,
                src,
                source_subresource,
                region,
            ),
            _ => copy_buffers(destination, destination_origin.x, source, region),
        },
        Command::GenerateMips(ref texture) => {
            texels::generate_mips(texture.desc(), &mut texture.raw().memory.write());
        }
        Command::ResolveSubresource {
            ref destination,
            ref source,
        } => copy_textures(destination, 0, Offset::ZERO, source, 0, None),
        Command::DrawInstancedIndirect { ref buffer, offset } => {
            let args = DrawIndirectCommand::from_bytes(&indirect_args(buffer, offset, 16));
            trace!("DrawInstancedIndirect {:?}", args);
        }
        Command::DrawIndexedInstancedIndirect { ref buffer, offset } => {
            let args = DrawIndexedIndirectCommand::from_bytes(&indirect_args(buffer, offset, 20));
            trace!("DrawIndexedInstancedIndirect {:?}", args);
        }
        Command::DispatchIndirect { ref buffer, offset } => {
            let args = DispatchIndirectCommand::from_bytes(&indirect_args(buffer, offset, 12));
            trace!("DispatchIndirect {:?}", args);
        }
        Command::BeginEvent(ref name) => debug!("Begin event `{}`", name),
        Command::EndEvent => debug!("End event"),
        Command::SetMarker(ref name) => debug!("Marker `{}`", name),
        ref other => trace!("{:?}", other),
    }
}
