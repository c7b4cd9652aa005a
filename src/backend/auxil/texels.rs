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

//! Texel level operations on linear texture memory.
//!
//! Offsets and extents are in texels. Formats with compressed blocks are addressed in whole
//! blocks; a region that ends inside a block covers the full block.

use half::f16;
use rhi_core::format::ChannelType;
use rhi_core::{Extent, Offset, PixelFormat, SubresourceLayout, TextureCopy, TextureDescription};
use smallvec::SmallVec;

/// Encoded value of a single texel.
pub type TexelValue = SmallVec<[u8; 16]>;

/// Copy `extent` from `src` at `src_origin` to `dst` at `dst_origin`.
pub fn copy_region(
    format: PixelFormat,
    src: &[u8],
    src_layout: &SubresourceLayout,
    src_origin: Offset,
    dst: &mut [u8],
    dst_layout: &SubresourceLayout,
    dst_origin: Offset,
    extent: Extent,
) {
    let edge = format.unit_edge();
    let unit = format.unit_size_in_bytes();
    let row_size = format.row_pitch(extent.width) as usize;
    let rows = format.num_rows(extent.height);
    let (src_x, dst_x) = ((src_origin.x / edge * unit) as usize, (dst_origin.x / edge * unit) as usize);
    for z in 0..extent.depth {
        for row in 0..rows {
            let s = src_layout.offset as usize
                + ((src_origin.z + z) * src_layout.depth_pitch) as usize
                + ((src_origin.y / edge + row) * src_layout.row_pitch) as usize
                + src_x;
            let d = dst_layout.offset as usize
                + ((dst_origin.z + z) * dst_layout.depth_pitch) as usize
                + ((dst_origin.y / edge + row) * dst_layout.row_pitch) as usize
                + dst_x;
            dst[d..d + row_size].copy_from_slice(&src[s..s + row_size]);
        }
    }
}

/// Copy the region of every layer named by `copy` between two textures' memory.
pub fn copy_texture(
    src_desc: &TextureDescription,
    src: &[u8],
    dst_desc: &TextureDescription,
    dst: &mut [u8],
    copy: &TextureCopy,
) {
    for layer in 0..copy.layer_count {
        let src_layout = src_desc.subresource_layout(copy.src_mip_level, copy.src_base_layer + layer);
        let dst_layout = dst_desc.subresource_layout(copy.dst_mip_level, copy.dst_base_layer + layer);
        copy_region(
            src_desc.format,
            src,
            &src_layout,
            copy.src_origin,
            dst,
            &dst_layout,
            copy.dst_origin,
            copy.extent,
        );
    }
}

/// Write `value` into every texel of a subresource.
pub fn fill(dst: &mut [u8], layout: &SubresourceLayout, value: &[u8]) {
    let start = layout.offset as usize;
    for texel in dst[start..start + layout.size as usize].chunks_exact_mut(value.len()) {
        texel.copy_from_slice(value);
    }
}

fn unorm(value: f32, max: u32) -> u32 {
    (value.max(0.0).min(1.0) * max as f32 + 0.5) as u32
}

fn snorm(value: f32, max: i32) -> i32 {
    let v = value.max(-1.0).min(1.0) * max as f32;
    (if v < 0.0 { v - 0.5 } else { v + 0.5 }) as i32
}

/// Encode a clear color for a color format, or `None` when the format cannot be cleared.
pub fn encode_color(format: PixelFormat, color: [f32; 4]) -> Option<TexelValue> {
    use rhi_core::PixelFormat::*;

    if format.is_compressed() || format.is_depth() {
        return None;
    }
    let mut out = TexelValue::new();
    match format {
        B8G8R8A8UNorm | B8G8R8A8UNormSRgb => {
            for &i in &[2, 1, 0, 3] {
                out.push(unorm(color[i], 0xFF) as u8);
            }
            return Some(out);
        }
        R10G10B10A2UNorm => {
            let packed = unorm(color[0], 0x3FF)
                | unorm(color[1], 0x3FF) << 10
                | unorm(color[2], 0x3FF) << 20
                | unorm(color[3], 0x3) << 30;
            out.extend_from_slice(&packed.to_le_bytes());
            return Some(out);
        }
        R10G10B10A2UInt => {
            let c = |i: usize, max: u32| (color[i].max(0.0) as u32).min(max);
            let packed = c(0, 0x3FF) | c(1, 0x3FF) << 10 | c(2, 0x3FF) << 20 | c(3, 0x3) << 30;
            out.extend_from_slice(&packed.to_le_bytes());
            return Some(out);
        }
        R11G11B10Float => return None,
        _ => {}
    }
    let channels = format.element_count() as usize;
    let channel_size = format.size_in_bytes() as usize / channels;
    for &c in &color[..channels] {
        match (format.channel_type(), channel_size) {
            (ChannelType::UNorm, 1) | (ChannelType::Srgb, 1) => out.push(unorm(c, 0xFF) as u8),
            (ChannelType::UNorm, 2) => out.extend_from_slice(&(unorm(c, 0xFFFF) as u16).to_le_bytes()),
            (ChannelType::SNorm, 1) => out.push(snorm(c, 0x7F) as i8 as u8),
            (ChannelType::SNorm, 2) => out.extend_from_slice(&(snorm(c, 0x7FFF) as i16).to_le_bytes()),
            (ChannelType::UInt, 1) => out.push(c as u8),
            (ChannelType::UInt, 2) => out.extend_from_slice(&(c as u16).to_le_bytes()),
            (ChannelType::UInt, 4) => out.extend_from_slice(&(c as u32).to_le_bytes()),
            (ChannelType::SInt, 1) => out.push(c as i8 as u8),
            (ChannelType::SInt, 2) => out.extend_from_slice(&(c as i16).to_le_bytes()),
            (ChannelType::SInt, 4) => out.extend_from_slice(&(c as i32).to_le_bytes()),
            (ChannelType::Float, 2) => out.extend_from_slice(&f16::from_f32(c).to_le_bytes()),
            (ChannelType::Float, 4) => out.extend_from_slice(&c.to_le_bytes()),
            _ => return None,
        }
    }
    Some(out)
}

/// Encode a depth-stencil clear value for a depth format.
pub fn encode_depth_stencil(format: PixelFormat, depth: f32, stencil: u8) -> Option<TexelValue> {
    let mut out = TexelValue::new();
    match format {
        PixelFormat::D16UNorm => out.extend_from_slice(&(unorm(depth, 0xFFFF) as u16).to_le_bytes()),
        PixelFormat::D24UNorm => out.extend_from_slice(&unorm(depth, 0xFF_FFFF).to_le_bytes()),
        PixelFormat::D24UNormS8UInt => {
            let packed = unorm(depth, 0xFF_FFFF) | (stencil as u32) << 24;
            out.extend_from_slice(&packed.to_le_bytes());
        }
        PixelFormat::D32Float => out.extend_from_slice(&depth.to_le_bytes()),
        PixelFormat::D32FloatS8UInt => {
            out.extend_from_slice(&depth.to_le_bytes());
            out.push(stencil);
        }
        _ => return None,
    }
    Some(out)
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Filter {
    /// Average of 8 bit normalized channels.
    Byte(usize),
    /// Average of 16 bit normalized channels.
    Short(usize),
    Half(usize),
    Float(usize),
    /// Top-left texel of the footprint.
    Nearest(usize),
}

fn filter(format: PixelFormat) -> Filter {
    use rhi_core::PixelFormat::*;

    let size = format.size_in_bytes() as usize;
    match format {
        R10G10B10A2UNorm | R10G10B10A2UInt | R11G11B10Float => return Filter::Nearest(size),
        _ if format.is_depth() => return Filter::Nearest(size),
        _ => {}
    }
    let channels = format.element_count() as usize;
    match (format.channel_type(), size / channels) {
        (ChannelType::UNorm, 1) | (ChannelType::Srgb, 1) => Filter::Byte(channels),
        (ChannelType::UNorm, 2) => Filter::Short(channels),
        (ChannelType::Float, 2) => Filter::Half(channels),
        (ChannelType::Float, 4) => Filter::Float(channels),
        _ => Filter::Nearest(size),
    }
}

fn average<F: Fn(usize) -> f32>(count: usize, sample: F) -> f32 {
    (0..count).map(sample).sum::<f32>() / count as f32
}

/// Box filter the subresource at `src` into the next smaller one at `dst`.
///
/// Both slices start at their subresource and use the pitches of their layouts.
pub fn downsample(
    format: PixelFormat,
    src: &[u8],
    src_layout: &SubresourceLayout,
    src_extent: Extent,
    dst: &mut [u8],
    dst_layout: &SubresourceLayout,
    dst_extent: Extent,
) {
    let filter = filter(format);
    let texel = format.size_in_bytes() as usize;
    let span = |size: u32, dst_size: u32| if size > dst_size { 2 } else { 1 };
    let (sx, sy, sz) = (
        span(src_extent.width, dst_extent.width),
        span(src_extent.height, dst_extent.height),
        span(src_extent.depth, dst_extent.depth),
    );
    let mut footprint: SmallVec<[usize; 8]> = SmallVec::new();
    for z in 0..dst_extent.depth {
        for y in 0..dst_extent.height {
            for x in 0..dst_extent.width {
                footprint.clear();
                for dz in 0..sz {
                    for dy in 0..sy {
                        for dx in 0..sx {
                            let (tx, ty, tz) = (
                                (x * sx + dx).min(src_extent.width - 1),
                                (y * sy + dy).min(src_extent.height - 1),
                                (z * sz + dz).min(src_extent.depth - 1),
                            );
                            footprint.push(
                                (tz * src_layout.depth_pitch + ty * src_layout.row_pitch) as usize + tx as usize * texel,
                            );
                        }
                    }
                }
                let d = (z * dst_layout.depth_pitch + y * dst_layout.row_pitch) as usize + x as usize * texel;
                let out = &mut dst[d..d + texel];
                let n = footprint.len();
                match filter {
                    Filter::Byte(channels) => {
                        for c in 0..channels {
                            let sum: u32 = footprint.iter().map(|&s| src[s + c] as u32).sum();
                            out[c] = ((sum + n as u32 / 2) / n as u32) as u8;
                        }
                    }
                    Filter::Short(channels) => {
                        for c in 0..channels {
                            let sum: u32 = footprint
                                .iter()
                                .map(|&s| u16::from_le_bytes([src[s + c * 2], src[s + c * 2 + 1]]) as u32)
                                .sum();
                            let value = ((sum + n as u32 / 2) / n as u32) as u16;
                            out[c * 2..c * 2 + 2].copy_from_slice(&value.to_le_bytes());
                        }
                    }
                    Filter::Half(channels) => {
                        for c in 0..channels {
                            let value = average(n, |i| {
                                let s = footprint[i] + c * 2;
                                f16::from_le_bytes([src[s], src[s + 1]]).to_f32()
                            });
                            out[c * 2..c * 2 + 2].copy_from_slice(&f16::from_f32(value).to_le_bytes());
                        }
                    }
                    Filter::Float(channels) => {
                        for c in 0..channels {
                            let value = average(n, |i| {
                                let s = footprint[i] + c * 4;
                                f32::from_le_bytes([src[s], src[s + 1], src[s + 2], src[s + 3]])
                            });
                            out[c * 4..c * 4 + 4].copy_from_slice(&value.to_le_bytes());
                        }
                    }
                    Filter::Nearest(size) => {
                        out.copy_from_slice(&src[footprint[0]..footprint[0] + size]);
                    }
                }
            }
        }
    }
}

/// Rebuild every mip below the top level of every layer from the level above it.
pub fn generate_mips(desc: &TextureDescription, memory: &mut [u8]) {
    if desc.format.is_compressed() {
        warn!("Skipping mip generation of compressed {:?}", desc.format);
        return;
    }
    for layer in 0..desc.effective_layers() {
        for level in 1..desc.mip_count {
            let src_layout = desc.subresource_layout(level - 1, layer);
            let dst_layout = desc.subresource_layout(level, layer);
            let (head, tail) = memory.split_at_mut(dst_layout.offset as usize);
            let src = &head[src_layout.offset as usize..(src_layout.offset + src_layout.size) as usize];
            let dst = &mut tail[..dst_layout.size as usize];
            downsample(
                desc.format,
                src,
                &src_layout,
                desc.mip_extent(level - 1),
                dst,
                &dst_layout,
                desc.mip_extent(level),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi_core::TextureUsage;

    fn rgba8(width: u32, height: u32, mips: u32) -> TextureDescription {
        TextureDescription::new_2d(width, height, mips, PixelFormat::R8G8B8A8UNorm, TextureUsage::SAMPLED)
    }

    #[test]
    fn test_copy_sub_box() {
        let desc = rgba8(4, 4, 1);
        let layout = desc.subresource_layout(0, 0);
        let src: Vec<u8> = (0..64).collect();
        let mut dst = vec![0u8; 64];
        copy_region(
            desc.format,
            &src,
            &layout,
            Offset { x: 1, y: 1, z: 0 },
            &mut dst,
            &layout,
            Offset::ZERO,
            Extent {
                width: 2,
                height: 2,
                depth: 1,
            },
        );
        assert_eq!(&dst[0..8], &src[20..28]);
        assert_eq!(&dst[16..24], &src[36..44]);
        assert!(dst[8..16].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_copy_partial_block() {
        let desc = TextureDescription::new_2d(8, 8, 2, PixelFormat::Bc1RgbaUNorm, TextureUsage::SAMPLED);
        let src: Vec<u8> = (0..desc.total_size()).map(|i| i as u8).collect();
        let mut dst = vec![0u8; src.len()];
        // mip 1 is 4x4, a single 8 byte block; a 2x2 region still moves it whole
        copy_texture(
            &desc,
            &src,
            &desc,
            &mut dst,
            &TextureCopy {
                extent: Extent {
                    width: 2,
                    height: 2,
                    depth: 1,
                },
                ..TextureCopy::whole_mip(&desc, 1)
            },
        );
        let layout = desc.subresource_layout(1, 0);
        let range = layout.offset as usize..(layout.offset + layout.size) as usize;
        assert_eq!(layout.size, 8);
        assert_eq!(&dst[range.clone()], &src[range]);
    }

    #[test]
    fn test_encode_colors() {
        let color = [1.0, 0.0, 0.5, 1.0];
        assert_eq!(&encode_color(PixelFormat::R8G8B8A8UNorm, color).unwrap()[..], &[255, 0, 128, 255]);
        assert_eq!(&encode_color(PixelFormat::B8G8R8A8UNorm, color).unwrap()[..], &[128, 0, 255, 255]);
        assert_eq!(&encode_color(PixelFormat::R32Float, color).unwrap()[..], &1.0f32.to_le_bytes());
        assert_eq!(&encode_color(PixelFormat::R16G16Float, color).unwrap()[..2], &f16::ONE.to_le_bytes());
        assert_eq!(&encode_color(PixelFormat::R8SNorm, [-1.0; 4]).unwrap()[..], &[0x81]);
        assert!(encode_color(PixelFormat::Bc1RgbaUNorm, color).is_none());
        assert!(encode_color(PixelFormat::D32Float, color).is_none());
    }

    #[test]
    fn test_encode_depth_stencil() {
        assert_eq!(
            &encode_depth_stencil(PixelFormat::D24UNormS8UInt, 1.0, 7).unwrap()[..],
            &[0xFF, 0xFF, 0xFF, 7]
        );
        assert_eq!(encode_depth_stencil(PixelFormat::D32FloatS8UInt, 0.0, 1).unwrap().len(), 5);
        assert!(encode_depth_stencil(PixelFormat::R8UNorm, 1.0, 0).is_none());
    }

    #[test]
    fn test_mips_average() {
        let desc = rgba8(2, 2, 2);
        let mut memory = vec![0u8; desc.total_size() as usize];
        for (i, texel) in memory[..16].chunks_exact_mut(4).enumerate() {
            texel.copy_from_slice(&[i as u8 * 10, 255, 0, 1]);
        }
        generate_mips(&desc, &mut memory);
        assert_eq!(&memory[16..20], &[15, 255, 0, 1]);
    }

    #[test]
    fn test_mips_odd_extent() {
        let desc = TextureDescription::new_2d(3, 1, 2, PixelFormat::R32Float, TextureUsage::SAMPLED);
        let mut memory = vec![0u8; desc.total_size() as usize];
        for (i, texel) in memory[..12].chunks_exact_mut(4).enumerate() {
            texel.copy_from_slice(&(i as f32).to_le_bytes());
        }
        generate_mips(&desc, &mut memory);
        assert_eq!(desc.mip_extent(1).width, 1);
        assert_eq!(&memory[12..16], &0.5f32.to_le_bytes());
    }

    #[test]
    fn test_single_mip_untouched() {
        let desc = rgba8(256, 256, 1);
        let mut memory: Vec<u8> = (0..desc.total_size()).map(|i| (i * 7) as u8).collect();
        let before = memory.clone();
        generate_mips(&desc, &mut memory);
        assert_eq!(memory, before);
    }
}
