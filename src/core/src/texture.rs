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

//! Texture descriptions, subresource addressing and linear memory layout.

use crate::format::{mip_dimension, PixelFormat};
use crate::{handle, Backend};
use bitflags::bitflags;
use std::fmt;

bitflags!(
    /// How a texture may be used.
    pub struct TextureUsage: u16 {
        /// Read by shaders through a read-only view.
        const SAMPLED = 0x1;
        /// Written by shaders through a read-write view.
        const STORAGE = 0x2;
        /// Color attachment of a framebuffer.
        const RENDER_TARGET = 0x4;
        /// Depth-stencil attachment of a framebuffer.
        const DEPTH_STENCIL = 0x8;
        /// Six faces per array layer.
        const CUBEMAP = 0x10;
        /// CPU mappable, only usable as a copy source or destination.
        const STAGING = 0x20;
        /// Mip levels can be generated from the top level.
        const GENERATE_MIPMAPS = 0x40;
    }
);

/// Dimensionality of a texture.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

/// Number of samples per texel.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum SampleCount {
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
    X16 = 16,
    X32 = 32,
}

impl Default for SampleCount {
    fn default() -> Self {
        SampleCount::X1
    }
}

impl SampleCount {
    /// Number of samples as an integer.
    pub fn count(self) -> u32 {
        self as u32
    }
}

/// A 3D size in texels.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// A 3D texel coordinate.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Offset {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Offset {
    /// The origin.
    pub const ZERO: Offset = Offset { x: 0, y: 0, z: 0 };
}

/// Parameters of a texture.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TextureDescription {
    /// Width of the top mip level.
    pub width: u32,
    /// Height of the top mip level.
    pub height: u32,
    /// Depth of the top mip level; 1 for anything but 3D textures.
    pub depth: u32,
    /// Number of mip levels.
    pub mip_count: u32,
    /// Number of array layers. Cubemaps count six faces per layer on top of this.
    pub array_layers: u32,
    /// Texel format.
    pub format: PixelFormat,
    /// Allowed usages.
    pub usage: TextureUsage,
    /// Dimensionality.
    pub dimension: TextureDimension,
    /// Samples per texel.
    pub sample_count: SampleCount,
}

impl Default for TextureDescription {
    fn default() -> Self {
        TextureDescription {
            width: 1,
            height: 1,
            depth: 1,
            mip_count: 1,
            array_layers: 1,
            format: PixelFormat::R8G8B8A8UNorm,
            usage: TextureUsage::SAMPLED,
            dimension: TextureDimension::D2,
            sample_count: SampleCount::X1,
        }
    }
}

impl TextureDescription {
    /// A 2D texture.
    pub fn new_2d(width: u32, height: u32, mip_count: u32, format: PixelFormat, usage: TextureUsage) -> Self {
        TextureDescription {
            width,
            height,
            mip_count,
            format,
            usage,
            ..Self::default()
        }
    }

    /// Number of addressable layers: six faces per array layer for cubemaps.
    pub fn effective_layers(&self) -> u32 {
        if self.usage.contains(TextureUsage::CUBEMAP) {
            self.array_layers * 6
        } else {
            self.array_layers
        }
    }

    /// Whether more than one sample is stored per texel.
    pub fn is_multisampled(&self) -> bool {
        self.sample_count != SampleCount::X1
    }

    /// Size of mip `level`.
    pub fn mip_extent(&self, level: u32) -> Extent {
        Extent {
            width: mip_dimension(self.width, level),
            height: mip_dimension(self.height, level),
            depth: mip_dimension(self.depth, level),
        }
    }

    /// Number of subresources.
    pub fn subresource_count(&self) -> u32 {
        self.mip_count * self.effective_layers()
    }

    /// Linear index of the subresource at `mip_level` of `array_layer`.
    pub fn subresource(&self, mip_level: u32, array_layer: u32) -> u32 {
        array_layer * self.mip_count + mip_level
    }

    /// Inverse of [`subresource`](TextureDescription::subresource): `(mip_level, array_layer)`.
    pub fn mip_level_and_layer(&self, subresource: u32) -> (u32, u32) {
        let array_layer = subresource / self.mip_count;
        (subresource - array_layer * self.mip_count, array_layer)
    }

    /// Where the given subresource lives in the texture's linear memory.
    ///
    /// Subresources are laid out layer-major: every mip of layer 0, then every mip of layer 1.
    pub fn subresource_layout(&self, mip_level: u32, array_layer: u32) -> SubresourceLayout {
        let mut offset = array_layer * self.layer_size();
        for level in 0..mip_level {
            offset += self.mip_size(level);
        }
        let extent = self.mip_extent(mip_level);
        let row_pitch = self.format.row_pitch(extent.width);
        let depth_pitch = self.format.depth_pitch(row_pitch, extent.height);
        SubresourceLayout {
            offset: offset as u64,
            size: (depth_pitch * extent.depth) as u64,
            row_pitch,
            depth_pitch,
        }
    }

    fn mip_size(&self, level: u32) -> u32 {
        let extent = self.mip_extent(level);
        self.format.region_size(extent.width, extent.height, extent.depth)
    }

    fn layer_size(&self) -> u32 {
        (0..self.mip_count).map(|level| self.mip_size(level)).sum()
    }

    /// Size of the whole texture in linear memory.
    pub fn total_size(&self) -> u64 {
        self.layer_size() as u64 * self.effective_layers() as u64
    }
}

/// Placement of one subresource in linear texture memory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubresourceLayout {
    /// Byte offset from the start of the texture.
    pub offset: u64,
    /// Byte size of the subresource.
    pub size: u64,
    /// Bytes between rows (block rows for compressed formats).
    pub row_pitch: u32,
    /// Bytes between depth slices.
    pub depth_pitch: u32,
}

/// A box within one subresource, the target of CPU texture updates.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TextureRegion {
    /// Corner of the box.
    pub origin: Offset,
    /// Size of the box.
    pub extent: Extent,
    #[allow(missing_docs)]
    pub mip_level: u32,
    #[allow(missing_docs)]
    pub array_layer: u32,
}

impl TextureRegion {
    /// All of mip `level` of `layer`.
    pub fn whole(desc: &TextureDescription, mip_level: u32, array_layer: u32) -> Self {
        TextureRegion {
            origin: Offset::ZERO,
            extent: desc.mip_extent(mip_level),
            mip_level,
            array_layer,
        }
    }

    /// Whether the box covers its whole subresource.
    pub fn is_whole(&self, desc: &TextureDescription) -> bool {
        self.origin == Offset::ZERO && self.extent == desc.mip_extent(self.mip_level)
    }

    /// Size of tightly packed data for the box.
    pub fn data_size(&self, format: PixelFormat) -> u32 {
        format.region_size(self.extent.width, self.extent.height, self.extent.depth)
    }
}

/// A texture owned by the device.
pub struct Texture<B: Backend> {
    desc: TextureDescription,
    raw: B::Texture,
}

impl<B: Backend> fmt::Debug for Texture<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Texture").field("desc", &self.desc).finish()
    }
}

impl<B: Backend> Texture<B> {
    /// Wrap a native texture.
    pub fn new(desc: TextureDescription, raw: B::Texture) -> Self {
        Texture { desc, raw }
    }

    /// Creation parameters.
    pub fn desc(&self) -> &TextureDescription {
        &self.desc
    }

    /// Native texture.
    pub fn raw(&self) -> &B::Texture {
        &self.raw
    }
}

/// Parameters of a texture view.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TextureViewDescription {
    /// Viewed texture.
    pub target: handle::Handle<handle::kind::Texture>,
    /// Reinterpreted format, or the texture's own.
    pub format: Option<PixelFormat>,
    /// First visible mip level.
    pub base_mip_level: u32,
    /// Number of visible mip levels.
    pub mip_count: u32,
    /// First visible layer.
    pub base_array_layer: u32,
    /// Number of visible layers.
    pub array_layers: u32,
}

impl TextureViewDescription {
    /// A view over every mip and layer of `target`.
    pub fn full(target: handle::Handle<handle::kind::Texture>, desc: &TextureDescription) -> Self {
        TextureViewDescription {
            target,
            format: None,
            base_mip_level: 0,
            mip_count: desc.mip_count,
            base_array_layer: 0,
            array_layers: desc.array_layers,
        }
    }
}

/// A view narrowing a texture to a mip and layer range.
pub struct TextureView<B: Backend> {
    texture: std::sync::Arc<Texture<B>>,
    format: PixelFormat,
    base_mip_level: u32,
    mip_count: u32,
    base_array_layer: u32,
    array_layers: u32,
    raw: B::TextureView,
}

impl<B: Backend> fmt::Debug for TextureView<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TextureView")
            .field("texture", &self.texture)
            .field("format", &self.format)
            .field("mips", &(self.base_mip_level..self.base_mip_level + self.mip_count))
            .field("layers", &(self.base_array_layer..self.base_array_layer + self.array_layers))
            .finish()
    }
}

impl<B: Backend> TextureView<B> {
    /// Wrap a native view. The description must already be resolved against `texture`.
    pub fn new(
        texture: std::sync::Arc<Texture<B>>,
        desc: &TextureViewDescription,
        raw: B::TextureView,
    ) -> Self {
        TextureView {
            format: desc.format.unwrap_or(texture.desc().format),
            texture,
            base_mip_level: desc.base_mip_level,
            mip_count: desc.mip_count,
            base_array_layer: desc.base_array_layer,
            array_layers: desc.array_layers,
            raw,
        }
    }

    /// Viewed texture.
    pub fn texture(&self) -> &std::sync::Arc<Texture<B>> {
        &self.texture
    }

    /// Effective format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Visible mip range as `(base, count)`.
    pub fn mips(&self) -> (u32, u32) {
        (self.base_mip_level, self.mip_count)
    }

    /// Visible layer range as `(base, count)`.
    pub fn layers(&self) -> (u32, u32) {
        (self.base_array_layer, self.array_layers)
    }

    /// Native view.
    pub fn raw(&self) -> &B::TextureView {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(width: u32, height: u32, mips: u32, layers: u32, format: PixelFormat) -> TextureDescription {
        TextureDescription {
            array_layers: layers,
            ..TextureDescription::new_2d(width, height, mips, format, TextureUsage::SAMPLED)
        }
    }

    #[test]
    fn test_subresource_roundtrip() {
        let mut tex = desc(64, 64, 7, 3, PixelFormat::R8G8B8A8UNorm);
        tex.usage |= TextureUsage::CUBEMAP;
        for subresource in 0..tex.subresource_count() {
            let (mip, layer) = tex.mip_level_and_layer(subresource);
            assert!(mip < tex.mip_count);
            assert!(layer < tex.effective_layers());
            assert_eq!(tex.subresource(mip, layer), subresource);
        }
        assert_eq!(tex.subresource_count(), 7 * 18);
    }

    #[test]
    fn test_layout_is_layer_major() {
        let tex = desc(4, 4, 3, 2, PixelFormat::R8G8B8A8UNorm);
        // mips: 4x4 = 64, 2x2 = 16, 1x1 = 4
        assert_eq!(tex.subresource_layout(0, 0).offset, 0);
        assert_eq!(tex.subresource_layout(1, 0).offset, 64);
        assert_eq!(tex.subresource_layout(2, 0).offset, 80);
        assert_eq!(tex.subresource_layout(0, 1).offset, 84);
        let last = tex.subresource_layout(2, 1);
        assert_eq!(last.offset + last.size, tex.total_size());
        assert_eq!(tex.subresource_layout(1, 1).row_pitch, 8);
    }

    #[test]
    fn test_compressed_layout() {
        let tex = desc(10, 6, 2, 1, PixelFormat::Bc1RgbaUNorm);
        let top = tex.subresource_layout(0, 0);
        assert_eq!(top.row_pitch, 3 * 8);
        assert_eq!(top.depth_pitch, 3 * 8 * 2);
        let second = tex.subresource_layout(1, 0);
        assert_eq!(second.offset, top.size);
        assert_eq!(second.row_pitch, 2 * 8);
        assert_eq!(second.size, 2 * 8);
    }
}
