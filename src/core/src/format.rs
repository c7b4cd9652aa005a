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

//! Pixel, vertex and index formats, and the pitch math built on them.
//!
//! Every function here is pure. Block-compressed formats are addressed in 4x4 blocks:
//! their row pitch counts blocks across and their row count counts block rows.

/// Edge length, in texels, of a compression block.
pub const BLOCK_EDGE: u32 = 4;

/// Texel format of a texture or texture view.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub enum PixelFormat {
    R8G8B8A8UNorm,
    B8G8R8A8UNorm,
    R8UNorm,
    R16UNorm,
    R32G32B32A32Float,
    R32Float,
    D32Float,
    D24UNorm,
    D16UNorm,
    Bc3UNorm,
    D24UNormS8UInt,
    D32FloatS8UInt,
    R32G32B32A32UInt,
    Bc1RgbUNorm,
    Bc1RgbaUNorm,
    Bc2UNorm,
    R10G10B10A2UNorm,
    R10G10B10A2UInt,
    R11G11B10Float,
    R8SNorm,
    R8UInt,
    R8SInt,
    R16SNorm,
    R16UInt,
    R16SInt,
    R16Float,
    R32UInt,
    R32SInt,
    R8G8UNorm,
    R8G8SNorm,
    R8G8UInt,
    R8G8SInt,
    R16G16UNorm,
    R16G16SNorm,
    R16G16UInt,
    R16G16SInt,
    R16G16Float,
    R32G32UInt,
    R32G32SInt,
    R32G32Float,
    R8G8B8UNorm,
    R8G8B8SNorm,
    R8G8B8UInt,
    R8G8B8SInt,
    R16G16B16UNorm,
    R16G16B16SNorm,
    R16G16B16UInt,
    R16G16B16SInt,
    R16G16B16Float,
    R32G32B32UInt,
    R32G32B32SInt,
    R32G32B32Float,
    R8G8B8A8SNorm,
    R8G8B8A8UInt,
    R8G8B8A8SInt,
    R16G16B16A16UNorm,
    R16G16B16A16SNorm,
    R16G16B16A16UInt,
    R16G16B16A16SInt,
    R16G16B16A16Float,
    R32G32B32A32SInt,
    Etc2R8G8B8UNorm,
    Etc2R8G8B8A1UNorm,
    Etc2R8G8B8A8UNorm,
    Bc4UNorm,
    Bc4SNorm,
    Bc5UNorm,
    Bc5SNorm,
    Bc7UNorm,
    R8G8B8A8UNormSRgb,
    B8G8R8A8UNormSRgb,
    Bc1RgbUNormSRgb,
    Bc1RgbaUNormSRgb,
    Bc2UNormSRgb,
    Bc3UNormSRgb,
    Bc7UNormSRgb,
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::R8G8B8A8UNorm
    }
}

/// How the channels of a pixel format are interpreted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChannelType {
    /// Unsigned normalized integer.
    UNorm,
    /// Signed normalized integer.
    SNorm,
    /// Unsigned integer.
    UInt,
    /// Signed integer.
    SInt,
    /// Floating point.
    Float,
    /// sRGB encoded unsigned normalized integer.
    Srgb,
}

impl PixelFormat {
    /// Every pixel format, in declaration order.
    pub const ALL: [PixelFormat; 76] = {
        use self::PixelFormat::*;
        [
            R8G8B8A8UNorm, B8G8R8A8UNorm, R8UNorm, R16UNorm, R32G32B32A32Float, R32Float,
            D32Float, D24UNorm, D16UNorm, Bc3UNorm, D24UNormS8UInt, D32FloatS8UInt,
            R32G32B32A32UInt, Bc1RgbUNorm, Bc1RgbaUNorm, Bc2UNorm, R10G10B10A2UNorm,
            R10G10B10A2UInt, R11G11B10Float, R8SNorm, R8UInt, R8SInt, R16SNorm, R16UInt,
            R16SInt, R16Float, R32UInt, R32SInt, R8G8UNorm, R8G8SNorm, R8G8UInt, R8G8SInt,
            R16G16UNorm, R16G16SNorm, R16G16UInt, R16G16SInt, R16G16Float, R32G32UInt,
            R32G32SInt, R32G32Float, R8G8B8UNorm, R8G8B8SNorm, R8G8B8UInt, R8G8B8SInt,
            R16G16B16UNorm, R16G16B16SNorm, R16G16B16UInt, R16G16B16SInt, R16G16B16Float,
            R32G32B32UInt, R32G32B32SInt, R32G32B32Float, R8G8B8A8SNorm, R8G8B8A8UInt,
            R8G8B8A8SInt, R16G16B16A16UNorm, R16G16B16A16SNorm, R16G16B16A16UInt,
            R16G16B16A16SInt, R16G16B16A16Float, R32G32B32A32SInt, Etc2R8G8B8UNorm,
            Etc2R8G8B8A1UNorm, Etc2R8G8B8A8UNorm, Bc4UNorm, Bc4SNorm, Bc5UNorm, Bc5SNorm,
            Bc7UNorm, R8G8B8A8UNormSRgb, B8G8R8A8UNormSRgb, Bc1RgbUNormSRgb, Bc1RgbaUNormSRgb,
            Bc2UNormSRgb, Bc3UNormSRgb, Bc7UNormSRgb,
        ]
    };

    /// Number of channels.
    pub fn element_count(self) -> u32 {
        use self::PixelFormat::*;
        match self {
            R8UNorm | R8SNorm | R8UInt | R8SInt | R16UNorm | R16SNorm | R16UInt | R16SInt
            | R16Float | R32UInt | R32SInt | R32Float | D32Float | D24UNorm | D16UNorm
            | Bc4UNorm | Bc4SNorm => 1,
            R8G8UNorm | R8G8SNorm | R8G8UInt | R8G8SInt | R16G16UNorm | R16G16SNorm
            | R16G16UInt | R16G16SInt | R16G16Float | R32G32UInt | R32G32SInt | R32G32Float
            | D24UNormS8UInt | D32FloatS8UInt | Bc5UNorm | Bc5SNorm => 2,
            R8G8B8UNorm | R8G8B8SNorm | R8G8B8UInt | R8G8B8SInt | R16G16B16UNorm
            | R16G16B16SNorm | R16G16B16UInt | R16G16B16SInt | R16G16B16Float
            | R32G32B32UInt | R32G32B32SInt | R32G32B32Float | R11G11B10Float | Bc1RgbUNorm
            | Bc1RgbUNormSRgb | Etc2R8G8B8UNorm => 3,
            R8G8B8A8UNorm | R8G8B8A8SNorm | R8G8B8A8UInt | R8G8B8A8SInt | R8G8B8A8UNormSRgb
            | B8G8R8A8UNorm | B8G8R8A8UNormSRgb | R16G16B16A16UNorm | R16G16B16A16SNorm
            | R16G16B16A16UInt | R16G16B16A16SInt | R16G16B16A16Float | R32G32B32A32UInt
            | R32G32B32A32SInt | R32G32B32A32Float | R10G10B10A2UNorm | R10G10B10A2UInt
            | Bc1RgbaUNorm | Bc1RgbaUNormSRgb | Bc2UNorm | Bc2UNormSRgb | Bc3UNorm
            | Bc3UNormSRgb | Bc7UNorm | Bc7UNormSRgb | Etc2R8G8B8A1UNorm | Etc2R8G8B8A8UNorm => 4,
        }
    }

    /// Size of one texel in bytes.
    ///
    /// # Panics
    ///
    /// Block-compressed formats have no per-texel size; use [`block_size_in_bytes`].
    ///
    /// [`block_size_in_bytes`]: PixelFormat::block_size_in_bytes
    pub fn size_in_bytes(self) -> u32 {
        use self::PixelFormat::*;
        match self {
            R8UNorm | R8SNorm | R8UInt | R8SInt => 1,
            R16UNorm | R16SNorm | R16UInt | R16SInt | R16Float | R8G8UNorm | R8G8SNorm
            | R8G8UInt | R8G8SInt | D16UNorm => 2,
            R8G8B8UNorm | R8G8B8SNorm | R8G8B8UInt | R8G8B8SInt => 3,
            R8G8B8A8UNorm | R8G8B8A8SNorm | R8G8B8A8UInt | R8G8B8A8SInt | R8G8B8A8UNormSRgb
            | B8G8R8A8UNorm | B8G8R8A8UNormSRgb | R10G10B10A2UNorm | R10G10B10A2UInt
            | R11G11B10Float | R16G16UNorm | R16G16SNorm | R16G16UInt | R16G16SInt
            | R16G16Float | R32UInt | R32SInt | R32Float | D32Float | D24UNorm
            | D24UNormS8UInt => 4,
            D32FloatS8UInt => 5,
            R16G16B16UNorm | R16G16B16SNorm | R16G16B16UInt | R16G16B16SInt
            | R16G16B16Float => 6,
            R16G16B16A16UNorm | R16G16B16A16SNorm | R16G16B16A16UInt | R16G16B16A16SInt
            | R16G16B16A16Float | R32G32UInt | R32G32SInt | R32G32Float => 8,
            R32G32B32UInt | R32G32B32SInt | R32G32B32Float => 12,
            R32G32B32A32UInt | R32G32B32A32SInt | R32G32B32A32Float => 16,
            _ => panic!("{:?} is block compressed and has no texel size", self),
        }
    }

    /// Whether the format stores 4x4 compressed blocks.
    pub fn is_compressed(self) -> bool {
        use self::PixelFormat::*;
        match self {
            Bc1RgbUNorm | Bc1RgbUNormSRgb | Bc1RgbaUNorm | Bc1RgbaUNormSRgb | Bc2UNorm
            | Bc2UNormSRgb | Bc3UNorm | Bc3UNormSRgb | Bc4UNorm | Bc4SNorm | Bc5UNorm
            | Bc5SNorm | Bc7UNorm | Bc7UNormSRgb | Etc2R8G8B8UNorm | Etc2R8G8B8A1UNorm
            | Etc2R8G8B8A8UNorm => true,
            _ => false,
        }
    }

    /// Whether the format has a depth aspect.
    pub fn is_depth(self) -> bool {
        use self::PixelFormat::*;
        match self {
            D16UNorm | D24UNorm | D32Float | D24UNormS8UInt | D32FloatS8UInt => true,
            _ => false,
        }
    }

    /// Whether the format has a stencil aspect.
    pub fn is_stencil(self) -> bool {
        match self {
            PixelFormat::D24UNormS8UInt | PixelFormat::D32FloatS8UInt => true,
            _ => false,
        }
    }

    /// Whether the format has both a depth and a stencil aspect.
    pub fn is_depth_stencil(self) -> bool {
        self.is_depth() && self.is_stencil()
    }

    /// Whether the texels are sRGB encoded.
    pub fn is_srgb(self) -> bool {
        self.channel_type() == ChannelType::Srgb
    }

    /// Size of one 4x4 block of a compressed format.
    ///
    /// # Panics
    ///
    /// If the format is not block compressed.
    pub fn block_size_in_bytes(self) -> u32 {
        use self::PixelFormat::*;
        match self {
            Bc1RgbUNorm | Bc1RgbUNormSRgb | Bc1RgbaUNorm | Bc1RgbaUNormSRgb | Bc4UNorm
            | Bc4SNorm | Etc2R8G8B8UNorm | Etc2R8G8B8A1UNorm => 8,
            Bc2UNorm | Bc2UNormSRgb | Bc3UNorm | Bc3UNormSRgb | Bc5UNorm | Bc5SNorm | Bc7UNorm
            | Bc7UNormSRgb | Etc2R8G8B8A8UNorm => 16,
            _ => panic!("{:?} is not block compressed", self),
        }
    }

    /// Size of the smallest addressable unit: a block for compressed formats, a texel otherwise.
    pub fn unit_size_in_bytes(self) -> u32 {
        if self.is_compressed() {
            self.block_size_in_bytes()
        } else {
            self.size_in_bytes()
        }
    }

    /// Edge length in texels of the smallest addressable unit.
    pub fn unit_edge(self) -> u32 {
        if self.is_compressed() {
            BLOCK_EDGE
        } else {
            1
        }
    }

    /// Channel interpretation.
    pub fn channel_type(self) -> ChannelType {
        use self::PixelFormat::*;
        match self {
            R8G8B8A8UNormSRgb | B8G8R8A8UNormSRgb | Bc1RgbUNormSRgb | Bc1RgbaUNormSRgb
            | Bc2UNormSRgb | Bc3UNormSRgb | Bc7UNormSRgb => ChannelType::Srgb,
            R8SNorm | R16SNorm | R8G8SNorm | R16G16SNorm | R8G8B8SNorm | R16G16B16SNorm
            | R8G8B8A8SNorm | R16G16B16A16SNorm | Bc4SNorm | Bc5SNorm => ChannelType::SNorm,
            R8UInt | R16UInt | R32UInt | R8G8UInt | R16G16UInt | R32G32UInt | R8G8B8UInt
            | R16G16B16UInt | R32G32B32UInt | R8G8B8A8UInt | R16G16B16A16UInt
            | R32G32B32A32UInt | R10G10B10A2UInt => ChannelType::UInt,
            R8SInt | R16SInt | R32SInt | R8G8SInt | R16G16SInt | R32G32SInt | R8G8B8SInt
            | R16G16B16SInt | R32G32B32SInt | R8G8B8A8SInt | R16G16B16A16SInt
            | R32G32B32A32SInt => ChannelType::SInt,
            R16Float | R32Float | R16G16Float | R32G32Float | R16G16B16Float | R32G32B32Float
            | R16G16B16A16Float | R32G32B32A32Float | R11G11B10Float | D32Float
            | D32FloatS8UInt => ChannelType::Float,
            _ => ChannelType::UNorm,
        }
    }

    /// The linear counterpart of an sRGB format, or the format itself.
    pub fn linear(self) -> PixelFormat {
        use self::PixelFormat::*;
        match self {
            R8G8B8A8UNormSRgb => R8G8B8A8UNorm,
            B8G8R8A8UNormSRgb => B8G8R8A8UNorm,
            Bc1RgbUNormSRgb => Bc1RgbUNorm,
            Bc1RgbaUNormSRgb => Bc1RgbaUNorm,
            Bc2UNormSRgb => Bc2UNorm,
            Bc3UNormSRgb => Bc3UNorm,
            Bc7UNormSRgb => Bc7UNorm,
            other => other,
        }
    }

    /// Whether a view of format `other` may reinterpret a texture of this format.
    pub fn is_view_compatible(self, other: PixelFormat) -> bool {
        if self == other || self.linear() == other.linear() {
            return true;
        }
        if self.is_compressed() || other.is_compressed() || self.is_depth() || other.is_depth() {
            return false;
        }
        self.size_in_bytes() == other.size_in_bytes()
    }

    /// Bytes per row of `width` texels, counting whole blocks for compressed formats.
    pub fn row_pitch(self, width: u32) -> u32 {
        if self.is_compressed() {
            let blocks = (width + BLOCK_EDGE - 1) / BLOCK_EDGE;
            blocks * self.block_size_in_bytes()
        } else {
            width * self.size_in_bytes()
        }
    }

    /// Number of rows stored for `height` texels, counting block rows for compressed formats.
    pub fn num_rows(self, height: u32) -> u32 {
        if self.is_compressed() {
            (height + BLOCK_EDGE - 1) / BLOCK_EDGE
        } else {
            height
        }
    }

    /// Bytes per depth slice.
    pub fn depth_pitch(self, row_pitch: u32, height: u32) -> u32 {
        row_pitch * self.num_rows(height)
    }

    /// Size in bytes of a `width × height × depth` region.
    pub fn region_size(self, width: u32, height: u32, depth: u32) -> u32 {
        self.depth_pitch(self.row_pitch(width), height) * depth
    }
}

/// Format of one vertex attribute.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VertexFormat {
    Float1,
    Float2,
    Float3,
    Float4,
    Byte2Norm,
    Byte2,
    Byte4Norm,
    Byte4,
    SByte2Norm,
    SByte2,
    SByte4Norm,
    SByte4,
    UShort2Norm,
    UShort2,
    UShort4Norm,
    UShort4,
    Short2Norm,
    Short2,
    Short4Norm,
    Short4,
    UInt1,
    UInt2,
    UInt3,
    UInt4,
    Int1,
    Int2,
    Int3,
    Int4,
    Half1,
    Half2,
    Half4,
}

impl VertexFormat {
    /// Number of components.
    pub fn element_count(self) -> u32 {
        use self::VertexFormat::*;
        match self {
            Float1 | UInt1 | Int1 | Half1 => 1,
            Float2 | Byte2Norm | Byte2 | SByte2Norm | SByte2 | UShort2Norm | UShort2
            | Short2Norm | Short2 | UInt2 | Int2 | Half2 => 2,
            Float3 | UInt3 | Int3 => 3,
            Float4 | Byte4Norm | Byte4 | SByte4Norm | SByte4 | UShort4Norm | UShort4
            | Short4Norm | Short4 | UInt4 | Int4 | Half4 => 4,
        }
    }

    /// Size of one attribute in bytes.
    pub fn size_in_bytes(self) -> u32 {
        use self::VertexFormat::*;
        match self {
            Byte2Norm | Byte2 | SByte2Norm | SByte2 | Half1 => 2,
            Float1 | UInt1 | Int1 | Byte4Norm | Byte4 | SByte4Norm | SByte4 | UShort2Norm
            | UShort2 | Short2Norm | Short2 | Half2 => 4,
            Float2 | UInt2 | Int2 | UShort4Norm | UShort4 | Short4Norm | Short4 | Half4 => 8,
            Float3 | UInt3 | Int3 => 12,
            Float4 | UInt4 | Int4 => 16,
        }
    }
}

/// Format of the elements of an index buffer.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size_in_bytes(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Largest dimension of mip `level` of a resource whose top level is `size`.
pub fn mip_dimension(size: u32, level: u32) -> u32 {
    size.checked_shr(level).unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(PixelFormat::R8G8B8A8UNorm.size_in_bytes(), 4);
        assert_eq!(PixelFormat::D32FloatS8UInt.size_in_bytes(), 5);
        assert_eq!(PixelFormat::R16G16B16Float.size_in_bytes(), 6);
        assert_eq!(PixelFormat::R32G32B32A32Float.size_in_bytes(), 16);
        assert_eq!(PixelFormat::Bc1RgbaUNorm.block_size_in_bytes(), 8);
        assert_eq!(PixelFormat::Bc7UNormSRgb.block_size_in_bytes(), 16);
        assert_eq!(PixelFormat::Etc2R8G8B8A8UNorm.block_size_in_bytes(), 16);
        assert_eq!(VertexFormat::Half1.size_in_bytes(), 2);
        assert_eq!(VertexFormat::Short4Norm.size_in_bytes(), 8);
        assert_eq!(VertexFormat::Float3.element_count(), 3);
        assert_eq!(IndexFormat::U16.size_in_bytes(), 2);
    }

    #[test]
    #[should_panic]
    fn test_compressed_texel_size() {
        PixelFormat::Bc3UNorm.size_in_bytes();
    }

    #[test]
    fn test_aspects() {
        assert!(PixelFormat::D24UNormS8UInt.is_depth_stencil());
        assert!(PixelFormat::D32Float.is_depth());
        assert!(!PixelFormat::D32Float.is_stencil());
        assert!(!PixelFormat::R32Float.is_depth());
        assert!(PixelFormat::Bc1RgbUNormSRgb.is_srgb());
        assert_eq!(PixelFormat::Bc1RgbUNormSRgb.linear(), PixelFormat::Bc1RgbUNorm);
    }

    #[test]
    fn test_pitches() {
        let bc1 = PixelFormat::Bc1RgbUNorm;
        assert_eq!(bc1.row_pitch(1), 8);
        assert_eq!(bc1.row_pitch(5), 16);
        assert_eq!(bc1.num_rows(1), 1);
        assert_eq!(bc1.num_rows(9), 3);
        assert_eq!(PixelFormat::Bc3UNorm.row_pitch(256), 64 * 16);
        assert_eq!(PixelFormat::R8G8B8A8UNorm.row_pitch(256), 1024);
        assert_eq!(PixelFormat::R8G8B8A8UNorm.num_rows(3), 3);
    }

    #[test]
    fn test_depth_pitch_is_row_pitch_times_rows() {
        for &format in PixelFormat::ALL.iter() {
            for &(width, height) in &[(1, 1), (3, 7), (4, 4), (17, 33), (256, 128)] {
                let row_pitch = format.row_pitch(width);
                assert_eq!(
                    row_pitch * format.num_rows(height),
                    format.depth_pitch(row_pitch, height),
                    "{:?}",
                    format
                );
            }
        }
    }

    #[test]
    fn test_mip_dimension_monotonic() {
        for &size in &[1, 2, 3, 255, 256, 1000, u32::max_value()] {
            let mut previous = size;
            for level in 0..40 {
                let dim = mip_dimension(size, level);
                assert!(dim >= 1);
                assert!(dim <= previous);
                previous = dim;
            }
        }
        assert_eq!(mip_dimension(256, 3), 32);
        assert_eq!(mip_dimension(5, 2), 1);
    }

    #[test]
    fn test_view_compatibility() {
        use super::PixelFormat::*;
        assert!(R8G8B8A8UNorm.is_view_compatible(R8G8B8A8UNormSRgb));
        assert!(R8G8B8A8UNorm.is_view_compatible(R32Float));
        assert!(!R8G8B8A8UNorm.is_view_compatible(D32Float));
        assert!(!Bc1RgbUNorm.is_view_compatible(Bc4UNorm));
    }
}
