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

//! Buffer descriptions and indirect argument layouts.

use crate::Backend;
use bitflags::bitflags;
use std::fmt;
use std::sync::Arc;

bitflags!(
    /// How a buffer may be used.
    #[derive(Default)]
    pub struct BufferUsage: u16 {
        /// Source of vertex data.
        const VERTEX = 0x1;
        /// Source of index data.
        const INDEX = 0x2;
        /// Shader constants.
        const CONSTANT = 0x4;
        /// Structured data read by shaders.
        const STRUCTURED_READ_ONLY = 0x8;
        /// Structured data read and written by shaders.
        const STRUCTURED_READ_WRITE = 0x10;
        /// Arguments of indirect draws and dispatches.
        const INDIRECT = 0x20;
        /// Frequently rewritten by the CPU; mappable for writing.
        const DYNAMIC = 0x40;
        /// CPU mappable, only usable as a copy source or destination.
        const STAGING = 0x80;
    }
);

/// Parameters of a buffer.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct BufferDescription {
    /// Size in bytes.
    pub size: u32,
    /// Allowed usages.
    pub usage: BufferUsage,
    /// Element stride of structured buffers, zero otherwise.
    pub structure_stride: u32,
    /// Whether structured views see raw bytes rather than elements.
    pub raw: bool,
}

impl BufferDescription {
    /// A buffer of `size` bytes.
    pub fn new(size: u32, usage: BufferUsage) -> Self {
        BufferDescription {
            size,
            usage,
            ..Self::default()
        }
    }
}

/// A buffer owned by the device.
pub struct Buffer<B: Backend> {
    desc: BufferDescription,
    raw: B::Buffer,
}

impl<B: Backend> fmt::Debug for Buffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Buffer").field("desc", &self.desc).finish()
    }
}

impl<B: Backend> Buffer<B> {
    /// Wrap a native buffer.
    pub fn new(desc: BufferDescription, raw: B::Buffer) -> Self {
        Buffer { desc, raw }
    }

    /// Creation parameters.
    pub fn desc(&self) -> &BufferDescription {
        &self.desc
    }

    /// Size in bytes.
    pub fn size(&self) -> u32 {
        self.desc.size
    }

    /// Usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    /// Native buffer.
    pub fn raw(&self) -> &B::Buffer {
        &self.raw
    }
}

/// A sub-range of a buffer, as bound in a resource set.
pub struct BufferRange<B: Backend> {
    /// The viewed buffer.
    pub buffer: Arc<Buffer<B>>,
    /// Start of the range in bytes.
    pub offset: u32,
    /// Size of the range in bytes.
    pub size: u32,
}

impl<B: Backend> Clone for BufferRange<B> {
    fn clone(&self) -> Self {
        BufferRange {
            buffer: Arc::clone(&self.buffer),
            offset: self.offset,
            size: self.size,
        }
    }
}

impl<B: Backend> fmt::Debug for BufferRange<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BufferRange({:?}, {}..{})", self.buffer, self.offset, self.offset + self.size)
    }
}

impl<B: Backend> BufferRange<B> {
    /// Whether the range covers the whole buffer.
    pub fn is_full(&self) -> bool {
        self.offset == 0 && self.size == self.buffer.size()
    }
}

/// Arguments of one non-indexed indirect draw.
#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DrawIndirectCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub vertex_start: u32,
    pub instance_start: u32,
}

/// Arguments of one indexed indirect draw.
#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DrawIndexedIndirectCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub index_start: u32,
    pub vertex_offset: i32,
    pub instance_start: u32,
}

/// Arguments of one indirect dispatch.
#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DispatchIndirectCommand {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Size in bytes of [`DrawIndirectCommand`].
pub const DRAW_INDIRECT_COMMAND_SIZE: u32 = 16;
/// Size in bytes of [`DrawIndexedIndirectCommand`].
pub const DRAW_INDEXED_INDIRECT_COMMAND_SIZE: u32 = 20;
/// Size in bytes of [`DispatchIndirectCommand`].
pub const DISPATCH_INDIRECT_COMMAND_SIZE: u32 = 12;

impl DrawIndirectCommand {
    /// Little-endian byte image, as read by the GPU.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0; 16];
        for (chunk, value) in out.chunks_mut(4).zip(&[
            self.vertex_count,
            self.instance_count,
            self.vertex_start,
            self.instance_start,
        ]) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Decode from the first 16 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        DrawIndirectCommand {
            vertex_count: word(0),
            instance_count: word(4),
            vertex_start: word(8),
            instance_start: word(12),
        }
    }
}

impl DrawIndexedIndirectCommand {
    /// Little-endian byte image, as read by the GPU.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0; 20];
        out[0..4].copy_from_slice(&self.index_count.to_le_bytes());
        out[4..8].copy_from_slice(&self.instance_count.to_le_bytes());
        out[8..12].copy_from_slice(&self.index_start.to_le_bytes());
        out[12..16].copy_from_slice(&self.vertex_offset.to_le_bytes());
        out[16..20].copy_from_slice(&self.instance_start.to_le_bytes());
        out
    }

    /// Decode from the first 20 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let word = |i: usize| [bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]];
        DrawIndexedIndirectCommand {
            index_count: u32::from_le_bytes(word(0)),
            instance_count: u32::from_le_bytes(word(4)),
            index_start: u32::from_le_bytes(word(8)),
            vertex_offset: i32::from_le_bytes(word(12)),
            instance_start: u32::from_le_bytes(word(16)),
        }
    }
}

impl DispatchIndirectCommand {
    /// Decode from the first 12 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        DispatchIndirectCommand {
            x: word(0),
            y: word(4),
            z: word(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_layout() {
        assert_eq!(std::mem::size_of::<DrawIndirectCommand>() as u32, DRAW_INDIRECT_COMMAND_SIZE);
        assert_eq!(
            std::mem::size_of::<DrawIndexedIndirectCommand>() as u32,
            DRAW_INDEXED_INDIRECT_COMMAND_SIZE
        );
        assert_eq!(
            std::mem::size_of::<DispatchIndirectCommand>() as u32,
            DISPATCH_INDIRECT_COMMAND_SIZE
        );
    }

    #[test]
    fn test_default_description() {
        let desc = BufferDescription::default();
        assert_eq!(desc.size, 0);
        assert!(desc.usage.is_empty());
        assert_eq!(BufferDescription::new(16, BufferUsage::VERTEX).usage, BufferUsage::VERTEX);
    }

    #[test]
    fn test_indirect_bytes() {
        let command = DrawIndirectCommand {
            vertex_count: 3,
            instance_count: 1,
            vertex_start: 0x0102_0304,
            instance_start: 7,
        };
        let bytes = command.to_bytes();
        assert_eq!(&bytes[8..12], &[4, 3, 2, 1]);
        assert_eq!(DrawIndirectCommand::from_bytes(&bytes), command);
        let indexed = DrawIndexedIndirectCommand {
            vertex_offset: -1,
            ..Default::default()
        };
        assert_eq!(&indexed.to_bytes()[12..16], &[0xFF; 4]);
    }
}
