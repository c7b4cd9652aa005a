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

//! Pipelines the backend records on its own behalf.

use crate::native::{ComputePipeline, Kernel, ResourceId};

/// Bytes of the copy kernel's parameter block bound at index 2.
pub const COPY_PARAMS_SIZE: usize = 12;

/// Parameters of one unaligned buffer copy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CopyParams {
    pub source_offset: u32,
    pub destination_offset: u32,
    pub size: u32,
}

impl CopyParams {
    pub fn to_bytes(&self) -> [u8; COPY_PARAMS_SIZE] {
        let mut out = [0; COPY_PARAMS_SIZE];
        out[0..4].copy_from_slice(&self.source_offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.destination_offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < COPY_PARAMS_SIZE {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Some(CopyParams {
            source_offset: word(0),
            destination_offset: word(4),
            size: word(8),
        })
    }
}

#[derive(Debug)]
pub struct ServicePipes {
    pub copy_buffer: ComputePipeline,
}

impl ServicePipes {
    pub fn new() -> Self {
        ServicePipes {
            copy_buffer: ComputePipeline {
                id: ResourceId::new(),
                kernel: Kernel::CopyBuffer,
                threads_per_group: [1, 1, 1],
                push_constants: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_params_layout() {
        let params = CopyParams {
            source_offset: 3,
            destination_offset: 0x0100,
            size: 7,
        };
        let bytes = params.to_bytes();
        assert_eq!(&bytes[4..8], &[0, 1, 0, 0]);
        assert_eq!(CopyParams::from_bytes(&bytes), Some(params));
        assert_eq!(CopyParams::from_bytes(&bytes[..8]), None);
    }
}
