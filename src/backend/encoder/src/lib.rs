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

//! Command-encoder backend.
//!
//! Command lists record into short-lived render, compute and blit encoders. Render passes
//! begin lazily, so clears become load actions of the pass that follows them. Buffer copies
//! the blit encoder cannot express run through an internal copy kernel.
//! Memory effects run on an emulated queue thread; draws and user kernels are only traced.

#[macro_use]
extern crate log;

mod device;
mod execute;
mod internal;
mod list;
mod native;
#[path = "../../auxil/queue.rs"]
mod queue;
mod soft;
#[path = "../../auxil/texels.rs"]
mod texels;

pub use crate::device::Device;
pub use crate::list::{CommandList, EncoderState};
pub use crate::native::{Kernel, RenderStages, ResourceId, StorageMode};
pub use crate::soft::{
    BlitCommand, ColorAttachment, CommandBuffer, ComputeCommand, DebugCommand, DepthAttachment, LoadAction, Pass,
    RenderCommand, RenderPassDescriptor, StencilAttachment, StoreAction,
};

/// The command-encoder backend.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Backend {}

impl rhi_core::Backend for Backend {
    type Device = device::Device;
    type CommandList = list::CommandList;
    type Buffer = native::Buffer;
    type Texture = native::Texture;
    type TextureView = native::TextureView;
    type Sampler = native::Sampler;
    type GraphicPipeline = native::GraphicPipeline;
    type ComputePipeline = native::ComputePipeline;
    type Framebuffer = native::Framebuffer;
}
