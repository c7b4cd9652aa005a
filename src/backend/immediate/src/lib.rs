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

//! Immediate-context backend.
//!
//! Every command list records into its own deferred context. `end` finishes the context into
//! a native command list, which the device's immediate context replays on submission.
//! Memory effects run on an emulated queue thread; draws and dispatches are only traced.

#[macro_use]
extern crate log;

mod command;
mod device;
mod execute;
mod list;
mod native;
#[path = "../../auxil/queue.rs"]
mod queue;
mod state;
#[path = "../../auxil/texels.rs"]
mod texels;

pub use crate::command::{Command, CopyBox, NativeCommandList, Resource};
pub use crate::device::Device;
pub use crate::list::CommandList;
pub use crate::native::{BindFlags, CpuAccess, ResourceId, Stage, TargetView, View};
pub use crate::state::StateId;

/// The immediate-context backend.
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
