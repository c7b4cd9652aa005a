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

//! # rhi
//!
//! Backend-agnostic GPU command recording and resource binding.
//!
//! # Overview
//!
//! ## Devices and handles
//!
//! A [`Device`](struct.Device.html) owns every object it creates. Objects are referenced through
//! copyable [`Handle`](struct.Handle.html)s that go stale when the object is destroyed, so a
//! dangling reference is an error instead of undefined behavior. Objects are created with the
//! device's [`ResourceFactory`](struct.ResourceFactory.html).
//!
//! ## Command lists
//!
//! A [`CommandList`](struct.CommandList.html) records draws, dispatches and copies between
//! `begin` and `end`, validating every call and eliding redundant state changes before they
//! reach the backend. Ended lists are submitted to the device, optionally with a
//! [`Fence`](struct.Fence.html) to wait on.
//!
//! ## Backends
//!
//! Each backend implements [`Backend`](trait.Backend.html) and is enabled by a cargo feature:
//!
//! - `immediate`: records into deferred contexts and replays native command lists on an
//!   immediate context.
//! - `encoder`: records into short-lived render, compute and blit encoders on one command
//!   buffer.
//!
//! Client code is written once against `Device<B>` and `CommandList<B>`:
//!
//! ```ignore
//! let device = rhi::Device::<rhi::immediate::Backend>::open(rhi::DeviceDescription::default())?;
//! let mut list = device.factory().create_command_list()?;
//! list.begin()?;
//! list.set_framebuffer(framebuffer)?;
//! list.clear_color_target(0, [0.0, 0.0, 0.0, 1.0])?;
//! list.end()?;
//! device.submit_command_list(&mut list, None)?;
//! ```

pub extern crate rhi_core as base;

#[cfg(feature = "encoder")]
pub extern crate rhi_backend_encoder as encoder;
#[cfg(feature = "immediate")]
pub extern crate rhi_backend_immediate as immediate;

pub use crate::base::{buffer, command, device, fence, format, framebuffer, handle, pso, staging, texture};
pub use crate::base::{
    Api, ApiVersion, Backend, BindingResource, Buffer, BufferDescription, BufferUsage, Capabilities, CommandError,
    CommandList, ComputePipelineDescription, CreationError, Device, DeviceDescription, DeviceError, Extent, Fence,
    FenceState, FramebufferDescription, GraphicPipelineDescription, Handle, HandleError, IndexFormat, Limits,
    MapAccess, MapError, Offset, OutputDescription, PixelFormat, RawCommandList, RawDevice, Rect, ResourceFactory,
    ResourceKind, ResourceLayoutDescription, ResourceLayoutElement, ResourceSetDescription, SampleCount,
    SamplerDescription, ShaderStages, SubmitError, SwapchainDescription, TextureCopy, TextureDescription,
    TextureRegion, TextureUsage, TextureViewDescription, VertexFormat, Viewport,
};
pub use crate::base::{AttachmentDescription, MAX_VERTEX_BUFFERS};

/// Backends compiled into this build, in order of preference.
pub fn available_apis() -> Vec<Api> {
    let mut apis = Vec::new();
    if cfg!(feature = "immediate") {
        apis.push(Api::Immediate);
    }
    if cfg!(feature = "encoder") {
        apis.push(Api::Encoder);
    }
    apis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_features_enable_both_backends() {
        assert_eq!(available_apis(), vec![Api::Immediate, Api::Encoder]);
    }
}
