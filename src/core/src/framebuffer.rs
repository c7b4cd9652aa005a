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

//! Framebuffers and their output descriptions.

use crate::format::mip_dimension;
use crate::handle::{kind, Handle};
use crate::pso::OutputDescription;
use crate::swapchain::References;
use crate::texture::{SampleCount, Texture};
use crate::Backend;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// One attachment of a framebuffer description.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AttachmentDescription {
    /// Attached texture.
    pub target: Handle<kind::Texture>,
    /// Rendered mip level.
    pub mip_level: u32,
    /// Rendered layer.
    pub array_layer: u32,
}

impl AttachmentDescription {
    /// Top mip of the first layer of `target`.
    pub fn new(target: Handle<kind::Texture>) -> Self {
        AttachmentDescription {
            target,
            mip_level: 0,
            array_layer: 0,
        }
    }
}

/// Parameters of a framebuffer.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct FramebufferDescription {
    /// Color attachments, in order.
    pub color_targets: Vec<AttachmentDescription>,
    /// Optional depth-stencil attachment.
    pub depth_target: Option<AttachmentDescription>,
}

/// A resolved framebuffer attachment.
pub struct Attachment<B: Backend> {
    /// Attached texture.
    pub texture: Arc<Texture<B>>,
    /// Rendered mip level.
    pub mip_level: u32,
    /// Rendered layer.
    pub array_layer: u32,
}

impl<B: Backend> Clone for Attachment<B> {
    fn clone(&self) -> Self {
        Attachment {
            texture: Arc::clone(&self.texture),
            mip_level: self.mip_level,
            array_layer: self.array_layer,
        }
    }
}

impl<B: Backend> fmt::Debug for Attachment<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Attachment({:?}, mip {}, layer {})", self.texture, self.mip_level, self.array_layer)
    }
}

/// Render targets of draws.
pub struct Framebuffer<B: Backend> {
    color_targets: SmallVec<[Attachment<B>; 8]>,
    depth_target: Option<Attachment<B>>,
    output: OutputDescription,
    width: u32,
    height: u32,
    swapchain: Option<Arc<References>>,
    raw: B::Framebuffer,
}

impl<B: Backend> fmt::Debug for Framebuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("output", &self.output)
            .field("size", &(self.width, self.height))
            .field("swapchain", &self.swapchain.is_some())
            .finish()
    }
}

impl<B: Backend> Framebuffer<B> {
    /// Assemble a framebuffer from resolved attachments.
    pub fn new(
        color_targets: SmallVec<[Attachment<B>; 8]>,
        depth_target: Option<Attachment<B>>,
        swapchain: Option<Arc<References>>,
        raw: B::Framebuffer,
    ) -> Self {
        let output = OutputDescription {
            depth: depth_target.as_ref().map(|a| a.texture.desc().format),
            colors: color_targets.iter().map(|a| a.texture.desc().format).collect(),
            sample_count: color_targets
                .first()
                .or_else(|| depth_target.as_ref())
                .map_or(SampleCount::X1, |a| a.texture.desc().sample_count),
        };
        let (width, height) = color_targets
            .first()
            .or_else(|| depth_target.as_ref())
            .map_or((0, 0), |a| {
                let desc = a.texture.desc();
                (mip_dimension(desc.width, a.mip_level), mip_dimension(desc.height, a.mip_level))
            });
        Framebuffer {
            color_targets,
            depth_target,
            output,
            width,
            height,
            swapchain,
            raw,
        }
    }

    /// Color attachments.
    pub fn color_targets(&self) -> &[Attachment<B>] {
        &self.color_targets
    }

    /// Depth-stencil attachment.
    pub fn depth_target(&self) -> Option<&Attachment<B>> {
        self.depth_target.as_ref()
    }

    /// Formats and sample count of the attachments.
    pub fn output(&self) -> &OutputDescription {
        &self.output
    }

    /// Width of the rendered area.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the rendered area.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether anything can be rendered into it.
    pub fn is_renderable(&self) -> bool {
        !self.color_targets.is_empty() || self.depth_target.is_some()
    }

    /// Back-reference registry of the owning swapchain, for swapchain framebuffers.
    pub fn swapchain(&self) -> Option<&Arc<References>> {
        self.swapchain.as_ref()
    }

    /// Native framebuffer.
    pub fn raw(&self) -> &B::Framebuffer {
        &self.raw
    }
}
