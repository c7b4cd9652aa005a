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

//! Resource creation.
//!
//! Every object is validated against the device capabilities before the backend sees it, then
//! registered with the device's [`ResourceManager`](crate::ResourceManager).

use crate::buffer::{Buffer, BufferDescription, BufferRange, BufferUsage};
use crate::command::{CommandList, CommandListToken};
use crate::device::{Device, RawDevice};
use crate::fence::Fence;
use crate::format::{mip_dimension, PixelFormat};
use crate::framebuffer::{Attachment, AttachmentDescription, Framebuffer, FramebufferDescription};
use crate::handle::{kind, Handle, HandleError};
use crate::manager::Registered;
use crate::pso::{
    BindingResource, BoundResource, ComputePipeline, ComputePipelineDescription, GraphicPipeline,
    GraphicPipelineDescription, PolygonFillMode, ResourceKind, ResourceLayout, ResourceLayoutDescription,
    ResourceSet, ResourceSetDescription, ShaderStages, MAX_COLOR_TARGETS,
};
use crate::sampler::{Sampler, SamplerDescription};
use crate::swapchain::{References, Swapchain, SwapchainDescription, Targets};
use crate::texture::{
    SampleCount, Texture, TextureDescription, TextureDimension, TextureUsage, TextureView, TextureViewDescription,
};
use crate::Backend;
use smallvec::SmallVec;
use std::sync::Arc;

/// Why an object could not be created.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CreationError {
    /// The format cannot be used the requested way.
    #[error("format {format:?} does not support {usage}")]
    UnsupportedFormat {
        #[allow(missing_docs)]
        format: PixelFormat,
        #[allow(missing_docs)]
        usage: &'static str,
    },
    /// A usage combination that no resource can have.
    #[error("unsupported usage: {0}")]
    UnsupportedUsage(&'static str),
    #[allow(missing_docs)]
    #[error("invalid description: {0}")]
    InvalidDescription(&'static str),
    /// A device capability the description relies on is missing.
    #[error("the device does not support `{0}`")]
    MissingCapability(&'static str),
    /// A resource does not fit the layout element it is bound to.
    #[error("resource {index} does not fit a {kind:?} element")]
    LayoutMismatch {
        #[allow(missing_docs)]
        index: u32,
        #[allow(missing_docs)]
        kind: ResourceKind,
    },
    #[allow(missing_docs)]
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[allow(missing_docs)]
    #[error("out of memory")]
    OutOfMemory,
}

/// Creates and registers the objects of a device.
#[derive(Debug)]
pub struct ResourceFactory<'a, B: Backend> {
    device: &'a Device<B>,
}

impl<'a, B: Backend> ResourceFactory<'a, B> {
    pub(crate) fn new(device: &'a Device<B>) -> Self {
        ResourceFactory { device }
    }

    fn register<K: Registered<B>>(&self, object: K::Object) -> Result<Handle<K>, CreationError> {
        let handle = self.device.manager.allocate(Arc::new(object))?;
        trace!("Created {:?}", handle);
        Ok(handle)
    }

    fn require(&self, supported: bool, capability: &'static str) -> Result<(), CreationError> {
        if supported {
            Ok(())
        } else {
            Err(CreationError::MissingCapability(capability))
        }
    }

    /// Create a buffer, optionally filled with `initial` data.
    pub fn create_buffer(
        &self,
        desc: &BufferDescription,
        initial: Option<&[u8]>,
    ) -> Result<Handle<kind::Buffer>, CreationError> {
        if desc.size == 0 {
            return Err(CreationError::InvalidDescription("buffer size is zero"));
        }
        if desc.usage.contains(BufferUsage::STAGING) && desc.usage != BufferUsage::STAGING {
            return Err(CreationError::UnsupportedUsage("staging buffers only serve copies"));
        }
        if desc.usage.contains(BufferUsage::CONSTANT) && desc.size % 16 != 0 {
            return Err(CreationError::InvalidDescription(
                "constant buffer size must be a multiple of 16",
            ));
        }
        let structured = BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE;
        if desc.usage.intersects(structured) {
            self.require(self.device.capabilities.structured_buffer, "structured_buffer")?;
            if !desc.raw && desc.structure_stride == 0 {
                return Err(CreationError::InvalidDescription(
                    "structured buffers need a structure stride",
                ));
            }
        }
        if let Some(data) = initial {
            if data.len() > desc.size as usize {
                return Err(CreationError::InvalidDescription(
                    "initial data is larger than the buffer",
                ));
            }
        }

        let raw = self.device.raw.create_buffer(desc)?;
        let buffer = Buffer::new(desc.clone(), raw);
        if let Some(data) = initial {
            self.device.raw.write_buffer(&buffer, 0, data);
        }
        self.register(buffer)
    }

    /// Create a texture.
    pub fn create_texture(&self, desc: &TextureDescription) -> Result<Handle<kind::Texture>, CreationError> {
        let raw = self.create_raw_texture(desc)?;
        self.register(Texture::new(desc.clone(), raw))
    }

    fn create_raw_texture(&self, desc: &TextureDescription) -> Result<B::Texture, CreationError> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 || desc.mip_count == 0 || desc.array_layers == 0 {
            return Err(CreationError::InvalidDescription("texture dimensions must be non-zero"));
        }
        let largest = desc.width.max(desc.height).max(desc.depth);
        if largest > self.device.limits.max_texture_dimension {
            return Err(CreationError::InvalidDescription("texture is larger than the device limit"));
        }
        let full_chain = 32 - largest.leading_zeros();
        if desc.mip_count > full_chain {
            return Err(CreationError::InvalidDescription("more mips than the full chain"));
        }
        match desc.dimension {
            TextureDimension::D1 => {
                self.require(self.device.capabilities.texture_1d, "texture_1d")?;
                if desc.height != 1 || desc.depth != 1 {
                    return Err(CreationError::InvalidDescription("1D textures have a height and depth of 1"));
                }
            }
            TextureDimension::D2 => {
                if desc.depth != 1 {
                    return Err(CreationError::InvalidDescription("2D textures have a depth of 1"));
                }
            }
            TextureDimension::D3 => {
                if desc.array_layers != 1 || desc.is_multisampled() {
                    return Err(CreationError::InvalidDescription(
                        "3D textures have one layer and one sample",
                    ));
                }
            }
        }
        if desc.usage.contains(TextureUsage::CUBEMAP) && desc.width != desc.height {
            return Err(CreationError::InvalidDescription("cubemap faces must be square"));
        }
        let format = desc.format;
        if desc.usage.contains(TextureUsage::DEPTH_STENCIL) && !format.is_depth() {
            return Err(CreationError::UnsupportedFormat {
                format,
                usage: "depth-stencil targets",
            });
        }
        if format.is_depth() && desc.usage.intersects(TextureUsage::RENDER_TARGET | TextureUsage::STORAGE) {
            return Err(CreationError::UnsupportedFormat {
                format,
                usage: "color or storage access",
            });
        }
        if format.is_compressed()
            && desc
                .usage
                .intersects(TextureUsage::RENDER_TARGET | TextureUsage::STORAGE | TextureUsage::DEPTH_STENCIL)
        {
            return Err(CreationError::UnsupportedFormat {
                format,
                usage: "rendering or storage",
            });
        }
        if desc.usage.contains(TextureUsage::STAGING) && desc.is_multisampled() {
            return Err(CreationError::UnsupportedUsage("staging textures cannot be multisampled"));
        }
        if desc.is_multisampled() {
            if desc.mip_count != 1 {
                return Err(CreationError::InvalidDescription("multisampled textures have one mip"));
            }
            let limit = self
                .device
                .raw
                .texture_sample_count_limit(format, desc.usage.contains(TextureUsage::DEPTH_STENCIL));
            if desc.sample_count.count() > limit.count() {
                return Err(CreationError::UnsupportedFormat {
                    format,
                    usage: "this sample count",
                });
            }
        }
        self.device.raw.create_texture(desc)
    }

    /// Create a view of a mip and layer range of a texture.
    pub fn create_texture_view(
        &self,
        desc: &TextureViewDescription,
    ) -> Result<Handle<kind::TextureView>, CreationError> {
        let texture = self.device.manager.resolve(desc.target)?;
        let view = self.create_view_object(texture, desc)?;
        self.register(view)
    }

    fn create_view_object(
        &self,
        texture: Arc<Texture<B>>,
        desc: &TextureViewDescription,
    ) -> Result<TextureView<B>, CreationError> {
        let tex = texture.desc();
        if desc.mip_count == 0 || desc.array_layers == 0 {
            return Err(CreationError::InvalidDescription("empty texture view"));
        }
        let mip_end = u64::from(desc.base_mip_level) + u64::from(desc.mip_count);
        let layer_end = u64::from(desc.base_array_layer) + u64::from(desc.array_layers);
        if mip_end > u64::from(tex.mip_count) || layer_end > u64::from(tex.effective_layers()) {
            return Err(CreationError::InvalidDescription("view range exceeds the texture"));
        }
        let subset = desc.base_mip_level != 0
            || desc.mip_count != tex.mip_count
            || desc.base_array_layer != 0
            || desc.array_layers != tex.effective_layers();
        if subset {
            self.require(self.device.capabilities.subset_texture_view, "subset_texture_view")?;
        }
        if let Some(format) = desc.format {
            if !format.is_view_compatible(tex.format) {
                return Err(CreationError::UnsupportedFormat {
                    format,
                    usage: "viewing this texture",
                });
            }
        }
        let raw = self.device.raw.create_texture_view(&texture, desc)?;
        Ok(TextureView::new(texture, desc, raw))
    }

    /// Create a sampler.
    pub fn create_sampler(&self, desc: &SamplerDescription) -> Result<Handle<kind::Sampler>, CreationError> {
        if desc.max_anisotropy > 1 {
            self.require(self.device.capabilities.sampler_anisotropy, "sampler_anisotropy")?;
        }
        if desc.lod_bias != 0.0 {
            self.require(self.device.capabilities.sampler_lod_bias, "sampler_lod_bias")?;
        }
        if desc.min_lod > desc.max_lod {
            return Err(CreationError::InvalidDescription("min_lod exceeds max_lod"));
        }
        let raw = self.device.raw.create_sampler(desc)?;
        self.register(Sampler::new(desc.clone(), raw))
    }

    /// Create a resource layout.
    pub fn create_resource_layout(
        &self,
        desc: &ResourceLayoutDescription,
    ) -> Result<Handle<kind::ResourceLayout>, CreationError> {
        for element in &desc.elements {
            if element.dynamic && !element.kind.is_buffer() {
                return Err(CreationError::InvalidDescription(
                    "only buffer elements take dynamic offsets",
                ));
            }
            if element.stages.is_empty() {
                return Err(CreationError::InvalidDescription("layout element visible to no stage"));
            }
        }
        self.register(ResourceLayout::new(desc))
    }

    /// Create a resource set, resolving one resource per layout element.
    pub fn create_resource_set(
        &self,
        desc: &ResourceSetDescription,
    ) -> Result<Handle<kind::ResourceSet>, CreationError> {
        let layout = self.device.manager.resolve(desc.layout)?;
        if layout.elements().len() != desc.resources.len() {
            return Err(CreationError::InvalidDescription(
                "resource count differs from the layout element count",
            ));
        }
        let manager = &self.device.manager;
        let mut resources = Vec::with_capacity(desc.resources.len());
        for (index, (element, binding)) in layout.elements().iter().zip(&desc.resources).enumerate() {
            let resource = match *binding {
                BindingResource::Buffer(handle) => {
                    let buffer = manager.resolve(handle)?;
                    let size = buffer.size();
                    BoundResource::Buffer(BufferRange {
                        buffer,
                        offset: 0,
                        size,
                    })
                }
                BindingResource::BufferRange { buffer, offset, size } => {
                    let buffer = manager.resolve(buffer)?;
                    self.check_range(&buffer, element.kind, offset, size)?;
                    BoundResource::Buffer(BufferRange { buffer, offset, size })
                }
                BindingResource::Texture(handle) => {
                    let texture = manager.resolve(handle)?;
                    let view_desc = TextureViewDescription::full(handle, texture.desc());
                    BoundResource::TextureView(Arc::new(self.create_view_object(texture, &view_desc)?))
                }
                BindingResource::TextureView(handle) => BoundResource::TextureView(manager.resolve(handle)?),
                BindingResource::Sampler(handle) => BoundResource::Sampler(manager.resolve(handle)?),
            };
            if !resource.supports(element.kind) {
                return Err(CreationError::LayoutMismatch {
                    index: index as u32,
                    kind: element.kind,
                });
            }
            resources.push(resource);
        }
        self.register(ResourceSet::new(layout, resources))
    }

    fn check_range(&self, buffer: &Buffer<B>, kind: ResourceKind, offset: u32, size: u32) -> Result<(), CreationError> {
        if size == 0 || offset as u64 + size as u64 > buffer.size() as u64 {
            return Err(CreationError::InvalidDescription("buffer range exceeds the buffer"));
        }
        if offset == 0 && size == buffer.size() {
            return Ok(());
        }
        self.require(self.device.capabilities.buffer_range_binding, "buffer_range_binding")?;
        let alignment = if kind == ResourceKind::ConstantBuffer {
            self.device.limits.constant_buffer_min_offset_alignment
        } else {
            self.device.limits.structured_buffer_min_offset_alignment
        };
        if offset % alignment != 0 {
            return Err(CreationError::InvalidDescription("misaligned buffer range offset"));
        }
        Ok(())
    }

    fn resolve_layouts(
        &self,
        handles: &[Handle<kind::ResourceLayout>],
    ) -> Result<Vec<Arc<ResourceLayout>>, CreationError> {
        handles
            .iter()
            .map(|&handle| self.device.manager.resolve(handle).map_err(CreationError::from))
            .collect()
    }

    /// Create a graphic pipeline.
    pub fn create_graphic_pipeline(
        &self,
        desc: &GraphicPipelineDescription,
    ) -> Result<Handle<kind::GraphicPipeline>, CreationError> {
        let caps = &self.device.capabilities;
        for shader in &desc.shaders {
            if shader.stage.contains(ShaderStages::GEOMETRY) {
                self.require(caps.geometry_shader, "geometry_shader")?;
            }
            if shader
                .stage
                .intersects(ShaderStages::TESSELLATION_CONTROL | ShaderStages::TESSELLATION_EVALUATION)
            {
                self.require(caps.tessellation_shaders, "tessellation_shaders")?;
            }
            if shader.stage.contains(ShaderStages::COMPUTE) {
                return Err(CreationError::InvalidDescription("compute shader in a graphic pipeline"));
            }
        }
        if !desc.shaders.iter().any(|shader| shader.stage.contains(ShaderStages::VERTEX)) {
            return Err(CreationError::InvalidDescription("graphic pipelines need a vertex shader"));
        }
        if desc.rasterizer.fill_mode == PolygonFillMode::Wireframe {
            self.require(caps.fill_mode_wireframe, "fill_mode_wireframe")?;
        }
        if !desc.rasterizer.depth_clip {
            self.require(caps.depth_clip_disable, "depth_clip_disable")?;
        }
        if desc.output.colors.len() > MAX_COLOR_TARGETS {
            return Err(CreationError::InvalidDescription("too many color outputs"));
        }
        let attachments = &desc.blend.attachments;
        if attachments.len() > 1 && attachments.iter().any(|a| *a != attachments[0]) {
            self.require(caps.independent_blend, "independent_blend")?;
        }
        let layouts = self.resolve_layouts(&desc.resource_layouts)?;
        let raw = self.device.raw.create_graphic_pipeline(desc, &layouts)?;
        self.register(GraphicPipeline::new(desc.clone(), layouts, raw))
    }

    /// Create a compute pipeline.
    pub fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescription,
    ) -> Result<Handle<kind::ComputePipeline>, CreationError> {
        self.require(self.device.capabilities.compute_shader, "compute_shader")?;
        if !desc.shader.stage.contains(ShaderStages::COMPUTE) {
            return Err(CreationError::InvalidDescription("compute pipelines need a compute shader"));
        }
        if desc.thread_group_size.iter().any(|&size| size == 0) {
            return Err(CreationError::InvalidDescription("empty thread group"));
        }
        let layouts = self.resolve_layouts(&desc.resource_layouts)?;
        let raw = self.device.raw.create_compute_pipeline(desc, &layouts)?;
        self.register(ComputePipeline::new(desc.clone(), layouts, raw))
    }

    /// Create a framebuffer.
    pub fn create_framebuffer(
        &self,
        desc: &FramebufferDescription,
    ) -> Result<Handle<kind::Framebuffer>, CreationError> {
        self.create_framebuffer_with(desc, None)
    }

    fn resolve_attachment(
        &self,
        desc: &AttachmentDescription,
        usage: TextureUsage,
    ) -> Result<Attachment<B>, CreationError> {
        let texture = self.device.manager.resolve(desc.target)?;
        let tex = texture.desc();
        if !tex.usage.contains(usage) {
            return Err(CreationError::UnsupportedUsage("attachment lacks the target usage"));
        }
        if desc.mip_level >= tex.mip_count || desc.array_layer >= tex.effective_layers() {
            return Err(CreationError::InvalidDescription("attachment subresource out of range"));
        }
        Ok(Attachment {
            texture,
            mip_level: desc.mip_level,
            array_layer: desc.array_layer,
        })
    }

    fn create_framebuffer_with(
        &self,
        desc: &FramebufferDescription,
        swapchain: Option<Arc<References>>,
    ) -> Result<Handle<kind::Framebuffer>, CreationError> {
        if desc.color_targets.len() > MAX_COLOR_TARGETS {
            return Err(CreationError::InvalidDescription("too many color targets"));
        }
        let colors = desc
            .color_targets
            .iter()
            .map(|target| self.resolve_attachment(target, TextureUsage::RENDER_TARGET))
            .collect::<Result<SmallVec<[_; MAX_COLOR_TARGETS]>, _>>()?;
        let depth = match desc.depth_target {
            Some(ref target) => Some(self.resolve_attachment(target, TextureUsage::DEPTH_STENCIL)?),
            None => None,
        };

        let mut attachments = colors.iter().chain(depth.as_ref());
        if let Some(first) = attachments.next() {
            let size = |a: &Attachment<B>| {
                let tex = a.texture.desc();
                (
                    mip_dimension(tex.width, a.mip_level),
                    mip_dimension(tex.height, a.mip_level),
                    tex.sample_count,
                )
            };
            let expected = size(first);
            if attachments.any(|a| size(a) != expected) {
                return Err(CreationError::InvalidDescription(
                    "attachments differ in size or sample count",
                ));
            }
        }

        let raw = self.device.raw.create_framebuffer(&colors, depth.as_ref())?;
        self.register(Framebuffer::new(colors, depth, swapchain, raw))
    }

    /// Create a fence.
    pub fn create_fence(&self, signaled: bool) -> Result<Handle<kind::Fence>, CreationError> {
        self.register(Fence::new(signaled))
    }

    /// Create a swapchain with its color and optional depth images.
    pub fn create_swapchain(&self, desc: &SwapchainDescription) -> Result<Handle<kind::Swapchain>, CreationError> {
        let references = Arc::new(References::default());
        let targets = self.create_swapchain_targets(desc, &references)?;
        debug!("Created a {}x{} swapchain", desc.width, desc.height);
        self.register(Swapchain::new(desc.clone(), references, targets))
    }

    pub(crate) fn create_swapchain_targets(
        &self,
        desc: &SwapchainDescription,
        references: &Arc<References>,
    ) -> Result<Targets, CreationError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(CreationError::InvalidDescription("swapchain size must be non-zero"));
        }
        let color = self.create_texture(&TextureDescription::new_2d(
            desc.width,
            desc.height,
            1,
            desc.color_format(),
            TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
        ))?;
        let depth = if desc.depth {
            Some(self.create_texture(&TextureDescription {
                sample_count: SampleCount::X1,
                ..TextureDescription::new_2d(
                    desc.width,
                    desc.height,
                    1,
                    desc.depth_format,
                    TextureUsage::DEPTH_STENCIL,
                )
            })?)
        } else {
            None
        };
        let framebuffer = self.create_framebuffer_with(
            &FramebufferDescription {
                color_targets: vec![AttachmentDescription::new(color)],
                depth_target: depth.map(AttachmentDescription::new),
            },
            Some(Arc::clone(references)),
        )?;
        Ok(Targets {
            framebuffer,
            color,
            depth,
        })
    }

    /// Create a command list.
    pub fn create_command_list(&self) -> Result<CommandList<B>, CreationError> {
        let token = Arc::new(CommandListToken::new());
        let handle = self.device.manager.allocate(Arc::clone(&token))?;
        trace!("Created {:?}", handle);
        Ok(CommandList::new(
            handle,
            token,
            self.device.raw.create_command_list(),
            Arc::clone(&self.device.manager),
            self.device.capabilities,
            self.device.limits,
            self.device.desc.debug,
        ))
    }

    /// Unregister an object. Command lists and sets that captured it keep it alive.
    pub fn destroy<K: Registered<B>>(&self, handle: Handle<K>) -> Result<(), HandleError> {
        self.device.manager.release(handle).map(|_| ())
    }
}
