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

use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};
use rhi_core::pso::DepthStencilState;
use rhi_core::{
    Api, ApiVersion, Attachment, Buffer, BufferDescription, BufferUsage, Capabilities, Completion,
    ComputePipelineDescription, CreationError, DeviceDescription, DeviceError, GraphicPipelineDescription,
    HardwareInfo, Limits, Offset, PixelFormat, RawDevice, ResourceLayout, SampleCount, SamplerDescription,
    ShaderStages, StagingBufferPool, SubmitError, SubresourceLayout, Texture, TextureDescription, TextureRegion,
    TextureUsage, TextureViewDescription,
};
use smallvec::SmallVec;
use std::sync::Arc;

use crate::internal::ServicePipes;
use crate::list::CommandList;
use crate::native::{self, Kernel, RasterState, ResourceId, StorageMode};
use crate::queue::Queue;
use crate::soft::{
    ColorAttachment, DepthAttachment, LoadAction, RenderPassDescriptor, Resource, StencilAttachment, StoreAction,
};
use crate::{execute, texels, Backend};

/// Create the native side of a buffer. Staging and dynamic buffers live in shared memory.
pub(crate) fn create_native_buffer(desc: &BufferDescription) -> Result<native::Buffer, CreationError> {
    let storage = if desc.usage.intersects(BufferUsage::STAGING | BufferUsage::DYNAMIC) {
        StorageMode::Shared
    } else {
        StorageMode::Private
    };
    Ok(native::Buffer {
        id: ResourceId::new(),
        storage,
        memory: RwLock::new(vec![0; desc.size as usize]),
    })
}

/// The emulated device and its command queue.
#[derive(Debug)]
pub struct Device {
    queue: Queue,
    depth_stencils: Mutex<FxHashMap<DepthStencilState, ResourceId>>,
    service: Arc<ServicePipes>,
    staging: Arc<StagingBufferPool<Backend>>,
}

impl Device {
    pub const ADAPTER: &'static str = "Command Encoder Emulator";

    /// Number of distinct depth-stencil states created so far.
    pub fn depth_stencil_state_count(&self) -> usize {
        self.depth_stencils.lock().len()
    }

    /// Depth-stencil states differ from pipeline to pipeline only by the stencil reference,
    /// which is set on the encoder instead.
    fn depth_stencil_state(&self, desc: &DepthStencilState) -> ResourceId {
        let key = DepthStencilState {
            stencil_reference: 0,
            ..*desc
        };
        *self.depth_stencils.lock().entry(key).or_insert_with(ResourceId::new)
    }
}

impl RawDevice<Backend> for Device {
    fn open(desc: &DeviceDescription, staging: Arc<StagingBufferPool<Backend>>) -> Result<Self, DeviceError> {
        if let Some(ref name) = desc.adapter {
            if name != Self::ADAPTER {
                return Err(DeviceError::AdapterUnavailable(name.clone()));
            }
        }
        let queue = Queue::new("rhi-encoder-queue").map_err(|e| {
            error!("Failed to start the command queue: {}", e);
            DeviceError::AdapterUnavailable(Self::ADAPTER.to_owned())
        })?;
        Ok(Device {
            queue,
            depth_stencils: Mutex::new(FxHashMap::default()),
            service: Arc::new(ServicePipes::new()),
            staging,
        })
    }

    fn api(&self) -> Api {
        Api::Encoder
    }

    fn api_version(&self) -> ApiVersion {
        ApiVersion {
            major: 2,
            minor: 4,
            patch: 0,
        }
    }

    fn hardware_info(&self) -> HardwareInfo {
        HardwareInfo {
            name: Self::ADAPTER.to_owned(),
            ..HardwareInfo::default()
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            depth_range_zero_to_one: true,
            uv_origin_top_left: true,
            clip_space_y_inverted: false,
            compute_shader: true,
            geometry_shader: false,
            tessellation_shaders: false,
            multiple_viewports: true,
            sampler_lod_bias: false,
            draw_base_vertex: true,
            draw_base_instance: true,
            draw_indirect: true,
            draw_indirect_base_instance: true,
            fill_mode_wireframe: true,
            sampler_anisotropy: true,
            depth_clip_disable: true,
            texture_1d: true,
            independent_blend: true,
            structured_buffer: true,
            subset_texture_view: true,
            command_list_debug_markers: true,
            buffer_range_binding: true,
            shader_float64: false,
            shader_float16: true,
            conservative_rasterization: false,
            command_lists: true,
            concurrent_resources: true,
        }
    }

    fn limits(&self) -> Limits {
        Limits::default()
    }

    fn texture_sample_count_limit(&self, format: PixelFormat, is_depth: bool) -> SampleCount {
        if format.is_compressed() {
            SampleCount::X1
        } else if is_depth {
            SampleCount::X4
        } else {
            SampleCount::X8
        }
    }

    fn create_buffer(&self, desc: &BufferDescription) -> Result<native::Buffer, CreationError> {
        create_native_buffer(desc)
    }

    fn create_texture(&self, desc: &TextureDescription) -> Result<native::Texture, CreationError> {
        // Staging textures are plain buffers laid out like the texture.
        let storage = if desc.usage.contains(TextureUsage::STAGING) {
            StorageMode::Shared
        } else {
            StorageMode::Private
        };
        Ok(native::Texture {
            id: ResourceId::new(),
            storage,
            memory: RwLock::new(vec![0; desc.total_size() as usize]),
        })
    }

    fn create_texture_view(
        &self,
        texture: &Arc<Texture<Backend>>,
        _desc: &TextureViewDescription,
    ) -> Result<native::TextureView, CreationError> {
        if texture.raw().is_buffer_backed() {
            return Err(CreationError::InvalidDescription("staging textures cannot be viewed"));
        }
        Ok(native::TextureView {
            id: ResourceId::new(),
            texture: texture.raw().id,
        })
    }

    fn create_sampler(&self, _desc: &SamplerDescription) -> Result<native::Sampler, CreationError> {
        Ok(native::Sampler { id: ResourceId::new() })
    }

    fn create_graphic_pipeline(
        &self,
        desc: &GraphicPipelineDescription,
        _layouts: &[Arc<ResourceLayout>],
    ) -> Result<native::GraphicPipeline, CreationError> {
        let rasterizer = &desc.rasterizer;
        Ok(native::GraphicPipeline {
            id: ResourceId::new(),
            primitive: desc.topology,
            raster: RasterState {
                cull_mode: rasterizer.cull_mode,
                front_face: rasterizer.front_face,
                fill_mode: rasterizer.fill_mode,
                depth_clip: rasterizer.depth_clip,
                scissor_test: rasterizer.scissor_test,
                depth_bias: rasterizer.depth_bias as f32,
                slope_scale: rasterizer.slope_scaled_depth_bias,
                depth_bias_clamp: rasterizer.depth_bias_clamp,
            },
            blend_color: desc.blend.blend_factor,
            depth_stencil: self.depth_stencil_state(&desc.depth_stencil),
            stencil_reference: desc.depth_stencil.stencil_reference,
            push_constants: desc.push_constants,
        })
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescription,
        _layouts: &[Arc<ResourceLayout>],
    ) -> Result<native::ComputePipeline, CreationError> {
        if !desc.shader.stage.contains(ShaderStages::COMPUTE) {
            return Err(CreationError::InvalidDescription("compute pipelines need a compute shader"));
        }
        Ok(native::ComputePipeline {
            id: ResourceId::new(),
            kernel: Kernel::Shader,
            threads_per_group: desc.thread_group_size,
            push_constants: desc.push_constants,
        })
    }

    fn create_framebuffer(
        &self,
        colors: &[Attachment<Backend>],
        depth: Option<&Attachment<Backend>>,
    ) -> Result<native::Framebuffer, CreationError> {
        let colors: SmallVec<[ColorAttachment; 8]> = colors
            .iter()
            .map(|attachment| ColorAttachment {
                texture: Arc::clone(&attachment.texture),
                mip_level: attachment.mip_level,
                array_layer: attachment.array_layer,
                load: LoadAction::Load,
                store: StoreAction::Store,
                clear_color: [0.0; 4],
                resolve_texture: None,
            })
            .collect();
        let stencil = depth
            .filter(|attachment| attachment.texture.desc().format.is_stencil())
            .map(|_| StencilAttachment {
                load: LoadAction::Load,
                store: StoreAction::Store,
                clear_stencil: 0,
            });
        let depth = depth.map(|attachment| DepthAttachment {
            texture: Arc::clone(&attachment.texture),
            mip_level: attachment.mip_level,
            array_layer: attachment.array_layer,
            load: LoadAction::Load,
            store: StoreAction::Store,
            clear_depth: 1.0,
        });
        Ok(native::Framebuffer {
            descriptor: RenderPassDescriptor { colors, depth, stencil },
        })
    }

    fn create_command_list(&self) -> CommandList {
        CommandList::new(Arc::clone(&self.staging), Arc::clone(&self.service))
    }

    fn submit(&self, list: &mut CommandList, mut completion: Completion<Backend>) -> Result<(), SubmitError> {
        let (buffer, staging) = list
            .take_finished()
            .ok_or_else(|| SubmitError::Rejected("no finished command buffer".to_owned()))?;
        completion.retain_staging(staging);
        debug!(
            "Committing list {} with {} passes",
            completion.list_id(),
            buffer.passes().len()
        );
        self.queue.execute(move || {
            execute::execute(&buffer);
            completion.complete();
        });
        Ok(())
    }

    fn wait_for_idle(&self) {
        self.queue.wait_idle();
    }

    fn read_buffer(&self, buffer: &Buffer<Backend>, offset: u32, size: u32) -> Vec<u8> {
        let start = offset as usize;
        buffer.raw().memory.read()[start..start + size as usize].to_vec()
    }

    fn write_buffer(&self, buffer: &Buffer<Backend>, offset: u32, data: &[u8]) {
        let start = offset as usize;
        buffer.raw().memory.write()[start..start + data.len()].copy_from_slice(data);
    }

    fn read_texture(&self, texture: &Texture<Backend>, mip_level: u32, array_layer: u32) -> Vec<u8> {
        let layout = texture.desc().subresource_layout(mip_level, array_layer);
        let start = layout.offset as usize;
        texture.raw().memory.read()[start..start + layout.size as usize].to_vec()
    }

    fn write_texture(&self, texture: &Texture<Backend>, mip_level: u32, array_layer: u32, data: &[u8]) {
        let layout = texture.desc().subresource_layout(mip_level, array_layer);
        let start = layout.offset as usize;
        let size = (layout.size as usize).min(data.len());
        texture.raw().memory.write()[start..start + size].copy_from_slice(&data[..size]);
    }

    fn update_buffer(&self, buffer: &Arc<Buffer<Backend>>, offset: u32, data: &[u8]) -> Result<(), CreationError> {
        let destination = Arc::clone(buffer);
        if buffer.raw().storage == StorageMode::Shared {
            let data = data.to_vec();
            self.queue.execute(move || {
                let start = offset as usize;
                destination.raw().memory.write()[start..start + data.len()].copy_from_slice(&data);
            });
            return Ok(());
        }

        // Private memory is only reachable through a blit from a staging buffer.
        let size = data.len() as u32;
        let staging = self.staging.acquire(size, create_native_buffer)?;
        staging.raw().memory.write()[..data.len()].copy_from_slice(data);
        let pool = Arc::clone(&self.staging);
        self.queue.execute(move || {
            execute::copy_bytes(
                &Resource::Buffer(Arc::clone(&staging)),
                0,
                &Resource::Buffer(destination),
                u64::from(offset),
                u64::from(size),
            );
            pool.release(staging);
        });
        Ok(())
    }

    fn update_texture(
        &self,
        texture: &Arc<Texture<Backend>>,
        data: &[u8],
        region: &TextureRegion,
    ) -> Result<(), CreationError> {
        let format = texture.desc().format;
        let size = region.data_size(format) as usize;
        if data.len() < size {
            return Err(CreationError::InvalidDescription("texture data is smaller than the region"));
        }
        let row_pitch = format.row_pitch(region.extent.width);
        let source_layout = SubresourceLayout {
            offset: 0,
            size: size as u64,
            row_pitch,
            depth_pitch: format.depth_pitch(row_pitch, region.extent.height),
        };
        let texture = Arc::clone(texture);
        let region = *region;
        let data = data[..size].to_vec();
        self.queue.execute(move || {
            let desc = texture.desc();
            let layout = desc.subresource_layout(region.mip_level, region.array_layer);
            texels::copy_region(
                desc.format,
                &data,
                &source_layout,
                Offset::ZERO,
                &mut texture.raw().memory.write(),
                &layout,
                region.origin,
                region.extent,
            );
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi_core::pso::{ComparisonFunction, ShaderDescription};
    use rhi_core::{AttachmentDescription, Device as RhiDevice, Extent, FramebufferDescription};

    fn device() -> RhiDevice<Backend> {
        let _ = env_logger::try_init();
        RhiDevice::open(DeviceDescription {
            debug: true,
            ..DeviceDescription::default()
        })
        .unwrap()
    }

    #[test]
    fn test_unknown_adapter() {
        let result = RhiDevice::<Backend>::open(DeviceDescription {
            adapter: Some("Nonexistent".into()),
            ..DeviceDescription::default()
        });
        assert_eq!(
            result.err(),
            Some(DeviceError::AdapterUnavailable("Nonexistent".into()))
        );
    }

    #[test]
    fn test_geometry_shaders_are_unsupported() {
        let device = device();
        let result = device.factory().create_graphic_pipeline(&GraphicPipelineDescription {
            shaders: vec![
                ShaderDescription::new(ShaderStages::VERTEX, b"vs"),
                ShaderDescription::new(ShaderStages::GEOMETRY, b"gs"),
            ],
            ..GraphicPipelineDescription::default()
        });
        assert_eq!(result, Err(CreationError::MissingCapability("geometry_shader")));
    }

    #[test]
    fn test_stencil_reference_shares_depth_stencil_states() {
        let device = device();
        let factory = device.factory();
        let desc = GraphicPipelineDescription {
            shaders: vec![ShaderDescription::new(ShaderStages::VERTEX, b"vs")],
            ..GraphicPipelineDescription::default()
        };
        factory.create_graphic_pipeline(&desc).unwrap();
        let referenced = GraphicPipelineDescription {
            depth_stencil: DepthStencilState {
                stencil_reference: 3,
                ..desc.depth_stencil
            },
            ..desc.clone()
        };
        factory.create_graphic_pipeline(&referenced).unwrap();
        assert_eq!(device.raw().depth_stencil_state_count(), 1);

        let always = GraphicPipelineDescription {
            depth_stencil: DepthStencilState {
                depth_comparison: ComparisonFunction::Always,
                ..desc.depth_stencil
            },
            ..desc
        };
        factory.create_graphic_pipeline(&always).unwrap();
        assert_eq!(device.raw().depth_stencil_state_count(), 2);
    }

    #[test]
    fn test_stencil_formats_get_a_stencil_attachment() {
        let device = device();
        let factory = device.factory();
        let color = factory
            .create_texture(&TextureDescription::new_2d(
                4,
                4,
                1,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::RENDER_TARGET,
            ))
            .unwrap();
        let depth = factory
            .create_texture(&TextureDescription::new_2d(
                4,
                4,
                1,
                PixelFormat::D24UNormS8UInt,
                TextureUsage::DEPTH_STENCIL,
            ))
            .unwrap();
        let framebuffer = factory
            .create_framebuffer(&FramebufferDescription {
                color_targets: vec![AttachmentDescription::new(color)],
                depth_target: Some(AttachmentDescription::new(depth)),
            })
            .unwrap();
        let framebuffer = device.resource_manager().resolve(framebuffer).unwrap();
        let descriptor = &framebuffer.raw().descriptor;
        assert_eq!(descriptor.colors.len(), 1);
        assert_eq!(descriptor.colors[0].load, LoadAction::Load);
        assert!(descriptor.depth.is_some());
        assert!(descriptor.stencil.is_some());
        assert_eq!(framebuffer.output().depth, Some(PixelFormat::D24UNormS8UInt));
    }

    #[test]
    fn test_updates_are_ordered_on_the_queue() {
        let device = device();
        let buffer = device
            .factory()
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();
        device.update_buffer(buffer, 0, &[1; 16]).unwrap();
        device.update_buffer(buffer, 12, &[2; 4]).unwrap();
        device.wait_for_idle();
        let raw = device.resource_manager().resolve(buffer).unwrap();
        assert_eq!(
            device.raw().read_buffer(&raw, 0, 16),
            vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2]
        );
    }

    #[test]
    fn test_private_updates_go_through_staging() {
        let device = device();
        let factory = device.factory();
        let dynamic = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX | BufferUsage::DYNAMIC), None)
            .unwrap();
        let private = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();
        let resolve = |handle| device.resource_manager().resolve(handle).unwrap();
        assert_eq!(resolve(dynamic).raw().storage, StorageMode::Shared);
        assert_eq!(resolve(private).raw().storage, StorageMode::Private);

        device.update_buffer(dynamic, 3, &[7; 5]).unwrap();
        device.wait_for_idle();
        assert_eq!(device.staging_pool().created_count(), 0);

        device.update_buffer(private, 3, &[9; 5]).unwrap();
        device.wait_for_idle();
        assert_eq!(device.staging_pool().created_count(), 1);
        assert_eq!(device.staging_pool().available_count(), 1);

        let expected = [0, 0, 0, 7, 7, 7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(device.raw().read_buffer(&resolve(dynamic), 0, 16), expected.to_vec());
        let expected: Vec<u8> = expected.iter().map(|&b| if b == 7 { 9 } else { 0 }).collect();
        assert_eq!(device.raw().read_buffer(&resolve(private), 0, 16), expected);
    }

    #[test]
    fn test_texture_update_region() {
        let device = device();
        let desc = TextureDescription::new_2d(4, 4, 1, PixelFormat::R8UNorm, TextureUsage::SAMPLED);
        let texture = device.factory().create_texture(&desc).unwrap();
        let region = TextureRegion {
            origin: Offset { x: 2, y: 1, z: 0 },
            extent: Extent {
                width: 2,
                height: 2,
                depth: 1,
            },
            mip_level: 0,
            array_layer: 0,
        };
        device.update_texture(texture, &[9, 8, 7, 6], &region).unwrap();
        device.wait_for_idle();
        let raw = device.resource_manager().resolve(texture).unwrap();
        let texels = device.raw().read_texture(&raw, 0, 0);
        assert_eq!(&texels[4..8], &[0, 0, 9, 8]);
        assert_eq!(&texels[8..12], &[0, 0, 7, 6]);
        assert_eq!(&texels[12..16], &[0, 0, 0, 0]);
    }
}
