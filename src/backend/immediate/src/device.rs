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

use parking_lot::{Mutex, RwLock};
use rhi_core::{
    Api, ApiVersion, Attachment, Buffer, BufferDescription, BufferUsage, Capabilities, Completion,
    ComputePipelineDescription, CreationError, DeviceDescription, DeviceError, GraphicPipelineDescription,
    HardwareInfo, Limits, PixelFormat, RawDevice, ResourceLayout, SampleCount, SamplerDescription,
    ShaderStages, StagingBufferPool, SubmitError, Texture, TextureDescription, TextureRegion, TextureUsage,
    TextureViewDescription,
};
use std::sync::Arc;

use crate::command::{Command, CopyBox, Resource};
use crate::list::{self, CommandList};
use crate::native::{self, BindFlags, CpuAccess, ResourceId, Stage, TargetView, View};
use crate::queue::Queue;
use crate::state::StateObjects;
use crate::{execute, Backend};

/// Create the native side of a buffer.
pub(crate) fn create_native_buffer(desc: &BufferDescription) -> Result<native::Buffer, CreationError> {
    let access = if desc.usage.contains(BufferUsage::STAGING) {
        CpuAccess::Staging
    } else if desc.usage.contains(BufferUsage::DYNAMIC) {
        CpuAccess::WriteDiscard
    } else {
        CpuAccess::None
    };
    Ok(native::Buffer {
        id: ResourceId::new(),
        bind: BindFlags::from_buffer_usage(desc.usage),
        access,
        memory: RwLock::new(vec![0; desc.size as usize]),
    })
}

/// The emulated device and its immediate context.
#[derive(Debug)]
pub struct Device {
    queue: Queue,
    states: Mutex<StateObjects>,
    staging: Arc<StagingBufferPool<Backend>>,
}

impl Device {
    pub const ADAPTER: &'static str = "Immediate Context Emulator";

    /// Number of distinct fixed-function state objects created so far.
    pub fn state_object_count(&self) -> usize {
        self.states.lock().len()
    }

    fn target_view(attachment: &Attachment<Backend>) -> TargetView {
        TargetView {
            resource: attachment.texture.raw().id,
            mip_level: attachment.mip_level,
            array_layer: attachment.array_layer,
        }
    }
}

impl RawDevice<Backend> for Device {
    fn open(desc: &DeviceDescription, staging: Arc<StagingBufferPool<Backend>>) -> Result<Self, DeviceError> {
        if let Some(ref name) = desc.adapter {
            if name != Self::ADAPTER {
                return Err(DeviceError::AdapterUnavailable(name.clone()));
            }
        }
        let queue = Queue::new("rhi-immediate-context").map_err(|e| {
            error!("Failed to start the immediate context: {}", e);
            DeviceError::AdapterUnavailable(Self::ADAPTER.to_owned())
        })?;
        Ok(Device {
            queue,
            states: Mutex::new(StateObjects::new()),
            staging,
        })
    }

    fn api(&self) -> Api {
        Api::Immediate
    }

    fn api_version(&self) -> ApiVersion {
        ApiVersion {
            major: 11,
            minor: 1,
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
            geometry_shader: true,
            tessellation_shaders: true,
            multiple_viewports: true,
            sampler_lod_bias: true,
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
            shader_float16: false,
            conservative_rasterization: false,
            command_lists: true,
            concurrent_resources: true,
        }
    }

    fn limits(&self) -> Limits {
        Limits::default()
    }

    fn texture_sample_count_limit(&self, format: PixelFormat, _is_depth: bool) -> SampleCount {
        if format.is_compressed() {
            SampleCount::X1
        } else {
            SampleCount::X8
        }
    }

    fn create_buffer(&self, desc: &BufferDescription) -> Result<native::Buffer, CreationError> {
        create_native_buffer(desc)
    }

    fn create_texture(&self, desc: &TextureDescription) -> Result<native::Texture, CreationError> {
        let access = if desc.usage.contains(TextureUsage::STAGING) {
            CpuAccess::Staging
        } else {
            CpuAccess::None
        };
        // Samples are not stored separately; multisampled textures hold one value per texel.
        Ok(native::Texture {
            id: ResourceId::new(),
            bind: BindFlags::from_texture_usage(desc.usage),
            access,
            memory: RwLock::new(vec![0; desc.total_size() as usize]),
        })
    }

    fn create_texture_view(
        &self,
        texture: &Arc<Texture<Backend>>,
        _desc: &TextureViewDescription,
    ) -> Result<native::TextureView, CreationError> {
        let raw = texture.raw();
        let view = |flag: BindFlags| {
            if raw.bind.contains(flag) {
                Some(View::Texture {
                    view: ResourceId::new(),
                    resource: raw.id,
                })
            } else {
                None
            }
        };
        Ok(native::TextureView {
            srv: view(BindFlags::SHADER_RESOURCE),
            uav: view(BindFlags::UNORDERED_ACCESS),
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
        if desc.push_constants {
            return Err(CreationError::MissingCapability("push constants"));
        }
        let mut states = self.states.lock();
        let mut shaders = [None; 5];
        for shader in &desc.shaders {
            for stage in Stage::iter(shader.stage) {
                if let Some(index) = Stage::GRAPHICS.iter().position(|&s| s == stage) {
                    shaders[index] = Some(states.shader(shader));
                }
            }
        }
        Ok(native::GraphicPipeline {
            blend: states.blend(&desc.blend),
            blend_factor: desc.blend.blend_factor,
            depth_stencil: states.depth_stencil(&desc.depth_stencil),
            stencil_reference: desc.depth_stencil.stencil_reference,
            rasterizer: states.rasterizer(&desc.rasterizer),
            topology: desc.topology,
            input_layout: states.input_layout(&desc.vertex_layouts),
            shaders,
        })
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescription,
        _layouts: &[Arc<ResourceLayout>],
    ) -> Result<native::ComputePipeline, CreationError> {
        if desc.push_constants {
            return Err(CreationError::MissingCapability("push constants"));
        }
        if !desc.shader.stage.contains(ShaderStages::COMPUTE) {
            return Err(CreationError::InvalidDescription("compute pipelines need a compute shader"));
        }
        Ok(native::ComputePipeline {
            shader: self.states.lock().shader(&desc.shader),
        })
    }

    fn create_framebuffer(
        &self,
        colors: &[Attachment<Backend>],
        depth: Option<&Attachment<Backend>>,
    ) -> Result<native::Framebuffer, CreationError> {
        Ok(native::Framebuffer {
            rtvs: colors.iter().map(Self::target_view).collect(),
            dsv: depth.map(Self::target_view),
        })
    }

    fn create_command_list(&self) -> CommandList {
        CommandList::new(Arc::clone(&self.staging))
    }

    fn submit(&self, list: &mut CommandList, mut completion: Completion<Backend>) -> Result<(), SubmitError> {
        let (native, staging) = list
            .take_finished()
            .ok_or_else(|| SubmitError::Rejected("no finished native command list".to_owned()))?;
        completion.retain_staging(staging);
        debug!(
            "Queueing list {} with {} native commands",
            completion.list_id(),
            native.commands().len()
        );
        self.queue.execute(move || {
            execute::execute(&native);
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
        let (command, staging) = list::buffer_update(&self.staging, buffer, offset, data)?;
        let pool = Arc::clone(&self.staging);
        self.queue.execute(move || {
            execute::process(&command);
            if let Some(buffer) = staging {
                pool.release(buffer);
            }
        });
        Ok(())
    }

    fn update_texture(
        &self,
        texture: &Arc<Texture<Backend>>,
        data: &[u8],
        region: &TextureRegion,
    ) -> Result<(), CreationError> {
        let desc = texture.desc();
        let size = region.data_size(desc.format) as usize;
        let command = Command::UpdateSubresource {
            resource: Resource::Texture(Arc::clone(texture)),
            subresource: desc.subresource(region.mip_level, region.array_layer),
            region: Some(CopyBox {
                left: region.origin.x,
                top: region.origin.y,
                front: region.origin.z,
                right: region.origin.x + region.extent.width,
                bottom: region.origin.y + region.extent.height,
                back: region.origin.z + region.extent.depth,
            }),
            data: data[..size].to_vec(),
        };
        self.queue.execute(move || execute::process(&command));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi_core::pso::{BlendState, ShaderDescription};
    use rhi_core::{Device as RhiDevice, Extent, Offset};

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
    fn test_push_constants_are_unsupported() {
        let device = device();
        let result = device.factory().create_graphic_pipeline(&GraphicPipelineDescription {
            shaders: vec![ShaderDescription::new(ShaderStages::VERTEX, b"vs")],
            push_constants: true,
            ..GraphicPipelineDescription::default()
        });
        assert_eq!(result, Err(CreationError::MissingCapability("push constants")));
    }

    #[test]
    fn test_pipelines_share_state_objects() {
        let device = device();
        let factory = device.factory();
        let desc = GraphicPipelineDescription {
            shaders: vec![ShaderDescription::new(ShaderStages::VERTEX, b"vs")],
            ..GraphicPipelineDescription::default()
        };
        factory.create_graphic_pipeline(&desc).unwrap();
        let count = device.raw().state_object_count();
        let tinted = GraphicPipelineDescription {
            blend: BlendState {
                blend_factor: [1.0; 4],
                ..BlendState::default()
            },
            ..desc
        };
        factory.create_graphic_pipeline(&tinted).unwrap();
        assert_eq!(device.raw().state_object_count(), count);
    }

    #[test]
    fn test_updates_are_ordered_on_the_queue() {
        let device = device();
        let factory = device.factory();
        let buffer = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();
        device.update_buffer(buffer, 0, &[1; 16]).unwrap();
        device.update_buffer(buffer, 4, &[2; 8]).unwrap();
        device.wait_for_idle();
        let raw = device.resource_manager().resolve(buffer).unwrap();
        assert_eq!(
            device.raw().read_buffer(&raw, 0, 16),
            vec![1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1]
        );
    }

    #[test]
    fn test_buffer_update_paths() {
        let device = device();
        let factory = device.factory();
        let vertex = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();
        let constant = factory
            .create_buffer(&BufferDescription::new(32, BufferUsage::CONSTANT), None)
            .unwrap();
        let dynamic = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX | BufferUsage::DYNAMIC), None)
            .unwrap();
        let resolve = |handle| device.resource_manager().resolve(handle).unwrap();
        let pool = StagingBufferPool::<Backend>::new();
        let path = |handle, offset, data: &[u8]| match list::buffer_update(&pool, &resolve(handle), offset, data) {
            Ok((Command::UpdateSubresource { region, .. }, None)) => ("update", region.is_some()),
            Ok((Command::MapDiscard { .. }, None)) => ("discard", false),
            Ok((Command::CopySubresourceRegion { .. }, Some(staging))) => {
                pool.release(staging);
                ("staging", true)
            }
            _ => ("unexpected", false),
        };
        assert_eq!(path(vertex, 4, &[1; 4]), ("update", true));
        assert_eq!(path(constant, 0, &[1; 32]), ("update", false));
        assert_eq!(path(constant, 16, &[1; 16]), ("staging", true));
        assert_eq!(path(dynamic, 0, &[1; 16]), ("discard", false));
        assert_eq!(path(dynamic, 8, &[1; 8]), ("staging", true));
        assert_eq!(pool.created_count(), 1);

        device.update_buffer(constant, 0, &[3; 32]).unwrap();
        device.update_buffer(constant, 16, &[4; 16]).unwrap();
        device.update_buffer(dynamic, 0, &[5; 16]).unwrap();
        device.update_buffer(dynamic, 8, &[6; 8]).unwrap();
        device.wait_for_idle();
        let constants = device.raw().read_buffer(&resolve(constant), 0, 32);
        assert_eq!(&constants[..16], &[3; 16]);
        assert_eq!(&constants[16..], &[4; 16]);
        let dynamics = device.raw().read_buffer(&resolve(dynamic), 0, 16);
        assert_eq!(&dynamics[..8], &[5; 8]);
        assert_eq!(&dynamics[8..], &[6; 8]);
        let staging = device.staging_pool();
        assert!(staging.created_count() >= 1);
        assert_eq!(staging.available_count(), staging.created_count());
    }

    #[test]
    fn test_texture_update_region() {
        let device = device();
        let desc = TextureDescription::new_2d(4, 4, 1, PixelFormat::R8UNorm, TextureUsage::SAMPLED);
        let texture = device.factory().create_texture(&desc).unwrap();
        let region = TextureRegion {
            origin: Offset { x: 1, y: 2, z: 0 },
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
        assert_eq!(&texels[8..12], &[0, 9, 8, 0]);
        assert_eq!(&texels[12..16], &[0, 7, 6, 0]);
    }
}
