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

//! Translation of validated command list calls into deferred context commands.
//!
//! The list mirrors the state bound on its deferred context. Pipeline states are issued only
//! when they change, constant buffers, shader resources and samplers of the vertex and pixel
//! stages are cached per slot, and resources are unbound from conflicting slots before use.

use arrayvec::{Array, ArrayVec};
use rhi_core::pso::{PrimitiveTopology, MAX_COLOR_TARGETS};
use rhi_core::{
    Buffer, BufferRange, BufferUsage, BoundResource, ComputePipeline, CreationError, Extent, Framebuffer,
    GraphicPipeline, IndexFormat, Offset, RawCommandList, Rect, ResourceKind, ResourceLayout, ResourceSet,
    ShaderStages, StagingBufferPool, Texture, TextureCopy, Viewport, MAX_VERTEX_BUFFERS,
};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

use crate::command::{Command, CopyBox, DeferredContext, NativeCommandList, Resource, VertexBinding};
use crate::device::create_native_buffer;
use crate::native::{ResourceId, Stage, View};
use crate::state::StateId;
use crate::Backend;

/// Slots of the vertex and pixel stages whose bindings are cached.
const CACHED_CONSTANT_BUFFERS: usize = 16;
const CACHED_TEXTURE_VIEWS: usize = 16;
const CACHED_SAMPLERS: usize = 4;

/// Pick the native path of a buffer update.
///
/// Non-dynamic buffers are updated in place, except for partial updates of constant buffers.
/// Whole updates of dynamic buffers map with discard. Everything else goes through a staging
/// buffer from `pool`, returned alongside the command and held until the copy has executed.
pub(crate) fn buffer_update(
    pool: &StagingBufferPool<Backend>,
    buffer: &Arc<Buffer<Backend>>,
    offset: u32,
    data: &[u8],
) -> Result<(Command, Option<Arc<Buffer<Backend>>>), CreationError> {
    let usage = buffer.usage();
    let size = data.len() as u32;
    let dynamic = usage.contains(BufferUsage::DYNAMIC);
    let staging = usage.contains(BufferUsage::STAGING);
    let constant = usage.contains(BufferUsage::CONSTANT);
    let whole = offset == 0 && size == buffer.size();

    if !dynamic && !staging && (!constant || whole) {
        // Constant buffers can only be updated whole and take no region.
        let region = if constant {
            None
        } else {
            Some(CopyBox::bytes(offset, size))
        };
        let command = Command::UpdateSubresource {
            resource: Resource::Buffer(Arc::clone(buffer)),
            subresource: 0,
            region,
            data: data.to_vec(),
        };
        Ok((command, None))
    } else if dynamic && whole {
        let command = Command::MapDiscard {
            buffer: Arc::clone(buffer),
            data: data.to_vec(),
        };
        Ok((command, None))
    } else {
        let staging = pool.acquire(size, create_native_buffer)?;
        staging.raw().memory.write()[..data.len()].copy_from_slice(data);
        let command = Command::CopySubresourceRegion {
            destination: Resource::Buffer(Arc::clone(buffer)),
            destination_subresource: 0,
            destination_origin: Offset { x: offset, y: 0, z: 0 },
            source: Resource::Buffer(Arc::clone(&staging)),
            source_subresource: 0,
            region: Some(CopyBox::bytes(0, size)),
        };
        Ok((command, Some(staging)))
    }
}

/// Constant buffer binding: buffer, byte offset and byte size.
type ConstantBinding = (ResourceId, u32, u32);

#[derive(Debug, Default)]
struct StageCache {
    constant_buffers: ArrayVec<[Option<ConstantBinding>; CACHED_CONSTANT_BUFFERS]>,
    shader_resources: ArrayVec<[Option<View>; CACHED_TEXTURE_VIEWS]>,
    samplers: ArrayVec<[Option<ResourceId>; CACHED_SAMPLERS]>,
}

/// Record `value` at `slot`. Returns whether the native binding has to be issued.
fn cache_binding<A>(cache: &mut ArrayVec<A>, slot: u32, value: A::Item) -> bool
where
    A: Array,
    A::Item: Copy + Default + PartialEq,
{
    let slot = slot as usize;
    if slot >= cache.capacity() {
        return true;
    }
    while cache.len() <= slot {
        cache.push(Default::default());
    }
    if cache[slot] == value {
        return false;
    }
    cache[slot] = value;
    true
}

/// Register classes resource kinds are bound to, with separate slot ranges each.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BindClass {
    ConstantBuffer = 0,
    ShaderResource = 1,
    UnorderedAccess = 2,
    Sampler = 3,
}

impl BindClass {
    fn of(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::ConstantBuffer => BindClass::ConstantBuffer,
            ResourceKind::StructuredBufferReadOnly | ResourceKind::TextureReadOnly => BindClass::ShaderResource,
            ResourceKind::StructuredBufferReadWrite | ResourceKind::TextureReadWrite => BindClass::UnorderedAccess,
            ResourceKind::Sampler => BindClass::Sampler,
        }
    }
}

/// First slot of every bind class for the set at `slot`.
fn class_bases(layouts: &[Arc<ResourceLayout>], slot: usize) -> [u32; 4] {
    let mut bases = [0; 4];
    for layout in &layouts[..slot] {
        for &kind in ResourceKind::ALL.iter() {
            bases[BindClass::of(kind) as usize] += layout.count(kind);
        }
    }
    bases
}

#[derive(Debug)]
struct BoundSet {
    set: Arc<ResourceSet<Backend>>,
    offsets: SmallVec<[u32; 4]>,
}

#[derive(Debug, Default)]
struct SetSlots {
    sets: Vec<Option<BoundSet>>,
    invalidated: Vec<bool>,
}

impl SetSlots {
    fn reset(&mut self, count: usize) {
        self.sets.clear();
        self.sets.resize_with(count, || None);
        self.invalidated.clear();
        self.invalidated.resize(count, false);
    }

    fn invalidate(&mut self, slot: u32) {
        if let Some(flag) = self.invalidated.get_mut(slot as usize) {
            *flag = true;
        }
    }
}

/// A texture bound as a shader resource or unordered access view by a resource set.
#[derive(Clone, Copy, Debug)]
struct BoundTexture {
    texture: ResourceId,
    slot: u32,
    stages: ShaderStages,
    compute: bool,
    set: u32,
}

/// A buffer bound as an unordered access view, at its final slot.
#[derive(Clone, Copy, Debug)]
struct BoundUavBuffer {
    buffer: ResourceId,
    slot: u32,
    compute: bool,
}

/// State mirrored from the deferred context.
#[derive(Debug, Default)]
struct State {
    framebuffer: Option<Arc<Framebuffer<Backend>>>,
    graphic_pipeline: Option<Arc<GraphicPipeline<Backend>>>,
    compute_pipeline: Option<Arc<ComputePipeline<Backend>>>,
    graphic_sets: SetSlots,
    compute_sets: SetSlots,

    blend: Option<(StateId, [f32; 4])>,
    depth_stencil: Option<(StateId, u32)>,
    rasterizer: Option<StateId>,
    topology: Option<PrimitiveTopology>,
    input_layout: Option<StateId>,
    shaders: [Option<StateId>; 5],
    compute_shader: Option<StateId>,

    viewports: ArrayVec<[Viewport; MAX_COLOR_TARGETS]>,
    viewports_changed: bool,
    scissor_rects: ArrayVec<[Rect; MAX_COLOR_TARGETS]>,
    scissor_rects_changed: bool,

    vertex_buffers: [Option<(ResourceId, u32)>; MAX_VERTEX_BUFFERS],
    vertex_strides: SmallVec<[u32; MAX_VERTEX_BUFFERS]>,
    vertex_buffer_count: u32,
    vertex_bindings_dirty: bool,
    index_buffer: Option<(ResourceId, IndexFormat, u32)>,

    vertex_cache: StageCache,
    pixel_cache: StageCache,
    uav_buffers: Vec<BoundUavBuffer>,
    bound_srvs: Vec<BoundTexture>,
    bound_uavs: Vec<BoundTexture>,
}

impl State {
    fn cache_mut(&mut self, stage: Stage) -> Option<&mut StageCache> {
        match stage {
            Stage::Vertex => Some(&mut self.vertex_cache),
            Stage::Pixel => Some(&mut self.pixel_cache),
            _ => None,
        }
    }

    fn sets_mut(&mut self, compute: bool) -> &mut SetSlots {
        if compute {
            &mut self.compute_sets
        } else {
            &mut self.graphic_sets
        }
    }

    fn color_target_count(&self) -> u32 {
        self.framebuffer
            .as_ref()
            .map_or(0, |framebuffer| framebuffer.color_targets().len() as u32)
    }
}

/// A command list recording into its own deferred context.
#[derive(Debug)]
pub struct CommandList {
    context: DeferredContext,
    finished: Option<NativeCommandList>,
    started: bool,
    state: State,
    staging: Vec<Arc<Buffer<Backend>>>,
    pool: Arc<StagingBufferPool<Backend>>,
}

impl CommandList {
    pub(crate) fn new(pool: Arc<StagingBufferPool<Backend>>) -> Self {
        CommandList {
            context: DeferredContext::new(),
            finished: None,
            started: false,
            state: State::default(),
            staging: Vec::new(),
            pool,
        }
    }

    /// Commands of the finished list, or those recorded so far.
    pub fn commands(&self) -> &[Command] {
        match self.finished {
            Some(ref list) => list.commands(),
            None => self.context.commands(),
        }
    }

    /// Number of staging buffers held until the next submission completes.
    pub fn staging_count(&self) -> usize {
        self.staging.len()
    }

    pub(crate) fn take_finished(&mut self) -> Option<(NativeCommandList, Vec<Arc<Buffer<Backend>>>)> {
        let list = self.finished.take()?;
        Some((list, self.staging.drain(..).collect()))
    }

    fn release_staging(&mut self) {
        if !self.staging.is_empty() {
            self.pool.release_all(self.staging.drain(..));
        }
    }

    fn push(&mut self, command: Command) {
        self.context.push(command);
    }

    fn pre_draw(&mut self) {
        self.flush_viewports();
        self.flush_scissor_rects();
        self.flush_vertex_bindings();
        self.activate_invalidated_sets(false);
    }

    fn pre_dispatch(&mut self) {
        self.activate_invalidated_sets(true);
    }

    fn flush_viewports(&mut self) {
        if !self.state.viewports_changed {
            return;
        }
        self.state.viewports_changed = false;
        if !self.state.viewports.is_empty() {
            let viewports = self.state.viewports.iter().cloned().collect();
            self.push(Command::SetViewports(viewports));
        }
    }

    fn flush_scissor_rects(&mut self) {
        if !self.state.scissor_rects_changed {
            return;
        }
        self.state.scissor_rects_changed = false;
        if !self.state.scissor_rects.is_empty() {
            let rects = self.state.scissor_rects.iter().cloned().collect();
            self.push(Command::SetScissorRects(rects));
        }
    }

    fn flush_vertex_bindings(&mut self) {
        if !self.state.vertex_bindings_dirty {
            return;
        }
        self.state.vertex_bindings_dirty = false;
        if self.state.vertex_buffer_count == 0 {
            return;
        }
        let state = &self.state;
        let buffers: SmallVec<[VertexBinding; 16]> = (0..state.vertex_buffer_count as usize)
            .map(|index| {
                state.vertex_buffers[index].map(|(buffer, offset)| {
                    let stride = state.vertex_strides.get(index).cloned().unwrap_or(0);
                    (buffer, stride, offset)
                })
            })
            .collect();
        self.push(Command::SetVertexBuffers { start: 0, buffers });
    }

    fn activate_invalidated_sets(&mut self, compute: bool) {
        let slots: SmallVec<[u32; 8]> = {
            let sets = self.state.sets_mut(compute);
            let slots = sets
                .invalidated
                .iter()
                .enumerate()
                .filter(|&(_, &invalidated)| invalidated)
                .map(|(slot, _)| slot as u32)
                .collect();
            for flag in sets.invalidated.iter_mut() {
                *flag = false;
            }
            slots
        };
        for slot in slots {
            self.activate_set(slot, compute);
        }
    }

    /// Bind every resource of the set at `slot` to its native slots.
    fn activate_set(&mut self, slot: u32, compute: bool) {
        let (set, offsets) = match self.state.sets_mut(compute).sets.get(slot as usize) {
            Some(&Some(ref bound)) => (Arc::clone(&bound.set), bound.offsets.clone()),
            _ => return,
        };
        let layouts: SmallVec<[Arc<ResourceLayout>; 4]> = if compute {
            match self.state.compute_pipeline {
                Some(ref pipeline) => pipeline.layouts().iter().cloned().collect(),
                None => return,
            }
        } else {
            match self.state.graphic_pipeline {
                Some(ref pipeline) => pipeline.layouts().iter().cloned().collect(),
                None => return,
            }
        };
        let bases = class_bases(&layouts, slot as usize);
        let stage_mask = if compute {
            ShaderStages::COMPUTE
        } else {
            ShaderStages::GRAPHICS
        };

        let mut indices = [0u32; 4];
        let mut dynamic_offsets = offsets.iter();
        for (index, (element, resource)) in set.layout().elements().iter().zip(set.resources()).enumerate() {
            let dynamic_offset = if element.dynamic {
                dynamic_offsets.next().cloned().unwrap_or(0)
            } else {
                0
            };
            let class = BindClass::of(element.kind) as usize;
            let native_slot = bases[class] + indices[class];
            indices[class] += 1;
            let stages = element.stages & stage_mask;

            match (element.kind, resource) {
                (ResourceKind::ConstantBuffer, &BoundResource::Buffer(ref range)) => {
                    self.bind_constant_buffer(range, dynamic_offset, native_slot, stages)
                }
                (ResourceKind::StructuredBufferReadOnly, &BoundResource::Buffer(ref range)) => {
                    self.bind_structured_buffer(range, dynamic_offset, native_slot, stages)
                }
                (ResourceKind::StructuredBufferReadWrite, &BoundResource::Buffer(ref range)) => {
                    let view = View::Buffer {
                        resource: range.buffer.raw().id,
                        offset: range.offset + dynamic_offset,
                        size: range.size,
                    };
                    self.bind_unordered_access_view(
                        None,
                        Some(range.buffer.raw().id),
                        Some(view),
                        native_slot,
                        stages,
                        compute,
                        slot,
                    );
                }
                (ResourceKind::TextureReadOnly, &BoundResource::TextureView(ref view)) => {
                    let texture = view.texture().raw().id;
                    self.unbind_uav_texture(texture);
                    self.bind_texture_view(view.raw().srv, Some(texture), native_slot, stages, compute, slot);
                }
                (ResourceKind::TextureReadWrite, &BoundResource::TextureView(ref view)) => {
                    let texture = view.texture().raw().id;
                    self.unbind_srv_texture(texture);
                    self.bind_unordered_access_view(
                        Some(texture),
                        None,
                        view.raw().uav,
                        native_slot,
                        stages,
                        compute,
                        slot,
                    );
                }
                (ResourceKind::Sampler, &BoundResource::Sampler(ref sampler)) => {
                    self.bind_sampler(Some(sampler.raw().id), native_slot, stages)
                }
                (kind, _) => error!("Resource {} of {:?} does not back a {:?} element", index, set, kind),
            }
        }
    }

    fn bind_constant_buffer(&mut self, range: &BufferRange<Backend>, dynamic_offset: u32, slot: u32, stages: ShaderStages) {
        let buffer = range.buffer.raw().id;
        let offset = range.offset + dynamic_offset;
        let full = offset == 0 && range.size == range.buffer.size();
        let key = Some((buffer, offset, range.size));
        for stage in Stage::iter(stages) {
            if let Some(cache) = self.state.cache_mut(stage) {
                if !cache_binding(&mut cache.constant_buffers, slot, key) {
                    continue;
                }
            }
            if full {
                self.push(Command::SetConstantBuffers {
                    stage,
                    start: slot,
                    buffers: smallvec![Some(buffer)],
                });
            } else {
                // Counts are in 16 byte constants and must be multiples of 16.
                let constant_count = (range.size.max(256) + 255) / 256 * 16;
                self.push(Command::SetConstantBuffers1 {
                    stage,
                    start: slot,
                    buffers: smallvec![Some(buffer)],
                    first_constant: smallvec![offset / 16],
                    constant_count: smallvec![constant_count],
                });
            }
        }
    }

    fn bind_shader_resource(&mut self, view: Option<View>, slot: u32, stages: ShaderStages) {
        for stage in Stage::iter(stages) {
            if let Some(cache) = self.state.cache_mut(stage) {
                if !cache_binding(&mut cache.shader_resources, slot, view) {
                    continue;
                }
            }
            self.push(Command::SetShaderResources {
                stage,
                start: slot,
                views: smallvec![view],
            });
        }
    }

    fn bind_structured_buffer(&mut self, range: &BufferRange<Backend>, dynamic_offset: u32, slot: u32, stages: ShaderStages) {
        let buffer = range.buffer.raw().id;
        self.unbind_uav_buffer(buffer);
        let view = View::Buffer {
            resource: buffer,
            offset: range.offset + dynamic_offset,
            size: range.size,
        };
        self.bind_shader_resource(Some(view), slot, stages);
    }

    fn bind_texture_view(
        &mut self,
        view: Option<View>,
        texture: Option<ResourceId>,
        slot: u32,
        stages: ShaderStages,
        compute: bool,
        set: u32,
    ) {
        if let (Some(_), Some(texture)) = (view, texture) {
            self.state.bound_srvs.push(BoundTexture {
                texture,
                slot,
                stages,
                compute,
                set,
            });
        }
        self.bind_shader_resource(view, slot, stages);
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_unordered_access_view(
        &mut self,
        texture: Option<ResourceId>,
        buffer: Option<ResourceId>,
        view: Option<View>,
        slot: u32,
        stages: ShaderStages,
        compute: bool,
        set: u32,
    ) {
        if let (Some(texture), Some(_)) = (texture, view) {
            self.state.bound_uavs.push(BoundTexture {
                texture,
                slot,
                stages,
                compute,
                set,
            });
        }
        // Graphic unordered access views share the output merger slots after the render targets.
        let base = if compute { 0 } else { self.state.color_target_count() };
        let slot = base + slot;
        if let Some(buffer) = buffer {
            self.state.uav_buffers.push(BoundUavBuffer { buffer, slot, compute });
        }
        let views = smallvec![view];
        self.push(if compute {
            Command::SetComputeUnorderedAccessViews { start: slot, views }
        } else {
            Command::SetGraphicUnorderedAccessViews { start: slot, views }
        });
    }

    fn bind_sampler(&mut self, sampler: Option<ResourceId>, slot: u32, stages: ShaderStages) {
        for stage in Stage::iter(stages) {
            if let Some(cache) = self.state.cache_mut(stage) {
                if !cache_binding(&mut cache.samplers, slot, sampler) {
                    continue;
                }
            }
            self.push(Command::SetSamplers {
                stage,
                start: slot,
                samplers: smallvec![sampler],
            });
        }
    }

    fn unbind_srv_texture(&mut self, texture: ResourceId) {
        let (unbound, kept): (Vec<BoundTexture>, Vec<BoundTexture>) = self
            .state
            .bound_srvs
            .drain(..)
            .partition(|bound| bound.texture == texture);
        self.state.bound_srvs = kept;
        for bound in unbound {
            self.bind_shader_resource(None, bound.slot, bound.stages);
            self.state.sets_mut(bound.compute).invalidate(bound.set);
        }
    }

    fn unbind_uav_texture(&mut self, texture: ResourceId) {
        let (unbound, kept): (Vec<BoundTexture>, Vec<BoundTexture>) = self
            .state
            .bound_uavs
            .drain(..)
            .partition(|bound| bound.texture == texture);
        self.state.bound_uavs = kept;
        for bound in unbound {
            self.bind_unordered_access_view(None, None, None, bound.slot, bound.stages, bound.compute, bound.set);
            self.state.sets_mut(bound.compute).invalidate(bound.set);
        }
    }

    fn unbind_uav_buffer(&mut self, buffer: ResourceId) {
        let (unbound, kept): (Vec<BoundUavBuffer>, Vec<BoundUavBuffer>) = self
            .state
            .uav_buffers
            .drain(..)
            .partition(|bound| bound.buffer == buffer);
        self.state.uav_buffers = kept;
        for bound in unbound {
            let views = smallvec![None];
            self.push(if bound.compute {
                Command::SetComputeUnorderedAccessViews { start: bound.slot, views }
            } else {
                Command::SetGraphicUnorderedAccessViews { start: bound.slot, views }
            });
        }
    }

    fn clear_state(&mut self) {
        self.context.clear_state();
        self.state = State::default();
    }
}

impl RawCommandList<Backend> for CommandList {
    fn begin(&mut self) {
        self.finished = None;
        self.release_staging();
        self.clear_state();
        self.started = true;
    }

    fn end(&mut self) {
        self.finished = Some(self.context.finish_command_list());
        self.state = State::default();
        self.started = false;
    }

    fn reset(&mut self) {
        if self.started {
            self.context.clear_state();
            self.context.finish_command_list();
        }
        self.finished = None;
        self.release_staging();
        self.state = State::default();
        self.started = false;
    }

    fn clear_cached_state(&mut self) {
        self.clear_state();
    }

    fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer<Backend>>) {
        for target in framebuffer.color_targets() {
            self.unbind_srv_texture(target.texture.raw().id);
        }
        self.push(Command::SetRenderTargets {
            rtvs: framebuffer.raw().rtvs.clone(),
            dsv: framebuffer.raw().dsv,
        });
        self.state.framebuffer = Some(Arc::clone(framebuffer));
    }

    fn set_viewport(&mut self, index: u32, viewport: &Viewport) {
        let viewports = &mut self.state.viewports;
        while viewports.len() <= index as usize {
            viewports.push(Viewport::full(0, 0));
        }
        viewports[index as usize] = *viewport;
        self.state.viewports_changed = true;
    }

    fn set_scissor_rect(&mut self, index: u32, rect: &Rect) {
        let rects = &mut self.state.scissor_rects;
        while rects.len() <= index as usize {
            rects.push(Rect::default());
        }
        rects[index as usize] = *rect;
        self.state.scissor_rects_changed = true;
    }

    fn set_graphic_pipeline(&mut self, pipeline: &Arc<GraphicPipeline<Backend>>) {
        let native = pipeline.raw();
        self.state.graphic_sets.reset(pipeline.layouts().len());

        let blend = Some((native.blend, native.blend_factor));
        if self.state.blend != blend {
            self.state.blend = blend;
            self.push(Command::SetBlendState(native.blend, native.blend_factor));
        }
        let depth_stencil = Some((native.depth_stencil, native.stencil_reference));
        if self.state.depth_stencil != depth_stencil {
            self.state.depth_stencil = depth_stencil;
            self.push(Command::SetDepthStencilState(native.depth_stencil, native.stencil_reference));
        }
        if self.state.rasterizer != Some(native.rasterizer) {
            self.state.rasterizer = Some(native.rasterizer);
            self.push(Command::SetRasterizerState(native.rasterizer));
        }
        if self.state.topology != Some(native.topology) {
            self.state.topology = Some(native.topology);
            self.push(Command::SetPrimitiveTopology(native.topology));
        }
        if self.state.input_layout != Some(native.input_layout) {
            self.state.input_layout = Some(native.input_layout);
            self.push(Command::SetInputLayout(native.input_layout));
        }
        for (index, &stage) in Stage::GRAPHICS.iter().enumerate() {
            if self.state.shaders[index] != native.shaders[index] {
                self.state.shaders[index] = native.shaders[index];
                self.push(Command::SetShader(stage, native.shaders[index]));
            }
        }

        self.state.vertex_strides = SmallVec::from_slice(pipeline.vertex_strides());
        self.state.vertex_bindings_dirty = true;
        self.state.graphic_pipeline = Some(Arc::clone(pipeline));
    }

    fn set_compute_pipeline(&mut self, pipeline: &Arc<ComputePipeline<Backend>>) {
        self.state.compute_sets.reset(pipeline.layouts().len());
        let shader = pipeline.raw().shader;
        if self.state.compute_shader != Some(shader) {
            self.state.compute_shader = Some(shader);
            self.push(Command::SetShader(Stage::Compute, Some(shader)));
        }
        self.state.compute_pipeline = Some(Arc::clone(pipeline));
    }

    fn set_vertex_buffer(&mut self, index: u32, buffer: &Arc<Buffer<Backend>>, offset: u32) {
        let binding = Some((buffer.raw().id, offset));
        if self.state.vertex_buffers[index as usize] == binding {
            return;
        }
        self.unbind_uav_buffer(buffer.raw().id);
        self.state.vertex_buffers[index as usize] = binding;
        self.state.vertex_buffer_count = self.state.vertex_buffer_count.max(index + 1);
        self.state.vertex_bindings_dirty = true;
    }

    fn set_index_buffer(&mut self, buffer: &Arc<Buffer<Backend>>, format: IndexFormat, offset: u32) {
        let binding = Some((buffer.raw().id, format, offset));
        if self.state.index_buffer == binding {
            return;
        }
        self.unbind_uav_buffer(buffer.raw().id);
        self.state.index_buffer = binding;
        self.push(Command::SetIndexBuffer {
            buffer: Some(buffer.raw().id),
            format,
            offset,
        });
    }

    fn set_graphic_resource_set(&mut self, slot: u32, set: &Arc<ResourceSet<Backend>>, dynamic_offsets: &[u32]) {
        if let Some(entry) = self.state.graphic_sets.sets.get_mut(slot as usize) {
            *entry = Some(BoundSet {
                set: Arc::clone(set),
                offsets: SmallVec::from_slice(dynamic_offsets),
            });
            self.activate_set(slot, false);
        }
    }

    fn set_compute_resource_set(&mut self, slot: u32, set: &Arc<ResourceSet<Backend>>, dynamic_offsets: &[u32]) {
        if let Some(entry) = self.state.compute_sets.sets.get_mut(slot as usize) {
            *entry = Some(BoundSet {
                set: Arc::clone(set),
                offsets: SmallVec::from_slice(dynamic_offsets),
            });
            self.activate_set(slot, true);
        }
    }

    fn push_constants(&mut self, stages: ShaderStages, data: &[u8]) {
        warn!("Dropping {} bytes of push constants for {:?}: not supported", data.len(), stages);
    }

    fn clear_color_target(&mut self, index: u32, color: [f32; 4]) {
        let target = self
            .state
            .framebuffer
            .as_ref()
            .and_then(|framebuffer| framebuffer.color_targets().get(index as usize))
            .map(|target| (Arc::clone(&target.texture), target.mip_level, target.array_layer));
        match target {
            Some((texture, mip_level, array_layer)) => self.push(Command::ClearRenderTargetView {
                texture,
                mip_level,
                array_layer,
                color,
            }),
            None => error!("No color target {} to clear", index),
        }
    }

    fn clear_depth_stencil_target(&mut self, depth: f32, stencil: u8) {
        let target = self
            .state
            .framebuffer
            .as_ref()
            .and_then(|framebuffer| framebuffer.depth_target())
            .map(|target| (Arc::clone(&target.texture), target.mip_level, target.array_layer));
        match target {
            Some((texture, mip_level, array_layer)) => {
                let stencil = if texture.desc().format.is_stencil() {
                    Some(stencil)
                } else {
                    None
                };
                self.push(Command::ClearDepthStencilView {
                    texture,
                    mip_level,
                    array_layer,
                    depth,
                    stencil,
                });
            }
            None => error!("No depth target to clear"),
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, vertex_start: u32, instance_start: u32) {
        self.pre_draw();
        self.push(if instance_count == 1 && instance_start == 0 {
            Command::Draw {
                vertex_count,
                vertex_start,
            }
        } else {
            Command::DrawInstanced {
                vertex_count,
                instance_count,
                vertex_start,
                instance_start,
            }
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        index_start: u32,
        vertex_offset: i32,
        instance_start: u32,
    ) {
        self.pre_draw();
        self.push(if instance_count == 1 && instance_start == 0 {
            Command::DrawIndexed {
                index_count,
                index_start,
                vertex_offset,
            }
        } else {
            Command::DrawIndexedInstanced {
                index_count,
                instance_count,
                index_start,
                vertex_offset,
                instance_start,
            }
        });
    }

    fn draw_indirect(&mut self, buffer: &Arc<Buffer<Backend>>, offset: u32, draw_count: u32, stride: u32) {
        self.pre_draw();
        for draw in 0..draw_count {
            self.push(Command::DrawInstancedIndirect {
                buffer: Arc::clone(buffer),
                offset: offset + draw * stride,
            });
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: &Arc<Buffer<Backend>>, offset: u32, draw_count: u32, stride: u32) {
        self.pre_draw();
        for draw in 0..draw_count {
            self.push(Command::DrawIndexedInstancedIndirect {
                buffer: Arc::clone(buffer),
                offset: offset + draw * stride,
            });
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.pre_dispatch();
        self.push(Command::Dispatch(x, y, z));
    }

    fn dispatch_indirect(&mut self, buffer: &Arc<Buffer<Backend>>, offset: u32) {
        self.pre_dispatch();
        self.push(Command::DispatchIndirect {
            buffer: Arc::clone(buffer),
            offset,
        });
    }

    fn update_buffer(&mut self, buffer: &Arc<Buffer<Backend>>, offset: u32, data: &[u8]) -> Result<(), CreationError> {
        let (command, staging) = buffer_update(&self.pool, buffer, offset, data)?;
        self.push(command);
        self.staging.extend(staging);
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        source: &Arc<Buffer<Backend>>,
        source_offset: u32,
        destination: &Arc<Buffer<Backend>>,
        destination_offset: u32,
        size: u32,
    ) {
        self.push(Command::CopySubresourceRegion {
            destination: Resource::Buffer(Arc::clone(destination)),
            destination_subresource: 0,
            destination_origin: Offset {
                x: destination_offset,
                y: 0,
                z: 0,
            },
            source: Resource::Buffer(Arc::clone(source)),
            source_subresource: 0,
            region: Some(CopyBox::bytes(source_offset, size)),
        });
    }

    fn copy_texture(&mut self, source: &Arc<Texture<Backend>>, destination: &Arc<Texture<Backend>>, copy: &TextureCopy) {
        let src_desc = source.desc();
        let block = if src_desc.format.is_compressed() { 4 } else { 1 };
        let extent = Extent {
            width: copy.extent.width.max(block),
            height: copy.extent.height.max(block),
            depth: copy.extent.depth,
        };
        let mip = src_desc.mip_extent(copy.src_mip_level);
        let region = if copy.src_origin != Offset::ZERO || extent != mip {
            Some(CopyBox {
                left: copy.src_origin.x,
                top: copy.src_origin.y,
                front: copy.src_origin.z,
                right: copy.src_origin.x + extent.width,
                bottom: copy.src_origin.y + extent.height,
                back: copy.src_origin.z + extent.depth,
            })
        } else {
            None
        };
        let dst_desc = destination.desc();
        for layer in 0..copy.layer_count {
            self.push(Command::CopySubresourceRegion {
                destination: Resource::Texture(Arc::clone(destination)),
                destination_subresource: dst_desc.subresource(copy.dst_mip_level, copy.dst_base_layer + layer),
                destination_origin: copy.dst_origin,
                source: Resource::Texture(Arc::clone(source)),
                source_subresource: src_desc.subresource(copy.src_mip_level, copy.src_base_layer + layer),
                region,
            });
        }
    }

    fn generate_mipmaps(&mut self, texture: &Arc<Texture<Backend>>) {
        self.push(Command::GenerateMips(Arc::clone(texture)));
    }

    fn resolve_texture(&mut self, source: &Arc<Texture<Backend>>, destination: &Arc<Texture<Backend>>) {
        self.push(Command::ResolveSubresource {
            destination: Arc::clone(destination),
            source: Arc::clone(source),
        });
    }

    fn push_debug_group(&mut self, name: &str) {
        self.push(Command::BeginEvent(name.to_owned()));
    }

    fn pop_debug_group(&mut self) {
        self.push(Command::EndEvent);
    }

    fn insert_debug_marker(&mut self, name: &str) {
        self.push(Command::SetMarker(name.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi_core::{
        BufferDescription, Device, DeviceDescription, RawDevice, ResourceLayoutDescription, ResourceLayoutElement,
    };

    #[test]
    fn test_class_bases_count_each_class_separately() {
        let first = ResourceLayout::new(&ResourceLayoutDescription {
            elements: vec![
                ResourceLayoutElement::new("a", ResourceKind::ConstantBuffer, ShaderStages::VERTEX),
                ResourceLayoutElement::new("b", ResourceKind::StructuredBufferReadWrite, ShaderStages::PIXEL),
                ResourceLayoutElement::new("c", ResourceKind::TextureReadOnly, ShaderStages::PIXEL),
                ResourceLayoutElement::new("d", ResourceKind::StructuredBufferReadOnly, ShaderStages::PIXEL),
                ResourceLayoutElement::new("e", ResourceKind::Sampler, ShaderStages::PIXEL),
            ],
        });
        let second = ResourceLayout::new(&ResourceLayoutDescription {
            elements: vec![ResourceLayoutElement::new(
                "f",
                ResourceKind::TextureReadWrite,
                ShaderStages::PIXEL,
            )],
        });
        let layouts = [Arc::new(first), Arc::new(second)];
        assert_eq!(class_bases(&layouts, 0), [0, 0, 0, 0]);
        assert_eq!(class_bases(&layouts, 1), [1, 2, 1, 1]);
        assert_eq!(class_bases(&layouts, 2), [1, 2, 2, 1]);
    }

    #[test]
    fn test_cache_binding() {
        let mut cache: ArrayVec<[Option<u32>; 4]> = ArrayVec::new();
        assert!(cache_binding(&mut cache, 2, Some(7)));
        assert_eq!(cache.len(), 3);
        assert!(!cache_binding(&mut cache, 2, Some(7)));
        assert!(cache_binding(&mut cache, 2, None));
        // Slots past the cache always bind.
        assert!(cache_binding(&mut cache, 9, Some(7)));
        assert!(cache_binding(&mut cache, 9, Some(7)));
    }

    fn device() -> Device<Backend> {
        Device::open(DeviceDescription {
            debug: true,
            ..DeviceDescription::default()
        })
        .unwrap()
    }

    #[test]
    fn test_update_buffer_paths() {
        let device = device();
        let factory = device.factory();
        let default = factory
            .create_buffer(&BufferDescription::new(64, BufferUsage::VERTEX), None)
            .unwrap();
        let constant = factory
            .create_buffer(&BufferDescription::new(256, BufferUsage::CONSTANT), None)
            .unwrap();
        let dynamic = factory
            .create_buffer(
                &BufferDescription::new(256, BufferUsage::CONSTANT | BufferUsage::DYNAMIC),
                None,
            )
            .unwrap();

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.update_buffer(default, 16, &[1; 16]).unwrap();
        list.update_buffer(constant, 0, &[2; 256]).unwrap();
        list.update_buffer(dynamic, 0, &[3; 256]).unwrap();
        list.update_buffer(constant, 16, &[4; 16]).unwrap();
        list.end().unwrap();

        let commands = list.raw().commands();
        match commands[1] {
            Command::UpdateSubresource { region, .. } => assert_eq!(region, Some(CopyBox::bytes(16, 16))),
            ref other => panic!("unexpected {:?}", other),
        }
        match commands[2] {
            Command::UpdateSubresource { region, .. } => assert_eq!(region, None),
            ref other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(commands[3], Command::MapDiscard { .. }));
        match commands[4] {
            Command::CopySubresourceRegion {
                destination_origin,
                region,
                ..
            } => {
                assert_eq!(destination_origin.x, 16);
                assert_eq!(region, Some(CopyBox::bytes(0, 16)));
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_eq!(list.raw().staging_count(), 1);

        device.submit_command_list(&mut list, None).unwrap();
        assert_eq!(device.staging_pool().available_count(), 1);
        let raw = device.resource_manager().resolve(constant).unwrap();
        let contents = device.raw().read_buffer(&raw, 0, 48);
        assert_eq!(&contents[..16], &[2; 16]);
        assert_eq!(&contents[16..32], &[4; 16]);
    }

    #[test]
    fn test_partial_texture_copy_uses_a_box() {
        use rhi_core::{PixelFormat, TextureDescription, TextureUsage};
        let device = device();
        let factory = device.factory();
        let desc = TextureDescription::new_2d(8, 8, 1, PixelFormat::R8G8B8A8UNorm, TextureUsage::SAMPLED);
        let source = factory.create_texture(&desc).unwrap();
        let destination = factory.create_texture(&desc).unwrap();

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.copy_texture(source, destination).unwrap();
        let copy = TextureCopy {
            src_origin: Offset { x: 2, y: 2, z: 0 },
            extent: Extent {
                width: 2,
                height: 2,
                depth: 1,
            },
            ..TextureCopy::whole_mip(&desc, 0)
        };
        list.copy_texture_region(source, destination, &copy).unwrap();
        list.end().unwrap();

        let regions: Vec<Option<CopyBox>> = list
            .raw()
            .commands()
            .iter()
            .filter_map(|command| match *command {
                Command::CopySubresourceRegion { region, .. } => Some(region),
                _ => None,
            })
            .collect();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0], None);
        assert_eq!(
            regions[1],
            Some(CopyBox {
                left: 2,
                top: 2,
                front: 0,
                right: 4,
                bottom: 4,
                back: 1,
            })
        );
    }

    #[test]
    fn test_shared_constant_buffer_binds_once() {
        let device = device();
        let factory = device.factory();
        let layout = factory
            .create_resource_layout(&ResourceLayoutDescription {
                elements: vec![ResourceLayoutElement::new(
                    "Camera",
                    ResourceKind::ConstantBuffer,
                    ShaderStages::VERTEX,
                )],
            })
            .unwrap();
        let pipeline = factory
            .create_graphic_pipeline(&rhi_core::GraphicPipelineDescription {
                shaders: vec![rhi_core::pso::ShaderDescription::new(ShaderStages::VERTEX, b"vs")],
                resource_layouts: vec![layout],
                ..rhi_core::GraphicPipelineDescription::default()
            })
            .unwrap();
        let constants = factory
            .create_buffer(&BufferDescription::new(512, BufferUsage::CONSTANT), None)
            .unwrap();
        let set = |offset| {
            factory
                .create_resource_set(&rhi_core::ResourceSetDescription {
                    layout,
                    resources: vec![rhi_core::BindingResource::BufferRange {
                        buffer: constants,
                        offset,
                        size: 256,
                    }],
                })
                .unwrap()
        };
        let (first, second, third) = (set(0), set(0), set(256));

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.set_graphic_pipeline(pipeline).unwrap();
        list.set_graphic_resource_set(0, first, &[]).unwrap();
        list.set_graphic_resource_set(0, second, &[]).unwrap();
        list.set_graphic_resource_set(0, third, &[]).unwrap();
        list.end().unwrap();

        let ranges: Vec<(u32, u32)> = list
            .raw()
            .commands()
            .iter()
            .filter_map(|command| match *command {
                Command::SetConstantBuffers1 {
                    stage: Stage::Vertex,
                    ref first_constant,
                    ref constant_count,
                    ..
                } => Some((first_constant[0], constant_count[0])),
                _ => None,
            })
            .collect();
        assert_eq!(ranges, vec![(0, 16), (16, 16)]);
    }

    #[test]
    fn test_storage_bind_unbinds_shader_resource() {
        use rhi_core::{ComputePipelineDescription, PixelFormat, TextureDescription, TextureUsage};
        let device = device();
        let factory = device.factory();
        let texture = factory
            .create_texture(&TextureDescription::new_2d(
                16,
                16,
                1,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::SAMPLED | TextureUsage::STORAGE,
            ))
            .unwrap();
        let read = factory
            .create_resource_layout(&ResourceLayoutDescription {
                elements: vec![ResourceLayoutElement::new(
                    "Input",
                    ResourceKind::TextureReadOnly,
                    ShaderStages::PIXEL,
                )],
            })
            .unwrap();
        let write = factory
            .create_resource_layout(&ResourceLayoutDescription {
                elements: vec![ResourceLayoutElement::new(
                    "Output",
                    ResourceKind::TextureReadWrite,
                    ShaderStages::COMPUTE,
                )],
            })
            .unwrap();
        let graphic = factory
            .create_graphic_pipeline(&rhi_core::GraphicPipelineDescription {
                shaders: vec![
                    rhi_core::pso::ShaderDescription::new(ShaderStages::VERTEX, b"vs"),
                    rhi_core::pso::ShaderDescription::new(ShaderStages::PIXEL, b"ps"),
                ],
                resource_layouts: vec![read],
                ..rhi_core::GraphicPipelineDescription::default()
            })
            .unwrap();
        let compute = factory
            .create_compute_pipeline(&ComputePipelineDescription {
                shader: rhi_core::pso::ShaderDescription::new(ShaderStages::COMPUTE, b"cs"),
                resource_layouts: vec![write],
                thread_group_size: [8, 8, 1],
                push_constants: false,
            })
            .unwrap();
        let bind = |layout| {
            factory
                .create_resource_set(&rhi_core::ResourceSetDescription {
                    layout,
                    resources: vec![rhi_core::BindingResource::Texture(texture)],
                })
                .unwrap()
        };
        let (sampled, storage) = (bind(read), bind(write));

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.set_graphic_pipeline(graphic).unwrap();
        list.set_graphic_resource_set(0, sampled, &[]).unwrap();
        list.set_compute_pipeline(compute).unwrap();
        list.set_compute_resource_set(0, storage, &[]).unwrap();
        list.end().unwrap();

        let commands = list.raw().commands();
        let unbind = commands.iter().position(|command| match *command {
            Command::SetShaderResources {
                stage: Stage::Pixel,
                ref views,
                ..
            } => views[0].is_none(),
            _ => false,
        });
        let storage_bind = commands.iter().position(|command| match *command {
            Command::SetComputeUnorderedAccessViews { start: 0, ref views } => views[0].is_some(),
            _ => false,
        });
        assert!(unbind.is_some());
        assert!(unbind < storage_bind);
    }
}
