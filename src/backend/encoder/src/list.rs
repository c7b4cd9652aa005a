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

//! Recording of validated command list calls into render, compute and blit encoders.
//!
//! At most one encoder is open at a time and every transition goes through the `ensure_*`
//! family. Render passes begin lazily on the first draw: pending clears turn into load actions
//! of that pass, and a framebuffer nobody draws into or clears costs no pass at all.

use arrayvec::ArrayVec;
use fxhash::FxHashMap;
use rhi_core::pso::MAX_COLOR_TARGETS;
use rhi_core::{
    BoundResource, Buffer, ComputePipeline, CreationError, Framebuffer, GraphicPipeline, IndexFormat, Offset,
    PixelFormat, RawCommandList, Rect, ResourceKind, ResourceLayout, ResourceSet, ShaderStages, StagingBufferPool,
    SubresourceLayout, Texture, TextureCopy, Viewport, MAX_VERTEX_BUFFERS,
};
use smallvec::{smallvec, SmallVec};
use std::mem;
use std::sync::Arc;

use crate::device::create_native_buffer;
use crate::internal::{CopyParams, ServicePipes};
use crate::native::{RenderStages, ResourceId};
use crate::soft::{
    BlitCommand, ColorAttachment, CommandBuffer, ComputeCommand, DebugCommand, IndexBinding, LinearLayout, LoadAction,
    Pass, RenderCommand, RenderPassDescriptor, Resource, StoreAction,
};
use crate::Backend;

/// Which encoder is open.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EncoderState {
    None,
    Render,
    Compute,
    Blit,
}

#[derive(Debug)]
enum Encoder {
    None,
    Render {
        descriptor: RenderPassDescriptor,
        commands: Vec<RenderCommand>,
    },
    Compute(Vec<ComputeCommand>),
    Blit(Vec<BlitCommand>),
}

impl Encoder {
    fn state(&self) -> EncoderState {
        match *self {
            Encoder::None => EncoderState::None,
            Encoder::Render { .. } => EncoderState::Render,
            Encoder::Compute(_) => EncoderState::Compute,
            Encoder::Blit(_) => EncoderState::Blit,
        }
    }

    /// Record a debug command into the open encoder. Returns `false` when none is open.
    fn debug(&mut self, command: DebugCommand) -> bool {
        match *self {
            Encoder::None => return false,
            Encoder::Render { ref mut commands, .. } => commands.push(RenderCommand::Debug(command)),
            Encoder::Compute(ref mut commands) => commands.push(ComputeCommand::Debug(command)),
            Encoder::Blit(ref mut commands) => commands.push(BlitCommand::Debug(command)),
        }
        true
    }

    fn finish(self) -> Option<Pass> {
        match self {
            Encoder::None => None,
            Encoder::Render { descriptor, commands } => Some(Pass::Render { descriptor, commands }),
            Encoder::Compute(commands) => Some(Pass::Compute(commands)),
            Encoder::Blit(commands) => Some(Pass::Blit(commands)),
        }
    }
}

/// Argument tables of a stage. Each resource kind binds into one of them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum ArgumentTable {
    Buffer = 0,
    Texture = 1,
    Sampler = 2,
}

impl ArgumentTable {
    fn of(kind: ResourceKind) -> Self {
        if kind.is_buffer() {
            ArgumentTable::Buffer
        } else if kind.is_texture() {
            ArgumentTable::Texture
        } else {
            ArgumentTable::Sampler
        }
    }
}

/// First index of every argument table for the set at `slot`.
fn table_bases(layouts: &[Arc<ResourceLayout>], slot: usize) -> [u32; 3] {
    let mut bases = [0; 3];
    for layout in &layouts[..slot] {
        for &kind in ResourceKind::ALL.iter() {
            bases[ArgumentTable::of(kind) as usize] += layout.count(kind);
        }
    }
    bases
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum BindPoint {
    Vertex,
    Fragment,
    Compute,
}

type BindingKey = (BindPoint, ArgumentTable, u32);

#[derive(Debug)]
struct BoundSet {
    set: Arc<ResourceSet<Backend>>,
    offsets: SmallVec<[u32; 4]>,
}

#[derive(Debug, Default)]
struct SetSlots {
    sets: Vec<Option<BoundSet>>,
    active: Vec<bool>,
}

impl SetSlots {
    fn reset(&mut self, count: usize) {
        self.sets.clear();
        self.sets.resize_with(count, || None);
        self.active.clear();
        self.active.resize(count, false);
    }

    fn deactivate_all(&mut self) {
        for active in self.active.iter_mut() {
            *active = false;
        }
    }

    fn inactive(&self) -> SmallVec<[u32; 8]> {
        self.sets
            .iter()
            .zip(&self.active)
            .enumerate()
            .filter(|&(_, (set, &active))| set.is_some() && !active)
            .map(|(slot, _)| slot as u32)
            .collect()
    }
}

#[derive(Debug)]
struct PushConstants {
    stages: ShaderStages,
    data: SmallVec<[u8; 128]>,
    dirty: bool,
}

/// State mirrored from the encoders.
#[derive(Debug, Default)]
struct State {
    framebuffer: Option<Arc<Framebuffer<Backend>>>,
    framebuffer_ever_active: bool,
    clear_colors: ArrayVec<[Option<[f32; 4]>; MAX_COLOR_TARGETS]>,
    clear_depth: Option<(f32, u8)>,

    viewports: ArrayVec<[Viewport; MAX_COLOR_TARGETS]>,
    viewports_changed: bool,
    scissor_rects: ArrayVec<[Rect; MAX_COLOR_TARGETS]>,
    scissor_rects_changed: bool,

    graphic_pipeline: Option<Arc<GraphicPipeline<Backend>>>,
    graphic_pipeline_changed: bool,
    compute_pipeline: Option<Arc<ComputePipeline<Backend>>>,
    compute_pipeline_changed: bool,
    graphic_sets: SetSlots,
    compute_sets: SetSlots,

    vertex_buffers: [Option<(ResourceId, u32)>; MAX_VERTEX_BUFFERS],
    vertex_buffers_active: [bool; MAX_VERTEX_BUFFERS],
    index_buffer: Option<(ResourceId, IndexFormat, u32)>,

    graphic_constants: Option<PushConstants>,
    compute_constants: Option<PushConstants>,
}

impl State {
    fn sets(&self, compute: bool) -> &SetSlots {
        if compute {
            &self.compute_sets
        } else {
            &self.graphic_sets
        }
    }

    fn sets_mut(&mut self, compute: bool) -> &mut SetSlots {
        if compute {
            &mut self.compute_sets
        } else {
            &mut self.graphic_sets
        }
    }

    fn has_pending_clears(&self) -> bool {
        self.clear_depth.is_some() || self.clear_colors.iter().any(Option::is_some)
    }
}

/// Byte offset of the texel at `origin` inside linear memory laid out like `layout`.
fn texel_offset(format: PixelFormat, layout: &SubresourceLayout, origin: Offset) -> u64 {
    let edge = format.unit_edge();
    layout.offset
        + u64::from(origin.z) * u64::from(layout.depth_pitch)
        + u64::from(origin.y / edge) * u64::from(layout.row_pitch)
        + u64::from(origin.x / edge) * u64::from(format.unit_size_in_bytes())
}

fn linear_layout(format: PixelFormat, layout: &SubresourceLayout, origin: Offset) -> LinearLayout {
    LinearLayout {
        offset: texel_offset(format, layout, origin),
        bytes_per_row: layout.row_pitch,
        bytes_per_image: layout.depth_pitch,
    }
}

/// A command list recording one command buffer through short-lived encoders.
#[derive(Debug)]
pub struct CommandList {
    encoder: Encoder,
    passes: Vec<Pass>,
    finished: Option<CommandBuffer>,
    state: State,
    bindings: FxHashMap<BindingKey, (ResourceId, u32)>,
    debug_groups: Vec<String>,
    pending_markers: Vec<String>,
    staging: Vec<Arc<Buffer<Backend>>>,
    pool: Arc<StagingBufferPool<Backend>>,
    service: Arc<ServicePipes>,
}

impl CommandList {
    pub(crate) fn new(pool: Arc<StagingBufferPool<Backend>>, service: Arc<ServicePipes>) -> Self {
        CommandList {
            encoder: Encoder::None,
            passes: Vec::new(),
            finished: None,
            state: State::default(),
            bindings: FxHashMap::default(),
            debug_groups: Vec::new(),
            pending_markers: Vec::new(),
            staging: Vec::new(),
            pool,
            service,
        }
    }

    pub fn encoder_state(&self) -> EncoderState {
        self.encoder.state()
    }

    /// Passes of the finished command buffer, or those closed so far.
    pub fn passes(&self) -> &[Pass] {
        match self.finished {
            Some(ref buffer) => buffer.passes(),
            None => &self.passes,
        }
    }

    /// Number of staging buffers held until the command buffer completes.
    pub fn staging_count(&self) -> usize {
        self.staging.len()
    }

    pub(crate) fn take_finished(&mut self) -> Option<(CommandBuffer, Vec<Arc<Buffer<Backend>>>)> {
        let buffer = self.finished.take()?;
        Some((buffer, self.staging.drain(..).collect()))
    }

    fn release_staging(&mut self) {
        if !self.staging.is_empty() {
            self.pool.release_all(self.staging.drain(..));
        }
    }

    fn open(&mut self, encoder: Encoder) {
        debug_assert_eq!(self.encoder.state(), EncoderState::None);
        self.encoder = encoder;
        self.bindings.clear();
        for name in &self.debug_groups {
            self.encoder.debug(DebugCommand::PushGroup(name.clone()));
        }
        for marker in self.pending_markers.drain(..) {
            self.encoder.debug(DebugCommand::Signpost(marker));
        }
    }

    fn close(&mut self) {
        for _ in 0..self.debug_groups.len() {
            self.encoder.debug(DebugCommand::PopGroup);
        }
        if let Some(pass) = mem::replace(&mut self.encoder, Encoder::None).finish() {
            self.passes.push(pass);
        }
    }

    fn render(&mut self, command: RenderCommand) {
        match self.encoder {
            Encoder::Render { ref mut commands, .. } => commands.push(command),
            _ => error!("No render encoder is open for {:?}", command),
        }
    }

    fn compute(&mut self, command: ComputeCommand) {
        match self.encoder {
            Encoder::Compute(ref mut commands) => commands.push(command),
            _ => error!("No compute encoder is open for {:?}", command),
        }
    }

    fn blit(&mut self, command: BlitCommand) {
        match self.encoder {
            Encoder::Blit(ref mut commands) => commands.push(command),
            _ => error!("No blit encoder is open for {:?}", command),
        }
    }

    fn begin_current_render_pass(&mut self) -> bool {
        let framebuffer = match self.state.framebuffer {
            Some(ref framebuffer) if framebuffer.is_renderable() => Arc::clone(framebuffer),
            _ => return false,
        };
        let mut descriptor = framebuffer.raw().descriptor.clone();
        for (attachment, clear) in descriptor.colors.iter_mut().zip(self.state.clear_colors.iter_mut()) {
            if let Some(color) = clear.take() {
                attachment.load = LoadAction::Clear;
                attachment.store = StoreAction::Store;
                attachment.clear_color = color;
            }
        }
        if let Some((depth, stencil)) = self.state.clear_depth.take() {
            if let Some(ref mut attachment) = descriptor.depth {
                attachment.load = LoadAction::Clear;
                attachment.store = StoreAction::Store;
                attachment.clear_depth = depth;
            }
            if let Some(ref mut attachment) = descriptor.stencil {
                attachment.load = LoadAction::Clear;
                attachment.store = StoreAction::Store;
                attachment.clear_stencil = stencil;
            }
        }
        self.open(Encoder::Render {
            descriptor,
            commands: Vec::new(),
        });
        self.state.framebuffer_ever_active = true;
        true
    }

    fn ensure_render_pass(&mut self) -> bool {
        if self.encoder.state() == EncoderState::Render {
            return true;
        }
        self.ensure_no_blit_encoder();
        self.ensure_no_compute_encoder();
        self.begin_current_render_pass()
    }

    fn end_current_render_pass(&mut self) {
        if self.encoder.state() != EncoderState::Render {
            return;
        }
        self.close();
        let state = &mut self.state;
        state.graphic_sets.deactivate_all();
        state.vertex_buffers_active = [false; MAX_VERTEX_BUFFERS];
        state.graphic_pipeline_changed = true;
        state.viewports_changed = true;
        state.scissor_rects_changed = true;
        if let Some(ref mut constants) = state.graphic_constants {
            constants.dirty = true;
        }
    }

    fn ensure_compute_encoder(&mut self) {
        if self.encoder.state() == EncoderState::Compute {
            return;
        }
        self.ensure_no_blit_encoder();
        self.end_current_render_pass();
        self.open(Encoder::Compute(Vec::new()));
    }

    fn ensure_no_compute_encoder(&mut self) {
        if self.encoder.state() != EncoderState::Compute {
            return;
        }
        self.close();
        self.invalidate_compute_bindings();
    }

    fn invalidate_compute_bindings(&mut self) {
        let state = &mut self.state;
        state.compute_pipeline_changed = true;
        state.compute_sets.deactivate_all();
        if let Some(ref mut constants) = state.compute_constants {
            constants.dirty = true;
        }
    }

    fn ensure_blit_encoder(&mut self) {
        if self.encoder.state() == EncoderState::Blit {
            return;
        }
        self.end_current_render_pass();
        self.ensure_no_compute_encoder();
        self.open(Encoder::Blit(Vec::new()));
    }

    fn ensure_no_blit_encoder(&mut self) {
        if self.encoder.state() == EncoderState::Blit {
            self.close();
        }
    }

    /// Open a render pass on attachments other than the current framebuffer.
    fn begin_resolve_pass(&mut self, descriptor: RenderPassDescriptor) {
        self.ensure_no_blit_encoder();
        self.ensure_no_compute_encoder();
        // Clears recorded before the resolve land before it.
        self.flush_pending_clears();
        self.end_current_render_pass();
        self.open(Encoder::Render {
            descriptor,
            commands: Vec::new(),
        });
    }

    /// Begin and end a pass for the current framebuffer if clears are still pending.
    fn flush_pending_clears(&mut self) {
        if self.state.has_pending_clears() && self.ensure_render_pass() {
            self.end_current_render_pass();
        }
    }

    /// Record `value` for `key`. Returns whether the native binding has to be issued.
    fn cache_binding(&mut self, key: BindingKey, value: (ResourceId, u32)) -> bool {
        self.bindings.insert(key, value) != Some(value)
    }

    fn render_stages_to_bind(
        &mut self,
        stages: RenderStages,
        table: ArgumentTable,
        index: u32,
        value: (ResourceId, u32),
    ) -> RenderStages {
        let mut out = RenderStages::empty();
        for &(flag, point) in &[
            (RenderStages::VERTEX, BindPoint::Vertex),
            (RenderStages::FRAGMENT, BindPoint::Fragment),
        ] {
            if stages.contains(flag) && self.cache_binding((point, table, index), value) {
                out |= flag;
            }
        }
        out
    }

    fn bind_buffer(&mut self, compute: bool, stages: ShaderStages, index: u32, buffer: &Arc<Buffer<Backend>>, offset: u32) {
        let value = (buffer.raw().id, offset);
        if compute {
            if stages.contains(ShaderStages::COMPUTE)
                && self.cache_binding((BindPoint::Compute, ArgumentTable::Buffer, index), value)
            {
                self.compute(ComputeCommand::BindBuffer {
                    index,
                    buffer: Arc::clone(buffer),
                    offset,
                });
            }
            return;
        }
        let stages = self.render_stages_to_bind(RenderStages::from_shader_stages(stages), ArgumentTable::Buffer, index, value);
        if !stages.is_empty() {
            self.render(RenderCommand::BindBuffer {
                stages,
                index,
                buffer: value.0,
                offset,
            });
        }
    }

    fn bind_texture(&mut self, compute: bool, stages: ShaderStages, index: u32, view: ResourceId) {
        if compute {
            if stages.contains(ShaderStages::COMPUTE)
                && self.cache_binding((BindPoint::Compute, ArgumentTable::Texture, index), (view, 0))
            {
                self.compute(ComputeCommand::BindTexture { index, view });
            }
            return;
        }
        let stages =
            self.render_stages_to_bind(RenderStages::from_shader_stages(stages), ArgumentTable::Texture, index, (view, 0));
        if !stages.is_empty() {
            self.render(RenderCommand::BindTexture { stages, index, view });
        }
    }

    fn bind_sampler(&mut self, compute: bool, stages: ShaderStages, index: u32, sampler: ResourceId) {
        if compute {
            if stages.contains(ShaderStages::COMPUTE)
                && self.cache_binding((BindPoint::Compute, ArgumentTable::Sampler, index), (sampler, 0))
            {
                self.compute(ComputeCommand::BindSampler { index, sampler });
            }
            return;
        }
        let stages = self.render_stages_to_bind(
            RenderStages::from_shader_stages(stages),
            ArgumentTable::Sampler,
            index,
            (sampler, 0),
        );
        if !stages.is_empty() {
            self.render(RenderCommand::BindSampler { stages, index, sampler });
        }
    }

    /// Bind inline bytes, replacing whatever buffer the index held.
    fn bind_bytes(&mut self, compute: bool, stages: RenderStages, index: u32, bytes: SmallVec<[u8; 128]>) {
        if compute {
            self.bindings.remove(&(BindPoint::Compute, ArgumentTable::Buffer, index));
            self.compute(ComputeCommand::BindBufferData { index, bytes });
        } else {
            self.bindings.remove(&(BindPoint::Vertex, ArgumentTable::Buffer, index));
            self.bindings.remove(&(BindPoint::Fragment, ArgumentTable::Buffer, index));
            self.render(RenderCommand::BindBufferData { stages, index, bytes });
        }
    }

    /// Bind every resource of the set at `slot` into the argument tables.
    fn activate_set(&mut self, slot: u32, compute: bool) {
        let (set, offsets) = match self.state.sets(compute).sets.get(slot as usize) {
            Some(&Some(ref bound)) => (Arc::clone(&bound.set), bound.offsets.clone()),
            _ => return,
        };
        let (layouts, push_constants): (SmallVec<[Arc<ResourceLayout>; 4]>, bool) = if compute {
            match self.state.compute_pipeline {
                Some(ref pipeline) => (pipeline.layouts().iter().cloned().collect(), pipeline.raw().push_constants),
                None => return,
            }
        } else {
            match self.state.graphic_pipeline {
                Some(ref pipeline) => (pipeline.layouts().iter().cloned().collect(), pipeline.raw().push_constants),
                None => return,
            }
        };
        // Index 0 of the buffer table holds push constants when the pipeline uses them.
        let shift = if push_constants { 1 } else { 0 };
        let bases = table_bases(&layouts, slot as usize);
        let mut indices = [0u32; 3];
        let mut dynamic_offsets = offsets.iter();

        for (element, resource) in set.layout().elements().iter().zip(set.resources()) {
            let dynamic_offset = if element.dynamic {
                dynamic_offsets.next().cloned().unwrap_or(0)
            } else {
                0
            };
            let table = ArgumentTable::of(element.kind);
            let mut index = bases[table as usize] + indices[table as usize];
            indices[table as usize] += 1;
            if table == ArgumentTable::Buffer {
                index += shift;
            }
            match *resource {
                BoundResource::Buffer(ref range) => {
                    self.bind_buffer(compute, element.stages, index, &range.buffer, range.offset + dynamic_offset)
                }
                BoundResource::TextureView(ref view) => self.bind_texture(compute, element.stages, index, view.raw().id),
                BoundResource::Sampler(ref sampler) => {
                    self.bind_sampler(compute, element.stages, index, sampler.raw().id)
                }
            }
        }
        if let Some(active) = self.state.sets_mut(compute).active.get_mut(slot as usize) {
            *active = true;
        }
    }

    fn activate_sets(&mut self, compute: bool) {
        for slot in self.state.sets(compute).inactive() {
            self.activate_set(slot, compute);
        }
    }

    fn apply_graphic_pipeline(&mut self, pipeline: &GraphicPipeline<Backend>) {
        let native = pipeline.raw();
        let raster = native.raster;
        self.render(RenderCommand::SetRenderPipelineState(native.id));
        self.render(RenderCommand::SetCullMode(raster.cull_mode));
        self.render(RenderCommand::SetFrontFacing(raster.front_face));
        self.render(RenderCommand::SetTriangleFillMode(raster.fill_mode));
        self.render(RenderCommand::SetDepthBias {
            bias: raster.depth_bias,
            slope_scale: raster.slope_scale,
            clamp: raster.depth_bias_clamp,
        });
        self.render(RenderCommand::SetBlendColor(native.blend_color));
        let has_depth = self
            .state
            .framebuffer
            .as_ref()
            .map_or(false, |framebuffer| framebuffer.depth_target().is_some());
        if has_depth {
            self.render(RenderCommand::SetDepthStencilState(native.depth_stencil));
            self.render(RenderCommand::SetDepthClipMode(raster.depth_clip));
            self.render(RenderCommand::SetStencilReference(native.stencil_reference));
        }
    }

    fn pre_draw(&mut self) -> Option<Arc<GraphicPipeline<Backend>>> {
        let pipeline = self.state.graphic_pipeline.as_ref().map(Arc::clone)?;
        if !self.ensure_render_pass() {
            warn!("Skipping a draw: the framebuffer cannot begin a render pass");
            return None;
        }

        if self.state.viewports_changed {
            self.state.viewports_changed = false;
            let viewports = self.state.viewports.iter().cloned().collect();
            self.render(RenderCommand::SetViewports(viewports));
        }
        if pipeline.raw().raster.scissor_test && self.state.scissor_rects_changed {
            self.state.scissor_rects_changed = false;
            let rects = self.state.scissor_rects.iter().cloned().collect();
            self.render(RenderCommand::SetScissorRects(rects));
        }
        if self.state.graphic_pipeline_changed {
            self.state.graphic_pipeline_changed = false;
            self.apply_graphic_pipeline(&pipeline);
        }

        self.activate_sets(false);

        // Vertex buffers follow the buffers of every resource set.
        let shift = if pipeline.raw().push_constants { 1 } else { 0 };
        let first = shift + table_bases(pipeline.layouts(), pipeline.layouts().len())[ArgumentTable::Buffer as usize];
        for slot in 0..MAX_VERTEX_BUFFERS {
            if self.state.vertex_buffers_active[slot] {
                continue;
            }
            if let Some((buffer, offset)) = self.state.vertex_buffers[slot] {
                self.state.vertex_buffers_active[slot] = true;
                let index = first + slot as u32;
                if self.cache_binding((BindPoint::Vertex, ArgumentTable::Buffer, index), (buffer, offset)) {
                    self.render(RenderCommand::BindBuffer {
                        stages: RenderStages::VERTEX,
                        index,
                        buffer,
                        offset,
                    });
                }
            }
        }

        if pipeline.raw().push_constants {
            let pending = match self.state.graphic_constants {
                Some(ref mut constants) if constants.dirty => {
                    constants.dirty = false;
                    Some((RenderStages::from_shader_stages(constants.stages), constants.data.clone()))
                }
                _ => None,
            };
            if let Some((stages, data)) = pending {
                self.bind_bytes(false, stages, 0, data);
            }
        }
        Some(pipeline)
    }

    fn pre_dispatch(&mut self) -> bool {
        let pipeline = match self.state.compute_pipeline {
            Some(ref pipeline) => Arc::clone(pipeline),
            None => return false,
        };
        self.ensure_compute_encoder();
        let native = pipeline.raw();
        if self.state.compute_pipeline_changed {
            self.state.compute_pipeline_changed = false;
            self.compute(ComputeCommand::SetComputePipelineState {
                pipeline: native.id,
                kernel: native.kernel,
                threads_per_group: native.threads_per_group,
            });
        }
        self.activate_sets(true);
        if native.push_constants {
            let pending = match self.state.compute_constants {
                Some(ref mut constants) if constants.dirty => {
                    constants.dirty = false;
                    Some(constants.data.clone())
                }
                _ => None,
            };
            if let Some(data) = pending {
                self.bind_bytes(true, RenderStages::empty(), 0, data);
            }
        }
        true
    }

    fn index_binding(&self, first_index: u32) -> Option<IndexBinding> {
        self.state.index_buffer.map(|(buffer, format, offset)| IndexBinding {
            buffer,
            format,
            offset: offset + first_index * format.size_in_bytes(),
        })
    }

    /// Copy through a blit when everything is 4-byte aligned, otherwise through the copy kernel.
    fn copy_buffer_range(
        &mut self,
        source: &Arc<Buffer<Backend>>,
        source_offset: u32,
        destination: &Arc<Buffer<Backend>>,
        destination_offset: u32,
        size: u32,
    ) {
        if source_offset % 4 == 0 && destination_offset % 4 == 0 && size % 4 == 0 {
            self.ensure_blit_encoder();
            self.blit(BlitCommand::CopyBuffer {
                source: Resource::Buffer(Arc::clone(source)),
                source_offset: u64::from(source_offset),
                destination: Resource::Buffer(Arc::clone(destination)),
                destination_offset: u64::from(destination_offset),
                size: u64::from(size),
            });
            return;
        }

        self.ensure_compute_encoder();
        let (pipeline, kernel, threads_per_group) = {
            let pipe = &self.service.copy_buffer;
            (pipe.id, pipe.kernel, pipe.threads_per_group)
        };
        self.compute(ComputeCommand::SetComputePipelineState {
            pipeline,
            kernel,
            threads_per_group,
        });
        // The copy kernel displaces the user's pipeline and its arguments.
        self.invalidate_compute_bindings();
        self.bind_buffer(true, ShaderStages::COMPUTE, 0, source, 0);
        self.bind_buffer(true, ShaderStages::COMPUTE, 1, destination, 0);
        let params = CopyParams {
            source_offset,
            destination_offset,
            size,
        };
        self.bind_bytes(true, RenderStages::empty(), 2, SmallVec::from_slice(&params.to_bytes()));
        self.compute(ComputeCommand::Dispatch { groups: [1, 1, 1] });
    }

    fn reset_recording(&mut self) {
        self.encoder = Encoder::None;
        self.passes.clear();
        self.finished = None;
        self.release_staging();
        self.state = State::default();
        self.bindings.clear();
        self.debug_groups.clear();
        self.pending_markers.clear();
    }
}

impl RawCommandList<Backend> for CommandList {
    fn begin(&mut self) {
        self.reset_recording();
    }

    fn end(&mut self) {
        self.ensure_no_blit_encoder();
        self.ensure_no_compute_encoder();
        // Clears must land even if nothing was drawn.
        self.flush_pending_clears();
        self.end_current_render_pass();
        if !self.debug_groups.is_empty() {
            warn!("Ending a command list with {} open debug groups", self.debug_groups.len());
            self.debug_groups.clear();
        }
        if !self.pending_markers.is_empty() {
            debug!("Dropping {} debug markers outside any encoder", self.pending_markers.len());
            self.pending_markers.clear();
        }
        self.finished = Some(CommandBuffer {
            passes: mem::replace(&mut self.passes, Vec::new()),
        });
        self.state = State::default();
    }

    fn reset(&mut self) {
        self.reset_recording();
    }

    fn clear_cached_state(&mut self) {
        self.ensure_no_blit_encoder();
        self.ensure_no_compute_encoder();
        self.end_current_render_pass();
        self.state = State::default();
    }

    fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer<Backend>>) {
        if self.state.framebuffer.is_some() {
            self.flush_pending_clears();
        }
        self.end_current_render_pass();

        let count = framebuffer.color_targets().len();
        let state = &mut self.state;
        state.clear_colors.clear();
        state.clear_colors.extend((0..count).map(|_| None));
        state.clear_depth = None;
        let viewports = count.max(1);
        state.viewports.clear();
        state
            .viewports
            .extend((0..viewports).map(|_| Viewport::full(framebuffer.width(), framebuffer.height())));
        state.scissor_rects.clear();
        state.scissor_rects.extend((0..viewports).map(|_| Rect {
            x: 0,
            y: 0,
            width: framebuffer.width(),
            height: framebuffer.height(),
        }));
        state.viewports_changed = true;
        state.scissor_rects_changed = true;
        state.framebuffer = Some(Arc::clone(framebuffer));
        state.framebuffer_ever_active = false;
    }

    fn set_viewport(&mut self, index: u32, viewport: &Viewport) {
        let viewports = &mut self.state.viewports;
        if index as usize >= viewports.capacity() {
            return;
        }
        while viewports.len() <= index as usize {
            viewports.push(Viewport::full(0, 0));
        }
        viewports[index as usize] = *viewport;
        self.state.viewports_changed = true;
    }

    fn set_scissor_rect(&mut self, index: u32, rect: &Rect) {
        let rects = &mut self.state.scissor_rects;
        if index as usize >= rects.capacity() {
            return;
        }
        while rects.len() <= index as usize {
            rects.push(Rect::default());
        }
        rects[index as usize] = *rect;
        self.state.scissor_rects_changed = true;
    }

    fn set_graphic_pipeline(&mut self, pipeline: &Arc<GraphicPipeline<Backend>>) {
        let state = &mut self.state;
        state.graphic_sets.reset(pipeline.layouts().len());
        state.vertex_buffers_active = [false; MAX_VERTEX_BUFFERS];
        state.graphic_constants = None;
        state.graphic_pipeline = Some(Arc::clone(pipeline));
        state.graphic_pipeline_changed = true;
    }

    fn set_compute_pipeline(&mut self, pipeline: &Arc<ComputePipeline<Backend>>) {
        let state = &mut self.state;
        state.compute_sets.reset(pipeline.layouts().len());
        state.compute_constants = None;
        state.compute_pipeline = Some(Arc::clone(pipeline));
        state.compute_pipeline_changed = true;
    }

    fn set_vertex_buffer(&mut self, index: u32, buffer: &Arc<Buffer<Backend>>, offset: u32) {
        let binding = Some((buffer.raw().id, offset));
        let slot = index as usize;
        if self.state.vertex_buffers[slot] != binding {
            self.state.vertex_buffers[slot] = binding;
            self.state.vertex_buffers_active[slot] = false;
        }
    }

    fn set_index_buffer(&mut self, buffer: &Arc<Buffer<Backend>>, format: IndexFormat, offset: u32) {
        self.state.index_buffer = Some((buffer.raw().id, format, offset));
    }

    fn set_graphic_resource_set(&mut self, slot: u32, set: &Arc<ResourceSet<Backend>>, dynamic_offsets: &[u32]) {
        let sets = &mut self.state.graphic_sets;
        if let Some(entry) = sets.sets.get_mut(slot as usize) {
            *entry = Some(BoundSet {
                set: Arc::clone(set),
                offsets: SmallVec::from_slice(dynamic_offsets),
            });
            sets.active[slot as usize] = false;
        }
    }

    fn set_compute_resource_set(&mut self, slot: u32, set: &Arc<ResourceSet<Backend>>, dynamic_offsets: &[u32]) {
        let sets = &mut self.state.compute_sets;
        if let Some(entry) = sets.sets.get_mut(slot as usize) {
            *entry = Some(BoundSet {
                set: Arc::clone(set),
                offsets: SmallVec::from_slice(dynamic_offsets),
            });
            sets.active[slot as usize] = false;
        }
    }

    fn push_constants(&mut self, stages: ShaderStages, data: &[u8]) {
        let graphic = stages & ShaderStages::GRAPHICS;
        if !graphic.is_empty() {
            self.state.graphic_constants = Some(PushConstants {
                stages: graphic,
                data: SmallVec::from_slice(data),
                dirty: true,
            });
        }
        if stages.contains(ShaderStages::COMPUTE) {
            self.state.compute_constants = Some(PushConstants {
                stages: ShaderStages::COMPUTE,
                data: SmallVec::from_slice(data),
                dirty: true,
            });
        }
    }

    fn clear_color_target(&mut self, index: u32, color: [f32; 4]) {
        self.end_current_render_pass();
        match self.state.clear_colors.get_mut(index as usize) {
            Some(clear) => *clear = Some(color),
            None => error!("No color target {} to clear", index),
        }
    }

    fn clear_depth_stencil_target(&mut self, depth: f32, stencil: u8) {
        self.end_current_render_pass();
        self.state.clear_depth = Some((depth, stencil));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, vertex_start: u32, instance_start: u32) {
        if let Some(pipeline) = self.pre_draw() {
            self.render(RenderCommand::Draw {
                primitive: pipeline.raw().primitive,
                vertex_start,
                vertex_count,
                instance_count,
                instance_start,
            });
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        index_start: u32,
        vertex_offset: i32,
        instance_start: u32,
    ) {
        let pipeline = match self.pre_draw() {
            Some(pipeline) => pipeline,
            None => return,
        };
        match self.index_binding(index_start) {
            Some(index) => self.render(RenderCommand::DrawIndexed {
                primitive: pipeline.raw().primitive,
                index,
                index_count,
                instance_count,
                base_vertex: vertex_offset,
                instance_start,
            }),
            None => error!("Indexed draw without an index buffer"),
        }
    }

    fn draw_indirect(&mut self, buffer: &Arc<Buffer<Backend>>, offset: u32, draw_count: u32, stride: u32) {
        if let Some(pipeline) = self.pre_draw() {
            for draw in 0..draw_count {
                self.render(RenderCommand::DrawIndirect {
                    primitive: pipeline.raw().primitive,
                    buffer: Arc::clone(buffer),
                    offset: offset + draw * stride,
                });
            }
        }
    }

    fn draw_indexed_indirect(&mut self, buffer: &Arc<Buffer<Backend>>, offset: u32, draw_count: u32, stride: u32) {
        let pipeline = match self.pre_draw() {
            Some(pipeline) => pipeline,
            None => return,
        };
        let index = match self.index_binding(0) {
            Some(index) => index,
            None => return error!("Indexed draw without an index buffer"),
        };
        for draw in 0..draw_count {
            self.render(RenderCommand::DrawIndexedIndirect {
                primitive: pipeline.raw().primitive,
                index,
                buffer: Arc::clone(buffer),
                offset: offset + draw * stride,
            });
        }
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if self.pre_dispatch() {
            self.compute(ComputeCommand::Dispatch { groups: [x, y, z] });
        }
    }

    fn dispatch_indirect(&mut self, buffer: &Arc<Buffer<Backend>>, offset: u32) {
        if self.pre_dispatch() {
            self.compute(ComputeCommand::DispatchIndirect {
                buffer: Arc::clone(buffer),
                offset,
            });
        }
    }

    fn update_buffer(&mut self, buffer: &Arc<Buffer<Backend>>, offset: u32, data: &[u8]) -> Result<(), CreationError> {
        let size = data.len() as u32;
        let staging = self.pool.acquire(size, create_native_buffer)?;
        staging.raw().memory.write()[..data.len()].copy_from_slice(data);
        self.copy_buffer_range(&staging, 0, buffer, offset, size);
        self.staging.push(staging);
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
        self.copy_buffer_range(source, source_offset, destination, destination_offset, size);
    }

    fn copy_texture(&mut self, source: &Arc<Texture<Backend>>, destination: &Arc<Texture<Backend>>, copy: &TextureCopy) {
        self.ensure_blit_encoder();
        let (src_desc, dst_desc) = (source.desc(), destination.desc());
        let format = src_desc.format;
        for layer in 0..copy.layer_count {
            let src_layer = copy.src_base_layer + layer;
            let dst_layer = copy.dst_base_layer + layer;
            let src_layout = src_desc.subresource_layout(copy.src_mip_level, src_layer);
            let dst_layout = dst_desc.subresource_layout(copy.dst_mip_level, dst_layer);

            match (source.raw().is_buffer_backed(), destination.raw().is_buffer_backed()) {
                (true, false) => self.blit(BlitCommand::CopyBufferToTexture {
                    source: Arc::clone(source),
                    source_layout: linear_layout(format, &src_layout, copy.src_origin),
                    destination: Arc::clone(destination),
                    mip_level: copy.dst_mip_level,
                    array_layer: dst_layer,
                    origin: copy.dst_origin,
                    extent: copy.extent,
                }),
                (false, true) => self.blit(BlitCommand::CopyTextureToBuffer {
                    source: Arc::clone(source),
                    mip_level: copy.src_mip_level,
                    array_layer: src_layer,
                    origin: copy.src_origin,
                    extent: copy.extent,
                    destination: Arc::clone(destination),
                    destination_layout: linear_layout(format, &dst_layout, copy.dst_origin),
                }),
                (true, true) => {
                    // Two linear buffers: one copy per row of texels or blocks.
                    let edge = format.unit_edge();
                    let row_size = u64::from(format.row_pitch(copy.extent.width));
                    for z in 0..copy.extent.depth {
                        for row in 0..format.num_rows(copy.extent.height) {
                            let at = |origin: Offset| Offset {
                                x: origin.x,
                                y: origin.y + row * edge,
                                z: origin.z + z,
                            };
                            self.blit(BlitCommand::CopyBuffer {
                                source: Resource::Texture(Arc::clone(source)),
                                source_offset: texel_offset(format, &src_layout, at(copy.src_origin)),
                                destination: Resource::Texture(Arc::clone(destination)),
                                destination_offset: texel_offset(format, &dst_layout, at(copy.dst_origin)),
                                size: row_size,
                            });
                        }
                    }
                }
                (false, false) => self.blit(BlitCommand::CopyTexture {
                    source: Arc::clone(source),
                    source_mip_level: copy.src_mip_level,
                    source_layer: src_layer,
                    source_origin: copy.src_origin,
                    destination: Arc::clone(destination),
                    destination_mip_level: copy.dst_mip_level,
                    destination_layer: dst_layer,
                    destination_origin: copy.dst_origin,
                    extent: copy.extent,
                }),
            }
        }
    }

    fn generate_mipmaps(&mut self, texture: &Arc<Texture<Backend>>) {
        self.ensure_blit_encoder();
        self.blit(BlitCommand::GenerateMipmaps(Arc::clone(texture)));
    }

    fn resolve_texture(&mut self, source: &Arc<Texture<Backend>>, destination: &Arc<Texture<Backend>>) {
        let descriptor = RenderPassDescriptor {
            colors: smallvec![ColorAttachment {
                texture: Arc::clone(source),
                mip_level: 0,
                array_layer: 0,
                load: LoadAction::Load,
                store: StoreAction::MultisampleResolve,
                clear_color: [0.0; 4],
                resolve_texture: Some(Arc::clone(destination)),
            }],
            depth: None,
            stencil: None,
        };
        self.begin_resolve_pass(descriptor);
        self.end_current_render_pass();
    }

    fn push_debug_group(&mut self, name: &str) {
        self.debug_groups.push(name.to_owned());
        self.encoder.debug(DebugCommand::PushGroup(name.to_owned()));
    }

    fn pop_debug_group(&mut self) {
        if self.debug_groups.pop().is_some() {
            self.encoder.debug(DebugCommand::PopGroup);
        }
    }

    fn insert_debug_marker(&mut self, name: &str) {
        if !self.encoder.debug(DebugCommand::Signpost(name.to_owned())) {
            self.pending_markers.push(name.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::Kernel;
    use rhi_core::pso::ShaderDescription;
    use rhi_core::{
        AttachmentDescription, BindingResource, BufferDescription, BufferUsage, ComputePipelineDescription, Device,
        DeviceDescription, FramebufferDescription, GraphicPipelineDescription, Handle, OutputDescription, RawDevice,
        ResourceLayoutDescription, ResourceLayoutElement, ResourceSetDescription, SampleCount, TextureDescription,
        TextureUsage,
    };
    use rhi_core::handle::kind;

    fn device() -> Device<Backend> {
        let _ = env_logger::try_init();
        Device::open(DeviceDescription {
            debug: true,
            ..DeviceDescription::default()
        })
        .unwrap()
    }

    fn framebuffer(device: &Device<Backend>) -> Handle<kind::Framebuffer> {
        let factory = device.factory();
        let target = factory
            .create_texture(&TextureDescription::new_2d(
                4,
                4,
                1,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
            ))
            .unwrap();
        factory
            .create_framebuffer(&FramebufferDescription {
                color_targets: vec![AttachmentDescription::new(target)],
                depth_target: None,
            })
            .unwrap()
    }

    fn graphic_pipeline(
        device: &Device<Backend>,
        layouts: Vec<Handle<kind::ResourceLayout>>,
        push_constants: bool,
    ) -> Handle<kind::GraphicPipeline> {
        device
            .factory()
            .create_graphic_pipeline(&GraphicPipelineDescription {
                shaders: vec![
                    ShaderDescription::new(ShaderStages::VERTEX, b"vs"),
                    ShaderDescription::new(ShaderStages::PIXEL, b"ps"),
                ],
                resource_layouts: layouts,
                output: OutputDescription {
                    colors: smallvec![PixelFormat::R8G8B8A8UNorm],
                    ..OutputDescription::default()
                },
                push_constants,
                ..GraphicPipelineDescription::default()
            })
            .unwrap()
    }

    fn constant_set(device: &Device<Backend>) -> (Handle<kind::ResourceLayout>, Handle<kind::ResourceSet>) {
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
        let buffer = factory
            .create_buffer(&BufferDescription::new(256, BufferUsage::CONSTANT), None)
            .unwrap();
        let set = factory
            .create_resource_set(&ResourceSetDescription {
                layout,
                resources: vec![BindingResource::Buffer(buffer)],
            })
            .unwrap();
        (layout, set)
    }

    fn render_passes(list: &CommandList) -> Vec<&RenderPassDescriptor> {
        list.passes()
            .iter()
            .filter_map(|pass| match *pass {
                Pass::Render { ref descriptor, .. } => Some(descriptor),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_table_bases() {
        let first = ResourceLayout::new(&ResourceLayoutDescription {
            elements: vec![
                ResourceLayoutElement::new("a", ResourceKind::ConstantBuffer, ShaderStages::VERTEX),
                ResourceLayoutElement::new("b", ResourceKind::StructuredBufferReadWrite, ShaderStages::PIXEL),
                ResourceLayoutElement::new("c", ResourceKind::TextureReadOnly, ShaderStages::PIXEL),
                ResourceLayoutElement::new("d", ResourceKind::Sampler, ShaderStages::PIXEL),
            ],
        });
        let second = ResourceLayout::new(&ResourceLayoutDescription {
            elements: vec![ResourceLayoutElement::new(
                "e",
                ResourceKind::TextureReadWrite,
                ShaderStages::PIXEL,
            )],
        });
        let layouts = [Arc::new(first), Arc::new(second)];
        assert_eq!(table_bases(&layouts, 0), [0, 0, 0]);
        assert_eq!(table_bases(&layouts, 1), [2, 1, 1]);
        assert_eq!(table_bases(&layouts, 2), [2, 2, 1]);
    }

    #[test]
    fn test_framebuffer_without_clears_records_no_pass() {
        let device = device();
        let framebuffer = framebuffer(&device);
        let mut list = device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(framebuffer).unwrap();
        list.end().unwrap();
        assert!(list.raw().passes().is_empty());
    }

    #[test]
    fn test_pending_clear_becomes_a_load_action() {
        let device = device();
        let framebuffer = framebuffer(&device);
        let mut list = device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(framebuffer).unwrap();
        list.clear_color_target(0, [1.0, 0.0, 0.0, 1.0]).unwrap();
        assert_eq!(list.raw().encoder_state(), EncoderState::None);
        list.end().unwrap();

        let passes = render_passes(list.raw());
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].colors[0].load, LoadAction::Clear);
        assert_eq!(passes[0].colors[0].clear_color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_clear_and_draws_share_one_pass() {
        let device = device();
        let framebuffer = framebuffer(&device);
        let pipeline = graphic_pipeline(&device, Vec::new(), false);
        let mut list = device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(framebuffer).unwrap();
        list.clear_color_target(0, [0.0; 4]).unwrap();
        list.set_graphic_pipeline(pipeline).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        assert_eq!(list.raw().encoder_state(), EncoderState::Render);
        list.draw(3, 1, 3, 0).unwrap();
        list.end().unwrap();

        let passes = render_passes(list.raw());
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].colors[0].load, LoadAction::Clear);
        let draws = match list.raw().passes()[0] {
            Pass::Render { ref commands, .. } => commands
                .iter()
                .filter(|command| match **command {
                    RenderCommand::Draw { .. } => true,
                    _ => false,
                })
                .count(),
            _ => 0,
        };
        assert_eq!(draws, 2);
    }

    #[test]
    fn test_set_activates_once_per_pass() {
        let device = device();
        let framebuffer = framebuffer(&device);
        let (layout, set) = constant_set(&device);
        let pipeline = graphic_pipeline(&device, vec![layout], false);
        let scratch = device
            .factory()
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();

        let mut list = device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(framebuffer).unwrap();
        list.set_graphic_pipeline(pipeline).unwrap();
        list.set_graphic_resource_set(0, set, &[]).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        list.set_graphic_resource_set(0, set, &[]).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        // A blit ends the pass; the next draw has to bind the set again.
        list.update_buffer(scratch, 0, &[0; 16]).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        list.end().unwrap();

        let binds: Vec<usize> = list
            .raw()
            .passes()
            .iter()
            .filter_map(|pass| match *pass {
                Pass::Render { ref commands, .. } => Some(
                    commands
                        .iter()
                        .filter(|command| match **command {
                            RenderCommand::BindBuffer { index: 0, .. } => true,
                            _ => false,
                        })
                        .count(),
                ),
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![1, 1]);
    }

    #[test]
    fn test_push_constants_take_buffer_zero() {
        let device = device();
        let framebuffer = framebuffer(&device);
        let (layout, set) = constant_set(&device);
        let pipeline = graphic_pipeline(&device, vec![layout], true);
        let mut list = device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(framebuffer).unwrap();
        list.set_graphic_pipeline(pipeline).unwrap();
        list.set_graphic_resource_set(0, set, &[]).unwrap();
        list.push_constants(ShaderStages::VERTEX, &[7; 16]).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        list.end().unwrap();

        let commands = match list.raw().passes()[0] {
            Pass::Render { ref commands, .. } => commands,
            ref other => panic!("unexpected {:?}", other),
        };
        assert!(commands.iter().any(|command| match *command {
            RenderCommand::BindBuffer { index, .. } => index == 1,
            _ => false,
        }));
        assert!(commands.iter().any(|command| match *command {
            RenderCommand::BindBufferData {
                index: 0,
                stages,
                ref bytes,
            } => stages == RenderStages::VERTEX && bytes.len() == 16,
            _ => false,
        }));
    }

    #[test]
    fn test_unaligned_copy_uses_the_copy_kernel() {
        let device = device();
        let factory = device.factory();
        let data: Vec<u8> = (0..16).collect();
        let source = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), Some(&data[..]))
            .unwrap();
        let destination = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.copy_buffer(source, 0, destination, 0, 8).unwrap();
        list.copy_buffer(source, 1, destination, 9, 3).unwrap();
        list.end().unwrap();

        let passes = list.raw().passes();
        assert_eq!(passes.len(), 2);
        assert!(matches!(passes[0], Pass::Blit(_)));
        match passes[1] {
            Pass::Compute(ref commands) => assert!(matches!(
                commands[0],
                ComputeCommand::SetComputePipelineState {
                    kernel: Kernel::CopyBuffer,
                    ..
                }
            )),
            ref other => panic!("unexpected {:?}", other),
        }

        device.submit_command_list(&mut list, None).unwrap();
        let raw = device.resource_manager().resolve(destination).unwrap();
        assert_eq!(
            device.raw().read_buffer(&raw, 0, 16),
            vec![0, 1, 2, 3, 4, 5, 6, 7, 0, 1, 2, 3, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_compute_copy_rebinds_the_user_pipeline() {
        let device = device();
        let factory = device.factory();
        let pipeline = factory
            .create_compute_pipeline(&ComputePipelineDescription {
                shader: ShaderDescription::new(ShaderStages::COMPUTE, b"cs"),
                resource_layouts: Vec::new(),
                thread_group_size: [8, 1, 1],
                push_constants: false,
            })
            .unwrap();
        let buffer = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.set_compute_pipeline(pipeline).unwrap();
        list.dispatch(1, 1, 1).unwrap();
        list.update_buffer(buffer, 1, &[1, 2, 3]).unwrap();
        list.dispatch(1, 1, 1).unwrap();
        list.end().unwrap();

        let passes = list.raw().passes();
        assert_eq!(passes.len(), 1);
        let kernels: Vec<Kernel> = match passes[0] {
            Pass::Compute(ref commands) => commands
                .iter()
                .filter_map(|command| match *command {
                    ComputeCommand::SetComputePipelineState { kernel, .. } => Some(kernel),
                    _ => None,
                })
                .collect(),
            ref other => panic!("unexpected {:?}", other),
        };
        assert_eq!(kernels, vec![Kernel::Shader, Kernel::CopyBuffer, Kernel::Shader]);
    }

    #[test]
    fn test_debug_group_waits_for_an_encoder() {
        let device = device();
        let factory = device.factory();
        let texture = factory
            .create_texture(&TextureDescription::new_2d(
                8,
                8,
                4,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::SAMPLED | TextureUsage::GENERATE_MIPMAPS,
            ))
            .unwrap();

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.push_debug_group("Mips").unwrap();
        list.insert_debug_marker("Start").unwrap();
        list.generate_mipmaps(texture).unwrap();
        list.pop_debug_group().unwrap();
        list.end().unwrap();

        match list.raw().passes()[0] {
            Pass::Blit(ref commands) => {
                assert!(matches!(commands[0], BlitCommand::Debug(DebugCommand::PushGroup(ref name)) if name == "Mips"));
                assert!(matches!(commands[1], BlitCommand::Debug(DebugCommand::Signpost(_))));
                assert!(matches!(commands[2], BlitCommand::GenerateMipmaps(_)));
                assert!(matches!(commands[3], BlitCommand::Debug(DebugCommand::PopGroup)));
                assert_eq!(commands.len(), 4);
            }
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resolve_closes_the_open_encoder_after_pending_clears() {
        let device = device();
        let framebuffer = framebuffer(&device);
        let factory = device.factory();
        let mipmapped = factory
            .create_texture(&TextureDescription::new_2d(
                8,
                8,
                4,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::SAMPLED | TextureUsage::GENERATE_MIPMAPS,
            ))
            .unwrap();
        let source = factory
            .create_texture(&TextureDescription {
                sample_count: SampleCount::X4,
                ..TextureDescription::new_2d(4, 4, 1, PixelFormat::R8G8B8A8UNorm, TextureUsage::RENDER_TARGET)
            })
            .unwrap();
        let destination = factory
            .create_texture(&TextureDescription::new_2d(
                4,
                4,
                1,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::SAMPLED,
            ))
            .unwrap();

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.generate_mipmaps(mipmapped).unwrap();
        assert_eq!(list.raw().encoder_state(), EncoderState::Blit);
        list.set_framebuffer(framebuffer).unwrap();
        list.clear_color_target(0, [0.0, 1.0, 0.0, 1.0]).unwrap();
        list.resolve_texture(source, destination).unwrap();
        assert_eq!(list.raw().encoder_state(), EncoderState::None);
        list.end().unwrap();

        let passes = list.raw().passes();
        assert_eq!(passes.len(), 3);
        assert!(matches!(passes[0], Pass::Blit(_)));
        let render = render_passes(list.raw());
        assert_eq!(render.len(), 2);
        assert_eq!(render[0].colors[0].load, LoadAction::Clear);
        assert!(render[0].colors[0].resolve_texture.is_none());
        assert_eq!(render[1].colors[0].store, StoreAction::MultisampleResolve);
        assert!(render[1].colors[0].resolve_texture.is_some());
    }

    #[test]
    fn test_unrenderable_framebuffer_skips_draws() {
        let device = device();
        let factory = device.factory();
        let framebuffer = factory
            .create_framebuffer(&FramebufferDescription {
                color_targets: Vec::new(),
                depth_target: None,
            })
            .unwrap();
        let pipeline = factory
            .create_graphic_pipeline(&GraphicPipelineDescription {
                shaders: vec![ShaderDescription::new(ShaderStages::VERTEX, b"vs")],
                ..GraphicPipelineDescription::default()
            })
            .unwrap();

        let mut list = factory.create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(framebuffer).unwrap();
        list.set_graphic_pipeline(pipeline).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        list.end().unwrap();
        assert!(list.raw().passes().is_empty());
    }
}
