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

//! Command lists: validated, cached recording on top of a backend's [`RawCommandList`].

use crate::buffer::{
    Buffer, BufferUsage, DISPATCH_INDIRECT_COMMAND_SIZE, DRAW_INDEXED_INDIRECT_COMMAND_SIZE,
    DRAW_INDIRECT_COMMAND_SIZE,
};
use crate::factory::CreationError;
use crate::format::{IndexFormat, BLOCK_EDGE};
use crate::framebuffer::Framebuffer;
use crate::handle::{kind, Handle, HandleError};
use crate::manager::{Registered, ResourceManager};
use crate::pso::{
    BoundResource, ComputePipeline, GraphicPipeline, ResourceKind, ResourceSet, ShaderStages,
    MAX_PUSH_CONSTANTS_SIZE,
};
use crate::swapchain::References;
use crate::texture::{Extent, Offset, Texture, TextureDescription, TextureUsage};
use crate::{Backend, Capabilities, Limits, MAX_VERTEX_BUFFERS, MAX_VIEWPORTS};
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle of a command list.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RecordingState {
    /// Created or reset; nothing recorded.
    Initial,
    /// Between `begin` and `end`.
    Recording,
    /// Recorded and ready for submission.
    Ended,
    /// Handed to the device.
    Submitted,
}

/// Identity of a command list, weakly referenced by swapchains it renders into.
#[derive(Debug)]
pub struct CommandListToken {
    id: u64,
}

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

impl CommandListToken {
    /// A fresh, unique identity.
    pub fn new() -> Self {
        CommandListToken {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Unique id of the command list.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for CommandListToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A viewport transform.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Covers `width × height` with the depth range `0..1`.
    pub fn full(width: u32, height: u32) -> Self {
        Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// A scissor rectangle.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A texture-to-texture region copy, forwarded to the backend.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TextureCopy {
    pub src_origin: Offset,
    pub src_mip_level: u32,
    pub src_base_layer: u32,
    pub dst_origin: Offset,
    pub dst_mip_level: u32,
    pub dst_base_layer: u32,
    pub extent: Extent,
    pub layer_count: u32,
}

impl TextureCopy {
    /// Every layer of mip `level`, origin to origin.
    pub fn whole_mip(desc: &TextureDescription, level: u32) -> Self {
        TextureCopy {
            src_origin: Offset::ZERO,
            src_mip_level: level,
            src_base_layer: 0,
            dst_origin: Offset::ZERO,
            dst_mip_level: level,
            dst_base_layer: 0,
            extent: desc.mip_extent(level),
            layer_count: desc.effective_layers(),
        }
    }
}

/// A recording precondition that does not hold.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// The operation is not allowed in the current state.
    #[error("`{operation}` is not allowed while the command list is {state:?}")]
    InvalidRecordingState {
        /// Rejected operation.
        operation: &'static str,
        /// State at the time of the call.
        state: RecordingState,
    },
    #[allow(missing_docs)]
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[allow(missing_docs)]
    #[error(transparent)]
    Creation(#[from] CreationError),
    #[allow(missing_docs)]
    #[error("no framebuffer is set")]
    NoFramebuffer,
    #[allow(missing_docs)]
    #[error("the framebuffer has no depth-stencil target")]
    NoDepthTarget,
    #[allow(missing_docs)]
    #[error("no graphic pipeline is set")]
    NoGraphicPipeline,
    #[allow(missing_docs)]
    #[error("no compute pipeline is set")]
    NoComputePipeline,
    /// The graphic pipeline renders to different formats than the framebuffer provides.
    #[error("the pipeline output description does not match the framebuffer")]
    OutputMismatch,
    #[allow(missing_docs)]
    #[error("no index buffer is set")]
    NoIndexBuffer,
    /// A device capability the call relies on is missing.
    #[error("the device does not support `{0}`")]
    MissingCapability(&'static str),
    /// A resource was not created with the usage the call relies on.
    #[error("the {resource} was not created with {usage} usage")]
    MissingUsage {
        #[allow(missing_docs)]
        resource: &'static str,
        #[allow(missing_docs)]
        usage: &'static str,
    },
    #[allow(missing_docs)]
    #[error("{what} ({value}) is not a multiple of {alignment}")]
    Misaligned {
        what: &'static str,
        value: u32,
        alignment: u32,
    },
    /// A byte or texel range ends past the end of its resource.
    #[error("{what} ends at {end}, past the limit of {limit}")]
    OutOfBounds {
        #[allow(missing_docs)]
        what: &'static str,
        #[allow(missing_docs)]
        end: u64,
        #[allow(missing_docs)]
        limit: u64,
    },
    #[allow(missing_docs)]
    #[error("{what} {index} is out of range (count {count})")]
    IndexOutOfRange {
        what: &'static str,
        index: u32,
        count: u32,
    },
    #[allow(missing_docs)]
    #[error("indirect stride {stride} is smaller than the {min} byte command")]
    InvalidStride { stride: u32, min: u32 },
    /// The set's layout differs from the pipeline's layout at that slot.
    #[error("resource set layout does not match the pipeline layout at slot {slot}")]
    LayoutMismatch {
        #[allow(missing_docs)]
        slot: u32,
    },
    #[allow(missing_docs)]
    #[error("expected {expected} dynamic offset(s), got {got}")]
    DynamicOffsetCount { expected: u32, got: u32 },
    #[allow(missing_docs)]
    #[error("push constants rejected: {0}")]
    PushConstants(&'static str),
    #[allow(missing_docs)]
    #[error("incompatible textures: {0}")]
    IncompatibleTextures(&'static str),
    #[allow(missing_docs)]
    #[error("the copy region is empty")]
    EmptyRegion,
    #[allow(missing_docs)]
    #[error("pop_debug_group without a matching push")]
    DebugGroupUnderflow,
}

/// Native recording interface of a backend.
///
/// Every call has already been validated and filtered for redundancy by [`CommandList`].
pub trait RawCommandList<B: Backend>: Send {
    /// Start recording, dropping whatever a previous recording produced.
    fn begin(&mut self);
    /// Finalize the recording into something submittable.
    fn end(&mut self);
    /// Discard recorded work and held staging buffers.
    fn reset(&mut self);
    /// Forget cached framebuffer, pipelines and index buffer.
    fn clear_cached_state(&mut self);

    #[allow(missing_docs)]
    fn set_framebuffer(&mut self, framebuffer: &Arc<Framebuffer<B>>);
    #[allow(missing_docs)]
    fn set_viewport(&mut self, index: u32, viewport: &Viewport);
    #[allow(missing_docs)]
    fn set_scissor_rect(&mut self, index: u32, rect: &Rect);
    #[allow(missing_docs)]
    fn set_graphic_pipeline(&mut self, pipeline: &Arc<GraphicPipeline<B>>);
    #[allow(missing_docs)]
    fn set_compute_pipeline(&mut self, pipeline: &Arc<ComputePipeline<B>>);
    #[allow(missing_docs)]
    fn set_vertex_buffer(&mut self, index: u32, buffer: &Arc<Buffer<B>>, offset: u32);
    #[allow(missing_docs)]
    fn set_index_buffer(&mut self, buffer: &Arc<Buffer<B>>, format: IndexFormat, offset: u32);
    #[allow(missing_docs)]
    fn set_graphic_resource_set(&mut self, slot: u32, set: &Arc<ResourceSet<B>>, dynamic_offsets: &[u32]);
    #[allow(missing_docs)]
    fn set_compute_resource_set(&mut self, slot: u32, set: &Arc<ResourceSet<B>>, dynamic_offsets: &[u32]);
    /// Store push constant data for the given stages.
    fn push_constants(&mut self, stages: ShaderStages, data: &[u8]);

    #[allow(missing_docs)]
    fn clear_color_target(&mut self, index: u32, color: [f32; 4]);
    #[allow(missing_docs)]
    fn clear_depth_stencil_target(&mut self, depth: f32, stencil: u8);

    #[allow(missing_docs)]
    fn draw(&mut self, vertex_count: u32, instance_count: u32, vertex_start: u32, instance_start: u32);
    #[allow(missing_docs)]
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        index_start: u32,
        vertex_offset: i32,
        instance_start: u32,
    );
    #[allow(missing_docs)]
    fn draw_indirect(&mut self, buffer: &Arc<Buffer<B>>, offset: u32, draw_count: u32, stride: u32);
    #[allow(missing_docs)]
    fn draw_indexed_indirect(&mut self, buffer: &Arc<Buffer<B>>, offset: u32, draw_count: u32, stride: u32);
    #[allow(missing_docs)]
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    #[allow(missing_docs)]
    fn dispatch_indirect(&mut self, buffer: &Arc<Buffer<B>>, offset: u32);

    /// Write `data` into `buffer` at `offset`, in command order.
    fn update_buffer(&mut self, buffer: &Arc<Buffer<B>>, offset: u32, data: &[u8]) -> Result<(), CreationError>;
    #[allow(missing_docs)]
    fn copy_buffer(
        &mut self,
        source: &Arc<Buffer<B>>,
        source_offset: u32,
        destination: &Arc<Buffer<B>>,
        destination_offset: u32,
        size: u32,
    );
    /// Copy one region, across `copy.layer_count` layers.
    fn copy_texture(&mut self, source: &Arc<Texture<B>>, destination: &Arc<Texture<B>>, copy: &TextureCopy);
    #[allow(missing_docs)]
    fn generate_mipmaps(&mut self, texture: &Arc<Texture<B>>);
    #[allow(missing_docs)]
    fn resolve_texture(&mut self, source: &Arc<Texture<B>>, destination: &Arc<Texture<B>>);

    #[allow(missing_docs)]
    fn push_debug_group(&mut self, name: &str);
    #[allow(missing_docs)]
    fn pop_debug_group(&mut self);
    #[allow(missing_docs)]
    fn insert_debug_marker(&mut self, name: &str);
}

struct Bound<K, T> {
    handle: Handle<K>,
    object: Arc<T>,
}

struct BoundSet<B: Backend> {
    handle: Handle<kind::ResourceSet>,
    offsets: SmallVec<[u32; 4]>,
    _set: Arc<ResourceSet<B>>,
}

#[derive(Clone, Copy, PartialEq)]
struct IndexBinding {
    handle: Handle<kind::Buffer>,
    format: IndexFormat,
    offset: u32,
}

/// State mirrored on the CPU to validate calls and drop redundant binds.
struct StateCache<B: Backend> {
    framebuffer: Option<Bound<kind::Framebuffer, Framebuffer<B>>>,
    graphic_pipeline: Option<Bound<kind::GraphicPipeline, GraphicPipeline<B>>>,
    compute_pipeline: Option<Bound<kind::ComputePipeline, ComputePipeline<B>>>,
    index_buffer: Option<(IndexBinding, Arc<Buffer<B>>)>,
    vertex_buffers: [Option<(Handle<kind::Buffer>, u32)>; MAX_VERTEX_BUFFERS],
    graphic_sets: SmallVec<[Option<BoundSet<B>>; 4]>,
    compute_sets: SmallVec<[Option<BoundSet<B>>; 4]>,
    viewports: SmallVec<[Viewport; MAX_VIEWPORTS]>,
    scissor_rects: SmallVec<[Rect; MAX_VIEWPORTS]>,
}

impl<B: Backend> StateCache<B> {
    fn new() -> Self {
        StateCache {
            framebuffer: None,
            graphic_pipeline: None,
            compute_pipeline: None,
            index_buffer: None,
            vertex_buffers: [None; MAX_VERTEX_BUFFERS],
            graphic_sets: SmallVec::new(),
            compute_sets: SmallVec::new(),
            viewports: SmallVec::new(),
            scissor_rects: SmallVec::new(),
        }
    }
}

/// Check a condition, turning a failure into a reported [`CommandError`].
macro_rules! ensure {
    ($list:ident, $cond:expr, $error:expr) => {
        if !$cond {
            return Err($list.fail($error));
        }
    };
}

fn round_up(value: u64, multiple: u64) -> u64 {
    (value + multiple - 1) / multiple * multiple
}

/// A recorded sequence of GPU work, submitted through a [`Device`](crate::Device).
///
/// Every recording call validates its preconditions. A violation is logged and returned; on a
/// device created with `debug` enabled it also panics, so mistakes surface where they are made.
/// Calls that would not change the bound state never reach the backend.
pub struct CommandList<B: Backend> {
    handle: Handle<kind::CommandList>,
    token: Arc<CommandListToken>,
    state: RecordingState,
    debug: bool,
    capabilities: Capabilities,
    limits: Limits,
    manager: Arc<ResourceManager<B>>,
    cache: StateCache<B>,
    swapchains: Vec<Arc<References>>,
    debug_groups: u32,
    raw: B::CommandList,
}

impl<B: Backend> fmt::Debug for CommandList<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CommandList")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish()
    }
}

impl<B: Backend> Drop for CommandList<B> {
    fn drop(&mut self) {
        let _ = self.manager.release(self.handle);
    }
}

impl<B: Backend> CommandList<B> {
    pub(crate) fn new(
        handle: Handle<kind::CommandList>,
        token: Arc<CommandListToken>,
        raw: B::CommandList,
        manager: Arc<ResourceManager<B>>,
        capabilities: Capabilities,
        limits: Limits,
        debug: bool,
    ) -> Self {
        CommandList {
            handle,
            token,
            state: RecordingState::Initial,
            debug,
            capabilities,
            limits,
            manager,
            cache: StateCache::new(),
            swapchains: Vec::new(),
            debug_groups: 0,
            raw,
        }
    }

    /// Registry handle of this list.
    pub fn handle(&self) -> Handle<kind::CommandList> {
        self.handle
    }

    /// Identity shared with swapchains and completion callbacks.
    pub fn token(&self) -> &Arc<CommandListToken> {
        &self.token
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Native recorder.
    pub fn raw(&self) -> &B::CommandList {
        &self.raw
    }

    /// Native recorder, mutably.
    pub fn raw_mut(&mut self) -> &mut B::CommandList {
        &mut self.raw
    }

    /// Currently bound framebuffer.
    pub fn framebuffer(&self) -> Option<Handle<kind::Framebuffer>> {
        self.cache.framebuffer.as_ref().map(|bound| bound.handle)
    }

    /// Currently bound graphic pipeline.
    pub fn graphic_pipeline(&self) -> Option<Handle<kind::GraphicPipeline>> {
        self.cache.graphic_pipeline.as_ref().map(|bound| bound.handle)
    }

    /// Currently bound compute pipeline.
    pub fn compute_pipeline(&self) -> Option<Handle<kind::ComputePipeline>> {
        self.cache.compute_pipeline.as_ref().map(|bound| bound.handle)
    }

    /// Current viewport at `index`.
    pub fn viewport(&self, index: u32) -> Option<Viewport> {
        self.cache.viewports.get(index as usize).cloned()
    }

    /// Current scissor rect at `index`.
    pub fn scissor_rect(&self, index: u32) -> Option<Rect> {
        self.cache.scissor_rects.get(index as usize).cloned()
    }

    fn fail(&self, error: CommandError) -> CommandError {
        error!("Command list {:?}: {}", self.handle, error);
        if self.debug {
            panic!("{}", error);
        }
        error
    }

    fn recording(&self, operation: &'static str) -> Result<(), CommandError> {
        ensure!(
            self,
            self.state == RecordingState::Recording,
            CommandError::InvalidRecordingState {
                operation,
                state: self.state,
            }
        );
        Ok(())
    }

    fn resolve<K: Registered<B>>(&self, handle: Handle<K>) -> Result<Arc<K::Object>, CommandError> {
        self.manager
            .resolve(handle)
            .map_err(|error| self.fail(error.into()))
    }

    fn bound_framebuffer(&self) -> Result<&Arc<Framebuffer<B>>, CommandError> {
        match self.cache.framebuffer {
            Some(ref bound) => Ok(&bound.object),
            None => Err(self.fail(CommandError::NoFramebuffer)),
        }
    }

    /// Start recording. Clears every cached binding.
    pub fn begin(&mut self) -> Result<(), CommandError> {
        ensure!(
            self,
            self.state != RecordingState::Recording,
            CommandError::InvalidRecordingState {
                operation: "begin",
                state: self.state,
            }
        );
        self.cache = StateCache::new();
        self.debug_groups = 0;
        self.raw.begin();
        self.state = RecordingState::Recording;
        Ok(())
    }

    /// Finish recording.
    pub fn end(&mut self) -> Result<(), CommandError> {
        self.recording("end")?;
        if self.debug_groups != 0 {
            warn!("Command list {:?} ended with {} open debug group(s)", self.handle, self.debug_groups);
        }
        self.raw.end();
        self.state = RecordingState::Ended;
        Ok(())
    }

    /// Return to the initial state from any state, discarding recorded work.
    pub fn reset(&mut self) {
        self.raw.reset();
        self.cache = StateCache::new();
        self.debug_groups = 0;
        if self.state != RecordingState::Submitted {
            for references in self.swapchains.drain(..) {
                references.unregister(&self.token);
            }
        }
        self.swapchains.clear();
        self.state = RecordingState::Initial;
    }

    /// Hand the swapchain back-references over to a submission.
    pub(crate) fn begin_submission(&mut self) -> Result<Vec<Arc<References>>, RecordingState> {
        if self.state != RecordingState::Ended {
            return Err(self.state);
        }
        Ok(std::mem::replace(&mut self.swapchains, Vec::new()))
    }

    /// Take back the swapchain back-references of a submission the backend refused.
    pub(crate) fn cancel_submission(&mut self, swapchains: Vec<Arc<References>>) {
        self.swapchains = swapchains;
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.state = RecordingState::Submitted;
    }

    /// Forget every binding, so the next set of each piece of state reaches the backend.
    pub fn clear_cached_state(&mut self) -> Result<(), CommandError> {
        self.recording("clear_cached_state")?;
        self.cache = StateCache::new();
        self.raw.clear_cached_state();
        Ok(())
    }

    /// Bind the render targets of subsequent draws and clears.
    ///
    /// Binding a new framebuffer resets the viewport and scissor rect of every color target
    /// to cover the whole framebuffer.
    pub fn set_framebuffer(&mut self, handle: Handle<kind::Framebuffer>) -> Result<(), CommandError> {
        self.recording("set_framebuffer")?;
        let framebuffer = self.resolve(handle)?;
        if self.framebuffer() == Some(handle) {
            return Ok(());
        }
        if let Some(references) = framebuffer.swapchain() {
            references.register(&self.token);
            if !self.swapchains.iter().any(|r| Arc::ptr_eq(r, references)) {
                self.swapchains.push(Arc::clone(references));
            }
        }
        self.raw.set_framebuffer(&framebuffer);

        let count = framebuffer.color_targets().len().max(1);
        let full_viewport = Viewport::full(framebuffer.width(), framebuffer.height());
        let full_rect = Rect {
            x: 0,
            y: 0,
            width: framebuffer.width(),
            height: framebuffer.height(),
        };
        self.cache.framebuffer = Some(Bound {
            handle,
            object: framebuffer,
        });
        self.cache.viewports = SmallVec::from_elem(full_viewport, count);
        self.cache.scissor_rects = SmallVec::from_elem(full_rect, count);
        for index in 0..count as u32 {
            self.raw.set_viewport(index, &full_viewport);
            self.raw.set_scissor_rect(index, &full_rect);
        }
        Ok(())
    }

    fn check_viewport_index(&self, index: u32) -> Result<(), CommandError> {
        ensure!(
            self,
            (index as usize) < MAX_VIEWPORTS,
            CommandError::IndexOutOfRange {
                what: "viewport",
                index,
                count: MAX_VIEWPORTS as u32,
            }
        );
        ensure!(
            self,
            index == 0 || self.capabilities.multiple_viewports,
            CommandError::MissingCapability("multiple_viewports")
        );
        Ok(())
    }

    /// Set the viewport at `index`.
    pub fn set_viewport(&mut self, index: u32, viewport: Viewport) -> Result<(), CommandError> {
        self.recording("set_viewport")?;
        self.check_viewport_index(index)?;
        let slot = index as usize;
        if self.cache.viewports.len() <= slot {
            self.cache.viewports.resize(slot + 1, Viewport::full(0, 0));
        }
        self.cache.viewports[slot] = viewport;
        self.raw.set_viewport(index, &viewport);
        Ok(())
    }

    /// Cover the whole framebuffer with the viewport at `index`.
    pub fn set_full_viewport(&mut self, index: u32) -> Result<(), CommandError> {
        self.recording("set_full_viewport")?;
        let framebuffer = self.bound_framebuffer()?;
        let viewport = Viewport::full(framebuffer.width(), framebuffer.height());
        self.set_viewport(index, viewport)
    }

    /// Cover the whole framebuffer with the viewport of every color target.
    pub fn set_full_viewports(&mut self) -> Result<(), CommandError> {
        self.recording("set_full_viewports")?;
        let count = self.bound_framebuffer()?.color_targets().len().max(1) as u32;
        for index in 0..count {
            self.set_full_viewport(index)?;
        }
        Ok(())
    }

    /// Set the scissor rect at `index`.
    pub fn set_scissor_rect(&mut self, index: u32, rect: Rect) -> Result<(), CommandError> {
        self.recording("set_scissor_rect")?;
        self.check_viewport_index(index)?;
        let slot = index as usize;
        if self.cache.scissor_rects.len() <= slot {
            self.cache.scissor_rects.resize(slot + 1, Rect::default());
        }
        self.cache.scissor_rects[slot] = rect;
        self.raw.set_scissor_rect(index, &rect);
        Ok(())
    }

    /// Cover the whole framebuffer with the scissor rect at `index`.
    pub fn set_full_scissor_rect(&mut self, index: u32) -> Result<(), CommandError> {
        self.recording("set_full_scissor_rect")?;
        let framebuffer = self.bound_framebuffer()?;
        let rect = Rect {
            x: 0,
            y: 0,
            width: framebuffer.width(),
            height: framebuffer.height(),
        };
        self.set_scissor_rect(index, rect)
    }

    /// Cover the whole framebuffer with the scissor rect of every color target.
    pub fn set_full_scissor_rects(&mut self) -> Result<(), CommandError> {
        self.recording("set_full_scissor_rects")?;
        let count = self.bound_framebuffer()?.color_targets().len().max(1) as u32;
        for index in 0..count {
            self.set_full_scissor_rect(index)?;
        }
        Ok(())
    }

    /// Bind the pipeline of subsequent draws. Resource set bindings are dropped on change.
    pub fn set_graphic_pipeline(&mut self, handle: Handle<kind::GraphicPipeline>) -> Result<(), CommandError> {
        self.recording("set_graphic_pipeline")?;
        let pipeline = self.resolve(handle)?;
        if self.graphic_pipeline() == Some(handle) {
            return Ok(());
        }
        self.raw.set_graphic_pipeline(&pipeline);
        self.cache.graphic_sets.clear();
        self.cache.graphic_sets.resize_with(pipeline.layouts().len(), || None);
        self.cache.graphic_pipeline = Some(Bound {
            handle,
            object: pipeline,
        });
        Ok(())
    }

    /// Bind the pipeline of subsequent dispatches. Resource set bindings are dropped on change.
    pub fn set_compute_pipeline(&mut self, handle: Handle<kind::ComputePipeline>) -> Result<(), CommandError> {
        self.recording("set_compute_pipeline")?;
        ensure!(
            self,
            self.capabilities.compute_shader,
            CommandError::MissingCapability("compute_shader")
        );
        let pipeline = self.resolve(handle)?;
        if self.compute_pipeline() == Some(handle) {
            return Ok(());
        }
        self.raw.set_compute_pipeline(&pipeline);
        self.cache.compute_sets.clear();
        self.cache.compute_sets.resize_with(pipeline.layouts().len(), || None);
        self.cache.compute_pipeline = Some(Bound {
            handle,
            object: pipeline,
        });
        Ok(())
    }

    /// Bind a vertex buffer at `index`.
    pub fn set_vertex_buffer(&mut self, index: u32, handle: Handle<kind::Buffer>, offset: u32) -> Result<(), CommandError> {
        self.recording("set_vertex_buffer")?;
        ensure!(
            self,
            (index as usize) < MAX_VERTEX_BUFFERS,
            CommandError::IndexOutOfRange {
                what: "vertex buffer",
                index,
                count: MAX_VERTEX_BUFFERS as u32,
            }
        );
        let buffer = self.resolve(handle)?;
        ensure!(
            self,
            buffer.usage().contains(BufferUsage::VERTEX),
            CommandError::MissingUsage {
                resource: "vertex buffer",
                usage: "VERTEX",
            }
        );
        ensure!(
            self,
            offset <= buffer.size(),
            CommandError::OutOfBounds {
                what: "vertex buffer offset",
                end: offset as u64,
                limit: buffer.size() as u64,
            }
        );
        if self.cache.vertex_buffers[index as usize] == Some((handle, offset)) {
            return Ok(());
        }
        self.cache.vertex_buffers[index as usize] = Some((handle, offset));
        self.raw.set_vertex_buffer(index, &buffer, offset);
        Ok(())
    }

    /// Bind the index buffer of subsequent indexed draws.
    pub fn set_index_buffer(
        &mut self,
        handle: Handle<kind::Buffer>,
        format: IndexFormat,
        offset: u32,
    ) -> Result<(), CommandError> {
        self.recording("set_index_buffer")?;
        let buffer = self.resolve(handle)?;
        ensure!(
            self,
            buffer.usage().contains(BufferUsage::INDEX),
            CommandError::MissingUsage {
                resource: "index buffer",
                usage: "INDEX",
            }
        );
        ensure!(
            self,
            offset % format.size_in_bytes() == 0,
            CommandError::Misaligned {
                what: "index buffer offset",
                value: offset,
                alignment: format.size_in_bytes(),
            }
        );
        let binding = IndexBinding { handle, format, offset };
        if self.cache.index_buffer.as_ref().map(|&(b, _)| b) == Some(binding) {
            return Ok(());
        }
        self.raw.set_index_buffer(&buffer, format, offset);
        self.cache.index_buffer = Some((binding, buffer));
        Ok(())
    }

    fn check_resource_set(
        &self,
        layouts: &[Arc<crate::pso::ResourceLayout>],
        slot: u32,
        set: &ResourceSet<B>,
        dynamic_offsets: &[u32],
    ) -> Result<(), CommandError> {
        let expected = match layouts.get(slot as usize) {
            Some(layout) => layout,
            None => {
                return Err(self.fail(CommandError::IndexOutOfRange {
                    what: "resource set slot",
                    index: slot,
                    count: layouts.len() as u32,
                }))
            }
        };
        ensure!(
            self,
            set.layout().is_compatible(expected),
            CommandError::LayoutMismatch { slot }
        );
        ensure!(
            self,
            dynamic_offsets.len() as u32 == set.layout().dynamic_count(),
            CommandError::DynamicOffsetCount {
                expected: set.layout().dynamic_count(),
                got: dynamic_offsets.len() as u32,
            }
        );

        let dynamic = set
            .layout()
            .elements()
            .iter()
            .zip(set.resources())
            .filter(|&(element, _)| element.dynamic);
        for ((element, resource), &offset) in dynamic.zip(dynamic_offsets) {
            let alignment = if element.kind == ResourceKind::ConstantBuffer {
                self.limits.constant_buffer_min_offset_alignment
            } else {
                self.limits.structured_buffer_min_offset_alignment
            };
            ensure!(
                self,
                offset % alignment == 0,
                CommandError::Misaligned {
                    what: "dynamic offset",
                    value: offset,
                    alignment,
                }
            );
            if let BoundResource::Buffer(ref range) = *resource {
                let end = range.offset as u64 + offset as u64 + range.size as u64;
                ensure!(
                    self,
                    end <= range.buffer.size() as u64,
                    CommandError::OutOfBounds {
                        what: "dynamic buffer range",
                        end,
                        limit: range.buffer.size() as u64,
                    }
                );
            }
        }
        Ok(())
    }

    /// Bind a resource set at `slot` of the graphic pipeline.
    ///
    /// Rebinding the set already bound at `slot` with the same offsets is a no-op.
    pub fn set_graphic_resource_set(
        &mut self,
        slot: u32,
        handle: Handle<kind::ResourceSet>,
        dynamic_offsets: &[u32],
    ) -> Result<(), CommandError> {
        self.recording("set_graphic_resource_set")?;
        let set = self.resolve(handle)?;
        let pipeline = match self.cache.graphic_pipeline {
            Some(ref bound) => Arc::clone(&bound.object),
            None => return Err(self.fail(CommandError::NoGraphicPipeline)),
        };
        self.check_resource_set(pipeline.layouts(), slot, &set, dynamic_offsets)?;

        let cached = &mut self.cache.graphic_sets[slot as usize];
        if let Some(ref bound) = *cached {
            if bound.handle == handle && bound.offsets.as_slice() == dynamic_offsets {
                return Ok(());
            }
        }
        *cached = Some(BoundSet {
            handle,
            offsets: SmallVec::from_slice(dynamic_offsets),
            _set: Arc::clone(&set),
        });
        self.raw.set_graphic_resource_set(slot, &set, dynamic_offsets);
        Ok(())
    }

    /// Bind a resource set at `slot` of the compute pipeline.
    ///
    /// Rebinding the set already bound at `slot` with the same offsets is a no-op.
    pub fn set_compute_resource_set(
        &mut self,
        slot: u32,
        handle: Handle<kind::ResourceSet>,
        dynamic_offsets: &[u32],
    ) -> Result<(), CommandError> {
        self.recording("set_compute_resource_set")?;
        let set = self.resolve(handle)?;
        let pipeline = match self.cache.compute_pipeline {
            Some(ref bound) => Arc::clone(&bound.object),
            None => return Err(self.fail(CommandError::NoComputePipeline)),
        };
        self.check_resource_set(pipeline.layouts(), slot, &set, dynamic_offsets)?;

        let cached = &mut self.cache.compute_sets[slot as usize];
        if let Some(ref bound) = *cached {
            if bound.handle == handle && bound.offsets.as_slice() == dynamic_offsets {
                return Ok(());
            }
        }
        *cached = Some(BoundSet {
            handle,
            offsets: SmallVec::from_slice(dynamic_offsets),
            _set: Arc::clone(&set),
        });
        self.raw.set_compute_resource_set(slot, &set, dynamic_offsets);
        Ok(())
    }

    /// Upload up to 128 bytes of constants for the given stages.
    pub fn push_constants(&mut self, stages: ShaderStages, data: &[u8]) -> Result<(), CommandError> {
        self.recording("push_constants")?;
        ensure!(
            self,
            data.len() <= MAX_PUSH_CONSTANTS_SIZE,
            CommandError::PushConstants("more than 128 bytes")
        );
        ensure!(
            self,
            data.len() % 4 == 0,
            CommandError::PushConstants("size is not a multiple of 4")
        );
        if stages.contains(ShaderStages::COMPUTE) {
            let supported = self
                .cache
                .compute_pipeline
                .as_ref()
                .map(|bound| bound.object.supports_push_constants());
            ensure!(self, supported.is_some(), CommandError::NoComputePipeline);
            ensure!(
                self,
                supported == Some(true),
                CommandError::PushConstants("the compute pipeline does not use push constants")
            );
        }
        if stages.intersects(ShaderStages::GRAPHICS) {
            let supported = self
                .cache
                .graphic_pipeline
                .as_ref()
                .map(|bound| bound.object.supports_push_constants());
            ensure!(self, supported.is_some(), CommandError::NoGraphicPipeline);
            ensure!(
                self,
                supported == Some(true),
                CommandError::PushConstants("the graphic pipeline does not use push constants")
            );
        }
        self.raw.push_constants(stages, data);
        Ok(())
    }

    /// Clear color target `index` of the bound framebuffer.
    pub fn clear_color_target(&mut self, index: u32, color: [f32; 4]) -> Result<(), CommandError> {
        self.recording("clear_color_target")?;
        let count = self.bound_framebuffer()?.color_targets().len() as u32;
        ensure!(
            self,
            index < count,
            CommandError::IndexOutOfRange {
                what: "color target",
                index,
                count,
            }
        );
        self.raw.clear_color_target(index, color);
        Ok(())
    }

    /// Clear the depth-stencil target of the bound framebuffer.
    pub fn clear_depth_stencil_target(&mut self, depth: f32, stencil: u8) -> Result<(), CommandError> {
        self.recording("clear_depth_stencil_target")?;
        let has_depth = self.bound_framebuffer()?.depth_target().is_some();
        ensure!(self, has_depth, CommandError::NoDepthTarget);
        self.raw.clear_depth_stencil_target(depth, stencil);
        Ok(())
    }

    fn check_draw_state(&self) -> Result<(), CommandError> {
        let pipeline = match self.cache.graphic_pipeline {
            Some(ref bound) => &bound.object,
            None => return Err(self.fail(CommandError::NoGraphicPipeline)),
        };
        let framebuffer = self.bound_framebuffer()?;
        ensure!(
            self,
            pipeline.output() == framebuffer.output(),
            CommandError::OutputMismatch
        );
        Ok(())
    }

    /// Draw non-indexed primitives.
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        vertex_start: u32,
        instance_start: u32,
    ) -> Result<(), CommandError> {
        self.recording("draw")?;
        self.check_draw_state()?;
        ensure!(
            self,
            instance_start == 0 || self.capabilities.draw_base_instance,
            CommandError::MissingCapability("draw_base_instance")
        );
        self.raw.draw(vertex_count, instance_count, vertex_start, instance_start);
        Ok(())
    }

    /// Draw indexed primitives from the bound index buffer.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        index_start: u32,
        vertex_offset: i32,
        instance_start: u32,
    ) -> Result<(), CommandError> {
        self.recording("draw_indexed")?;
        self.check_draw_state()?;
        let (binding, size) = match self.cache.index_buffer {
            Some((binding, ref buffer)) => (binding, buffer.size()),
            None => return Err(self.fail(CommandError::NoIndexBuffer)),
        };
        let end = binding.offset as u64
            + (index_start as u64 + index_count as u64) * binding.format.size_in_bytes() as u64;
        ensure!(
            self,
            end <= size as u64,
            CommandError::OutOfBounds {
                what: "indexed draw",
                end,
                limit: size as u64,
            }
        );
        ensure!(
            self,
            vertex_offset == 0 || self.capabilities.draw_base_vertex,
            CommandError::MissingCapability("draw_base_vertex")
        );
        ensure!(
            self,
            instance_start == 0 || self.capabilities.draw_base_instance,
            CommandError::MissingCapability("draw_base_instance")
        );
        self.raw
            .draw_indexed(index_count, instance_count, index_start, vertex_offset, instance_start);
        Ok(())
    }

    fn check_indirect(
        &self,
        buffer: &Buffer<B>,
        offset: u32,
        draw_count: u32,
        stride: u32,
        command_size: u32,
    ) -> Result<(), CommandError> {
        ensure!(
            self,
            self.capabilities.draw_indirect,
            CommandError::MissingCapability("draw_indirect")
        );
        ensure!(
            self,
            buffer.usage().contains(BufferUsage::INDIRECT),
            CommandError::MissingUsage {
                resource: "indirect buffer",
                usage: "INDIRECT",
            }
        );
        ensure!(
            self,
            offset % 4 == 0,
            CommandError::Misaligned {
                what: "indirect offset",
                value: offset,
                alignment: 4,
            }
        );
        ensure!(
            self,
            stride % 4 == 0,
            CommandError::Misaligned {
                what: "indirect stride",
                value: stride,
                alignment: 4,
            }
        );
        ensure!(
            self,
            stride >= command_size,
            CommandError::InvalidStride {
                stride,
                min: command_size,
            }
        );
        if draw_count > 0 {
            let end = offset as u64 + stride as u64 * (draw_count as u64 - 1) + command_size as u64;
            ensure!(
                self,
                end <= buffer.size() as u64,
                CommandError::OutOfBounds {
                    what: "indirect arguments",
                    end,
                    limit: buffer.size() as u64,
                }
            );
        }
        Ok(())
    }

    /// Draw `draw_count` non-indexed draws whose arguments live in `buffer`.
    pub fn draw_indirect(
        &mut self,
        handle: Handle<kind::Buffer>,
        offset: u32,
        draw_count: u32,
        stride: u32,
    ) -> Result<(), CommandError> {
        self.recording("draw_indirect")?;
        self.check_draw_state()?;
        let buffer = self.resolve(handle)?;
        self.check_indirect(&buffer, offset, draw_count, stride, DRAW_INDIRECT_COMMAND_SIZE)?;
        self.raw.draw_indirect(&buffer, offset, draw_count, stride);
        Ok(())
    }

    /// Draw `draw_count` indexed draws whose arguments live in `buffer`.
    pub fn draw_indexed_indirect(
        &mut self,
        handle: Handle<kind::Buffer>,
        offset: u32,
        draw_count: u32,
        stride: u32,
    ) -> Result<(), CommandError> {
        self.recording("draw_indexed_indirect")?;
        self.check_draw_state()?;
        ensure!(self, self.cache.index_buffer.is_some(), CommandError::NoIndexBuffer);
        let buffer = self.resolve(handle)?;
        self.check_indirect(&buffer, offset, draw_count, stride, DRAW_INDEXED_INDIRECT_COMMAND_SIZE)?;
        self.raw.draw_indexed_indirect(&buffer, offset, draw_count, stride);
        Ok(())
    }

    /// Dispatch compute work groups.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), CommandError> {
        self.recording("dispatch")?;
        ensure!(self, self.cache.compute_pipeline.is_some(), CommandError::NoComputePipeline);
        self.raw.dispatch(x, y, z);
        Ok(())
    }

    /// Dispatch compute work groups whose counts live in `buffer`.
    pub fn dispatch_indirect(&mut self, handle: Handle<kind::Buffer>, offset: u32) -> Result<(), CommandError> {
        self.recording("dispatch_indirect")?;
        ensure!(self, self.cache.compute_pipeline.is_some(), CommandError::NoComputePipeline);
        let buffer = self.resolve(handle)?;
        ensure!(
            self,
            buffer.usage().contains(BufferUsage::INDIRECT),
            CommandError::MissingUsage {
                resource: "indirect buffer",
                usage: "INDIRECT",
            }
        );
        ensure!(
            self,
            offset % 4 == 0,
            CommandError::Misaligned {
                what: "indirect offset",
                value: offset,
                alignment: 4,
            }
        );
        let end = offset as u64 + DISPATCH_INDIRECT_COMMAND_SIZE as u64;
        ensure!(
            self,
            end <= buffer.size() as u64,
            CommandError::OutOfBounds {
                what: "dispatch arguments",
                end,
                limit: buffer.size() as u64,
            }
        );
        self.raw.dispatch_indirect(&buffer, offset);
        Ok(())
    }

    /// Write `data` into the buffer at `offset` when the list executes.
    ///
    /// Empty updates succeed without recording anything.
    pub fn update_buffer(&mut self, handle: Handle<kind::Buffer>, offset: u32, data: &[u8]) -> Result<(), CommandError> {
        self.recording("update_buffer")?;
        let buffer = self.resolve(handle)?;
        if data.is_empty() {
            return Ok(());
        }
        let end = offset as u64 + data.len() as u64;
        ensure!(
            self,
            end <= buffer.size() as u64,
            CommandError::OutOfBounds {
                what: "buffer update",
                end,
                limit: buffer.size() as u64,
            }
        );
        self.raw
            .update_buffer(&buffer, offset, data)
            .map_err(|error| self.fail(error.into()))
    }

    /// Copy `size` bytes between buffers. Empty copies succeed without recording anything.
    pub fn copy_buffer(
        &mut self,
        source: Handle<kind::Buffer>,
        source_offset: u32,
        destination: Handle<kind::Buffer>,
        destination_offset: u32,
        size: u32,
    ) -> Result<(), CommandError> {
        self.recording("copy_buffer")?;
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        if size == 0 {
            return Ok(());
        }
        let src_end = source_offset as u64 + size as u64;
        ensure!(
            self,
            src_end <= src.size() as u64,
            CommandError::OutOfBounds {
                what: "copy source",
                end: src_end,
                limit: src.size() as u64,
            }
        );
        let dst_end = destination_offset as u64 + size as u64;
        ensure!(
            self,
            dst_end <= dst.size() as u64,
            CommandError::OutOfBounds {
                what: "copy destination",
                end: dst_end,
                limit: dst.size() as u64,
            }
        );
        self.raw.copy_buffer(&src, source_offset, &dst, destination_offset, size);
        Ok(())
    }

    fn check_same_shape(&self, src: &TextureDescription, dst: &TextureDescription) -> Result<(), CommandError> {
        ensure!(
            self,
            src.effective_layers() == dst.effective_layers(),
            CommandError::IncompatibleTextures("layer counts differ")
        );
        ensure!(
            self,
            src.mip_count == dst.mip_count,
            CommandError::IncompatibleTextures("mip counts differ")
        );
        ensure!(
            self,
            src.sample_count == dst.sample_count,
            CommandError::IncompatibleTextures("sample counts differ")
        );
        ensure!(
            self,
            src.width == dst.width && src.height == dst.height && src.depth == dst.depth,
            CommandError::IncompatibleTextures("dimensions differ")
        );
        ensure!(
            self,
            src.format == dst.format,
            CommandError::IncompatibleTextures("formats differ")
        );
        Ok(())
    }

    /// Copy every subresource of `source` into `destination`.
    pub fn copy_texture(
        &mut self,
        source: Handle<kind::Texture>,
        destination: Handle<kind::Texture>,
    ) -> Result<(), CommandError> {
        self.recording("copy_texture")?;
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        self.check_same_shape(src.desc(), dst.desc())?;
        for level in 0..src.desc().mip_count {
            let copy = TextureCopy::whole_mip(src.desc(), level);
            self.raw.copy_texture(&src, &dst, &copy);
        }
        Ok(())
    }

    /// Copy one subresource of `source` into the same subresource of `destination`.
    pub fn copy_texture_subresource(
        &mut self,
        source: Handle<kind::Texture>,
        destination: Handle<kind::Texture>,
        mip_level: u32,
        array_layer: u32,
    ) -> Result<(), CommandError> {
        self.recording("copy_texture_subresource")?;
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        self.check_same_shape(src.desc(), dst.desc())?;
        ensure!(
            self,
            mip_level < src.desc().mip_count,
            CommandError::IndexOutOfRange {
                what: "mip level",
                index: mip_level,
                count: src.desc().mip_count,
            }
        );
        ensure!(
            self,
            array_layer < src.desc().effective_layers(),
            CommandError::IndexOutOfRange {
                what: "array layer",
                index: array_layer,
                count: src.desc().effective_layers(),
            }
        );
        let copy = TextureCopy {
            src_base_layer: array_layer,
            dst_base_layer: array_layer,
            layer_count: 1,
            ..TextureCopy::whole_mip(src.desc(), mip_level)
        };
        self.raw.copy_texture(&src, &dst, &copy);
        Ok(())
    }

    fn check_region(
        &self,
        desc: &TextureDescription,
        origin: Offset,
        mip_level: u32,
        base_layer: u32,
        copy: &TextureCopy,
        names: [&'static str; 3],
    ) -> Result<(), CommandError> {
        ensure!(
            self,
            mip_level < desc.mip_count,
            CommandError::IndexOutOfRange {
                what: "mip level",
                index: mip_level,
                count: desc.mip_count,
            }
        );
        let layer_end = base_layer as u64 + copy.layer_count as u64;
        ensure!(
            self,
            layer_end <= desc.effective_layers() as u64,
            CommandError::OutOfBounds {
                what: "copied layers",
                end: layer_end,
                limit: desc.effective_layers() as u64,
            }
        );
        let mip = desc.mip_extent(mip_level);
        let edge = u64::from(desc.format.unit_edge());
        let axes = [
            (names[0], origin.x, copy.extent.width, mip.width, edge),
            (names[1], origin.y, copy.extent.height, mip.height, edge),
            (names[2], origin.z, copy.extent.depth, mip.depth, 1),
        ];
        for &(what, start, size, limit, edge) in &axes {
            let end = u64::from(start) + u64::from(size);
            let limit = round_up(u64::from(limit), edge);
            ensure!(self, round_up(end, edge) <= limit, CommandError::OutOfBounds { what, end, limit });
        }
        Ok(())
    }

    /// Copy an explicit region between textures.
    pub fn copy_texture_region(
        &mut self,
        source: Handle<kind::Texture>,
        destination: Handle<kind::Texture>,
        copy: &TextureCopy,
    ) -> Result<(), CommandError> {
        self.recording("copy_texture_region")?;
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        ensure!(
            self,
            copy.extent.width != 0 && copy.extent.height != 0 && copy.extent.depth != 0 && copy.layer_count != 0,
            CommandError::EmptyRegion
        );
        let (src_desc, dst_desc) = (src.desc(), dst.desc());
        ensure!(
            self,
            src_desc.format.unit_size_in_bytes() == dst_desc.format.unit_size_in_bytes()
                && src_desc.format.unit_edge() == dst_desc.format.unit_edge(),
            CommandError::IncompatibleTextures("block sizes differ")
        );
        ensure!(
            self,
            src_desc.sample_count == dst_desc.sample_count,
            CommandError::IncompatibleTextures("sample counts differ")
        );
        self.check_region(
            src_desc,
            copy.src_origin,
            copy.src_mip_level,
            copy.src_base_layer,
            copy,
            ["copy source region x", "copy source region y", "copy source region z"],
        )?;
        self.check_region(
            dst_desc,
            copy.dst_origin,
            copy.dst_mip_level,
            copy.dst_base_layer,
            copy,
            ["copy destination region x", "copy destination region y", "copy destination region z"],
        )?;
        if src_desc.format.is_compressed() {
            let aligned = |offset: Offset| offset.x % BLOCK_EDGE == 0 && offset.y % BLOCK_EDGE == 0;
            ensure!(
                self,
                aligned(copy.src_origin) && aligned(copy.dst_origin),
                CommandError::Misaligned {
                    what: "compressed copy origin",
                    value: copy.src_origin.x.max(copy.dst_origin.x),
                    alignment: BLOCK_EDGE,
                }
            );
        }
        self.raw.copy_texture(&src, &dst, copy);
        Ok(())
    }

    /// Regenerate every mip below the top level.
    ///
    /// Textures with a single mip level are left untouched.
    pub fn generate_mipmaps(&mut self, handle: Handle<kind::Texture>) -> Result<(), CommandError> {
        self.recording("generate_mipmaps")?;
        let texture = self.resolve(handle)?;
        if texture.desc().mip_count <= 1 {
            return Ok(());
        }
        ensure!(
            self,
            texture.desc().usage.contains(TextureUsage::GENERATE_MIPMAPS),
            CommandError::MissingUsage {
                resource: "texture",
                usage: "GENERATE_MIPMAPS",
            }
        );
        self.raw.generate_mipmaps(&texture);
        Ok(())
    }

    /// Resolve a multisampled texture into a single-sampled one.
    pub fn resolve_texture(
        &mut self,
        source: Handle<kind::Texture>,
        destination: Handle<kind::Texture>,
    ) -> Result<(), CommandError> {
        self.recording("resolve_texture")?;
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        ensure!(
            self,
            src.desc().is_multisampled(),
            CommandError::IncompatibleTextures("the resolve source is not multisampled")
        );
        ensure!(
            self,
            !dst.desc().is_multisampled(),
            CommandError::IncompatibleTextures("the resolve destination is multisampled")
        );
        ensure!(
            self,
            src.desc().format == dst.desc().format,
            CommandError::IncompatibleTextures("formats differ")
        );
        ensure!(
            self,
            src.desc().width == dst.desc().width && src.desc().height == dst.desc().height,
            CommandError::IncompatibleTextures("dimensions differ")
        );
        self.raw.resolve_texture(&src, &dst);
        Ok(())
    }

    /// Open a named debug group.
    pub fn push_debug_group(&mut self, name: &str) -> Result<(), CommandError> {
        self.recording("push_debug_group")?;
        self.debug_groups += 1;
        if self.capabilities.command_list_debug_markers {
            self.raw.push_debug_group(name);
        }
        Ok(())
    }

    /// Close the innermost debug group.
    pub fn pop_debug_group(&mut self) -> Result<(), CommandError> {
        self.recording("pop_debug_group")?;
        ensure!(self, self.debug_groups > 0, CommandError::DebugGroupUnderflow);
        self.debug_groups -= 1;
        if self.capabilities.command_list_debug_markers {
            self.raw.pop_debug_group();
        }
        Ok(())
    }

    /// Insert a single named marker.
    pub fn insert_debug_marker(&mut self, name: &str) -> Result<(), CommandError> {
        self.recording("insert_debug_marker")?;
        if self.capabilities.command_list_debug_markers {
            self.raw.insert_debug_marker(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferDescription;
    use crate::device::{Device, DeviceDescription};
    use crate::dummy::{DummyBackend, DummyCall};
    use crate::format::PixelFormat;
    use crate::framebuffer::{AttachmentDescription, FramebufferDescription};
    use crate::pso::{
        BindingResource, GraphicPipelineDescription, OutputDescription, ResourceLayoutDescription,
        ResourceLayoutElement, ResourceSetDescription, ShaderDescription,
    };
    use crate::texture::TextureDescription;

    struct Fixture {
        device: Device<DummyBackend>,
        framebuffer: Handle<kind::Framebuffer>,
        pipeline: Handle<kind::GraphicPipeline>,
        set: Handle<kind::ResourceSet>,
    }

    fn output() -> OutputDescription {
        OutputDescription {
            depth: None,
            colors: smallvec::smallvec![PixelFormat::R8G8B8A8UNorm],
            sample_count: crate::texture::SampleCount::X1,
        }
    }

    fn fixture(debug: bool) -> Fixture {
        let device = Device::open(DeviceDescription {
            debug,
            ..DeviceDescription::default()
        })
        .unwrap();
        let factory = device.factory();
        let color = factory
            .create_texture(&TextureDescription::new_2d(
                64,
                32,
                1,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::RENDER_TARGET,
            ))
            .unwrap();
        let framebuffer = factory
            .create_framebuffer(&FramebufferDescription {
                color_targets: vec![AttachmentDescription::new(color)],
                depth_target: None,
            })
            .unwrap();
        let layout = factory
            .create_resource_layout(&ResourceLayoutDescription {
                elements: vec![ResourceLayoutElement::new(
                    "Object",
                    ResourceKind::ConstantBuffer,
                    ShaderStages::VERTEX,
                )
                .with_dynamic_offset()],
            })
            .unwrap();
        let pipeline = factory
            .create_graphic_pipeline(&GraphicPipelineDescription {
                shaders: vec![ShaderDescription::new(ShaderStages::VERTEX, b"vs")],
                resource_layouts: vec![layout],
                output: output(),
                push_constants: true,
                ..GraphicPipelineDescription::default()
            })
            .unwrap();
        let constants = factory
            .create_buffer(&BufferDescription::new(1024, BufferUsage::CONSTANT), None)
            .unwrap();
        let set = factory
            .create_resource_set(&ResourceSetDescription {
                layout,
                resources: vec![BindingResource::BufferRange {
                    buffer: constants,
                    offset: 0,
                    size: 256,
                }],
            })
            .unwrap();
        Fixture {
            device,
            framebuffer,
            pipeline,
            set,
        }
    }

    fn recording(fixture: &Fixture) -> CommandList<DummyBackend> {
        let mut list = fixture.device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(fixture.framebuffer).unwrap();
        list.set_graphic_pipeline(fixture.pipeline).unwrap();
        list
    }

    #[test]
    fn test_recording_state_machine() {
        let fixture = fixture(false);
        let mut list = fixture.device.factory().create_command_list().unwrap();
        assert_eq!(
            list.draw(3, 1, 0, 0),
            Err(CommandError::InvalidRecordingState {
                operation: "draw",
                state: RecordingState::Initial,
            })
        );
        assert!(list.end().is_err());
        list.begin().unwrap();
        assert!(list.begin().is_err());
        list.end().unwrap();
        assert!(list.end().is_err());
        fixture.device.submit_command_list(&mut list, None).unwrap();
        assert_eq!(list.state(), RecordingState::Submitted);
        list.begin().unwrap();
        list.reset();
        assert_eq!(list.state(), RecordingState::Initial);
        assert!(list.raw().calls().is_empty());
    }

    #[test]
    fn test_framebuffer_sets_full_viewports() {
        let fixture = fixture(false);
        let mut list = recording(&fixture);
        list.set_framebuffer(fixture.framebuffer).unwrap();
        let raw = list.raw();
        assert_eq!(raw.count(|call| *call == DummyCall::SetFramebuffer), 1);
        assert_eq!(
            raw.count(|call| *call == DummyCall::SetViewport(0, Viewport::full(64, 32))),
            1
        );
        assert_eq!(
            list.scissor_rect(0),
            Some(Rect {
                x: 0,
                y: 0,
                width: 64,
                height: 32,
            })
        );
        assert!(list.set_viewport(MAX_VIEWPORTS as u32, Viewport::full(1, 1)).is_err());
    }

    #[test]
    fn test_redundant_set_bind_is_dropped() {
        let fixture = fixture(false);
        let mut list = recording(&fixture);
        let binds = |list: &CommandList<DummyBackend>| {
            list.raw()
                .count(|call| matches!(call, DummyCall::SetGraphicResourceSet { slot: 0, .. }))
        };
        list.set_graphic_resource_set(0, fixture.set, &[0]).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        list.set_graphic_resource_set(0, fixture.set, &[0]).unwrap();
        list.draw(3, 1, 0, 0).unwrap();
        assert_eq!(binds(&list), 1);

        list.set_graphic_resource_set(0, fixture.set, &[256]).unwrap();
        assert_eq!(binds(&list), 2);

        // rebinding the same pipeline keeps the sets
        list.set_graphic_pipeline(fixture.pipeline).unwrap();
        list.set_graphic_resource_set(0, fixture.set, &[256]).unwrap();
        assert_eq!(binds(&list), 2);
        assert_eq!(list.raw().count(|call| *call == DummyCall::SetGraphicPipeline), 1);
    }

    #[test]
    fn test_cleared_state_rebinds_everything() {
        let fixture = fixture(false);
        let mut list = recording(&fixture);
        let vertices = fixture
            .device
            .factory()
            .create_buffer(&BufferDescription::new(64, BufferUsage::VERTEX), None)
            .unwrap();
        let vertex_binds = |list: &CommandList<DummyBackend>| {
            list.raw()
                .count(|call| matches!(call, DummyCall::SetVertexBuffer { index: 0, .. }))
        };
        list.set_vertex_buffer(0, vertices, 0).unwrap();
        list.set_vertex_buffer(0, vertices, 0).unwrap();
        assert_eq!(vertex_binds(&list), 1);

        list.clear_cached_state().unwrap();
        assert_eq!(list.viewport(0), None);
        assert_eq!(list.scissor_rect(0), None);
        list.set_vertex_buffer(0, vertices, 0).unwrap();
        assert_eq!(vertex_binds(&list), 2);

        list.set_framebuffer(fixture.framebuffer).unwrap();
        list.set_graphic_pipeline(fixture.pipeline).unwrap();
        assert_eq!(list.raw().count(|call| *call == DummyCall::SetFramebuffer), 2);
        assert_eq!(list.raw().count(|call| *call == DummyCall::SetGraphicPipeline), 2);
    }

    #[test]
    fn test_resource_set_validation() {
        let fixture = fixture(false);
        let mut list = recording(&fixture);
        assert_eq!(
            list.set_graphic_resource_set(0, fixture.set, &[]),
            Err(CommandError::DynamicOffsetCount { expected: 1, got: 0 })
        );
        assert!(matches!(
            list.set_graphic_resource_set(0, fixture.set, &[16]),
            Err(CommandError::Misaligned { alignment: 256, .. })
        ));
        assert!(matches!(
            list.set_graphic_resource_set(0, fixture.set, &[1024]),
            Err(CommandError::OutOfBounds { .. })
        ));
        assert!(matches!(
            list.set_graphic_resource_set(1, fixture.set, &[0]),
            Err(CommandError::IndexOutOfRange { .. })
        ));
        assert_eq!(
            list.set_compute_resource_set(0, fixture.set, &[0]),
            Err(CommandError::NoComputePipeline)
        );
    }

    #[test]
    fn test_undersized_index_buffer() {
        let fixture = fixture(false);
        let factory = fixture.device.factory();
        let indices = factory
            .create_buffer(&BufferDescription::new(12, BufferUsage::INDEX), None)
            .unwrap();
        let mut list = recording(&fixture);
        assert_eq!(list.draw_indexed(3, 1, 0, 0, 0), Err(CommandError::NoIndexBuffer));
        list.set_index_buffer(indices, IndexFormat::U16, 0).unwrap();
        list.draw_indexed(6, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            list.draw_indexed(4, 1, 0, 0, 0),
            Ok(())
        ));
        assert_eq!(
            list.draw_indexed(7, 1, 0, 0, 0),
            Err(CommandError::OutOfBounds {
                what: "indexed draw",
                end: 14,
                limit: 12,
            })
        );
        list.set_index_buffer(indices, IndexFormat::U32, 0).unwrap();
        assert!(list.draw_indexed(6, 1, 0, 0, 0).is_err());
        assert_eq!(
            list.raw().count(|call| matches!(call, DummyCall::DrawIndexed { .. })),
            2
        );
    }

    #[test]
    fn test_index_buffer_bind_is_cached() {
        let fixture = fixture(false);
        let indices = fixture
            .device
            .factory()
            .create_buffer(&BufferDescription::new(64, BufferUsage::INDEX), None)
            .unwrap();
        let mut list = recording(&fixture);
        list.set_index_buffer(indices, IndexFormat::U16, 0).unwrap();
        list.set_index_buffer(indices, IndexFormat::U16, 0).unwrap();
        list.set_index_buffer(indices, IndexFormat::U16, 2).unwrap();
        list.set_index_buffer(indices, IndexFormat::U32, 4).unwrap();
        assert_eq!(
            list.raw().count(|call| matches!(call, DummyCall::SetIndexBuffer { .. })),
            3
        );
        assert!(list.set_index_buffer(indices, IndexFormat::U32, 2).is_err());
    }

    #[test]
    fn test_draw_requires_matching_output() {
        let fixture = fixture(false);
        let factory = fixture.device.factory();
        let depth_only = factory
            .create_graphic_pipeline(&GraphicPipelineDescription {
                shaders: vec![ShaderDescription::new(ShaderStages::VERTEX, b"vs")],
                output: OutputDescription {
                    depth: Some(PixelFormat::D32Float),
                    ..OutputDescription::default()
                },
                ..GraphicPipelineDescription::default()
            })
            .unwrap();
        let mut list = fixture.device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_graphic_pipeline(depth_only).unwrap();
        assert_eq!(list.draw(3, 1, 0, 0), Err(CommandError::NoFramebuffer));
        list.set_framebuffer(fixture.framebuffer).unwrap();
        assert_eq!(list.draw(3, 1, 0, 0), Err(CommandError::OutputMismatch));
        assert_eq!(list.clear_depth_stencil_target(1.0, 0), Err(CommandError::NoDepthTarget));
        assert!(list.clear_color_target(1, [0.0; 4]).is_err());
        list.clear_color_target(0, [0.0; 4]).unwrap();
    }

    #[test]
    fn test_push_constant_rules() {
        let fixture = fixture(false);
        let mut list = recording(&fixture);
        list.push_constants(ShaderStages::VERTEX, &[0; 64]).unwrap();
        assert!(list.push_constants(ShaderStages::VERTEX, &[0; 132]).is_err());
        assert!(list.push_constants(ShaderStages::VERTEX, &[0; 6]).is_err());
        assert_eq!(
            list.push_constants(ShaderStages::COMPUTE, &[0; 4]),
            Err(CommandError::NoComputePipeline)
        );
        assert_eq!(
            list.raw()
                .count(|call| matches!(call, DummyCall::PushConstants { size: 64, .. })),
            1
        );
    }

    #[test]
    fn test_indirect_validation() {
        let fixture = fixture(false);
        let args = fixture
            .device
            .factory()
            .create_buffer(&BufferDescription::new(64, BufferUsage::INDIRECT), None)
            .unwrap();
        let mut list = recording(&fixture);
        list.draw_indirect(args, 0, 4, 16).unwrap();
        assert!(matches!(
            list.draw_indirect(args, 0, 5, 16),
            Err(CommandError::OutOfBounds { end: 80, .. })
        ));
        assert_eq!(
            list.draw_indirect(args, 0, 2, 8),
            Err(CommandError::InvalidStride { stride: 8, min: 16 })
        );
        assert!(list.draw_indirect(args, 2, 1, 16).is_err());
        assert_eq!(list.dispatch_indirect(args, 0), Err(CommandError::NoComputePipeline));
    }

    #[test]
    fn test_transfers_skip_empty_work() {
        let fixture = fixture(false);
        let factory = fixture.device.factory();
        let buffer = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();
        let texture = factory
            .create_texture(&TextureDescription::new_2d(
                256,
                256,
                1,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::SAMPLED,
            ))
            .unwrap();
        let mut list = fixture.device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.update_buffer(buffer, 0, &[]).unwrap();
        list.copy_buffer(buffer, 0, buffer, 8, 0).unwrap();
        list.generate_mipmaps(texture).unwrap();
        assert_eq!(list.raw().calls(), &[DummyCall::Begin]);
        assert!(list.update_buffer(buffer, 12, &[0; 8]).is_err());
        assert!(list.copy_buffer(buffer, 8, buffer, 0, 9).is_err());
    }

    #[test]
    fn test_whole_texture_copy_walks_mips() {
        let fixture = fixture(false);
        let factory = fixture.device.factory();
        let desc = TextureDescription {
            array_layers: 3,
            ..TextureDescription::new_2d(16, 8, 3, PixelFormat::R8G8B8A8UNorm, TextureUsage::SAMPLED)
        };
        let src = factory.create_texture(&desc).unwrap();
        let dst = factory.create_texture(&desc).unwrap();
        let other = factory
            .create_texture(&TextureDescription { mip_count: 2, ..desc.clone() })
            .unwrap();
        let mut list = fixture.device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.copy_texture(src, dst).unwrap();
        assert!(list.copy_texture(src, other).is_err());
        let copies: Vec<_> = list
            .raw()
            .calls()
            .iter()
            .filter_map(|call| match *call {
                DummyCall::CopyTexture(copy) => Some(copy),
                _ => None,
            })
            .collect();
        assert_eq!(copies.len(), 3);
        assert_eq!(copies[2].extent, Extent { width: 4, height: 2, depth: 1 });
        assert!(copies.iter().all(|copy| copy.layer_count == 3));

        list.copy_texture_subresource(src, dst, 1, 2).unwrap();
        assert!(list.copy_texture_subresource(src, dst, 3, 0).is_err());
    }

    #[test]
    fn test_region_copy_validation() {
        let fixture = fixture(false);
        let factory = fixture.device.factory();
        let compressed = TextureDescription::new_2d(10, 10, 1, PixelFormat::Bc1RgbaUNorm, TextureUsage::SAMPLED);
        let src = factory.create_texture(&compressed).unwrap();
        let dst = factory.create_texture(&compressed).unwrap();
        let rgba = factory
            .create_texture(&TextureDescription::new_2d(
                10,
                10,
                1,
                PixelFormat::R8G8B8A8UNorm,
                TextureUsage::SAMPLED,
            ))
            .unwrap();
        let mut list = fixture.device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        let region = TextureCopy {
            src_origin: Offset { x: 8, y: 8, z: 0 },
            dst_origin: Offset::ZERO,
            extent: Extent { width: 4, height: 4, depth: 1 },
            ..TextureCopy::whole_mip(&compressed, 0)
        };
        // the 2 texel tail rounds up to a whole block
        list.copy_texture_region(src, dst, &region).unwrap();
        let past = TextureCopy {
            src_origin: Offset { x: 12, y: 0, z: 0 },
            ..region
        };
        assert!(list.copy_texture_region(src, dst, &past).is_err());
        let empty = TextureCopy {
            layer_count: 0,
            ..region
        };
        assert_eq!(list.copy_texture_region(src, dst, &empty), Err(CommandError::EmptyRegion));
        assert!(matches!(
            list.copy_texture_region(src, rgba, &region),
            Err(CommandError::IncompatibleTextures(_))
        ));

        let rgba_desc = TextureDescription::new_2d(10, 10, 1, PixelFormat::R8G8B8A8UNorm, TextureUsage::SAMPLED);
        let far = TextureCopy {
            src_origin: Offset { x: 0, y: u32::MAX, z: 0 },
            ..TextureCopy::whole_mip(&rgba_desc, 0)
        };
        assert_eq!(
            list.copy_texture_region(rgba, rgba, &far),
            Err(CommandError::OutOfBounds {
                what: "copy source region y",
                end: u64::from(u32::MAX) + 10,
                limit: 10,
            })
        );
        let far = TextureCopy {
            dst_origin: Offset { x: 0, y: 0, z: u32::MAX },
            ..TextureCopy::whole_mip(&rgba_desc, 0)
        };
        assert_eq!(
            list.copy_texture_region(rgba, rgba, &far),
            Err(CommandError::OutOfBounds {
                what: "copy destination region z",
                end: u64::from(u32::MAX) + 1,
                limit: 1,
            })
        );
    }

    #[test]
    fn test_debug_groups() {
        let fixture = fixture(false);
        let mut list = fixture.device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        assert_eq!(list.pop_debug_group(), Err(CommandError::DebugGroupUnderflow));
        list.push_debug_group("Shadows").unwrap();
        list.insert_debug_marker("Cascade 0").unwrap();
        list.pop_debug_group().unwrap();
        assert_eq!(
            &list.raw().calls()[1..],
            &[
                DummyCall::PushDebugGroup("Shadows".into()),
                DummyCall::InsertDebugMarker("Cascade 0".into()),
                DummyCall::PopDebugGroup,
            ]
        );
    }

    #[test]
    fn test_stale_handles_are_rejected() {
        let fixture = fixture(false);
        let factory = fixture.device.factory();
        let buffer = factory
            .create_buffer(&BufferDescription::new(16, BufferUsage::VERTEX), None)
            .unwrap();
        factory.destroy(buffer).unwrap();
        let mut list = recording(&fixture);
        assert!(matches!(
            list.set_vertex_buffer(0, buffer, 0),
            Err(CommandError::Handle(HandleError::Stale { .. }))
        ));
    }

    #[test]
    fn test_swapchain_references_follow_submission() {
        let device = Device::<DummyBackend>::open(DeviceDescription {
            debug: false,
            has_main_swapchain: true,
            ..DeviceDescription::default()
        })
        .unwrap();
        let swapchain = device
            .resource_manager()
            .resolve(device.main_swapchain().unwrap())
            .unwrap();
        let mut list = device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(swapchain.framebuffer()).unwrap();
        assert_eq!(swapchain.references().count(), 1);
        list.end().unwrap();
        device.submit_command_list(&mut list, None).unwrap();
        assert_eq!(swapchain.references().count(), 0);
    }

    #[test]
    #[should_panic(expected = "no graphic pipeline is set")]
    fn test_debug_device_panics() {
        let fixture = fixture(true);
        let mut list = fixture.device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        let _ = list.draw(3, 1, 0, 0);
    }
}
