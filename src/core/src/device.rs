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

//! The device: resource ownership, submission, synchronization and CPU access.

use crate::buffer::{Buffer, BufferDescription, BufferUsage, DrawIndexedIndirectCommand, DrawIndirectCommand};
use crate::command::{CommandError, CommandList, CommandListToken, RecordingState};
use crate::factory::{CreationError, ResourceFactory};
use crate::fence::{self, Fence};
use crate::format::PixelFormat;
use crate::framebuffer::Attachment;
use crate::handle::{kind, Handle, HandleError};
use crate::manager::ResourceManager;
use crate::pso::{ComputePipelineDescription, GraphicPipelineDescription, ResourceLayout};
use crate::sampler::SamplerDescription;
use crate::staging::StagingBufferPool;
use crate::swapchain::{References, Swapchain, SwapchainDescription};
use crate::texture::{SampleCount, Texture, TextureDescription, TextureRegion, TextureUsage, TextureViewDescription};
use crate::{Backend, Capabilities, Limits};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt, ops};

/// Native API family of a backend.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Api {
    /// A single immediate context replaying deferred command lists.
    Immediate,
    /// Command buffers recorded through short-lived pass encoders.
    Encoder,
    /// The recording test backend.
    Dummy,
}

/// Version of the native API.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Description of the adapter a device runs on.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct HardwareInfo {
    /// Adapter name.
    pub name: String,
    /// PCI vendor id.
    pub vendor: u32,
    /// PCI device id.
    pub device_id: u32,
    /// Dedicated video memory in bytes.
    pub video_memory: u64,
}

/// Parameters of a device.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceDescription {
    /// Panic on command list validation failures instead of only returning them.
    pub debug: bool,
    /// Name of the adapter to open. `None` picks the default one.
    pub adapter: Option<String>,
    /// Whether the device owns a swapchain from the start.
    pub has_main_swapchain: bool,
    /// Parameters of the main swapchain.
    pub swapchain: SwapchainDescription,
    #[allow(missing_docs)]
    pub prefer_depth_range_zero_to_one: bool,
    #[allow(missing_docs)]
    pub prefer_standard_clip_space_y_direction: bool,
}

impl Default for DeviceDescription {
    fn default() -> Self {
        DeviceDescription {
            debug: cfg!(debug_assertions),
            adapter: None,
            has_main_swapchain: false,
            swapchain: SwapchainDescription::default(),
            prefer_depth_range_zero_to_one: true,
            prefer_standard_clip_space_y_direction: true,
        }
    }
}

/// Device-level failures.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DeviceError {
    /// The requested adapter does not exist.
    #[error("adapter `{0}` is not available")]
    AdapterUnavailable(String),
    #[allow(missing_docs)]
    #[error("invalid device description: {0}")]
    InvalidDescription(&'static str),
    /// A CPU update does not fit its resource.
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
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[allow(missing_docs)]
    #[error(transparent)]
    Creation(#[from] CreationError),
    #[allow(missing_docs)]
    #[error(transparent)]
    Command(#[from] CommandError),
    #[allow(missing_docs)]
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Failures of [`Device::submit_command_list`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SubmitError {
    /// Only ended lists can be submitted.
    #[error("the command list is {0:?}, not Ended")]
    NotEnded(RecordingState),
    #[allow(missing_docs)]
    #[error(transparent)]
    Handle(#[from] HandleError),
    /// The native queue refused the work.
    #[error("the queue rejected the submission: {0}")]
    Rejected(String),
}

/// CPU access mode of a mapping.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MapAccess {
    /// Read back GPU results. Staging resources only.
    Read,
    /// Overwrite the contents. Staging or dynamic resources.
    Write,
    /// Read, then write back. Staging resources only.
    ReadWrite,
}

impl MapAccess {
    fn reads(self) -> bool {
        self != MapAccess::Write
    }

    fn writes(self) -> bool {
        self != MapAccess::Read
    }
}

/// Resource addressed by a mapping.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MapTarget {
    Buffer(Handle<kind::Buffer>),
    Texture(Handle<kind::Texture>),
}

impl From<Handle<kind::Buffer>> for MapTarget {
    fn from(handle: Handle<kind::Buffer>) -> Self {
        MapTarget::Buffer(handle)
    }
}

impl From<Handle<kind::Texture>> for MapTarget {
    fn from(handle: Handle<kind::Texture>) -> Self {
        MapTarget::Texture(handle)
    }
}

/// Failures of [`Device::map`] and [`Device::unmap`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum MapError {
    /// The resource usage does not allow the access mode.
    #[error("{access:?} access needs a {needed} resource")]
    IncompatibleAccess {
        #[allow(missing_docs)]
        access: MapAccess,
        #[allow(missing_docs)]
        needed: &'static str,
    },
    /// The subresource is already mapped with another access mode.
    #[error("subresource {subresource} is already mapped for {current:?} access")]
    AlreadyMapped {
        #[allow(missing_docs)]
        subresource: u32,
        #[allow(missing_docs)]
        current: MapAccess,
    },
    #[allow(missing_docs)]
    #[error("the subresource is not mapped")]
    NotMapped,
    #[allow(missing_docs)]
    #[error("subresource {subresource} is out of range (count {count})")]
    SubresourceOutOfRange { subresource: u32, count: u32 },
    #[allow(missing_docs)]
    #[error(transparent)]
    Handle(#[from] HandleError),
}

enum MappedObject<B: Backend> {
    Buffer(Arc<Buffer<B>>),
    Texture(Arc<Texture<B>>, u32, u32),
}

/// CPU copy of a mapped subresource. Hand it back to [`Device::unmap`] to write it back.
pub struct MappedResource<B: Backend> {
    target: MapTarget,
    access: MapAccess,
    subresource: u32,
    row_pitch: u32,
    depth_pitch: u32,
    data: Vec<u8>,
    object: MappedObject<B>,
}

impl<B: Backend> fmt::Debug for MappedResource<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MappedResource")
            .field("target", &self.target)
            .field("access", &self.access)
            .field("subresource", &self.subresource)
            .field("size", &self.data.len())
            .finish()
    }
}

impl<B: Backend> MappedResource<B> {
    #[allow(missing_docs)]
    pub fn target(&self) -> MapTarget {
        self.target
    }

    #[allow(missing_docs)]
    pub fn access(&self) -> MapAccess {
        self.access
    }

    #[allow(missing_docs)]
    pub fn subresource(&self) -> u32 {
        self.subresource
    }

    /// Bytes between rows. Equals the size for buffers.
    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }

    /// Bytes between depth slices. Equals the size for buffers.
    pub fn depth_pitch(&self) -> u32 {
        self.depth_pitch
    }

    /// Writable contents.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl<B: Backend> ops::Deref for MappedResource<B> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Clone, Copy, Debug)]
struct MapEntry {
    access: MapAccess,
    count: u32,
}

/// Everything a backend has to finish once a submission has executed.
///
/// Consumed by [`complete`](Completion::complete), which returns the staging buffers to the
/// pool, drops the swapchain back-references of the list and raises the fence.
pub struct Completion<B: Backend> {
    token: Arc<CommandListToken>,
    staging: Vec<Arc<Buffer<B>>>,
    pool: Arc<StagingBufferPool<B>>,
    swapchains: Vec<Arc<References>>,
    fence: Arc<Fence>,
}

impl<B: Backend> fmt::Debug for Completion<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Completion")
            .field("list", &self.token.id())
            .field("staging", &self.staging.len())
            .field("fence", &self.fence)
            .finish()
    }
}

impl<B: Backend> Completion<B> {
    /// A completion of backend-internal work, raising `fence`.
    pub fn new(token: Arc<CommandListToken>, pool: Arc<StagingBufferPool<B>>, fence: Arc<Fence>) -> Self {
        Completion {
            token,
            staging: Vec::new(),
            pool,
            swapchains: Vec::new(),
            fence,
        }
    }

    /// Id of the completed command list.
    pub fn list_id(&self) -> u64 {
        self.token.id()
    }

    /// Keep staging buffers alive until the submission has executed.
    pub fn retain_staging<I: IntoIterator<Item = Arc<Buffer<B>>>>(&mut self, buffers: I) {
        self.staging.extend(buffers);
    }

    /// Finish the submission.
    pub fn complete(self) {
        let Completion {
            token,
            staging,
            pool,
            swapchains,
            fence,
        } = self;
        if !staging.is_empty() {
            trace!("List {} returned {} staging buffer(s)", token.id(), staging.len());
            pool.release_all(staging);
        }
        for references in swapchains {
            references.unregister(&token);
        }
        fence.signal();
    }
}

/// Native device interface of a backend.
pub trait RawDevice<B: Backend>: Send + Sync + Sized {
    /// Open the native device.
    fn open(desc: &DeviceDescription, staging: Arc<StagingBufferPool<B>>) -> Result<Self, DeviceError>;

    #[allow(missing_docs)]
    fn api(&self) -> Api;
    #[allow(missing_docs)]
    fn api_version(&self) -> ApiVersion;
    #[allow(missing_docs)]
    fn hardware_info(&self) -> HardwareInfo;
    #[allow(missing_docs)]
    fn capabilities(&self) -> Capabilities;
    #[allow(missing_docs)]
    fn limits(&self) -> Limits;
    /// Highest sample count supported for `format`.
    fn texture_sample_count_limit(&self, format: PixelFormat, is_depth: bool) -> SampleCount;

    #[allow(missing_docs)]
    fn create_buffer(&self, desc: &BufferDescription) -> Result<B::Buffer, CreationError>;
    #[allow(missing_docs)]
    fn create_texture(&self, desc: &TextureDescription) -> Result<B::Texture, CreationError>;
    #[allow(missing_docs)]
    fn create_texture_view(
        &self,
        texture: &Arc<Texture<B>>,
        desc: &TextureViewDescription,
    ) -> Result<B::TextureView, CreationError>;
    #[allow(missing_docs)]
    fn create_sampler(&self, desc: &SamplerDescription) -> Result<B::Sampler, CreationError>;
    #[allow(missing_docs)]
    fn create_graphic_pipeline(
        &self,
        desc: &GraphicPipelineDescription,
        layouts: &[Arc<ResourceLayout>],
    ) -> Result<B::GraphicPipeline, CreationError>;
    #[allow(missing_docs)]
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescription,
        layouts: &[Arc<ResourceLayout>],
    ) -> Result<B::ComputePipeline, CreationError>;
    #[allow(missing_docs)]
    fn create_framebuffer(
        &self,
        colors: &[Attachment<B>],
        depth: Option<&Attachment<B>>,
    ) -> Result<B::Framebuffer, CreationError>;
    #[allow(missing_docs)]
    fn create_command_list(&self) -> B::CommandList;

    /// Queue an ended native list. `completion` must be completed once it has executed.
    fn submit(&self, list: &mut B::CommandList, completion: Completion<B>) -> Result<(), SubmitError>;
    /// Block until every submission has executed.
    fn wait_for_idle(&self);

    /// Read `size` bytes at `offset`, as currently visible to the CPU.
    fn read_buffer(&self, buffer: &Buffer<B>, offset: u32, size: u32) -> Vec<u8>;
    /// Write `data` at `offset` from the CPU.
    fn write_buffer(&self, buffer: &Buffer<B>, offset: u32, data: &[u8]);
    /// Read one subresource, laid out with its linear pitches.
    fn read_texture(&self, texture: &Texture<B>, mip_level: u32, array_layer: u32) -> Vec<u8>;
    /// Overwrite one subresource, laid out with its linear pitches.
    fn write_texture(&self, texture: &Texture<B>, mip_level: u32, array_layer: u32, data: &[u8]);

    /// Update a buffer, ordered after every prior submission.
    fn update_buffer(&self, buffer: &Arc<Buffer<B>>, offset: u32, data: &[u8]) -> Result<(), CreationError>;
    /// Update a box of a texture with tightly packed `data`, ordered after every prior submission.
    fn update_texture(&self, texture: &Arc<Texture<B>>, data: &[u8], region: &TextureRegion) -> Result<(), CreationError>;

    /// Show the current image of `swapchain`.
    fn present(&self, _swapchain: &Swapchain) {}
    #[allow(missing_docs)]
    fn begin_frame(&self) {}
    #[allow(missing_docs)]
    fn end_frame(&self) {}
}

/// A logical GPU device.
///
/// Owns the registry of every created object, the staging buffer pool and optionally a main
/// swapchain. Objects are created through [`factory`](Device::factory) and addressed by handles.
pub struct Device<B: Backend> {
    pub(crate) raw: B::Device,
    pub(crate) desc: DeviceDescription,
    pub(crate) capabilities: Capabilities,
    pub(crate) limits: Limits,
    pub(crate) manager: Arc<ResourceManager<B>>,
    pub(crate) staging: Arc<StagingBufferPool<B>>,
    mapped: Mutex<FxHashMap<(MapTarget, u32), MapEntry>>,
    main_swapchain: Option<Handle<kind::Swapchain>>,
}

impl<B: Backend> fmt::Debug for Device<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Device")
            .field("api", &self.raw.api())
            .field("debug", &self.desc.debug)
            .field("manager", &self.manager)
            .finish()
    }
}

impl<B: Backend> Device<B> {
    /// Open a device, creating the main swapchain when requested.
    pub fn open(desc: DeviceDescription) -> Result<Self, DeviceError> {
        let staging = Arc::new(StagingBufferPool::new());
        let raw = <B::Device as RawDevice<B>>::open(&desc, Arc::clone(&staging))?;
        let info = raw.hardware_info();
        info!(
            "Opened {:?} {} device on {} (debug: {})",
            raw.api(),
            raw.api_version(),
            info.name,
            desc.debug
        );
        let mut device = Device {
            capabilities: raw.capabilities(),
            limits: raw.limits(),
            raw,
            desc,
            manager: Arc::new(ResourceManager::new()),
            staging,
            mapped: Mutex::new(FxHashMap::default()),
            main_swapchain: None,
        };
        if device.desc.has_main_swapchain {
            let swapchain_desc = device.desc.swapchain.clone();
            device.main_swapchain = Some(device.factory().create_swapchain(&swapchain_desc)?);
        }
        Ok(device)
    }

    /// Native device.
    pub fn raw(&self) -> &B::Device {
        &self.raw
    }

    /// Creation parameters.
    pub fn description(&self) -> &DeviceDescription {
        &self.desc
    }

    /// Whether validation failures panic.
    pub fn is_debug_enabled(&self) -> bool {
        self.desc.debug
    }

    #[allow(missing_docs)]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    #[allow(missing_docs)]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    #[allow(missing_docs)]
    pub fn hardware_info(&self) -> HardwareInfo {
        self.raw.hardware_info()
    }

    #[allow(missing_docs)]
    pub fn api(&self) -> Api {
        self.raw.api()
    }

    #[allow(missing_docs)]
    pub fn api_version(&self) -> ApiVersion {
        self.raw.api_version()
    }

    /// Required alignment of constant buffer offsets and ranges.
    pub fn constant_buffer_min_offset_alignment(&self) -> u32 {
        self.limits.constant_buffer_min_offset_alignment
    }

    /// Required alignment of structured buffer offsets and ranges.
    pub fn structured_buffer_min_offset_alignment(&self) -> u32 {
        self.limits.structured_buffer_min_offset_alignment
    }

    /// Highest sample count supported for `format`.
    pub fn texture_sample_count_limit(&self, format: PixelFormat, is_depth: bool) -> SampleCount {
        self.raw.texture_sample_count_limit(format, is_depth)
    }

    /// Creates every object of the device.
    pub fn factory(&self) -> ResourceFactory<'_, B> {
        ResourceFactory::new(self)
    }

    /// Registry of every object of the device.
    pub fn resource_manager(&self) -> &Arc<ResourceManager<B>> {
        &self.manager
    }

    /// Pool of CPU-writable staging buffers.
    pub fn staging_pool(&self) -> &Arc<StagingBufferPool<B>> {
        &self.staging
    }

    /// Swapchain created with the device.
    pub fn main_swapchain(&self) -> Option<Handle<kind::Swapchain>> {
        self.main_swapchain
    }

    /// Execute an ended command list.
    ///
    /// Without a fence this blocks until the list has executed. With a fence it returns at
    /// once and the fence is raised on completion.
    pub fn submit_command_list(
        &self,
        list: &mut CommandList<B>,
        fence: Option<Handle<kind::Fence>>,
    ) -> Result<(), SubmitError> {
        let fence = match fence {
            Some(handle) => Some(self.manager.resolve(handle).map_err(|e| self.report(e.into()))?),
            None => None,
        };
        let swapchains = list
            .begin_submission()
            .map_err(|state| self.report(SubmitError::NotEnded(state)))?;
        let (fence, previous) = match fence {
            Some(fence) => {
                let previous = fence.mark_pending();
                (fence, Some(previous))
            }
            None => (Arc::new(Fence::new(false)), None),
        };
        let blocking = previous.is_none();
        let completion = Completion {
            token: Arc::clone(list.token()),
            staging: Vec::new(),
            pool: Arc::clone(&self.staging),
            swapchains: swapchains.clone(),
            fence: Arc::clone(&fence),
        };
        debug!("Submitting list {} (blocking: {})", list.token().id(), blocking);
        if let Err(error) = self.raw.submit(list.raw_mut(), completion) {
            error!("Backend refused list {}: {}", list.token().id(), error);
            if let Some(previous) = previous {
                fence.restore(previous);
            }
            list.cancel_submission(swapchains);
            return Err(error);
        }
        list.mark_submitted();
        if blocking {
            fence.wait(None);
        }
        Ok(())
    }

    fn report(&self, error: SubmitError) -> SubmitError {
        error!("Submission failed: {}", error);
        if self.desc.debug {
            panic!("{}", error);
        }
        error
    }

    /// Block until `fence` is raised or `timeout` elapses. Returns whether it was raised.
    pub fn wait_for_fence(&self, fence: Handle<kind::Fence>, timeout: Option<Duration>) -> Result<bool, HandleError> {
        Ok(self.manager.resolve(fence)?.wait(timeout))
    }

    /// Block until all (or any) of `fences` are raised or `timeout` elapses.
    pub fn wait_for_fences(
        &self,
        fences: &[Handle<kind::Fence>],
        wait_all: bool,
        timeout: Option<Duration>,
    ) -> Result<bool, HandleError> {
        let fences = fences
            .iter()
            .map(|&handle| self.manager.resolve(handle))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(fence::wait_for_fences(&fences, wait_all, timeout))
    }

    /// Raise `fence` from the CPU.
    pub fn raise_fence(&self, fence: Handle<kind::Fence>) -> Result<(), HandleError> {
        self.manager.resolve(fence)?.signal();
        debug!("Raised {:?}", fence);
        Ok(())
    }

    /// Lower `fence` so it can be reused. No wait may be outstanding.
    pub fn reset_fence(&self, fence: Handle<kind::Fence>) -> Result<(), HandleError> {
        self.manager.resolve(fence)?.reset();
        Ok(())
    }

    /// Block until every submission has executed.
    pub fn wait_for_idle(&self) {
        self.raw.wait_for_idle();
    }

    /// Map one subresource for CPU access.
    ///
    /// Mapping a subresource again with the same access mode is reference counted; mapping it
    /// with another mode fails until it is fully unmapped.
    pub fn map<T: Into<MapTarget>>(
        &self,
        target: T,
        access: MapAccess,
        subresource: u32,
    ) -> Result<MappedResource<B>, MapError> {
        let target = target.into();
        let result = self.map_inner(target, access, subresource);
        if let Err(ref error) = result {
            error!("Mapping {:?} failed: {}", target, error);
        }
        result
    }

    fn map_inner(&self, target: MapTarget, access: MapAccess, subresource: u32) -> Result<MappedResource<B>, MapError> {
        let (object, size, row_pitch, depth_pitch) = match target {
            MapTarget::Buffer(handle) => {
                let buffer = self.manager.resolve(handle)?;
                let usage = buffer.usage();
                let allowed = if access.reads() {
                    usage.contains(BufferUsage::STAGING)
                } else {
                    usage.intersects(BufferUsage::STAGING | BufferUsage::DYNAMIC)
                };
                if !allowed {
                    return Err(MapError::IncompatibleAccess {
                        access,
                        needed: if access.reads() { "staging" } else { "staging or dynamic" },
                    });
                }
                if subresource != 0 {
                    return Err(MapError::SubresourceOutOfRange { subresource, count: 1 });
                }
                let size = buffer.size();
                (MappedObject::Buffer(buffer), size, size, size)
            }
            MapTarget::Texture(handle) => {
                let texture = self.manager.resolve(handle)?;
                let desc = texture.desc();
                if !desc.usage.contains(TextureUsage::STAGING) {
                    return Err(MapError::IncompatibleAccess {
                        access,
                        needed: "staging",
                    });
                }
                if subresource >= desc.subresource_count() {
                    return Err(MapError::SubresourceOutOfRange {
                        subresource,
                        count: desc.subresource_count(),
                    });
                }
                let (mip_level, array_layer) = desc.mip_level_and_layer(subresource);
                let layout = desc.subresource_layout(mip_level, array_layer);
                (
                    MappedObject::Texture(Arc::clone(&texture), mip_level, array_layer),
                    layout.size as u32,
                    layout.row_pitch,
                    layout.depth_pitch,
                )
            }
        };

        {
            let mut mapped = self.mapped.lock();
            let entry = mapped
                .entry((target, subresource))
                .or_insert(MapEntry { access, count: 0 });
            if entry.access != access {
                return Err(MapError::AlreadyMapped {
                    subresource,
                    current: entry.access,
                });
            }
            entry.count += 1;
        }

        // Write-only maps of dynamic buffers discard; staging maps keep the current contents.
        let discard = match object {
            MappedObject::Buffer(ref buffer) => {
                !access.reads() && !buffer.usage().contains(BufferUsage::STAGING)
            }
            MappedObject::Texture(..) => false,
        };
        let data = if !discard {
            self.raw.wait_for_idle();
            match object {
                MappedObject::Buffer(ref buffer) => self.raw.read_buffer(buffer, 0, size),
                MappedObject::Texture(ref texture, mip, layer) => self.raw.read_texture(texture, mip, layer),
            }
        } else {
            vec![0; size as usize]
        };
        trace!("Mapped {:?} subresource {} for {:?}", target, subresource, access);
        Ok(MappedResource {
            target,
            access,
            subresource,
            row_pitch,
            depth_pitch,
            data,
            object,
        })
    }

    /// Release a mapping, writing the CPU copy back for write access.
    pub fn unmap(&self, mapped: MappedResource<B>) -> Result<(), MapError> {
        let key = (mapped.target, mapped.subresource);
        {
            let mut entries = self.mapped.lock();
            let remove = match entries.get_mut(&key) {
                Some(entry) => {
                    entry.count -= 1;
                    entry.count == 0
                }
                None => {
                    error!("Unmapping {:?} which is not mapped", mapped.target);
                    return Err(MapError::NotMapped);
                }
            };
            if remove {
                entries.remove(&key);
            }
        }
        if mapped.access.writes() {
            match mapped.object {
                MappedObject::Buffer(ref buffer) => self.raw.write_buffer(buffer, 0, &mapped.data),
                MappedObject::Texture(ref texture, mip, layer) => {
                    self.raw.write_texture(texture, mip, layer, &mapped.data)
                }
            }
        }
        Ok(())
    }

    /// Overwrite part of a buffer, ordered after every prior submission.
    pub fn update_buffer(&self, handle: Handle<kind::Buffer>, offset: u32, data: &[u8]) -> Result<(), DeviceError> {
        let buffer = self.manager.resolve(handle)?;
        if data.is_empty() {
            return Ok(());
        }
        let end = offset as u64 + data.len() as u64;
        if end > buffer.size() as u64 {
            return Err(DeviceError::OutOfBounds {
                what: "buffer update",
                end,
                limit: buffer.size() as u64,
            });
        }
        self.raw.update_buffer(&buffer, offset, data)?;
        Ok(())
    }

    /// Overwrite a box of a texture with tightly packed `data`.
    pub fn update_texture(
        &self,
        handle: Handle<kind::Texture>,
        data: &[u8],
        region: &TextureRegion,
    ) -> Result<(), DeviceError> {
        let texture = self.manager.resolve(handle)?;
        let desc = texture.desc();
        if region.mip_level >= desc.mip_count || region.array_layer >= desc.effective_layers() {
            return Err(DeviceError::OutOfBounds {
                what: "updated subresource",
                end: desc.subresource(region.mip_level, region.array_layer) as u64,
                limit: desc.subresource_count() as u64,
            });
        }
        let mip = desc.mip_extent(region.mip_level);
        let axes = [
            ("texture update region x", region.origin.x, region.extent.width, mip.width),
            ("texture update region y", region.origin.y, region.extent.height, mip.height),
            ("texture update region z", region.origin.z, region.extent.depth, mip.depth),
        ];
        for &(what, start, size, limit) in &axes {
            let end = u64::from(start) + u64::from(size);
            if end > u64::from(limit) {
                return Err(DeviceError::OutOfBounds {
                    what,
                    end,
                    limit: u64::from(limit),
                });
            }
        }
        let needed = region.data_size(desc.format) as u64;
        if (data.len() as u64) < needed {
            return Err(DeviceError::OutOfBounds {
                what: "texture update data",
                end: needed,
                limit: data.len() as u64,
            });
        }
        self.raw.update_texture(&texture, data, region)?;
        Ok(())
    }

    /// Write non-indexed indirect draw arguments at `offset`.
    pub fn update_indirect_buffer(
        &self,
        handle: Handle<kind::Buffer>,
        offset: u32,
        commands: &[DrawIndirectCommand],
    ) -> Result<(), DeviceError> {
        let bytes: Vec<u8> = commands.iter().flat_map(|command| command.to_bytes().to_vec()).collect();
        self.update_buffer(handle, offset, &bytes)
    }

    /// Write indexed indirect draw arguments at `offset`.
    pub fn update_indexed_indirect_buffer(
        &self,
        handle: Handle<kind::Buffer>,
        offset: u32,
        commands: &[DrawIndexedIndirectCommand],
    ) -> Result<(), DeviceError> {
        let bytes: Vec<u8> = commands.iter().flat_map(|command| command.to_bytes().to_vec()).collect();
        self.update_buffer(handle, offset, &bytes)
    }

    /// Resolve a multisampled texture, blocking until done.
    pub fn resolve_texture(&self, source: Handle<kind::Texture>, destination: Handle<kind::Texture>) -> Result<(), DeviceError> {
        let mut list = self.factory().create_command_list()?;
        list.begin()?;
        list.resolve_texture(source, destination)?;
        list.end()?;
        self.submit_command_list(&mut list, None)?;
        Ok(())
    }

    /// Recreate the images of a swapchain at a new size.
    ///
    /// Waits for the queue when command lists still reference the old images. The old
    /// framebuffer and texture handles become stale.
    pub fn resize_swapchain(&self, handle: Handle<kind::Swapchain>, width: u32, height: u32) -> Result<(), DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::InvalidDescription("swapchain size must be non-zero"));
        }
        let swapchain = self.manager.resolve(handle)?;
        let mut desc = swapchain.desc();
        if desc.width == width && desc.height == height {
            return Ok(());
        }
        if swapchain.references().count() != 0 {
            self.raw.wait_for_idle();
        }
        desc.width = width;
        desc.height = height;
        let targets = self.factory().create_swapchain_targets(&desc, swapchain.references())?;
        let old = swapchain.replace(desc, targets);
        self.manager.release(old.framebuffer)?;
        self.manager.release(old.color)?;
        if let Some(depth) = old.depth {
            self.manager.release(depth)?;
        }
        debug!("Resized {:?} to {}x{}", handle, width, height);
        Ok(())
    }

    /// Show the current image of a swapchain.
    pub fn present(&self, handle: Handle<kind::Swapchain>) -> Result<(), HandleError> {
        let swapchain = self.manager.resolve(handle)?;
        let frame = swapchain.mark_presented();
        self.raw.present(&swapchain);
        trace!("Presented frame {} of {:?}", frame, handle);
        Ok(())
    }

    #[allow(missing_docs)]
    pub fn begin_frame(&self) {
        self.raw.begin_frame();
    }

    #[allow(missing_docs)]
    pub fn end_frame(&self) {
        self.raw.end_frame();
    }

    /// Wait for the queue, then drop every object of the device.
    pub fn destroy(&self) {
        self.raw.wait_for_idle();
        let leaked = self.mapped.lock().len();
        if leaked != 0 {
            warn!("Destroying a device with {} mapped subresource(s)", leaked);
        }
        self.mapped.lock().clear();
        self.manager.clear();
        debug!("Device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferDescription;
    use crate::dummy::{DummyBackend, DummyDevice};
    use crate::texture::{Extent, Offset};

    type TestDevice = Device<DummyBackend>;

    fn device() -> TestDevice {
        Device::open(DeviceDescription {
            debug: false,
            ..DeviceDescription::default()
        })
        .unwrap()
    }

    #[test]
    fn test_adapter_selection() {
        let desc = DeviceDescription {
            adapter: Some("Imaginary GPU".into()),
            ..DeviceDescription::default()
        };
        match TestDevice::open(desc) {
            Err(DeviceError::AdapterUnavailable(name)) => assert_eq!(name, "Imaginary GPU"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        let desc = DeviceDescription {
            adapter: Some(DummyDevice::ADAPTER.into()),
            ..DeviceDescription::default()
        };
        assert!(TestDevice::open(desc).is_ok());
    }

    #[test]
    fn test_map_access_rules() {
        let device = device();
        let factory = device.factory();
        let vertex = factory
            .create_buffer(&BufferDescription::new(64, BufferUsage::VERTEX), None)
            .unwrap();
        let dynamic = factory
            .create_buffer(&BufferDescription::new(64, BufferUsage::CONSTANT | BufferUsage::DYNAMIC), None)
            .unwrap();
        let staging = factory
            .create_buffer(&BufferDescription::new(64, BufferUsage::STAGING), None)
            .unwrap();

        assert!(matches!(
            device.map(vertex, MapAccess::Write, 0),
            Err(MapError::IncompatibleAccess { .. })
        ));
        assert!(matches!(
            device.map(dynamic, MapAccess::Read, 0),
            Err(MapError::IncompatibleAccess { .. })
        ));
        let mapped = device.map(dynamic, MapAccess::Write, 0).unwrap();
        device.unmap(mapped).unwrap();

        let first = device.map(staging, MapAccess::Read, 0).unwrap();
        let second = device.map(staging, MapAccess::Read, 0).unwrap();
        assert!(matches!(
            device.map(staging, MapAccess::Write, 0),
            Err(MapError::AlreadyMapped {
                current: MapAccess::Read,
                ..
            })
        ));
        device.unmap(first).unwrap();
        assert!(device.map(staging, MapAccess::Write, 0).is_err());
        device.unmap(second).unwrap();
        let write = device.map(staging, MapAccess::Write, 0).unwrap();
        device.unmap(write).unwrap();
    }

    #[test]
    fn test_map_write_then_read() {
        let device = device();
        let buffer = device
            .factory()
            .create_buffer(&BufferDescription::new(8, BufferUsage::STAGING), None)
            .unwrap();
        let mut mapped = device.map(buffer, MapAccess::Write, 0).unwrap();
        mapped.data_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        device.unmap(mapped).unwrap();

        let mapped = device.map(buffer, MapAccess::Read, 0).unwrap();
        assert_eq!(&mapped[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(mapped.row_pitch(), 8);
        device.unmap(mapped).unwrap();
    }

    #[test]
    fn test_map_write_keeps_staging_contents() {
        let device = device();
        let factory = device.factory();
        let initial = [1, 2, 3, 4, 5, 6, 7, 8];
        let staging = factory
            .create_buffer(&BufferDescription::new(8, BufferUsage::STAGING), Some(&initial[..]))
            .unwrap();
        let mut mapped = device.map(staging, MapAccess::Write, 0).unwrap();
        assert_eq!(&mapped[..], &initial);
        mapped.data_mut()[0] = 9;
        device.unmap(mapped).unwrap();

        let mapped = device.map(staging, MapAccess::Read, 0).unwrap();
        assert_eq!(&mapped[..], &[9, 2, 3, 4, 5, 6, 7, 8]);
        device.unmap(mapped).unwrap();

        let dynamic = factory
            .create_buffer(&BufferDescription::new(8, BufferUsage::DYNAMIC | BufferUsage::VERTEX), Some(&initial[..]))
            .unwrap();
        let mapped = device.map(dynamic, MapAccess::Write, 0).unwrap();
        assert_eq!(&mapped[..], &[0; 8]);
        device.unmap(mapped).unwrap();
    }

    #[test]
    fn test_map_texture_subresource() {
        let device = device();
        let desc = TextureDescription::new_2d(8, 8, 2, PixelFormat::R8G8B8A8UNorm, TextureUsage::STAGING);
        let texture = device.factory().create_texture(&desc).unwrap();
        let mapped = device.map(texture, MapAccess::Read, 1).unwrap();
        assert_eq!(mapped.row_pitch(), 16);
        assert_eq!(mapped.len(), 64);
        device.unmap(mapped).unwrap();
        assert!(matches!(
            device.map(texture, MapAccess::Read, 2),
            Err(MapError::SubresourceOutOfRange { count: 2, .. })
        ));
    }

    #[test]
    fn test_update_texture_bounds() {
        let device = device();
        let desc = TextureDescription::new_2d(4, 4, 1, PixelFormat::R8UNorm, TextureUsage::SAMPLED);
        let texture = device.factory().create_texture(&desc).unwrap();
        let region = TextureRegion {
            origin: Offset { x: 2, y: 0, z: 0 },
            extent: Extent {
                width: 4,
                height: 1,
                depth: 1,
            },
            mip_level: 0,
            array_layer: 0,
        };
        assert!(matches!(
            device.update_texture(texture, &[0; 4], &region),
            Err(DeviceError::OutOfBounds { .. })
        ));
        let region = TextureRegion {
            origin: Offset { x: 2, y: 0, z: 0 },
            extent: Extent {
                width: 2,
                height: 1,
                depth: 1,
            },
            ..region
        };
        assert!(matches!(
            device.update_texture(texture, &[0; 1], &region),
            Err(DeviceError::OutOfBounds { .. })
        ));
        device.update_texture(texture, &[7, 9], &region).unwrap();
        let object = device.resource_manager().resolve(texture).unwrap();
        assert_eq!(device.raw().read_texture(&object, 0, 0)[2..4], [7, 9]);

        let far = TextureRegion {
            origin: Offset { x: u32::MAX, y: 0, z: 0 },
            ..region
        };
        assert_eq!(
            device.update_texture(texture, &[0; 2], &far),
            Err(DeviceError::OutOfBounds {
                what: "texture update region x",
                end: u64::from(u32::MAX) + 2,
                limit: 4,
            })
        );
        let far = TextureRegion {
            origin: Offset { x: 0, y: u32::MAX, z: 0 },
            ..region
        };
        assert!(matches!(
            device.update_texture(texture, &[0; 2], &far),
            Err(DeviceError::OutOfBounds { what: "texture update region y", .. })
        ));
    }

    #[test]
    fn test_submit_with_fence() {
        let device = device();
        let fence = device.factory().create_fence(false).unwrap();
        let mut list = device.factory().create_command_list().unwrap();
        assert_eq!(
            device.submit_command_list(&mut list, Some(fence)),
            Err(SubmitError::NotEnded(RecordingState::Initial))
        );
        list.begin().unwrap();
        list.end().unwrap();
        device.submit_command_list(&mut list, Some(fence)).unwrap();
        assert_eq!(list.state(), RecordingState::Submitted);
        assert!(device.wait_for_fence(fence, Some(Duration::from_secs(1))).unwrap());
        device.reset_fence(fence).unwrap();
        assert!(!device.wait_for_fence(fence, Some(Duration::from_millis(1))).unwrap());
        device.raise_fence(fence).unwrap();
        assert!(device.wait_for_fences(&[fence], true, None).unwrap());
    }

    #[test]
    fn test_refused_submission_leaves_no_trace() {
        use crate::fence::FenceState;
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
        let fence = device.factory().create_fence(true).unwrap();
        let mut list = device.factory().create_command_list().unwrap();
        list.begin().unwrap();
        list.set_framebuffer(swapchain.framebuffer()).unwrap();
        list.end().unwrap();
        assert_eq!(swapchain.references().count(), 1);

        list.raw_mut().reject_submissions = true;
        assert!(matches!(
            device.submit_command_list(&mut list, Some(fence)),
            Err(SubmitError::Rejected(_))
        ));
        let state = device.resource_manager().resolve(fence).unwrap().state();
        assert_eq!(state, FenceState::Signaled);
        assert_eq!(list.state(), RecordingState::Ended);
        assert_eq!(swapchain.references().count(), 1);

        list.raw_mut().reject_submissions = false;
        device.reset_fence(fence).unwrap();
        device.submit_command_list(&mut list, Some(fence)).unwrap();
        assert!(device.wait_for_fence(fence, Some(Duration::from_secs(1))).unwrap());
        assert_eq!(swapchain.references().count(), 0);
        assert_eq!(list.raw().submissions(), 1);
    }

    #[test]
    fn test_swapchain_resize() {
        let device = Device::<DummyBackend>::open(DeviceDescription {
            debug: false,
            has_main_swapchain: true,
            ..DeviceDescription::default()
        })
        .unwrap();
        let handle = device.main_swapchain().unwrap();
        let swapchain = device.resource_manager().resolve(handle).unwrap();
        let old = swapchain.framebuffer();
        device.resize_swapchain(handle, 640, 480).unwrap();
        assert!(!device.resource_manager().contains(old));
        let framebuffer = device.resource_manager().resolve(swapchain.framebuffer()).unwrap();
        assert_eq!((framebuffer.width(), framebuffer.height()), (640, 480));
        assert!(framebuffer.swapchain().is_some());
        device.present(handle).unwrap();
        assert_eq!(swapchain.presented_frames(), 1);
    }
}
