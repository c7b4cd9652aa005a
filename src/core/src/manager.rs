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

//! The resource registry shared by a device and every object it creates.

use crate::buffer::Buffer;
use crate::command::CommandListToken;
use crate::fence::Fence;
use crate::framebuffer::Framebuffer;
use crate::handle::{kind, Handle, HandleError, Kind, Storage};
use crate::pso::{ComputePipeline, GraphicPipeline, ResourceLayout, ResourceSet};
use crate::sampler::Sampler;
use crate::swapchain::Swapchain;
use crate::texture::{Texture, TextureView};
use crate::Backend;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// A handle category stored by the [`ResourceManager`].
pub trait Registered<B: Backend>: Kind + Sized {
    /// Type of the registered object.
    type Object: Send + Sync;

    #[doc(hidden)]
    fn storage(manager: &ResourceManager<B>) -> &RwLock<Storage<Self, Arc<Self::Object>>>;
}

macro_rules! registry {
    ($($field:ident: $kind:ident => $object:ty,)*) => {
        /// Owns every object created through a device, addressed by generation-checked handles.
        ///
        /// Objects are reference counted: releasing a handle invalidates it immediately, while
        /// command lists and resource sets that already captured the object keep it alive.
        pub struct ResourceManager<B: Backend> {
            $($field: RwLock<Storage<kind::$kind, Arc<$object>>>,)*
        }

        impl<B: Backend> Default for ResourceManager<B> {
            fn default() -> Self {
                ResourceManager {
                    $($field: RwLock::new(Storage::new()),)*
                }
            }
        }

        impl<B: Backend> fmt::Debug for ResourceManager<B> {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.debug_struct("ResourceManager")
                    $(.field(stringify!($field), &self.$field.read().len()))*
                    .finish()
            }
        }

        impl<B: Backend> ResourceManager<B> {
            /// Drop every registered object.
            pub fn clear(&self) {
                $(self.$field.write().drain();)*
            }
        }

        $(
            impl<B: Backend> Registered<B> for kind::$kind {
                type Object = $object;

                fn storage(manager: &ResourceManager<B>) -> &RwLock<Storage<Self, Arc<$object>>> {
                    &manager.$field
                }
            }
        )*
    };
}

registry! {
    buffers: Buffer => Buffer<B>,
    textures: Texture => Texture<B>,
    texture_views: TextureView => TextureView<B>,
    samplers: Sampler => Sampler<B>,
    resource_layouts: ResourceLayout => ResourceLayout,
    resource_sets: ResourceSet => ResourceSet<B>,
    graphic_pipelines: GraphicPipeline => GraphicPipeline<B>,
    compute_pipelines: ComputePipeline => ComputePipeline<B>,
    framebuffers: Framebuffer => Framebuffer<B>,
    fences: Fence => Fence,
    swapchains: Swapchain => Swapchain,
    command_lists: CommandList => CommandListToken,
}

impl<B: Backend> ResourceManager<B> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `object`, returning its handle.
    pub fn allocate<K: Registered<B>>(&self, object: Arc<K::Object>) -> Result<Handle<K>, HandleError> {
        K::storage(self).write().allocate(object)
    }

    /// Look up the object addressed by `handle`.
    pub fn resolve<K: Registered<B>>(&self, handle: Handle<K>) -> Result<Arc<K::Object>, HandleError> {
        K::storage(self).read().resolve(handle).map(Arc::clone)
    }

    /// Unregister the object addressed by `handle`, invalidating the handle.
    pub fn release<K: Registered<B>>(&self, handle: Handle<K>) -> Result<Arc<K::Object>, HandleError> {
        let object = K::storage(self).write().release(handle)?;
        trace!("Released {:?}", handle);
        Ok(object)
    }

    /// Whether `handle` still addresses a live object.
    pub fn contains<K: Registered<B>>(&self, handle: Handle<K>) -> bool {
        K::storage(self).read().contains(handle)
    }

    /// Number of live objects of category `K`.
    pub fn count<K: Registered<B>>(&self) -> usize {
        K::storage(self).read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferDescription, BufferUsage};
    use crate::dummy::{DummyBackend, DummyBuffer};

    #[test]
    fn test_registry_roundtrip() {
        let manager = ResourceManager::<DummyBackend>::new();
        let desc = BufferDescription::new(16, BufferUsage::VERTEX);
        let buffer = Arc::new(Buffer::new(desc.clone(), DummyBuffer::new(&desc)));
        let handle: Handle<kind::Buffer> = manager.allocate(Arc::clone(&buffer)).unwrap();
        assert!(Arc::ptr_eq(&manager.resolve(handle).unwrap(), &buffer));
        assert_eq!(manager.count::<kind::Buffer>(), 1);

        let released = manager.release(handle).unwrap();
        assert!(Arc::ptr_eq(&released, &buffer));
        assert!(!manager.contains(handle));
        match manager.resolve(handle) {
            Err(HandleError::Stale { kind: "Buffer", .. }) => {}
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_kinds_are_independent() {
        let manager = ResourceManager::<DummyBackend>::new();
        let fence: Handle<kind::Fence> = manager.allocate(Arc::new(Fence::new(false))).unwrap();
        let token: Handle<kind::CommandList> =
            manager.allocate(Arc::new(CommandListToken::new())).unwrap();
        assert_eq!(fence.index(), 0);
        assert_eq!(token.index(), 0);
        manager.clear();
        assert!(!manager.contains(fence));
        assert!(!manager.contains(token));
    }
}
