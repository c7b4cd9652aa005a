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

//! Generation-checked handles to device objects.
//!
//! A handle packs a dense slot index and a generation counter into a `u32`. The index
//! addresses a slot of a [`Storage`]; the generation is bumped every time the slot is
//! released, so a handle that outlived its object no longer resolves.

use std::fmt;
use std::marker::PhantomData;

/// Category of object a handle refers to, together with its bit layout.
pub trait Kind: 'static {
    /// Human readable name, used in errors and debug output.
    const NAME: &'static str;
    /// Number of low bits used for the slot index. The rest holds the generation.
    const INDEX_BITS: u32;

    /// Largest representable slot index.
    fn max_index() -> u32 {
        (1 << Self::INDEX_BITS) - 1
    }

    /// Largest representable generation.
    fn max_generation() -> u32 {
        (1 << (32 - Self::INDEX_BITS)) - 1
    }
}

/// Marker types for every handle category.
pub mod kind {
    use super::Kind;

    macro_rules! define_kinds {
        ($($(#[$attr:meta])* $name:ident = $bits:expr;)*) => {
            $(
                $(#[$attr])*
                #[derive(Debug)]
                pub enum $name {}

                impl Kind for $name {
                    const NAME: &'static str = stringify!($name);
                    const INDEX_BITS: u32 = $bits;
                }
            )*
        };
    }

    define_kinds! {
        /// A GPU buffer.
        Buffer = 28;
        /// A texture.
        Texture = 28;
        /// A view into a texture.
        TextureView = 28;
        /// A sampler state.
        Sampler = 28;
        /// An immutable resource layout.
        ResourceLayout = 28;
        /// An immutable resource set.
        ResourceSet = 28;
        /// A graphic pipeline.
        GraphicPipeline = 28;
        /// A compute pipeline.
        ComputePipeline = 28;
        /// A framebuffer.
        Framebuffer = 28;
        /// A fence.
        Fence = 28;
        /// A swapchain.
        Swapchain = 28;
        /// A command list. Contexts are few but recycled often, so they trade index
        /// bits for generation bits.
        CommandList = 24;
    }
}

/// Typed handle to an object living in a [`Storage`].
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Copy(bound = ""), Eq(bound = ""), Hash(bound = ""), PartialEq(bound = ""))]
pub struct Handle<K> {
    raw: u32,
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    kind: PhantomData<fn() -> K>,
}

impl<K: Kind> Handle<K> {
    fn new(index: u32, generation: u32) -> Self {
        debug_assert!(index <= K::max_index());
        debug_assert!(generation <= K::max_generation());
        Handle {
            raw: index | (generation << K::INDEX_BITS),
            kind: PhantomData,
        }
    }

    /// Rebuild a handle from its packed representation.
    pub fn from_raw(raw: u32) -> Self {
        Handle {
            raw,
            kind: PhantomData,
        }
    }

    /// Packed representation.
    pub fn into_raw(self) -> u32 {
        self.raw
    }

    /// Slot index.
    pub fn index(self) -> u32 {
        self.raw & K::max_index()
    }

    /// Generation of the slot at the time this handle was allocated.
    pub fn generation(self) -> u32 {
        self.raw >> K::INDEX_BITS
    }
}

impl<K: Kind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({}v{})", K::NAME, self.index(), self.generation())
    }
}

/// Failure to allocate or resolve a handle.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum HandleError {
    /// The handle's generation does not match the live object, or the slot is empty.
    #[error("stale {kind} handle (index {index}, generation {generation})")]
    Stale {
        /// Handle category.
        kind: &'static str,
        /// Slot index.
        index: u32,
        /// Generation carried by the handle.
        generation: u32,
    },
    /// Every slot of this category is either live or retired.
    #[error("out of {kind} handles")]
    Exhausted {
        /// Handle category.
        kind: &'static str,
    },
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Dense arena addressed by generation-checked handles.
#[derive(Debug)]
pub struct Storage<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    retired: usize,
    kind: PhantomData<fn() -> K>,
}

impl<K: Kind, T> Default for Storage<K, T> {
    fn default() -> Self {
        Storage {
            slots: Vec::new(),
            free: Vec::new(),
            retired: 0,
            kind: PhantomData,
        }
    }
}

impl<K: Kind, T> Storage<K, T> {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` and return the handle addressing it.
    pub fn allocate(&mut self, value: T) -> Result<Handle<K>, HandleError> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            return Ok(Handle::new(index, slot.generation));
        }
        let index = self.slots.len() as u32;
        if index > K::max_index() {
            return Err(HandleError::Exhausted { kind: K::NAME });
        }
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Ok(Handle::new(index, 0))
    }

    fn stale(handle: Handle<K>) -> HandleError {
        HandleError::Stale {
            kind: K::NAME,
            index: handle.index(),
            generation: handle.generation(),
        }
    }

    /// Look up the object addressed by `handle`.
    pub fn resolve(&self, handle: Handle<K>) -> Result<&T, HandleError> {
        match self.slots.get(handle.index() as usize) {
            Some(&Slot {
                generation,
                value: Some(ref value),
            }) if generation == handle.generation() => Ok(value),
            _ => Err(Self::stale(handle)),
        }
    }

    /// Check whether `handle` still addresses a live object.
    pub fn contains(&self, handle: Handle<K>) -> bool {
        self.resolve(handle).is_ok()
    }

    /// Remove the object addressed by `handle`, invalidating every copy of the handle.
    ///
    /// A slot whose generation is exhausted is retired instead of being recycled.
    pub fn release(&mut self, handle: Handle<K>) -> Result<T, HandleError> {
        let slot = match self.slots.get_mut(handle.index() as usize) {
            Some(slot) if slot.generation == handle.generation() && slot.value.is_some() => slot,
            _ => return Err(Self::stale(handle)),
        };
        let value = slot.value.take().ok_or_else(|| Self::stale(handle))?;
        if slot.generation == K::max_generation() {
            self.retired += 1;
        } else {
            slot.generation += 1;
            self.free.push(handle.index());
        }
        Ok(value)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len() - self.retired
    }

    /// Whether no object is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over live objects.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }

    /// Remove every live object, bumping generations as `release` would.
    pub fn drain(&mut self) -> Vec<T> {
        let handles = self.iter().map(|(handle, _)| handle).collect::<Vec<_>>();
        handles
            .into_iter()
            .filter_map(|handle| self.release(handle).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_layout() {
        let buffer = Handle::<kind::Buffer>::new(5, 3);
        assert_eq!(buffer.index(), 5);
        assert_eq!(buffer.generation(), 3);
        assert_eq!(buffer.into_raw(), 5 | (3 << 28));
        assert_eq!(kind::Buffer::max_generation(), 15);
        assert_eq!(kind::CommandList::max_index(), (1 << 24) - 1);
        assert_eq!(kind::CommandList::max_generation(), 255);
        assert_eq!(format!("{:?}", buffer), "Buffer(5v3)");
    }

    #[test]
    fn test_stale_handle() {
        let mut storage = Storage::<kind::Texture, &str>::new();
        let first = storage.allocate("first").unwrap();
        assert_eq!(storage.resolve(first), Ok(&"first"));
        assert_eq!(storage.release(first), Ok("first"));
        let second = storage.allocate("second").unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);
        assert_eq!(
            storage.resolve(first),
            Err(HandleError::Stale {
                kind: "Texture",
                index: 0,
                generation: 0
            })
        );
        assert!(storage.release(first).is_err());
        assert_eq!(storage.resolve(second), Ok(&"second"));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_generation_wrap_retires_slot() {
        let mut storage = Storage::<kind::Fence, u32>::new();
        let mut handle = storage.allocate(0).unwrap();
        for i in 1..=kind::Fence::max_generation() {
            storage.release(handle).unwrap();
            handle = storage.allocate(i).unwrap();
            assert_eq!(handle.index(), 0);
        }
        assert_eq!(handle.generation(), 15);
        storage.release(handle).unwrap();
        let fresh = storage.allocate(99).unwrap();
        assert_eq!(fresh.index(), 1);
        assert!(storage.resolve(handle).is_err());
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_iter_and_drain() {
        let mut storage = Storage::<kind::Sampler, u8>::new();
        let a = storage.allocate(1).unwrap();
        let b = storage.allocate(2).unwrap();
        storage.release(a).unwrap();
        assert_eq!(storage.iter().map(|(h, v)| (h, *v)).collect::<Vec<_>>(), vec![(b, 2)]);
        assert_eq!(storage.drain(), vec![2]);
        assert!(storage.is_empty());
        assert!(!storage.contains(b));
    }
}
