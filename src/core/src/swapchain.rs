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

//! Swapchains and their non-owning links to the command lists rendering into them.

use crate::command::CommandListToken;
use crate::format::PixelFormat;
use crate::handle::{kind, Handle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Parameters of a swapchain.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SwapchainDescription {
    #[allow(missing_docs)]
    pub width: u32,
    #[allow(missing_docs)]
    pub height: u32,
    /// Whether a depth attachment is created next to the color buffer.
    pub depth: bool,
    /// Format of the depth attachment.
    pub depth_format: PixelFormat,
    /// Wait for vertical blank on present.
    pub vsync: bool,
    /// Use an sRGB color format.
    pub srgb: bool,
}

impl Default for SwapchainDescription {
    fn default() -> Self {
        SwapchainDescription {
            width: 1280,
            height: 720,
            depth: true,
            depth_format: PixelFormat::D24UNormS8UInt,
            vsync: true,
            srgb: false,
        }
    }
}

impl SwapchainDescription {
    /// Format of the color buffer.
    pub fn color_format(&self) -> PixelFormat {
        if self.srgb {
            PixelFormat::B8G8R8A8UNormSRgb
        } else {
            PixelFormat::B8G8R8A8UNorm
        }
    }
}

/// Weak registry of the command lists whose pending work renders into a swapchain.
///
/// A command list registers itself when it binds a swapchain framebuffer and unregisters
/// from its completion callback. The registry never keeps a list alive.
#[derive(Debug, Default)]
pub struct References {
    lists: Mutex<Vec<Weak<CommandListToken>>>,
}

impl References {
    /// Record that `token`'s list references the swapchain.
    pub fn register(&self, token: &Arc<CommandListToken>) {
        let mut lists = self.lists.lock();
        let ptr = Arc::as_ptr(token);
        if !lists.iter().any(|weak| weak.as_ptr() == ptr) {
            lists.push(Arc::downgrade(token));
        }
    }

    /// Forget `token`'s list, along with any list that no longer exists.
    pub fn unregister(&self, token: &CommandListToken) {
        let ptr = token as *const CommandListToken;
        self.lists
            .lock()
            .retain(|weak| weak.as_ptr() != ptr && weak.strong_count() != 0);
    }

    /// Number of live command lists referencing the swapchain.
    pub fn count(&self) -> usize {
        let mut lists = self.lists.lock();
        lists.retain(|weak| weak.strong_count() != 0);
        lists.len()
    }
}

/// A set of presentable images.
#[derive(Debug)]
pub struct Swapchain {
    desc: Mutex<SwapchainDescription>,
    targets: Mutex<Targets>,
    references: Arc<References>,
    presented: AtomicU64,
}

/// Objects backing a swapchain image.
#[derive(Clone, Debug)]
pub(crate) struct Targets {
    pub framebuffer: Handle<kind::Framebuffer>,
    pub color: Handle<kind::Texture>,
    pub depth: Option<Handle<kind::Texture>>,
}

impl Swapchain {
    pub(crate) fn new(desc: SwapchainDescription, references: Arc<References>, targets: Targets) -> Self {
        Swapchain {
            desc: Mutex::new(desc),
            targets: Mutex::new(targets),
            references,
            presented: AtomicU64::new(0),
        }
    }

    /// Current parameters.
    pub fn desc(&self) -> SwapchainDescription {
        self.desc.lock().clone()
    }

    /// Framebuffer rendering into the current image. Changes on resize.
    pub fn framebuffer(&self) -> Handle<kind::Framebuffer> {
        self.targets.lock().framebuffer
    }

    /// Registry of referencing command lists.
    pub fn references(&self) -> &Arc<References> {
        &self.references
    }

    /// Number of presented frames.
    pub fn presented_frames(&self) -> u64 {
        self.presented.load(Ordering::Acquire)
    }

    pub(crate) fn targets(&self) -> Targets {
        self.targets.lock().clone()
    }

    pub(crate) fn replace(&self, desc: SwapchainDescription, targets: Targets) -> Targets {
        *self.desc.lock() = desc;
        std::mem::replace(&mut *self.targets.lock(), targets)
    }

    pub(crate) fn mark_presented(&self) -> u64 {
        self.presented.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_are_weak() {
        let references = References::default();
        let a = Arc::new(CommandListToken::new());
        let b = Arc::new(CommandListToken::new());
        references.register(&a);
        references.register(&a);
        references.register(&b);
        assert_eq!(references.count(), 2);
        references.unregister(&a);
        assert_eq!(references.count(), 1);
        drop(b);
        assert_eq!(references.count(), 0);
    }
}
