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

//! Deduplicated fixed-function state objects.
//!
//! Equal descriptions share one native object, the way the driver hands back the same
//! interface for identical state descriptions.

use rhi_core::pso::{BlendState, DepthStencilState, RasterizerState, ShaderDescription, VertexLayout};

/// Index of a state object in its table.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StateId(pub(crate) u32);

#[derive(Debug)]
struct Table<T> {
    entries: Vec<T>,
}

impl<T: PartialEq> Table<T> {
    fn new() -> Self {
        Table { entries: Vec::new() }
    }

    fn get_or_insert(&mut self, key: T) -> StateId {
        if let Some(index) = self.entries.iter().position(|entry| *entry == key) {
            return StateId(index as u32);
        }
        self.entries.push(key);
        StateId(self.entries.len() as u32 - 1)
    }
}

#[derive(Debug)]
pub struct StateObjects {
    blends: Table<BlendState>,
    depth_stencils: Table<DepthStencilState>,
    rasterizers: Table<RasterizerState>,
    input_layouts: Table<Vec<VertexLayout>>,
    shaders: Table<ShaderDescription>,
}

impl StateObjects {
    pub fn new() -> Self {
        StateObjects {
            blends: Table::new(),
            depth_stencils: Table::new(),
            rasterizers: Table::new(),
            input_layouts: Table::new(),
            shaders: Table::new(),
        }
    }

    /// The blend factor is dynamic state and does not take part in the key.
    pub fn blend(&mut self, desc: &BlendState) -> StateId {
        let mut key = desc.clone();
        key.blend_factor = [0.0; 4];
        self.blends.get_or_insert(key)
    }

    /// The stencil reference is dynamic state and does not take part in the key.
    pub fn depth_stencil(&mut self, desc: &DepthStencilState) -> StateId {
        let mut key = *desc;
        key.stencil_reference = 0;
        self.depth_stencils.get_or_insert(key)
    }

    pub fn rasterizer(&mut self, desc: &RasterizerState) -> StateId {
        self.rasterizers.get_or_insert(*desc)
    }

    pub fn input_layout(&mut self, layouts: &[VertexLayout]) -> StateId {
        self.input_layouts.get_or_insert(layouts.to_vec())
    }

    pub fn shader(&mut self, desc: &ShaderDescription) -> StateId {
        self.shaders.get_or_insert(desc.clone())
    }

    pub fn len(&self) -> usize {
        self.blends.entries.len()
            + self.depth_stencils.entries.len()
            + self.rasterizers.entries.len()
            + self.input_layouts.entries.len()
            + self.shaders.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_state_is_not_part_of_the_key() {
        let mut objects = StateObjects::new();
        let mut blend = BlendState::default();
        let first = objects.blend(&blend);
        blend.blend_factor = [0.5; 4];
        assert_eq!(objects.blend(&blend), first);

        let mut depth = DepthStencilState::default();
        let first = objects.depth_stencil(&depth);
        depth.stencil_reference = 7;
        assert_eq!(objects.depth_stencil(&depth), first);
        depth.depth_write = !depth.depth_write;
        assert_ne!(objects.depth_stencil(&depth), first);
        assert_eq!(objects.len(), 3);
    }
}
