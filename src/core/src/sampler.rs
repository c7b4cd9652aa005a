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

//! Sampler states.

use crate::pso::ComparisonFunction;
use crate::Backend;
use std::fmt;

/// Texture coordinate wrapping.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
}

/// Texel filtering.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Filter {
    Point,
    Linear,
}

/// Border color of [`AddressMode::Border`].
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Parameters of a sampler.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerDescription {
    /// Addressing along U, V and W.
    pub address: [AddressMode; 3],
    /// Minification filter.
    pub min_filter: Filter,
    /// Magnification filter.
    pub mag_filter: Filter,
    /// Filter between mip levels.
    pub mip_filter: Filter,
    /// Maximum anisotropy; zero disables anisotropic filtering.
    pub max_anisotropy: u32,
    /// Comparison for depth samplers.
    pub comparison: Option<ComparisonFunction>,
    /// Smallest accessible LOD.
    pub min_lod: f32,
    /// Largest accessible LOD.
    pub max_lod: f32,
    /// Bias added to the computed LOD.
    pub lod_bias: f32,
    #[allow(missing_docs)]
    pub border_color: BorderColor,
}

impl Default for SamplerDescription {
    fn default() -> Self {
        SamplerDescription {
            address: [AddressMode::Wrap; 3],
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            max_anisotropy: 0,
            comparison: None,
            min_lod: 0.0,
            max_lod: std::f32::MAX,
            lod_bias: 0.0,
            border_color: BorderColor::TransparentBlack,
        }
    }
}

impl SamplerDescription {
    /// Point sampling with clamped coordinates.
    pub fn point() -> Self {
        SamplerDescription {
            address: [AddressMode::Clamp; 3],
            min_filter: Filter::Point,
            mag_filter: Filter::Point,
            mip_filter: Filter::Point,
            ..Self::default()
        }
    }
}

/// A sampler owned by the device.
pub struct Sampler<B: Backend> {
    desc: SamplerDescription,
    raw: B::Sampler,
}

impl<B: Backend> fmt::Debug for Sampler<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Sampler").field("desc", &self.desc).finish()
    }
}

impl<B: Backend> Sampler<B> {
    /// Wrap a native sampler.
    pub fn new(desc: SamplerDescription, raw: B::Sampler) -> Self {
        Sampler { desc, raw }
    }

    /// Creation parameters.
    pub fn desc(&self) -> &SamplerDescription {
        &self.desc
    }

    /// Native sampler.
    pub fn raw(&self) -> &B::Sampler {
        &self.raw
    }
}
