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

//! Resource layouts, resource sets and pipeline state.
//!
//! Everything in here is immutable once created and shared between command lists
//! through `Arc`.

use crate::buffer::{BufferRange, BufferUsage};
use crate::format::{PixelFormat, VertexFormat};
use crate::handle::{kind, Handle};
use crate::sampler::Sampler;
use crate::texture::{SampleCount, TextureUsage, TextureView};
use crate::Backend;
use bitflags::bitflags;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Maximum number of color attachments of a framebuffer.
pub const MAX_COLOR_TARGETS: usize = 8;
/// Maximum size of push constant data in bytes.
pub const MAX_PUSH_CONSTANTS_SIZE: usize = 128;

bitflags!(
    /// Shader stages a binding is visible to.
    pub struct ShaderStages: u8 {
        #[allow(missing_docs)]
        const VERTEX = 0x1;
        #[allow(missing_docs)]
        const GEOMETRY = 0x2;
        #[allow(missing_docs)]
        const TESSELLATION_CONTROL = 0x4;
        #[allow(missing_docs)]
        const TESSELLATION_EVALUATION = 0x8;
        #[allow(missing_docs)]
        const PIXEL = 0x10;
        #[allow(missing_docs)]
        const COMPUTE = 0x20;
        /// Every stage of a graphic pipeline.
        const GRAPHICS = Self::VERTEX.bits | Self::GEOMETRY.bits | Self::TESSELLATION_CONTROL.bits
            | Self::TESSELLATION_EVALUATION.bits | Self::PIXEL.bits;
    }
);

/// Kind of resource bound at one element of a resource layout.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    ConstantBuffer,
    StructuredBufferReadOnly,
    StructuredBufferReadWrite,
    TextureReadOnly,
    TextureReadWrite,
    Sampler,
}

impl ResourceKind {
    /// Every kind, in a stable order.
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::ConstantBuffer,
        ResourceKind::StructuredBufferReadOnly,
        ResourceKind::StructuredBufferReadWrite,
        ResourceKind::TextureReadOnly,
        ResourceKind::TextureReadWrite,
        ResourceKind::Sampler,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Whether the kind is bound from a buffer.
    pub fn is_buffer(self) -> bool {
        match self {
            ResourceKind::ConstantBuffer
            | ResourceKind::StructuredBufferReadOnly
            | ResourceKind::StructuredBufferReadWrite => true,
            _ => false,
        }
    }

    /// Whether the kind is bound from a texture.
    pub fn is_texture(self) -> bool {
        match self {
            ResourceKind::TextureReadOnly | ResourceKind::TextureReadWrite => true,
            _ => false,
        }
    }
}

/// One element of a resource layout.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceLayoutElement {
    /// Name of the binding in shader code.
    pub name: String,
    /// Kind of bound resource.
    pub kind: ResourceKind,
    /// Stages the binding is visible to.
    pub stages: ShaderStages,
    /// Whether a byte offset is supplied every time the set is bound.
    pub dynamic: bool,
}

impl ResourceLayoutElement {
    /// A non-dynamic element.
    pub fn new(name: &str, kind: ResourceKind, stages: ShaderStages) -> Self {
        ResourceLayoutElement {
            name: name.to_owned(),
            kind,
            stages,
            dynamic: false,
        }
    }

    /// Same element, taking a dynamic offset.
    pub fn with_dynamic_offset(mut self) -> Self {
        self.dynamic = true;
        self
    }
}

/// Parameters of a resource layout.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ResourceLayoutDescription {
    /// Ordered elements.
    pub elements: Vec<ResourceLayoutElement>,
}

/// The typed shape of the bindings a pipeline expects at one slot.
#[derive(Debug)]
pub struct ResourceLayout {
    elements: Vec<ResourceLayoutElement>,
    dynamic_count: u32,
    counts: [u32; 6],
}

impl ResourceLayout {
    /// Build a layout, precomputing its per-kind counts.
    pub fn new(desc: &ResourceLayoutDescription) -> Self {
        let mut counts = [0; 6];
        for element in &desc.elements {
            counts[element.kind.index()] += 1;
        }
        ResourceLayout {
            dynamic_count: desc.elements.iter().filter(|e| e.dynamic).count() as u32,
            elements: desc.elements.clone(),
            counts,
        }
    }

    /// Ordered elements.
    pub fn elements(&self) -> &[ResourceLayoutElement] {
        &self.elements
    }

    /// Number of elements taking a dynamic offset.
    pub fn dynamic_count(&self) -> u32 {
        self.dynamic_count
    }

    /// Number of elements of the given kind.
    pub fn count(&self, kind: ResourceKind) -> u32 {
        self.counts[kind.index()]
    }

    /// Whether both layouts bind the same kinds in the same order.
    pub fn is_compatible(&self, other: &ResourceLayout) -> bool {
        self.elements.len() == other.elements.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| a.kind == b.kind)
    }
}

/// Resource referenced by one element of a resource set description.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum BindingResource {
    /// A whole buffer.
    Buffer(Handle<kind::Buffer>),
    /// A byte range of a buffer.
    BufferRange {
        /// The buffer.
        buffer: Handle<kind::Buffer>,
        /// Start of the range.
        offset: u32,
        /// Size of the range.
        size: u32,
    },
    /// A texture, viewed whole.
    Texture(Handle<kind::Texture>),
    /// A texture view.
    TextureView(Handle<kind::TextureView>),
    /// A sampler.
    Sampler(Handle<kind::Sampler>),
}

/// Parameters of a resource set.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceSetDescription {
    /// Layout the set conforms to.
    pub layout: Handle<kind::ResourceLayout>,
    /// One resource per layout element.
    pub resources: Vec<BindingResource>,
}

/// A resolved resource of a resource set.
pub enum BoundResource<B: Backend> {
    /// A buffer range.
    Buffer(BufferRange<B>),
    /// A texture view.
    TextureView(Arc<TextureView<B>>),
    /// A sampler.
    Sampler(Arc<Sampler<B>>),
}

impl<B: Backend> fmt::Debug for BoundResource<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            BoundResource::Buffer(ref range) => range.fmt(f),
            BoundResource::TextureView(ref view) => view.fmt(f),
            BoundResource::Sampler(ref sampler) => sampler.fmt(f),
        }
    }
}

impl<B: Backend> BoundResource<B> {
    /// Whether this resource can back an element of the given kind.
    pub fn supports(&self, kind: ResourceKind) -> bool {
        match (self, kind) {
            (&BoundResource::Buffer(ref range), ResourceKind::ConstantBuffer) => {
                range.buffer.usage().contains(BufferUsage::CONSTANT)
            }
            (&BoundResource::Buffer(ref range), ResourceKind::StructuredBufferReadOnly) => range
                .buffer
                .usage()
                .intersects(BufferUsage::STRUCTURED_READ_ONLY | BufferUsage::STRUCTURED_READ_WRITE),
            (&BoundResource::Buffer(ref range), ResourceKind::StructuredBufferReadWrite) => {
                range.buffer.usage().contains(BufferUsage::STRUCTURED_READ_WRITE)
            }
            (&BoundResource::TextureView(ref view), ResourceKind::TextureReadOnly) => {
                view.texture().desc().usage.contains(TextureUsage::SAMPLED)
            }
            (&BoundResource::TextureView(ref view), ResourceKind::TextureReadWrite) => {
                view.texture().desc().usage.contains(TextureUsage::STORAGE)
            }
            (&BoundResource::Sampler(_), ResourceKind::Sampler) => true,
            _ => false,
        }
    }
}

/// A concrete binding of one resource per element of a resource layout.
pub struct ResourceSet<B: Backend> {
    layout: Arc<ResourceLayout>,
    resources: Vec<BoundResource<B>>,
}

impl<B: Backend> fmt::Debug for ResourceSet<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field("layout", &self.layout)
            .field("resources", &self.resources)
            .finish()
    }
}

impl<B: Backend> ResourceSet<B> {
    /// Assemble a set. The factory checks the resources against the layout.
    pub fn new(layout: Arc<ResourceLayout>, resources: Vec<BoundResource<B>>) -> Self {
        debug_assert_eq!(layout.elements().len(), resources.len());
        ResourceSet { layout, resources }
    }

    /// Layout the set conforms to.
    pub fn layout(&self) -> &Arc<ResourceLayout> {
        &self.layout
    }

    /// Resources, in layout order.
    pub fn resources(&self) -> &[BoundResource<B>] {
        &self.resources
    }
}

/// Comparison used by depth, stencil and comparison samplers.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ComparisonFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Blend factor.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BlendFactor {
    Zero,
    One,
    SourceAlpha,
    InverseSourceAlpha,
    DestinationAlpha,
    InverseDestinationAlpha,
    SourceColor,
    InverseSourceColor,
    DestinationColor,
    InverseDestinationColor,
    BlendFactor,
    InverseBlendFactor,
}

/// Blend operation.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BlendFunction {
    Add,
    Subtract,
    ReverseSubtract,
    Minimum,
    Maximum,
}

bitflags!(
    /// Color channels written by a blend attachment.
    pub struct ColorWriteMask: u8 {
        #[allow(missing_docs)]
        const RED = 0x1;
        #[allow(missing_docs)]
        const GREEN = 0x2;
        #[allow(missing_docs)]
        const BLUE = 0x4;
        #[allow(missing_docs)]
        const ALPHA = 0x8;
        #[allow(missing_docs)]
        const ALL = 0xF;
    }
);

/// Blending of one color attachment.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BlendAttachment {
    pub enabled: bool,
    pub write_mask: ColorWriteMask,
    pub source_color: BlendFactor,
    pub destination_color: BlendFactor,
    pub color_function: BlendFunction,
    pub source_alpha: BlendFactor,
    pub destination_alpha: BlendFactor,
    pub alpha_function: BlendFunction,
}

impl BlendAttachment {
    /// Writes the source color unchanged.
    pub const OVERRIDE: BlendAttachment = BlendAttachment {
        enabled: false,
        write_mask: ColorWriteMask::ALL,
        source_color: BlendFactor::One,
        destination_color: BlendFactor::Zero,
        color_function: BlendFunction::Add,
        source_alpha: BlendFactor::One,
        destination_alpha: BlendFactor::Zero,
        alpha_function: BlendFunction::Add,
    };

    /// Classic alpha blending.
    pub const ALPHA_BLEND: BlendAttachment = BlendAttachment {
        enabled: true,
        write_mask: ColorWriteMask::ALL,
        source_color: BlendFactor::SourceAlpha,
        destination_color: BlendFactor::InverseSourceAlpha,
        color_function: BlendFunction::Add,
        source_alpha: BlendFactor::SourceAlpha,
        destination_alpha: BlendFactor::InverseSourceAlpha,
        alpha_function: BlendFunction::Add,
    };
}

/// Blend state of a graphic pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct BlendState {
    /// Constant blend color.
    pub blend_factor: [f32; 4],
    /// Per color attachment blending.
    pub attachments: SmallVec<[BlendAttachment; MAX_COLOR_TARGETS]>,
    /// Whether alpha drives coverage.
    pub alpha_to_coverage: bool,
}

impl Default for BlendState {
    fn default() -> Self {
        BlendState {
            blend_factor: [0.0; 4],
            attachments: SmallVec::from_slice(&[BlendAttachment::OVERRIDE]),
            alpha_to_coverage: false,
        }
    }
}

/// Stencil operation.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

/// Stencil behavior of one face.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct StencilBehavior {
    pub fail: StencilOperation,
    pub pass: StencilOperation,
    pub depth_fail: StencilOperation,
    pub comparison: ComparisonFunction,
}

impl Default for StencilBehavior {
    fn default() -> Self {
        StencilBehavior {
            fail: StencilOperation::Keep,
            pass: StencilOperation::Keep,
            depth_fail: StencilOperation::Keep,
            comparison: ComparisonFunction::Always,
        }
    }
}

/// Depth and stencil state of a graphic pipeline.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_comparison: ComparisonFunction,
    pub stencil_test: bool,
    pub stencil_front: StencilBehavior,
    pub stencil_back: StencilBehavior,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub stencil_reference: u32,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState {
            depth_test: true,
            depth_write: true,
            depth_comparison: ComparisonFunction::LessEqual,
            stencil_test: false,
            stencil_front: StencilBehavior::default(),
            stencil_back: StencilBehavior::default(),
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            stencil_reference: 0,
        }
    }
}

/// Faces culled by the rasterizer.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FaceCullMode {
    None,
    Front,
    Back,
}

/// Polygon fill mode.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PolygonFillMode {
    Solid,
    Wireframe,
}

/// Winding of front faces.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

/// Rasterizer state of a graphic pipeline.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerState {
    pub cull_mode: FaceCullMode,
    pub fill_mode: PolygonFillMode,
    pub front_face: FrontFace,
    pub depth_clip: bool,
    pub scissor_test: bool,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias: f32,
    pub depth_bias_clamp: f32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        RasterizerState {
            cull_mode: FaceCullMode::Back,
            fill_mode: PolygonFillMode::Solid,
            front_face: FrontFace::Clockwise,
            depth_clip: true,
            scissor_test: false,
            depth_bias: 0,
            slope_scaled_depth_bias: 0.0,
            depth_bias_clamp: 0.0,
        }
    }
}

/// Primitive assembly.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

/// One attribute of a vertex layout.
#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VertexElement {
    pub name: String,
    pub format: VertexFormat,
    /// Byte offset in the vertex; `None` packs after the previous element.
    pub offset: Option<u32>,
}

/// Layout of one vertex buffer.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct VertexLayout {
    /// Attributes.
    pub elements: Vec<VertexElement>,
    /// Byte stride; zero derives it from the elements.
    pub stride: u32,
    /// Zero for per-vertex data, otherwise instances per element.
    pub instance_step_rate: u32,
}

impl VertexLayout {
    /// Effective stride.
    pub fn stride(&self) -> u32 {
        if self.stride != 0 {
            return self.stride;
        }
        let mut end = 0;
        for element in &self.elements {
            let offset = element.offset.unwrap_or(end);
            end = offset + element.format.size_in_bytes();
        }
        end
    }
}

/// A shader module, opaque to this layer.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ShaderDescription {
    /// The single stage this module runs at.
    pub stage: ShaderStages,
    /// Entry point name.
    pub entry_point: String,
    /// Backend specific byte code.
    pub code: Vec<u8>,
}

impl ShaderDescription {
    /// A module for `stage` with entry point `main`.
    pub fn new(stage: ShaderStages, code: &[u8]) -> Self {
        ShaderDescription {
            stage,
            entry_point: "main".to_owned(),
            code: code.to_vec(),
        }
    }
}

/// Formats and sample count a framebuffer renders to.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct OutputDescription {
    /// Depth-stencil attachment format.
    pub depth: Option<PixelFormat>,
    /// Color attachment formats.
    pub colors: SmallVec<[PixelFormat; MAX_COLOR_TARGETS]>,
    /// Samples per texel.
    pub sample_count: SampleCount,
}

/// Parameters of a graphic pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphicPipelineDescription {
    #[allow(missing_docs)]
    pub blend: BlendState,
    #[allow(missing_docs)]
    pub depth_stencil: DepthStencilState,
    #[allow(missing_docs)]
    pub rasterizer: RasterizerState,
    #[allow(missing_docs)]
    pub topology: PrimitiveTopology,
    /// One module per used stage.
    pub shaders: Vec<ShaderDescription>,
    /// One layout per vertex buffer slot.
    pub vertex_layouts: Vec<VertexLayout>,
    /// One resource layout per set slot.
    pub resource_layouts: Vec<Handle<kind::ResourceLayout>>,
    /// Targets the pipeline renders to.
    pub output: OutputDescription,
    /// Whether the pipeline reads push constants.
    pub push_constants: bool,
}

impl Default for GraphicPipelineDescription {
    fn default() -> Self {
        GraphicPipelineDescription {
            blend: BlendState::default(),
            depth_stencil: DepthStencilState::default(),
            rasterizer: RasterizerState::default(),
            topology: PrimitiveTopology::TriangleList,
            shaders: Vec::new(),
            vertex_layouts: Vec::new(),
            resource_layouts: Vec::new(),
            output: OutputDescription::default(),
            push_constants: false,
        }
    }
}

/// Parameters of a compute pipeline.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ComputePipelineDescription {
    /// Compute module.
    pub shader: ShaderDescription,
    /// One resource layout per set slot.
    pub resource_layouts: Vec<Handle<kind::ResourceLayout>>,
    /// Threads per group.
    pub thread_group_size: [u32; 3],
    /// Whether the pipeline reads push constants.
    pub push_constants: bool,
}

/// An immutable graphic pipeline.
pub struct GraphicPipeline<B: Backend> {
    desc: GraphicPipelineDescription,
    layouts: Vec<Arc<ResourceLayout>>,
    vertex_strides: SmallVec<[u32; 8]>,
    raw: B::GraphicPipeline,
}

impl<B: Backend> fmt::Debug for GraphicPipeline<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GraphicPipeline")
            .field("output", &self.desc.output)
            .field("layouts", &self.layouts.len())
            .finish()
    }
}

impl<B: Backend> GraphicPipeline<B> {
    /// Wrap a native pipeline.
    pub fn new(desc: GraphicPipelineDescription, layouts: Vec<Arc<ResourceLayout>>, raw: B::GraphicPipeline) -> Self {
        let vertex_strides = desc.vertex_layouts.iter().map(VertexLayout::stride).collect();
        GraphicPipeline {
            desc,
            layouts,
            vertex_strides,
            raw,
        }
    }

    /// Creation parameters.
    pub fn desc(&self) -> &GraphicPipelineDescription {
        &self.desc
    }

    /// Resolved resource layouts, by set slot.
    pub fn layouts(&self) -> &[Arc<ResourceLayout>] {
        &self.layouts
    }

    /// Stride of every vertex buffer slot.
    pub fn vertex_strides(&self) -> &[u32] {
        &self.vertex_strides
    }

    /// Targets the pipeline renders to.
    pub fn output(&self) -> &OutputDescription {
        &self.desc.output
    }

    /// Whether the pipeline reads push constants.
    pub fn supports_push_constants(&self) -> bool {
        self.desc.push_constants
    }

    /// Native pipeline.
    pub fn raw(&self) -> &B::GraphicPipeline {
        &self.raw
    }
}

/// An immutable compute pipeline.
pub struct ComputePipeline<B: Backend> {
    desc: ComputePipelineDescription,
    layouts: Vec<Arc<ResourceLayout>>,
    raw: B::ComputePipeline,
}

impl<B: Backend> fmt::Debug for ComputePipeline<B> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ComputePipeline")
            .field("thread_group_size", &self.desc.thread_group_size)
            .field("layouts", &self.layouts.len())
            .finish()
    }
}

impl<B: Backend> ComputePipeline<B> {
    /// Wrap a native pipeline.
    pub fn new(desc: ComputePipelineDescription, layouts: Vec<Arc<ResourceLayout>>, raw: B::ComputePipeline) -> Self {
        ComputePipeline { desc, layouts, raw }
    }

    /// Creation parameters.
    pub fn desc(&self) -> &ComputePipelineDescription {
        &self.desc
    }

    /// Resolved resource layouts, by set slot.
    pub fn layouts(&self) -> &[Arc<ResourceLayout>] {
        &self.layouts
    }

    /// Whether the pipeline reads push constants.
    pub fn supports_push_constants(&self) -> bool {
        self.desc.push_constants
    }

    /// Native pipeline.
    pub fn raw(&self) -> &B::ComputePipeline {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(kinds: &[(ResourceKind, bool)]) -> ResourceLayout {
        ResourceLayout::new(&ResourceLayoutDescription {
            elements: kinds
                .iter()
                .enumerate()
                .map(|(i, &(kind, dynamic))| ResourceLayoutElement {
                    name: format!("e{}", i),
                    kind,
                    stages: ShaderStages::VERTEX | ShaderStages::PIXEL,
                    dynamic,
                })
                .collect(),
        })
    }

    #[test]
    fn test_layout_counts() {
        let l = layout(&[
            (ResourceKind::ConstantBuffer, true),
            (ResourceKind::TextureReadOnly, false),
            (ResourceKind::Sampler, false),
            (ResourceKind::ConstantBuffer, false),
        ]);
        assert_eq!(l.dynamic_count(), 1);
        assert_eq!(l.count(ResourceKind::ConstantBuffer), 2);
        assert_eq!(l.count(ResourceKind::TextureReadOnly), 1);
        assert_eq!(l.count(ResourceKind::TextureReadWrite), 0);
    }

    #[test]
    fn test_layout_compatibility() {
        let a = layout(&[(ResourceKind::ConstantBuffer, true), (ResourceKind::Sampler, false)]);
        let b = layout(&[(ResourceKind::ConstantBuffer, false), (ResourceKind::Sampler, false)]);
        let c = layout(&[(ResourceKind::Sampler, false), (ResourceKind::ConstantBuffer, false)]);
        assert!(a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
        assert!(!a.is_compatible(&layout(&[(ResourceKind::ConstantBuffer, true)])));
    }

    #[test]
    fn test_vertex_stride() {
        let layout = VertexLayout {
            elements: vec![
                VertexElement {
                    name: "position".into(),
                    format: VertexFormat::Float3,
                    offset: None,
                },
                VertexElement {
                    name: "uv".into(),
                    format: VertexFormat::Half2,
                    offset: None,
                },
            ],
            ..Default::default()
        };
        assert_eq!(layout.stride(), 16);
        assert_eq!(VertexLayout { stride: 32, ..layout }.stride(), 32);
    }
}
