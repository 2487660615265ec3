//! GPU context capability interface
//!
//! The renderer core never talks to a concrete graphics API. Everything it
//! needs from the device goes through [`GpuContext`]: object creation and
//! deletion, fixed-function state commands, attribute/uniform binding and draw
//! calls. State changes are expressed as [`StateCommand`] values so the
//! [`GpuStateCache`](super::state_cache::GpuStateCache) can compare them
//! against its shadow copy before issuing anything.

use crate::core::ClearMask;

/// Opaque name of a GPU-side object (buffer, texture, program, vertex array)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(pub u32);

/// Errors reported by a [`GpuContext`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    /// Every handle is invalid until the context is restored
    #[error("GPU context lost")]
    ContextLost,

    /// A shader stage failed to compile
    #[error("{stage} shader compilation failed: {log}")]
    ShaderCompilation {
        /// "vertex" or "fragment"
        stage: &'static str,
        /// Driver info log
        log: String,
    },

    /// Stages compiled but the program did not link
    #[error("Program link failed: {0}")]
    Link(String),

    /// Object creation failed (out of memory, invalid descriptor, ...)
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// Feature not available on this device
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Limits and optional features of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuCapabilities {
    /// Combined texture image units
    pub max_texture_units: u32,
    /// Vertex attribute slots
    pub max_vertex_attribs: u32,
    /// Vertex array objects available
    pub vertex_array_objects: bool,
    /// 32-bit element indices available
    pub uint_indices: bool,
}

/// Buffer binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Index data
    ElementArray,
}

/// Expected update frequency of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written once
    Static,
    /// Rewritten often
    Dynamic,
}

/// Toggleable fixed-function capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth testing
    DepthTest,
    /// Face culling
    CullFace,
    /// Color blending
    Blend,
    /// Stencil testing
    StencilTest,
    /// Scissor testing
    ScissorTest,
    /// Polygon offset for filled primitives
    PolygonOffsetFill,
    /// Alpha-to-coverage multisampling
    SampleAlphaToCoverage,
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    /// Never passes
    Never,
    /// Passes if incoming < stored
    #[default]
    Less,
    /// Passes if equal
    Equal,
    /// Passes if incoming <= stored
    LessEqual,
    /// Passes if incoming > stored
    Greater,
    /// Passes if not equal
    NotEqual,
    /// Passes if incoming >= stored
    GreaterEqual,
    /// Always passes
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source color
    SrcColor,
    /// 1 - source color
    OneMinusSrcColor,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Destination alpha
    DstAlpha,
    /// 1 - destination alpha
    OneMinusDstAlpha,
    /// Destination color
    DstColor,
    /// 1 - destination color
    OneMinusDstColor,
    /// min(source alpha, 1 - destination alpha)
    SrcAlphaSaturate,
}

/// Blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    /// src + dst
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    ReverseSubtract,
}

/// Polygon face selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    /// Front faces
    Front,
    /// Back faces
    Back,
    /// Both
    FrontAndBack,
}

/// Winding that counts as front-facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise
    #[default]
    Ccw,
    /// Clockwise
    Cw,
}

/// Texture binding target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTarget {
    /// 2D texture
    #[default]
    Texture2D,
    /// Cube map
    CubeMap,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    /// Points
    Points,
    /// Separate lines
    Lines,
    /// Closed line loop
    LineLoop,
    /// Line strip
    LineStrip,
    /// Separate triangles
    #[default]
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Triangle fan
    TriangleFan,
}

/// Element index width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

impl IndexType {
    /// Size of one index in bytes
    pub fn byte_size(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// A fixed-function state change.
///
/// Two commands with the same [`StateSlot`] overwrite each other on the GPU,
/// which is what the state cache diffs against.
#[derive(Debug, Clone, PartialEq)]
pub enum StateCommand {
    /// Enable a capability
    Enable(Capability),
    /// Disable a capability
    Disable(Capability),
    /// Depth comparison
    DepthFunc(CompareFunc),
    /// Depth writes
    DepthMask(bool),
    /// Depth range mapping
    DepthRange(f32, f32),
    /// Separate RGB/alpha blend factors
    BlendFuncSeparate {
        /// Source RGB factor
        src_rgb: BlendFactor,
        /// Destination RGB factor
        dst_rgb: BlendFactor,
        /// Source alpha factor
        src_alpha: BlendFactor,
        /// Destination alpha factor
        dst_alpha: BlendFactor,
    },
    /// Separate RGB/alpha blend equations
    BlendEquationSeparate {
        /// RGB equation
        rgb: BlendEquation,
        /// Alpha equation
        alpha: BlendEquation,
    },
    /// Faces culled when culling is enabled
    CullFace(Face),
    /// Front-facing winding
    FrontFace(FrontFace),
    /// Active texture unit
    ActiveTexture(u32),
    /// Texture bound to `unit`/`target`
    BindTexture {
        /// Texture unit
        unit: u32,
        /// Binding target
        target: TextureTarget,
        /// Texture, or unbind
        texture: Option<RawHandle>,
    },
    /// Draw framebuffer, `None` for the default one
    BindFramebuffer(Option<RawHandle>),
    /// Viewport rectangle
    Viewport {
        /// Left
        x: i32,
        /// Bottom
        y: i32,
        /// Width
        width: u32,
        /// Height
        height: u32,
    },
    /// Clear color
    ClearColor([f32; 4]),
    /// Current program
    UseProgram(Option<RawHandle>),
    /// Current vertex array object
    BindVertexArray(Option<RawHandle>),
    /// Buffer bound to a target
    BindBuffer {
        /// Binding point
        target: BufferTarget,
        /// Buffer, or unbind
        buffer: Option<RawHandle>,
    },
}

/// Identity of a state call: which piece of GPU state a command overwrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSlot {
    /// Enabled flag of a capability
    Capability(Capability),
    /// Depth func
    DepthFunc,
    /// Depth mask
    DepthMask,
    /// Depth range
    DepthRange,
    /// Blend factors
    BlendFunc,
    /// Blend equations
    BlendEquation,
    /// Cull face
    CullFace,
    /// Front face
    FrontFace,
    /// Active texture unit
    ActiveTexture,
    /// Binding of one unit/target pair
    TextureBinding(u32, TextureTarget),
    /// Framebuffer binding
    Framebuffer,
    /// Viewport
    Viewport,
    /// Clear color
    ClearColor,
    /// Program
    Program,
    /// Vertex array
    VertexArray,
    /// Buffer binding per target
    Buffer(BufferTarget),
}

impl StateCommand {
    /// State slot this command writes
    pub fn slot(&self) -> StateSlot {
        match self {
            Self::Enable(cap) | Self::Disable(cap) => StateSlot::Capability(*cap),
            Self::DepthFunc(_) => StateSlot::DepthFunc,
            Self::DepthMask(_) => StateSlot::DepthMask,
            Self::DepthRange(..) => StateSlot::DepthRange,
            Self::BlendFuncSeparate { .. } => StateSlot::BlendFunc,
            Self::BlendEquationSeparate { .. } => StateSlot::BlendEquation,
            Self::CullFace(_) => StateSlot::CullFace,
            Self::FrontFace(_) => StateSlot::FrontFace,
            Self::ActiveTexture(_) => StateSlot::ActiveTexture,
            Self::BindTexture { unit, target, .. } => StateSlot::TextureBinding(*unit, *target),
            Self::BindFramebuffer(_) => StateSlot::Framebuffer,
            Self::Viewport { .. } => StateSlot::Viewport,
            Self::ClearColor(_) => StateSlot::ClearColor,
            Self::UseProgram(_) => StateSlot::Program,
            Self::BindVertexArray(_) => StateSlot::VertexArray,
            Self::BindBuffer { target, .. } => StateSlot::Buffer(*target),
        }
    }
}

/// GLSL type of an active program input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlslType {
    /// float
    Float,
    /// vec2
    Vec2,
    /// vec3
    Vec3,
    /// vec4
    Vec4,
    /// int
    Int,
    /// bool
    Bool,
    /// mat3
    Mat3,
    /// mat4
    Mat4,
    /// sampler2D
    Sampler2D,
    /// samplerCube
    SamplerCube,
}

impl GlslType {
    /// Parse a GLSL type keyword
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "float" => Self::Float,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "int" => Self::Int,
            "bool" => Self::Bool,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            "sampler2D" => Self::Sampler2D,
            "samplerCube" => Self::SamplerCube,
            _ => return None,
        })
    }

    /// Whether uniforms of this type bind texture units
    pub fn is_sampler(self) -> bool {
        matches!(self, Self::Sampler2D | Self::SamplerCube)
    }
}

/// Active vertex attribute reported by a linked program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAttribute {
    /// Name in the shader source
    pub name: String,
    /// Bound location
    pub location: u32,
    /// Declared type
    pub kind: GlslType,
}

/// Location of a uniform within its program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Active uniform reported by a linked program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    /// Name without any `[0]` suffix
    pub name: String,
    /// Location of element 0
    pub location: UniformLocation,
    /// Declared element type
    pub kind: GlslType,
    /// 1 for non-array uniforms
    pub array_size: u32,
}

/// Result of a successful program compile + link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    /// Program object
    pub handle: RawHandle,
    /// Active attributes
    pub attributes: Vec<ActiveAttribute>,
    /// Active uniforms
    pub uniforms: Vec<ActiveUniform>,
}

/// Value written to a uniform location
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// float
    Float(f32),
    /// int / bool / sampler unit
    Int(i32),
    /// vec2
    Vec2([f32; 2]),
    /// vec3
    Vec3([f32; 3]),
    /// vec4
    Vec4([f32; 4]),
    /// mat3, column-major
    Mat3([f32; 9]),
    /// mat4, column-major
    Mat4([f32; 16]),
    /// Packed float array (vecN[] / matN[] / float[])
    FloatArray(Vec<f32>),
    /// Packed int array (sampler arrays)
    IntArray(Vec<i32>),
}

/// Layout of one float vertex attribute inside the bound array buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLayout {
    /// Components per vertex (1..=4)
    pub item_size: u8,
    /// Normalize integer data
    pub normalized: bool,
    /// Byte stride, 0 for tightly packed
    pub stride: u32,
    /// Byte offset of the first element
    pub offset: u32,
}

/// Texel format of a texture upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA
    #[default]
    Rgba8,
    /// 8-bit RGB
    Rgb8,
    /// 8-bit single channel
    Luminance8,
    /// Depth component (shadow maps)
    Depth,
}

/// Texture filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// Nearest texel
    Nearest,
    /// Bilinear
    #[default]
    Linear,
    /// Trilinear with mipmaps
    LinearMipmapLinear,
}

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    /// Repeat
    #[default]
    Repeat,
    /// Mirror on every repeat
    MirroredRepeat,
    /// Clamp to edge
    ClampToEdge,
}

/// Everything needed to create a texture object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureDescriptor<'a> {
    /// Binding target
    pub target: TextureTarget,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
    /// Minification filter
    pub min_filter: FilterMode,
    /// Magnification filter
    pub mag_filter: FilterMode,
    /// S wrapping
    pub wrap_s: WrapMode,
    /// T wrapping
    pub wrap_t: WrapMode,
    /// Build a mip chain after upload
    pub generate_mipmaps: bool,
    /// Decoded texels, `None` to allocate storage only
    pub pixels: Option<&'a [u8]>,
}

/// Device capability interface consumed by the renderer
pub trait GpuContext {
    /// Query limits. Failing here fails renderer initialization.
    fn capabilities(&self) -> Result<GpuCapabilities, GpuError>;

    /// Whether the context is currently lost
    fn is_context_lost(&self) -> bool;

    /// Issue a fixed-function state change
    fn apply_state(&mut self, command: &StateCommand);

    /// Create a buffer and upload `data`
    fn create_buffer(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<RawHandle, GpuError>;

    /// Replace the contents of a buffer
    fn update_buffer(&mut self, buffer: RawHandle, target: BufferTarget, data: &[u8]);

    /// Delete a buffer
    fn delete_buffer(&mut self, buffer: RawHandle);

    /// Create and upload a texture
    fn create_texture(&mut self, descriptor: &TextureDescriptor<'_>) -> Result<RawHandle, GpuError>;

    /// Delete a texture
    fn delete_texture(&mut self, texture: RawHandle);

    /// Compile and link a program, reporting its active inputs
    fn compile_program(&mut self, vertex: &str, fragment: &str) -> Result<CompiledProgram, GpuError>;

    /// Delete a program
    fn delete_program(&mut self, program: RawHandle);

    /// Create a vertex array object
    fn create_vertex_array(&mut self) -> Result<RawHandle, GpuError>;

    /// Delete a vertex array object
    fn delete_vertex_array(&mut self, vertex_array: RawHandle);

    /// Point an attribute location at the currently bound array buffer
    fn vertex_attrib_pointer(&mut self, location: u32, layout: &AttributeLayout);

    /// Write a uniform of the current program
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    /// Clear the bound framebuffer
    fn clear(&mut self, mask: ClearMask);

    /// Non-indexed draw
    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32);

    /// Indexed draw from the bound element buffer
    fn draw_elements(&mut self, mode: DrawMode, count: u32, index_type: IndexType, offset: u32);
}
