//! Headless GPU context
//!
//! [`RecordingContext`] implements [`GpuContext`] without a device. It hands
//! out handles, records every call it receives, and reports active program
//! inputs by scanning the `attribute` / `uniform` declarations left after a
//! minimal preprocessor pass (`#define`, `#ifdef`, `#ifndef`, `#else`,
//! `#endif`). Context loss and compile failures can be simulated.

use std::collections::{HashMap, HashSet};

use super::gpu::{
    ActiveAttribute, ActiveUniform, AttributeLayout, BufferTarget, BufferUsage, CompiledProgram,
    DrawMode, GlslType, GpuCapabilities, GpuContext, GpuError, IndexType, RawHandle, StateCommand,
    TextureDescriptor, UniformLocation, UniformValue,
};
use crate::core::ClearMask;

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    /// Fixed-function state change
    State(StateCommand),
    /// Buffer created
    CreateBuffer {
        /// New handle
        handle: RawHandle,
        /// Binding point
        target: BufferTarget,
        /// Bytes uploaded
        size: usize,
    },
    /// Buffer contents replaced
    UpdateBuffer {
        /// Buffer
        handle: RawHandle,
        /// Bytes uploaded
        size: usize,
    },
    /// Buffer deleted
    DeleteBuffer(RawHandle),
    /// Texture created
    CreateTexture(RawHandle),
    /// Texture deleted
    DeleteTexture(RawHandle),
    /// Program compiled and linked
    CompileProgram(RawHandle),
    /// Program deleted
    DeleteProgram(RawHandle),
    /// Vertex array created
    CreateVertexArray(RawHandle),
    /// Vertex array deleted
    DeleteVertexArray(RawHandle),
    /// Attribute pointer set
    VertexAttribPointer {
        /// Attribute location
        location: u32,
        /// Layout
        layout: AttributeLayout,
    },
    /// Uniform written
    SetUniform {
        /// Program in use at the time
        program: Option<RawHandle>,
        /// Location
        location: UniformLocation,
        /// Value
        value: UniformValue,
    },
    /// Framebuffer cleared
    Clear(ClearMask),
    /// Non-indexed draw
    DrawArrays {
        /// Topology
        mode: DrawMode,
        /// First vertex
        first: u32,
        /// Vertex count
        count: u32,
    },
    /// Indexed draw
    DrawElements {
        /// Topology
        mode: DrawMode,
        /// Index count
        count: u32,
        /// Index width
        index_type: IndexType,
        /// Byte offset
        offset: u32,
    },
}

impl GpuCall {
    /// Whether this is a draw call
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawArrays { .. } | Self::DrawElements { .. })
    }
}

/// Kind of a live GPU object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Buffer
    Buffer,
    /// Texture
    Texture,
    /// Program
    Program,
    /// Vertex array
    VertexArray,
}

/// Recording [`GpuContext`] for tests and offline runs
#[derive(Debug)]
pub struct RecordingContext {
    calls: Vec<GpuCall>,
    next_handle: u32,
    live: HashMap<RawHandle, ObjectKind>,
    programs: HashMap<RawHandle, CompiledProgram>,
    current_program: Option<RawHandle>,
    capabilities: GpuCapabilities,
    capabilities_error: Option<GpuError>,
    context_lost: bool,
    compile_failure: Option<String>,
}

impl RecordingContext {
    /// Context with generous default limits
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            next_handle: 1,
            live: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            capabilities: GpuCapabilities {
                max_texture_units: 16,
                max_vertex_attribs: 16,
                vertex_array_objects: true,
                uint_indices: true,
            },
            capabilities_error: None,
            context_lost: false,
            compile_failure: None,
        }
    }

    /// Override reported limits
    pub fn with_capabilities(mut self, capabilities: GpuCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Make the capability query fail
    pub fn fail_capabilities(&mut self, error: Option<GpuError>) {
        self.capabilities_error = error;
    }

    /// Make every following compile fail with `log`, or succeed again with `None`
    pub fn set_compile_failure(&mut self, log: Option<String>) {
        self.compile_failure = log;
    }

    /// Simulate context loss: every handle becomes invalid
    pub fn lose_context(&mut self) {
        self.context_lost = true;
        self.live.clear();
        self.programs.clear();
        self.current_program = None;
    }

    /// Simulate context restoration
    pub fn restore_context(&mut self) {
        self.context_lost = false;
    }

    /// Every recorded call
    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    /// Drain the recorded calls
    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    /// Forget recorded calls
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Count calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&GpuCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    /// Number of draw calls recorded
    pub fn draw_count(&self) -> usize {
        self.count(GpuCall::is_draw)
    }

    /// Live objects of a kind
    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.live.values().filter(|k| **k == kind).count()
    }

    /// Active inputs of a live program
    pub fn program(&self, handle: RawHandle) -> Option<&CompiledProgram> {
        self.programs.get(&handle)
    }

    /// Values written to uniform `name` of any live program, in call order
    pub fn uniform_writes(&self, name: &str) -> Vec<&UniformValue> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                GpuCall::SetUniform { program: Some(program), location, value } => {
                    let uniform = self.programs.get(program)?.uniforms.iter().find(|u| u.name == name)?;
                    (uniform.location == *location).then_some(value)
                }
                _ => None,
            })
            .collect()
    }

    fn allocate(&mut self, kind: ObjectKind) -> RawHandle {
        let handle = RawHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, kind);
        handle
    }

    fn release(&mut self, handle: RawHandle) {
        self.live.remove(&handle);
    }
}

impl Default for RecordingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuContext for RecordingContext {
    fn capabilities(&self) -> Result<GpuCapabilities, GpuError> {
        if self.context_lost {
            return Err(GpuError::ContextLost);
        }
        match &self.capabilities_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.capabilities),
        }
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn apply_state(&mut self, command: &StateCommand) {
        if self.context_lost {
            return;
        }
        if let StateCommand::UseProgram(program) = command {
            self.current_program = *program;
        }
        self.calls.push(GpuCall::State(command.clone()));
    }

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        _usage: BufferUsage,
    ) -> Result<RawHandle, GpuError> {
        if self.context_lost {
            return Err(GpuError::ContextLost);
        }
        let handle = self.allocate(ObjectKind::Buffer);
        self.calls.push(GpuCall::CreateBuffer { handle, target, size: data.len() });
        Ok(handle)
    }

    fn update_buffer(&mut self, buffer: RawHandle, _target: BufferTarget, data: &[u8]) {
        if self.context_lost {
            return;
        }
        self.calls.push(GpuCall::UpdateBuffer { handle: buffer, size: data.len() });
    }

    fn delete_buffer(&mut self, buffer: RawHandle) {
        if self.context_lost {
            return;
        }
        self.release(buffer);
        self.calls.push(GpuCall::DeleteBuffer(buffer));
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor<'_>) -> Result<RawHandle, GpuError> {
        if self.context_lost {
            return Err(GpuError::ContextLost);
        }
        if let Some(pixels) = descriptor.pixels {
            let expected = descriptor.width as usize * descriptor.height as usize * 4;
            if pixels.len() < expected && descriptor.format == super::gpu::TextureFormat::Rgba8 {
                return Err(GpuError::ResourceCreation(format!(
                    "texture needs {expected} bytes, got {}",
                    pixels.len()
                )));
            }
        }
        let handle = self.allocate(ObjectKind::Texture);
        self.calls.push(GpuCall::CreateTexture(handle));
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: RawHandle) {
        if self.context_lost {
            return;
        }
        self.release(texture);
        self.calls.push(GpuCall::DeleteTexture(texture));
    }

    fn compile_program(&mut self, vertex: &str, fragment: &str) -> Result<CompiledProgram, GpuError> {
        if self.context_lost {
            return Err(GpuError::ContextLost);
        }
        if let Some(log) = &self.compile_failure {
            return Err(GpuError::ShaderCompilation {
                stage: "fragment",
                log: log.clone(),
            });
        }

        let vertex_decls = declarations(vertex);
        let fragment_decls = declarations(fragment);

        let attributes = vertex_decls
            .iter()
            .filter(|d| d.storage == Storage::Attribute)
            .enumerate()
            .map(|(location, d)| ActiveAttribute {
                name: d.name.clone(),
                location: location as u32,
                kind: d.kind,
            })
            .collect();

        let mut seen = HashSet::new();
        let mut uniforms = Vec::new();
        let mut next_location = 0;
        for decl in vertex_decls.iter().chain(fragment_decls.iter()) {
            if decl.storage != Storage::Uniform || !seen.insert(decl.name.clone()) {
                continue;
            }
            uniforms.push(ActiveUniform {
                name: decl.name.clone(),
                location: UniformLocation(next_location),
                kind: decl.kind,
                array_size: decl.array_size,
            });
            next_location += decl.array_size;
        }

        let handle = self.allocate(ObjectKind::Program);
        let program = CompiledProgram { handle, attributes, uniforms };
        self.programs.insert(handle, program.clone());
        self.calls.push(GpuCall::CompileProgram(handle));
        Ok(program)
    }

    fn delete_program(&mut self, program: RawHandle) {
        if self.context_lost {
            return;
        }
        self.release(program);
        self.programs.remove(&program);
        self.calls.push(GpuCall::DeleteProgram(program));
    }

    fn create_vertex_array(&mut self) -> Result<RawHandle, GpuError> {
        if self.context_lost {
            return Err(GpuError::ContextLost);
        }
        if !self.capabilities.vertex_array_objects {
            return Err(GpuError::Unsupported("vertex array objects".to_string()));
        }
        let handle = self.allocate(ObjectKind::VertexArray);
        self.calls.push(GpuCall::CreateVertexArray(handle));
        Ok(handle)
    }

    fn delete_vertex_array(&mut self, vertex_array: RawHandle) {
        if self.context_lost {
            return;
        }
        self.release(vertex_array);
        self.calls.push(GpuCall::DeleteVertexArray(vertex_array));
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: &AttributeLayout) {
        if self.context_lost {
            return;
        }
        self.calls.push(GpuCall::VertexAttribPointer { location, layout: *layout });
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        if self.context_lost {
            return;
        }
        self.calls.push(GpuCall::SetUniform {
            program: self.current_program,
            location,
            value: value.clone(),
        });
    }

    fn clear(&mut self, mask: ClearMask) {
        if self.context_lost {
            return;
        }
        self.calls.push(GpuCall::Clear(mask));
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) {
        if self.context_lost {
            return;
        }
        self.calls.push(GpuCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&mut self, mode: DrawMode, count: u32, index_type: IndexType, offset: u32) {
        if self.context_lost {
            return;
        }
        self.calls.push(GpuCall::DrawElements { mode, count, index_type, offset });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    Attribute,
    Uniform,
}

#[derive(Debug, Clone)]
struct Declaration {
    storage: Storage,
    kind: GlslType,
    name: String,
    array_size: u32,
}

/// Declarations surviving the preprocessor, in source order
fn declarations(source: &str) -> Vec<Declaration> {
    let mut defines: HashMap<String, String> = HashMap::new();
    // Branch state of every open conditional
    let mut stack: Vec<bool> = Vec::new();
    let mut out = Vec::new();

    for line in source.lines().map(str::trim) {
        let active = stack.iter().all(|b| *b);

        if let Some(directive) = line.strip_prefix('#') {
            let mut parts = directive.split_whitespace();
            match parts.next() {
                Some("define") if active => {
                    if let Some(name) = parts.next() {
                        let value = parts.next().unwrap_or("").to_string();
                        defines.insert(name.to_string(), value);
                    }
                }
                Some("ifdef") => {
                    let defined = parts.next().is_some_and(|n| defines.contains_key(n));
                    stack.push(defined);
                }
                Some("ifndef") => {
                    let defined = parts.next().is_some_and(|n| defines.contains_key(n));
                    stack.push(!defined);
                }
                Some("if") => stack.push(true),
                Some("else") => {
                    if let Some(top) = stack.last_mut() {
                        *top = !*top;
                    }
                }
                Some("endif") => {
                    stack.pop();
                }
                _ => {}
            }
            continue;
        }

        if !active {
            continue;
        }
        if let Some(decl) = parse_declaration(line, &defines) {
            out.push(decl);
        }
    }
    out
}

fn parse_declaration(line: &str, defines: &HashMap<String, String>) -> Option<Declaration> {
    let line = line.strip_suffix(';')?;
    let mut tokens = line.split_whitespace();
    let storage = match tokens.next()? {
        "attribute" => Storage::Attribute,
        "uniform" => Storage::Uniform,
        _ => return None,
    };

    let mut type_token = tokens.next()?;
    if matches!(type_token, "highp" | "mediump" | "lowp") {
        type_token = tokens.next()?;
    }
    let kind = GlslType::from_keyword(type_token)?;
    let declarator = tokens.next()?;

    let (name, array_size) = match declarator.split_once('[') {
        Some((name, rest)) => {
            let size_token = rest.strip_suffix(']')?;
            let size = size_token
                .parse::<u32>()
                .ok()
                .or_else(|| defines.get(size_token)?.parse().ok())?;
            (name, size)
        }
        None => (declarator, 1),
    };

    Some(Declaration {
        storage,
        kind,
        name: name.to_string(),
        array_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = "\
#define HAS_NORMAL
#define COUNT 3
attribute vec3 a_position;
#ifdef HAS_NORMAL
attribute vec3 a_normal;
#else
attribute vec3 a_fallback;
#endif
#ifdef HAS_UV
attribute vec2 a_uv;
#endif
uniform mat4 u_mvp;
uniform highp vec3 u_lights[COUNT];
";

    const FRAGMENT: &str = "\
uniform mat4 u_mvp;
uniform sampler2D u_map;
";

    #[test]
    fn test_preprocessed_declarations() {
        let mut gpu = RecordingContext::new();
        let program = gpu.compile_program(VERTEX, FRAGMENT).unwrap();

        let attributes: Vec<&str> = program.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(attributes, vec!["a_position", "a_normal"]);

        let uniforms: Vec<(&str, u32)> = program
            .uniforms
            .iter()
            .map(|u| (u.name.as_str(), u.array_size))
            .collect();
        assert_eq!(uniforms, vec![("u_mvp", 1), ("u_lights", 3), ("u_map", 1)]);
        assert_eq!(program.uniforms[2].location, UniformLocation(4));
        assert!(program.uniforms[2].kind.is_sampler());
    }

    #[test]
    fn test_context_loss_invalidates_everything() {
        let mut gpu = RecordingContext::new();
        gpu.create_buffer(BufferTarget::Array, &[0; 4], BufferUsage::Static).unwrap();
        assert_eq!(gpu.live_count(ObjectKind::Buffer), 1);

        gpu.lose_context();
        assert_eq!(gpu.live_count(ObjectKind::Buffer), 0);
        assert_eq!(
            gpu.create_buffer(BufferTarget::Array, &[0; 4], BufferUsage::Static),
            Err(GpuError::ContextLost)
        );
        gpu.draw_arrays(DrawMode::Triangles, 0, 3);
        assert_eq!(gpu.draw_count(), 0);

        gpu.restore_context();
        assert!(gpu.capabilities().is_ok());
    }

    #[test]
    fn test_compile_failure_switch() {
        let mut gpu = RecordingContext::new();
        gpu.set_compile_failure(Some("syntax error".to_string()));
        assert!(matches!(
            gpu.compile_program(VERTEX, FRAGMENT),
            Err(GpuError::ShaderCompilation { .. })
        ));
        gpu.set_compile_failure(None);
        assert!(gpu.compile_program(VERTEX, FRAGMENT).is_ok());
    }
}
