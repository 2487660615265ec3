//! GPU state shadowing
//!
//! Keeps a copy of the last value written to every piece of fixed-function
//! state and drops writes that would not change anything. The shadow is keyed
//! by [`StateSlot`], so enabling blend and disabling blend hit the same entry
//! while enabling blend and enabling depth test do not.

use std::collections::HashMap;

use super::gpu::{
    BufferTarget, Capability, CompareFunc, Face, FrontFace, GpuContext, RawHandle, StateCommand,
    StateSlot, TextureTarget,
};

/// Counters since the last [`GpuStateCache::take_stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateStats {
    /// Calls forwarded to the GPU
    pub issued: u64,
    /// Calls dropped as redundant
    pub elided: u64,
}

/// Shadow copy of GPU fixed-function state
#[derive(Debug, Default)]
pub struct GpuStateCache {
    shadow: HashMap<StateSlot, StateCommand>,
    stats: StateStats,
}

impl GpuStateCache {
    /// Empty shadow: every first write is issued
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue `command` unless the shadow already holds it. Returns whether it
    /// was issued.
    pub fn apply(&mut self, gpu: &mut dyn GpuContext, command: StateCommand) -> bool {
        let slot = command.slot();
        if self.shadow.get(&slot) == Some(&command) {
            self.stats.elided += 1;
            return false;
        }

        gpu.apply_state(&command);
        self.stats.issued += 1;

        // A vertex array carries its own element buffer binding
        if slot == StateSlot::VertexArray {
            self.shadow.remove(&StateSlot::Buffer(BufferTarget::ElementArray));
        }
        self.shadow.insert(slot, command);
        true
    }

    /// Forget the shadow entirely. Every following write is issued.
    pub fn reset(&mut self) {
        log::debug!("Resetting GPU state shadow ({} entries)", self.shadow.len());
        self.shadow.clear();
    }

    /// Forget one slot, for state changed behind the cache's back
    pub fn invalidate(&mut self, slot: StateSlot) {
        self.shadow.remove(&slot);
    }

    /// Shadowed value of a slot
    pub fn current(&self, slot: StateSlot) -> Option<&StateCommand> {
        self.shadow.get(&slot)
    }

    /// Read and reset counters
    pub fn take_stats(&mut self) -> StateStats {
        std::mem::take(&mut self.stats)
    }

    /// Enable a capability
    pub fn enable(&mut self, gpu: &mut dyn GpuContext, capability: Capability) -> bool {
        self.apply(gpu, StateCommand::Enable(capability))
    }

    /// Disable a capability
    pub fn disable(&mut self, gpu: &mut dyn GpuContext, capability: Capability) -> bool {
        self.apply(gpu, StateCommand::Disable(capability))
    }

    /// Enable or disable a capability
    pub fn set_enabled(&mut self, gpu: &mut dyn GpuContext, capability: Capability, enabled: bool) -> bool {
        if enabled {
            self.enable(gpu, capability)
        } else {
            self.disable(gpu, capability)
        }
    }

    /// Depth comparison
    pub fn depth_func(&mut self, gpu: &mut dyn GpuContext, func: CompareFunc) -> bool {
        self.apply(gpu, StateCommand::DepthFunc(func))
    }

    /// Depth writes
    pub fn depth_mask(&mut self, gpu: &mut dyn GpuContext, enabled: bool) -> bool {
        self.apply(gpu, StateCommand::DepthMask(enabled))
    }

    /// Culled faces
    pub fn cull_face(&mut self, gpu: &mut dyn GpuContext, face: Face) -> bool {
        self.apply(gpu, StateCommand::CullFace(face))
    }

    /// Front-facing winding
    pub fn front_face(&mut self, gpu: &mut dyn GpuContext, front_face: FrontFace) -> bool {
        self.apply(gpu, StateCommand::FrontFace(front_face))
    }

    /// Current program
    pub fn use_program(&mut self, gpu: &mut dyn GpuContext, program: Option<RawHandle>) -> bool {
        self.apply(gpu, StateCommand::UseProgram(program))
    }

    /// Current vertex array
    pub fn bind_vertex_array(&mut self, gpu: &mut dyn GpuContext, vertex_array: Option<RawHandle>) -> bool {
        self.apply(gpu, StateCommand::BindVertexArray(vertex_array))
    }

    /// Buffer bound to a target
    pub fn bind_buffer(&mut self, gpu: &mut dyn GpuContext, target: BufferTarget, buffer: Option<RawHandle>) -> bool {
        self.apply(gpu, StateCommand::BindBuffer { target, buffer })
    }

    /// Bind a texture to a unit, selecting the unit first
    pub fn bind_texture(
        &mut self,
        gpu: &mut dyn GpuContext,
        unit: u32,
        target: TextureTarget,
        texture: Option<RawHandle>,
    ) -> bool {
        let binding = StateCommand::BindTexture { unit, target, texture };
        if self.shadow.get(&binding.slot()) == Some(&binding) {
            self.stats.elided += 1;
            return false;
        }
        self.apply(gpu, StateCommand::ActiveTexture(unit));
        self.apply(gpu, binding)
    }

    /// Viewport rectangle
    pub fn viewport(&mut self, gpu: &mut dyn GpuContext, x: i32, y: i32, width: u32, height: u32) -> bool {
        self.apply(gpu, StateCommand::Viewport { x, y, width, height })
    }

    /// Clear color
    pub fn clear_color(&mut self, gpu: &mut dyn GpuContext, color: [f32; 4]) -> bool {
        self.apply(gpu, StateCommand::ClearColor(color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::BlendFactor;
    use crate::render::headless::{GpuCall, RecordingContext};

    fn state_calls(gpu: &RecordingContext) -> usize {
        gpu.count(|c| matches!(c, GpuCall::State(_)))
    }

    #[test]
    fn test_same_value_twice_issues_once() {
        let mut gpu = RecordingContext::new();
        let mut cache = GpuStateCache::new();

        assert!(cache.enable(&mut gpu, Capability::Blend));
        assert!(!cache.enable(&mut gpu, Capability::Blend));
        assert_eq!(state_calls(&gpu), 1);

        assert!(cache.disable(&mut gpu, Capability::Blend));
        assert_eq!(state_calls(&gpu), 2);

        let stats = cache.take_stats();
        assert_eq!(stats, StateStats { issued: 2, elided: 1 });
    }

    #[test]
    fn test_independent_slots() {
        let mut gpu = RecordingContext::new();
        let mut cache = GpuStateCache::new();
        cache.enable(&mut gpu, Capability::Blend);
        cache.enable(&mut gpu, Capability::DepthTest);
        let blend = StateCommand::BlendFuncSeparate {
            src_rgb: BlendFactor::SrcAlpha,
            dst_rgb: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
        };
        assert!(cache.apply(&mut gpu, blend.clone()));
        assert!(!cache.apply(&mut gpu, blend));
        assert_eq!(state_calls(&gpu), 3);
    }

    #[test]
    fn test_reset_reissues_everything() {
        let mut gpu = RecordingContext::new();
        let mut cache = GpuStateCache::new();
        cache.depth_mask(&mut gpu, false);
        cache.viewport(&mut gpu, 0, 0, 640, 480);

        cache.reset();
        assert!(cache.depth_mask(&mut gpu, false));
        assert!(cache.viewport(&mut gpu, 0, 0, 640, 480));
        assert_eq!(state_calls(&gpu), 4);
    }

    #[test]
    fn test_vertex_array_bind_invalidates_element_buffer() {
        let mut gpu = RecordingContext::new();
        let mut cache = GpuStateCache::new();
        let ebo = Some(RawHandle(9));

        cache.bind_buffer(&mut gpu, BufferTarget::ElementArray, ebo);
        assert!(!cache.bind_buffer(&mut gpu, BufferTarget::ElementArray, ebo));

        cache.bind_vertex_array(&mut gpu, Some(RawHandle(3)));
        assert!(cache.bind_buffer(&mut gpu, BufferTarget::ElementArray, ebo));
    }

    #[test]
    fn test_texture_binding_selects_unit_once() {
        let mut gpu = RecordingContext::new();
        let mut cache = GpuStateCache::new();
        let tex = Some(RawHandle(5));

        assert!(cache.bind_texture(&mut gpu, 1, TextureTarget::Texture2D, tex));
        assert!(!cache.bind_texture(&mut gpu, 1, TextureTarget::Texture2D, tex));
        assert_eq!(state_calls(&gpu), 2);
        assert_eq!(cache.current(StateSlot::ActiveTexture), Some(&StateCommand::ActiveTexture(1)));
    }
}
