//! Texture sources
//!
//! Decoded pixel data plus sampling parameters. Decoding image files is the
//! caller's job; the renderer only uploads what it is given, lazily, through
//! the texture pool.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::gpu::{FilterMode, TextureDescriptor, TextureFormat, TextureTarget, WrapMode};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a texture source, used as its pool key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Texture shared between materials and lights
pub type SharedTexture = Rc<Texture>;

/// CPU-side texture description
///
/// A clone is uploaded separately: it gets its own id.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    /// Optional debug name
    pub name: Option<String>,
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
    /// Build mipmaps after upload
    pub generate_mipmaps: bool,
    /// Decoded texels
    pub pixels: Option<Vec<u8>>,
}

impl Clone for Texture {
    fn clone(&self) -> Self {
        Self {
            id: next_texture_id(),
            name: self.name.clone(),
            target: self.target,
            width: self.width,
            height: self.height,
            format: self.format,
            min_filter: self.min_filter,
            mag_filter: self.mag_filter,
            wrap_s: self.wrap_s,
            wrap_t: self.wrap_t,
            generate_mipmaps: self.generate_mipmaps,
            pixels: self.pixels.clone(),
        }
    }
}

fn next_texture_id() -> TextureId {
    TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
}

impl Texture {
    /// Create a 2D RGBA texture from decoded pixels
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            id: next_texture_id(),
            name: None,
            target: TextureTarget::Texture2D,
            width,
            height,
            format: TextureFormat::Rgba8,
            min_filter: FilterMode::LinearMipmapLinear,
            mag_filter: FilterMode::Linear,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
            generate_mipmaps: true,
            pixels: Some(pixels),
        }
    }

    /// Storage-only depth texture, typically rendered into as a shadow map
    pub fn depth(width: u32, height: u32) -> Self {
        Self {
            format: TextureFormat::Depth,
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Nearest,
            wrap_s: WrapMode::ClampToEdge,
            wrap_t: WrapMode::ClampToEdge,
            generate_mipmaps: false,
            pixels: None,
            ..Self::from_rgba8(width, height, Vec::new())
        }
    }

    /// Set the debug name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set both wrap modes
    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap_s = wrap;
        self.wrap_t = wrap;
        self
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedTexture {
        Rc::new(self)
    }

    /// Pool key
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Creation descriptor for the GPU
    pub fn descriptor(&self) -> TextureDescriptor<'_> {
        TextureDescriptor {
            target: self.target,
            width: self.width,
            height: self.height,
            format: self.format,
            min_filter: self.min_filter,
            mag_filter: self.mag_filter,
            wrap_s: self.wrap_s,
            wrap_t: self.wrap_t,
            generate_mipmaps: self.generate_mipmaps,
            pixels: self.pixels.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Texture::from_rgba8(1, 1, vec![0; 4]);
        let b = Texture::from_rgba8(1, 1, vec![0; 4]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_clone_is_uploaded_separately() {
        let original = Texture::from_rgba8(2, 1, vec![255; 8]).with_name("checker");
        let copy = original.clone();
        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.pixels, original.pixels);
        assert_eq!(copy.name.as_deref(), Some("checker"));
    }

    #[test]
    fn test_depth_texture_has_no_pixels() {
        let t = Texture::depth(512, 512);
        let d = t.descriptor();
        assert_eq!(d.format, TextureFormat::Depth);
        assert!(d.pixels.is_none());
        assert!(!d.generate_mipmaps);
    }
}
