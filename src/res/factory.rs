//! The seam through which typed resources are created from loaded bytes.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::utils::prelude::ObjectPool;

impl_handle!(TextureHandle);
impl_handle!(FontHandle);
impl_handle!(SoundHandle);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    R8,
    RG8,
    RGB8,
    RGBA8,
}

impl TextureFormat {
    pub fn size(self) -> usize {
        match self {
            TextureFormat::R8 => 1,
            TextureFormat::RG8 => 2,
            TextureFormat::RGB8 => 3,
            TextureFormat::RGBA8 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureParams {
    pub format: TextureFormat,
    pub mipmaps: bool,
    pub repeat: bool,
}

impl Default for TextureParams {
    fn default() -> Self {
        TextureParams {
            format: TextureFormat::RGBA8,
            mipmaps: false,
            repeat: false,
        }
    }
}

/// Constructors of the typed objects a resource manager hands out. They are
/// called with fully loaded bytes; an error marks the load as failed.
pub trait Factory: Send + Sync + 'static {
    fn create_texture(&self, bytes: &[u8], params: &TextureParams) -> Result<TextureHandle>;
    fn new_texture(&self, width: u32, height: u32, params: &TextureParams) -> Result<TextureHandle>;
    fn delete_texture(&self, handle: TextureHandle);

    fn parse_bitmap_font(&self, bytes: &[u8]) -> Result<FontHandle>;
    fn parse_freetype_font(&self, bytes: &[u8], size: u32) -> Result<FontHandle>;
    fn delete_font(&self, handle: FontHandle);

    fn create_sound(&self, bytes: &[u8]) -> Result<SoundHandle>;
    fn delete_sound(&self, handle: SoundHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub params: TextureParams,
    pub width: u32,
    pub height: u32,
    /// Number of bytes the texture was created from, zero for blank textures.
    pub len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontDesc {
    Bitmap { len: usize },
    FreeType { len: usize, size: u32 },
}

#[derive(Default)]
struct HeadlessState {
    textures: ObjectPool<TextureHandle, TextureDesc>,
    fonts: ObjectPool<FontHandle, FontDesc>,
    sounds: ObjectPool<SoundHandle, usize>,
}

/// A `Factory` without any GPU or audio backend behind it. Objects are plain
/// descriptors, which makes it possible to observe what is alive.
#[derive(Default)]
pub struct HeadlessFactory {
    state: Mutex<HeadlessState>,
}

impl HeadlessFactory {
    pub fn new() -> Self {
        HeadlessFactory::default()
    }

    /// Number of live textures.
    pub fn textures(&self) -> usize {
        self.state.lock().unwrap().textures.len()
    }

    /// Number of live fonts.
    pub fn fonts(&self) -> usize {
        self.state.lock().unwrap().fonts.len()
    }

    /// Number of live sounds.
    pub fn sounds(&self) -> usize {
        self.state.lock().unwrap().sounds.len()
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<TextureDesc> {
        self.state.lock().unwrap().textures.get(handle).cloned()
    }

    pub fn font(&self, handle: FontHandle) -> Option<FontDesc> {
        self.state.lock().unwrap().fonts.get(handle).cloned()
    }

    /// Returns the length of the clip a sound was created from.
    pub fn sound(&self, handle: SoundHandle) -> Option<usize> {
        self.state.lock().unwrap().sounds.get(handle).cloned()
    }
}

fn non_empty(bytes: &[u8], what: &str) -> Result<()> {
    if bytes.is_empty() {
        Err(Error::Malformed(format!("empty {}", what)))
    } else {
        Ok(())
    }
}

impl Factory for HeadlessFactory {
    fn create_texture(&self, bytes: &[u8], params: &TextureParams) -> Result<TextureHandle> {
        non_empty(bytes, "texture")?;

        let desc = TextureDesc {
            params: *params,
            width: 0,
            height: 0,
            len: bytes.len(),
        };

        Ok(self.state.lock().unwrap().textures.create(desc))
    }

    fn new_texture(&self, width: u32, height: u32, params: &TextureParams) -> Result<TextureHandle> {
        if width == 0 || height == 0 {
            return Err(Error::Malformed(format!(
                "texture dimensions {}x{}",
                width, height
            )));
        }

        let desc = TextureDesc {
            params: *params,
            width,
            height,
            len: 0,
        };

        Ok(self.state.lock().unwrap().textures.create(desc))
    }

    fn delete_texture(&self, handle: TextureHandle) {
        self.state.lock().unwrap().textures.free(handle);
    }

    fn parse_bitmap_font(&self, bytes: &[u8]) -> Result<FontHandle> {
        non_empty(bytes, "bitmap font")?;
        let desc = FontDesc::Bitmap { len: bytes.len() };
        Ok(self.state.lock().unwrap().fonts.create(desc))
    }

    fn parse_freetype_font(&self, bytes: &[u8], size: u32) -> Result<FontHandle> {
        non_empty(bytes, "freetype font")?;
        let desc = FontDesc::FreeType {
            len: bytes.len(),
            size,
        };

        Ok(self.state.lock().unwrap().fonts.create(desc))
    }

    fn delete_font(&self, handle: FontHandle) {
        self.state.lock().unwrap().fonts.free(handle);
    }

    fn create_sound(&self, bytes: &[u8]) -> Result<SoundHandle> {
        non_empty(bytes, "sound")?;
        Ok(self.state.lock().unwrap().sounds.create(bytes.len()))
    }

    fn delete_sound(&self, handle: SoundHandle) {
        self.state.lock().unwrap().sounds.free(handle);
    }
}
