use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::factory::{Factory, FontHandle, SoundHandle, TextureHandle};
use super::id::ResourceKind;
use crate::io::prelude::FileHandle;
use crate::memory::prelude::Buffer;

/// Shared, read-only view of a data resource. The bytes stay alive as long as
/// any `Data` does, even if the resource itself is freed meanwhile.
#[derive(Clone)]
pub struct Data(Arc<Buffer>);

impl Data {
    /// Returns the alignment the bytes were allocated with.
    #[inline]
    pub fn align(&self) -> usize {
        self.0.align()
    }
}

impl Deref for Data {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Data").field(&self.0.len()).finish()
    }
}

/// A byte range of a host file opened for raw access.
#[derive(Debug, Clone)]
pub(crate) struct OpenFile {
    pub file: FileHandle,
    pub offset: u64,
    pub size: u64,
    pub pos: u64,
}

pub(crate) enum Payload {
    Data(Arc<Buffer>),
    Texture(TextureHandle),
    Font(FontHandle),
    Sound(SoundHandle),
    File(OpenFile),
}

impl Payload {
    #[inline]
    pub fn data(buf: Buffer) -> Self {
        Payload::Data(Arc::new(buf))
    }

    pub fn kind(&self) -> ResourceKind {
        match *self {
            Payload::Data(_) => ResourceKind::Data,
            Payload::Texture(_) => ResourceKind::Texture,
            Payload::Font(_) => ResourceKind::Font,
            Payload::Sound(_) => ResourceKind::Sound,
            Payload::File(_) => ResourceKind::File,
        }
    }

    pub fn as_data(&self) -> Option<Data> {
        match *self {
            Payload::Data(ref v) => Some(Data(v.clone())),
            _ => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut Arc<Buffer>> {
        match *self {
            Payload::Data(ref mut v) => Some(v),
            _ => None,
        }
    }

    /// Gives the typed object back to the factory that created it.
    pub fn release(self, factory: &dyn Factory) {
        match self {
            Payload::Texture(handle) => factory.delete_texture(handle),
            Payload::Font(handle) => factory.delete_font(handle),
            Payload::Sound(handle) => factory.delete_sound(handle),
            Payload::Data(_) | Payload::File(_) => {}
        }
    }
}
