//! Cache record definitions.
//!
//! Every type here maps to one on-disk record layout:
//!
//! | Record | Fields |
//! |---|---|
//! | [`IndexEntry`] | `hash: u32`, `size: i64`, `offset: i64` |
//! | [`DataEntry`] | `mime_type: string`, `count: u32`, `count` PNG blobs |
//! | [`IconIndexEntry`] | `name: string`, `scale: u8`, `offset: i64` |
//! | [`IconBlob`] | one PNG blob |

use std::path::PathBuf;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use serde::Serialize;

use crate::stream::{Record, RecordStream, StreamError, StreamResult};

/// Icon edge lengths the icon cache accepts, largest first.
pub const ICON_SCALES: [u32; 4] = [64, 48, 32, 16];

/// Identifies a cached content-derived entry.
///
/// A zero hash or a non-positive size marks content that was never hashed
/// and must not be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ContentKey {
    /// 32-bit MurmurHash2 of the file content.
    pub hash: u32,
    /// File size in bytes.
    pub size: i64,
}

impl ContentKey {
    /// Create a new key.
    #[must_use]
    pub fn new(hash: u32, size: i64) -> Self {
        Self { hash, size }
    }

    /// Whether an entry may be stored under this key.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.hash != 0 && self.size > 0
    }
}

/// One record of `index.cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Key the entry is stored under.
    pub key: ContentKey,
    /// Byte offset of the matching [`DataEntry`] in `data.cache`.
    pub offset: i64,
}

/// Size of one serialized [`IndexEntry`].
pub const INDEX_ENTRY_LEN: u64 = 4 + 8 + 8;

impl Record for IndexEntry {
    fn write_to(&self, stream: &mut RecordStream) -> StreamResult<()> {
        stream.write_u32(self.key.hash)?;
        stream.write_i64(self.key.size)?;
        stream.write_i64(self.offset)
    }

    fn read_from(stream: &mut RecordStream) -> StreamResult<Self> {
        let hash = stream.read_u32()?;
        let size = stream.read_i64()?;
        let offset = stream.read_i64()?;
        Ok(Self {
            key: ContentKey::new(hash, size),
            offset,
        })
    }
}

/// Mimetype and thumbnails derived from one file's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataEntry {
    /// Detected mimetype, e.g. `image/jpeg`.
    pub mime_type: String,
    /// Thumbnails, largest first.
    pub thumbnails: Vec<RgbaImage>,
}

impl DataEntry {
    /// An entry carrying only a mimetype.
    #[must_use]
    pub fn with_mime(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            thumbnails: Vec::new(),
        }
    }

    /// Whether the entry may be persisted.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        !self.mime_type.is_empty()
    }

    /// Edge lengths of the thumbnails, in stored order.
    #[must_use]
    pub fn thumbnail_sizes(&self) -> Vec<(u32, u32)> {
        self.thumbnails.iter().map(|t| t.dimensions()).collect()
    }
}

impl Record for DataEntry {
    fn write_to(&self, stream: &mut RecordStream) -> StreamResult<()> {
        let images: Vec<&RgbaImage> = self.thumbnails.iter().filter(|t| !is_null(t)).collect();
        stream.write_string(&self.mime_type)?;
        stream.write_u32(images.len() as u32)?;
        for image in images {
            stream.write_bytes(&encode_png(image)?)?;
        }
        Ok(())
    }

    fn read_from(stream: &mut RecordStream) -> StreamResult<Self> {
        let mime_type = stream.read_string()?;
        let count = stream.read_u32()?;
        let mut thumbnails = Vec::new();
        for _ in 0..count {
            thumbnails.push(decode_png(&stream.read_bytes()?)?);
        }
        Ok(Self {
            mime_type,
            thumbnails,
        })
    }
}

/// Identifies a cached icon bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IconKey {
    /// Theme icon name, e.g. `folder`.
    pub name: String,
    /// Edge length, one of [`ICON_SCALES`].
    pub scale: u32,
}

impl IconKey {
    /// Create a key, or `None` when the scale is not one of [`ICON_SCALES`].
    #[must_use]
    pub fn new(name: impl Into<String>, scale: u32) -> Option<Self> {
        let name = name.into();
        if name.is_empty() || !ICON_SCALES.contains(&scale) {
            return None;
        }
        Some(Self { name, scale })
    }
}

/// One record of `icons.index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconIndexEntry {
    /// Key the icon is stored under.
    pub key: IconKey,
    /// Byte offset of the matching [`IconBlob`] in `icons.data`.
    pub offset: i64,
}

impl Record for IconIndexEntry {
    fn write_to(&self, stream: &mut RecordStream) -> StreamResult<()> {
        let scale = u8::try_from(self.key.scale)
            .map_err(|_| StreamError::Corrupt(format!("icon scale {} out of range", self.key.scale)))?;
        stream.write_string(&self.key.name)?;
        stream.write_u8(scale)?;
        stream.write_i64(self.offset)
    }

    fn read_from(stream: &mut RecordStream) -> StreamResult<Self> {
        let name = stream.read_string()?;
        let scale = u32::from(stream.read_u8()?);
        let offset = stream.read_i64()?;
        Ok(Self {
            key: IconKey { name, scale },
            offset,
        })
    }
}

/// One record of `icons.data`: a single serialized image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconBlob(pub RgbaImage);

impl Record for IconBlob {
    fn write_to(&self, stream: &mut RecordStream) -> StreamResult<()> {
        stream.write_bytes(&encode_png(&self.0)?)
    }

    fn read_from(stream: &mut RecordStream) -> StreamResult<Self> {
        Ok(Self(decode_png(&stream.read_bytes()?)?))
    }
}

/// Extraction output for one content request.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Key to persist under; `None` for content that was never hashed.
    pub key: Option<ContentKey>,
    /// Source file the entry was derived from.
    pub path: PathBuf,
    /// Extracted mimetype and thumbnails.
    pub entry: DataEntry,
}

/// Fetch output for one icon request.
#[derive(Debug, Clone)]
pub struct IconItem {
    /// Requested icon.
    pub key: IconKey,
    /// Resolved bitmap at the requested scale.
    pub image: RgbaImage,
}

/// Whether an image has no pixels.
#[must_use]
pub fn is_null(image: &RgbaImage) -> bool {
    image.width() == 0 || image.height() == 0
}

fn encode_png(image: &RgbaImage) -> StreamResult<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| StreamError::Corrupt(format!("PNG encoding failed: {}", e)))?;
    Ok(buf)
}

fn decode_png(bytes: &[u8]) -> StreamResult<RgbaImage> {
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map(|image| image.to_rgba8())
        .map_err(|e| StreamError::Corrupt(format!("PNG decoding failed: {}", e)))
}
