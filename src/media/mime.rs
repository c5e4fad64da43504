//! Mimetype detection.
//!
//! Content sniffing covers the image formats the `image` crate knows plus a
//! handful of container and executable signatures. Everything else falls
//! back to the file extension through `mime_guess`.

use std::path::Path;

/// Fallback for binary content nothing else recognizes.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Fallback for unrecognized content that is valid UTF-8.
pub const PLAIN_TEXT: &str = "text/plain";

const MAGIC: &[(&[u8], &str)] = &[
    (b"\x7fELF", "application/x-executable"),
    (b"MZ", "application/x-msdownload"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b", "application/gzip"),
    (b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
];

const EXECUTABLE_TYPES: &[&str] = &[
    "application/x-executable",
    "application/x-sharedlib",
    "application/x-msdownload",
    "application/x-dosexec",
    "application/vnd.microsoft.portable-executable",
];

/// Identify content from its leading bytes.
#[must_use]
pub fn sniff(content: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(content) {
        return Some(format.to_mime_type());
    }
    MAGIC
        .iter()
        .find(|(magic, _)| content.starts_with(magic))
        .map(|(_, mime)| *mime)
}

/// Guess a mimetype from the file extension alone.
#[must_use]
pub fn by_extension(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}

/// Detect the mimetype of a file.
///
/// With `content`, sniffing wins over the extension and unrecognized UTF-8
/// is reported as plain text. Without it only the extension is consulted.
#[must_use]
pub fn detect(path: &Path, content: Option<&[u8]>) -> String {
    let detected = match content {
        Some(content) => sniff(content).or_else(|| by_extension(path)).unwrap_or(
            if std::str::from_utf8(content).is_ok() {
                PLAIN_TEXT
            } else {
                OCTET_STREAM
            },
        ),
        None => by_extension(path).unwrap_or(OCTET_STREAM),
    };
    detected.to_string()
}

/// Whether thumbnails can be rendered for this mimetype.
#[must_use]
pub fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

/// Whether the mimetype denotes a platform executable.
#[must_use]
pub fn is_executable(mime: &str) -> bool {
    EXECUTABLE_TYPES.contains(&mime)
}
