//! Collaborators the caches consume.
//!
//! - [`mime`]: content and extension based mimetype detection
//! - [`thumbnail`]: square center-cropped thumbnail chains
//! - [`exe`]: icons embedded in executables
//! - [`theme`]: icon theme lookup for the icon cache

pub mod exe;
pub mod mime;
pub mod theme;
pub mod thumbnail;

pub use exe::{is_mostly_transparent, ExecutableIconExtractor, NoExecutableIcons};
pub use theme::{default_search_paths, DirectoryIconTheme, IconResolver};
pub use thumbnail::{square_crop, thumbnail_chain, THUMBNAIL_SCALES};
