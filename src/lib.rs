//! Resolves CPU-resident bitmaps into cached GPU texture resources.
//!
//! A [`BitmapTextureMaker`] derives a cache key from a bitmap's mutation
//! identity, reuses the matching resource out of a [`TextureStore`] when
//! one exists, and lazily upgrades a cached resource to a mip-mapped
//! variant without re-uploading the base image. Mutating the bitmap's
//! pixels invalidates the cached entries automatically.

mod backend;
mod bitmap;
mod caps;
mod message;
mod pixel;
mod texture;

pub use backend::{BackendTextureId, SoftwareBackend, TextureBackend};
pub use bitmap::{Bitmap, PixelRef};
pub use caps::GpuCaps;
pub use message::{InvalidationSender, UniqueKeyInvalidated};
pub use pixel::{AlphaType, ColorEncoding, SubsetRect, convert_row_to_rgba8888};
pub use texture::{
    BitmapTextureMaker, CacheKey, Cached, CopyKey, CopyParams, FilterMode, Fit, GenerationPolicy,
    MipStatus, TextureDesc, TextureKey, TextureOrigin, TextureProxy, TextureStore, UniqueKey,
    WrapMode,
};
