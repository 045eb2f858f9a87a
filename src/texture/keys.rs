use std::fmt;

use slotmap::new_key_type;

use crate::bitmap::Bitmap;
use crate::pixel::SubsetRect;

new_key_type! { pub struct TextureKey; }

/// Canonical cache identity for "the GPU texture holding this exact
/// bitmap's pixels": generation token + subset view. Pure function of image
/// identity — the encoding eventually chosen for upload never feeds in, so
/// mipped and unmipped requests, fallback or not, land on the same slot.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct CacheKey {
    pub generation: u32,
    pub subset: SubsetRect,
}

impl CacheKey {
    /// Derives the key for a bitmap, or `None` for volatile bitmaps whose
    /// pixels may change without a generation bump.
    pub fn from_bitmap(bitmap: &Bitmap) -> Option<CacheKey> {
        if bitmap.is_volatile() {
            return None;
        }
        Some(CacheKey {
            generation: bitmap.generation(),
            subset: bitmap.subset(),
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey(gen={}, subset={})", self.generation, self.subset)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
    Mipmap,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum WrapMode {
    Clamp,
    Repeat,
    MirrorRepeat,
}

/// Transform parameters distinguishing one cached derivative from another.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct CopyParams {
    pub filter: FilterMode,
    pub wrap: WrapMode,
    pub width: u32,
    pub height: u32,
}

/// Identity of a filtered/transformed derivative of an original cached
/// texture. Only derivable while the originating [`CacheKey`] exists.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct CopyKey {
    pub base: CacheKey,
    pub params: CopyParams,
}

impl CopyKey {
    pub fn derive(base: Option<&CacheKey>, params: CopyParams) -> Option<CopyKey> {
        base.map(|&base| CopyKey { base, params })
    }
}

/// What the store's key table is indexed by: either the original upload or
/// a cached derivative of it.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum UniqueKey {
    Original(CacheKey),
    Copy(CopyKey),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CopyParams {
        CopyParams {
            filter: FilterMode::Linear,
            wrap: WrapMode::Clamp,
            width: 32,
            height: 32,
        }
    }

    #[test]
    fn copy_key_requires_base() {
        assert!(CopyKey::derive(None, params()).is_none());

        let base = CacheKey {
            generation: 7,
            subset: SubsetRect::new(0, 0, 64, 64),
        };
        let copy = CopyKey::derive(Some(&base), params()).unwrap();
        assert_eq!(copy.base, base);
    }

    #[test]
    fn keys_with_equal_identity_are_equal() {
        let a = CacheKey {
            generation: 42,
            subset: SubsetRect::new(4, 4, 16, 16),
        };
        let b = CacheKey {
            generation: 42,
            subset: SubsetRect::new(4, 4, 16, 16),
        };
        assert_eq!(a, b);
        assert_eq!(
            CopyKey::derive(Some(&a), params()),
            CopyKey::derive(Some(&b), params())
        );
    }
}
