use std::fmt;
use std::sync::Arc;

use crate::backend::BackendTextureId;
use crate::pixel::{AlphaType, ColorEncoding};
use crate::texture::TextureKey;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MipStatus {
    NotMipped,
    Mipped,
}

/// Whether an allocation must be exact-size or may be rounded up to a
/// pool-friendly size.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Fit {
    Exact,
    Approx,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TextureOrigin {
    TopLeft,
    BottomLeft,
}

/// Immutable description of a texture resource. Everything produced by the
/// resolution path uses the `TopLeft` origin.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub encoding: ColorEncoding,
    pub alpha: AlphaType,
    pub mip_status: MipStatus,
    pub origin: TextureOrigin,
    pub fit: Fit,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            encoding: ColorEncoding::Rgba8888,
            alpha: AlphaType::Premul,
            mip_status: MipStatus::NotMipped,
            origin: TextureOrigin::TopLeft,
            fit: Fit::Exact,
        }
    }
}

impl TextureDesc {
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn encoding(mut self, encoding: ColorEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn alpha(mut self, alpha: AlphaType) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn mip_status(mut self, mip_status: MipStatus) -> Self {
        self.mip_status = mip_status;
        self
    }

    pub fn fit(mut self, fit: Fit) -> Self {
        self.fit = fit;
        self
    }
}

impl fmt::Display for TextureDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TextureDesc({}x{}, encoding={}, mips={:?}, fit={:?})",
            self.width, self.height, self.encoding, self.mip_status, self.fit
        )
    }
}

pub(crate) struct TextureInner {
    pub key: TextureKey,
    pub backend_id: BackendTextureId,
    pub desc: TextureDesc,
}

/// Shared handle to a GPU-side texture resource. The store and any number
/// of callers co-own the resource; the backend allocation is recycled only
/// once the store entry is gone and the last handle is dropped.
#[derive(Clone)]
pub struct TextureProxy {
    pub(crate) inner: Arc<TextureInner>,
}

impl TextureProxy {
    pub(crate) fn new(key: TextureKey, backend_id: BackendTextureId, desc: TextureDesc) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                key,
                backend_id,
                desc,
            }),
        }
    }

    pub fn key(&self) -> TextureKey {
        self.inner.key
    }

    pub fn backend_id(&self) -> BackendTextureId {
        self.inner.backend_id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.inner.desc
    }

    pub fn mip_status(&self) -> MipStatus {
        self.inner.desc.mip_status
    }

    pub fn origin(&self) -> TextureOrigin {
        self.inner.desc.origin
    }

    /// Handle identity: do two proxies refer to the same resource?
    pub fn is_same(&self, other: &TextureProxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
