use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use smallvec::SmallVec;

use crate::message::{InvalidationSender, UniqueKeyInvalidated};
use crate::pixel::{AlphaType, ColorEncoding, SubsetRect, convert_row_to_rgba8888};
use crate::texture::UniqueKey;

static NEXT_GENERATION: AtomicU32 = AtomicU32::new(1);

fn next_generation() -> u32 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

struct KeyListener {
    key: UniqueKey,
    store_id: u32,
    tx: InvalidationSender,
}

/// Shared, mutation-tracked pixel allocation. The generation token is
/// process-unique and re-issued on every content mutation, so equal tokens
/// guarantee byte-identical pixels.
pub struct PixelRef {
    width: u32,
    height: u32,
    row_bytes: usize,
    pixels: Mutex<Vec<u8>>,
    generation: AtomicU32,
    listeners: Mutex<SmallVec<[KeyListener; 2]>>,
}

impl PixelRef {
    pub fn new(width: u32, height: u32, row_bytes: usize, pixels: Vec<u8>) -> anyhow::Result<Self> {
        if pixels.len() < row_bytes * height as usize {
            bail!(
                "pixel allocation too small: {} bytes for {} rows of {}",
                pixels.len(),
                height,
                row_bytes
            );
        }
        Ok(Self {
            width,
            height,
            row_bytes,
            pixels: Mutex::new(pixels),
            generation: AtomicU32::new(next_generation()),
            listeners: Mutex::new(SmallVec::new()),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let pixels = self.pixels.lock().expect("pixel lock poisoned");
        f(&pixels)
    }

    /// Mutates the pixel contents in place, then re-tokens the generation
    /// and posts an invalidation for every registered key. Keys derived
    /// from the old token are stale forever, so the listener list is
    /// cleared rather than retargeted.
    pub fn mutate_pixels(&self, f: impl FnOnce(&mut [u8])) {
        {
            let mut pixels = self.pixels.lock().expect("pixel lock poisoned");
            f(&mut pixels);
        }
        self.notify_pixels_changed();
    }

    pub fn notify_pixels_changed(&self) {
        self.generation.store(next_generation(), Ordering::Release);
        let mut listeners = self.listeners.lock().expect("listener lock poisoned");
        for listener in listeners.drain(..) {
            // Store may already be gone; nothing left to invalidate then.
            let _ = listener.tx.send(UniqueKeyInvalidated { key: listener.key });
        }
    }

    /// Subscribes a store's key to this allocation's mutation
    /// notifications. Idempotent per `(key, store_id)` pair, so
    /// re-registering after a key migration keeps a single subscription.
    pub fn register_invalidator(&self, key: UniqueKey, store_id: u32, tx: InvalidationSender) {
        let mut listeners = self.listeners.lock().expect("listener lock poisoned");
        if listeners
            .iter()
            .any(|l| l.store_id == store_id && l.key == key)
        {
            return;
        }
        listeners.push(KeyListener { key, store_id, tx });
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listener lock poisoned").len()
    }
}

/// CPU-resident image: a view into a [`PixelRef`] plus encoding and the
/// volatility flag that decides whether it may participate in caching.
#[derive(Clone)]
pub struct Bitmap {
    pixel_ref: Arc<PixelRef>,
    origin_x: u32,
    origin_y: u32,
    width: u32,
    height: u32,
    encoding: ColorEncoding,
    alpha: AlphaType,
    volatile: bool,
}

impl Bitmap {
    /// Builds a bitmap owning a fresh tightly-packed allocation.
    pub fn from_pixels(
        width: u32,
        height: u32,
        encoding: ColorEncoding,
        alpha: AlphaType,
        pixels: Vec<u8>,
    ) -> anyhow::Result<Bitmap> {
        let row_bytes = width as usize * encoding.bytes_per_pixel();
        let pixel_ref =
            PixelRef::new(width, height, row_bytes, pixels).context("failed to create bitmap")?;
        Ok(Bitmap {
            pixel_ref: Arc::new(pixel_ref),
            origin_x: 0,
            origin_y: 0,
            width,
            height,
            encoding,
            alpha,
            volatile: false,
        })
    }

    /// A view of a sub-rectangle sharing the same allocation (and thus the
    /// same generation token).
    pub fn subset_view(&self, rect: SubsetRect) -> anyhow::Result<Bitmap> {
        let x = self.origin_x + rect.x;
        let y = self.origin_y + rect.y;
        if x + rect.width > self.pixel_ref.width() || y + rect.height > self.pixel_ref.height() {
            bail!("subset {} exceeds pixel allocation", rect);
        }
        Ok(Bitmap {
            pixel_ref: self.pixel_ref.clone(),
            origin_x: x,
            origin_y: y,
            width: rect.width,
            height: rect.height,
            ..*self
        })
    }

    pub fn set_volatile(&mut self, volatile: bool) {
        self.volatile = volatile;
    }

    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    pub fn generation(&self) -> u32 {
        self.pixel_ref.generation()
    }

    /// The offset + size of this view within its allocation; with the
    /// generation token, this is the bitmap's cache identity.
    pub fn subset(&self) -> SubsetRect {
        SubsetRect::new(self.origin_x, self.origin_y, self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn encoding(&self) -> ColorEncoding {
        self.encoding
    }

    pub fn alpha(&self) -> AlphaType {
        self.alpha
    }

    pub fn pixel_ref(&self) -> &Arc<PixelRef> {
        &self.pixel_ref
    }

    /// Reads this view's pixels out as tightly-packed rows in
    /// `dst_encoding`. Supports a same-encoding copy and conversion into
    /// the `Rgba8888` fallback; anything else is not a supported upload
    /// path.
    pub fn read_pixels(&self, dst_encoding: ColorEncoding) -> anyhow::Result<Vec<u8>> {
        if dst_encoding != self.encoding && dst_encoding != ColorEncoding::Rgba8888 {
            bail!("unsupported conversion {} -> {}", self.encoding, dst_encoding);
        }

        let src_bpp = self.encoding.bytes_per_pixel();
        let dst_bpp = dst_encoding.bytes_per_pixel();
        let dst_row = self.width as usize * dst_bpp;
        let len = dst_row * self.height as usize;

        let mut dst = Vec::new();
        dst.try_reserve_exact(len)
            .context("failed to allocate conversion buffer")?;
        dst.resize(len, 0);

        self.pixel_ref.with_pixels(|pixels| {
            for row in 0..self.height as usize {
                let src_start = (self.origin_y as usize + row) * self.pixel_ref.row_bytes()
                    + self.origin_x as usize * src_bpp;
                let src = &pixels[src_start..src_start + self.width as usize * src_bpp];
                let out = &mut dst[row * dst_row..(row + 1) * dst_row];
                if dst_encoding == self.encoding {
                    out.copy_from_slice(src);
                } else {
                    convert_row_to_rgba8888(self.encoding, src, out)?;
                }
            }
            Ok::<_, anyhow::Error>(())
        })?;

        Ok(dst)
    }
}
