use crate::bitmap::Bitmap;
use crate::pixel::ColorEncoding;
use crate::texture::store::TextureStore;
use crate::texture::{
    CacheKey, CopyKey, CopyParams, Fit, MipStatus, TextureDesc, TextureOrigin, TextureProxy,
    UniqueKey,
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Cached {
    Yes,
    No,
}

/// Caller hint: `CheapOnly` resolves only what already exists for free and
/// never touches the store.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum GenerationPolicy {
    Any,
    CheapOnly,
}

/// Resolves one bitmap into a GPU texture resource, reusing a cached
/// resource when the pixels are unchanged and upgrading it in place of the
/// key when mip levels become required.
pub struct BitmapTextureMaker {
    bitmap: Bitmap,
    fit: Fit,
    original_key: Option<CacheKey>,
}

impl BitmapTextureMaker {
    /// The cache key is derived once here, from the bitmap's identity at
    /// construction time; volatile bitmaps and `Cached::No` leave the
    /// maker keyless.
    pub fn new(bitmap: Bitmap, cached: Cached, fit: Fit) -> Self {
        let original_key = match cached {
            Cached::Yes => CacheKey::from_bitmap(&bitmap),
            Cached::No => None,
        };
        Self {
            bitmap,
            fit,
            original_key,
        }
    }

    pub fn cache_key(&self) -> Option<&CacheKey> {
        self.original_key.as_ref()
    }

    pub fn resolve(
        &self,
        store: &mut TextureStore,
        want_mips: bool,
        policy: GenerationPolicy,
    ) -> Option<TextureProxy> {
        if policy == GenerationPolicy::CheapOnly {
            return None;
        }

        let mut proxy = None;
        if let Some(key) = self.unique_key() {
            if let Some(found) = store.find_by_key(&key) {
                if !want_mips || found.mip_status() == MipStatus::Mipped {
                    return Some(found);
                }
                // Cached but not mipped; keep it as the upgrade source.
                proxy = Some(found);
            }
        }

        if proxy.is_none() {
            let created = self.create_base(store, want_mips)?;
            debug_assert_eq!(created.origin(), TextureOrigin::TopLeft);
            if let Some(key) = self.unique_key() {
                store.assign_key(key, &created);
                self.register_invalidator(key, store);
            }
            if !want_mips || created.mip_status() == MipStatus::Mipped {
                return Some(created);
            }
            proxy = Some(created);
        }

        // A resource exists but lacks mip levels: build a mipped copy and
        // migrate the key onto it. Migration only happens once the copy is
        // known good, so the key never names a half-built resource.
        let proxy = proxy.expect("upgrade path requires a base resource");
        match store.copy_base_into_mipped(&proxy) {
            Ok(mipped) => {
                debug_assert_eq!(mipped.origin(), TextureOrigin::TopLeft);
                if let Some(key) = self.unique_key() {
                    log::debug!("migrating {:?} to mipped resource", key);
                    store.remove_key(&proxy);
                    store.assign_key(key, &mipped);
                    self.register_invalidator(key, store);
                }
                Some(mipped)
            }
            Err(e) => {
                // Degraded but valid; the unmipped resource keeps its key
                // until a later call manages the upgrade.
                log::warn!("mip upgrade failed, returning unmipped texture: {e:#}");
                Some(proxy)
            }
        }
    }

    /// Key for a filtered/transformed derivative of the original resource.
    /// Destination color space is irrelevant — the cached bytes are
    /// uploaded as-is no matter how they are later sampled.
    pub fn copy_key(&self, params: CopyParams) -> Option<CopyKey> {
        CopyKey::derive(self.original_key.as_ref(), params)
    }

    /// Store-side notification that a derivative was cached under
    /// `copy_key`; wires invalidation up for that entry too.
    pub fn did_cache_copy(&self, copy_key: &CopyKey, store: &TextureStore) {
        self.register_invalidator(UniqueKey::Copy(*copy_key), store);
    }

    fn unique_key(&self) -> Option<UniqueKey> {
        self.original_key.map(UniqueKey::Original)
    }

    fn register_invalidator(&self, key: UniqueKey, store: &TextureStore) {
        self.bitmap
            .pixel_ref()
            .register_invalidator(key, store.id(), store.invalidation_sender());
    }

    fn create_base(&self, store: &mut TextureStore, want_mips: bool) -> Option<TextureProxy> {
        let native = self.bitmap.encoding();
        let upload_encoding = if store.caps().supports_non_renderable(native) {
            native
        } else {
            log::debug!("encoding {} unsupported, falling back to Rgba8888", native);
            ColorEncoding::Rgba8888
        };

        let pixels = match self.bitmap.read_pixels(upload_encoding) {
            Ok(pixels) => pixels,
            Err(e) => {
                log::warn!("pixel read-back failed: {e:#}");
                return None;
            }
        };

        let mip_status = if want_mips && store.caps().mips_at_creation {
            MipStatus::Mipped
        } else {
            MipStatus::NotMipped
        };
        let desc = TextureDesc::default()
            .size(self.bitmap.width(), self.bitmap.height())
            .encoding(upload_encoding)
            .alpha(self.bitmap.alpha())
            .mip_status(mip_status)
            .fit(self.fit);

        match store.create_from_pixels(&desc, &pixels) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                log::warn!("texture creation failed: {e:#}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FlakyBackend;
    use crate::caps::GpuCaps;
    use crate::pixel::AlphaType;
    use crate::texture::{FilterMode, WrapMode};

    fn gray_bitmap(width: u32, height: u32) -> Bitmap {
        let pixels = vec![0x40u8; (width * height) as usize];
        Bitmap::from_pixels(width, height, ColorEncoding::Gray8, AlphaType::Opaque, pixels)
            .unwrap()
    }

    fn rgba_bitmap(width: u32, height: u32) -> Bitmap {
        let pixels = vec![0x80u8; (width * height * 4) as usize];
        Bitmap::from_pixels(
            width,
            height,
            ColorEncoding::Rgba8888,
            AlphaType::Premul,
            pixels,
        )
        .unwrap()
    }

    fn no_gray_caps() -> GpuCaps {
        GpuCaps {
            non_renderable: vec![ColorEncoding::Rgba8888, ColorEncoding::Bgra8888],
            mips_at_creation: true,
        }
    }

    #[test]
    fn cheap_only_never_touches_the_store() {
        let (backend, probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let maker = BitmapTextureMaker::new(rgba_bitmap(4, 4), Cached::Yes, Fit::Exact);

        assert!(
            maker
                .resolve(&mut store, false, GenerationPolicy::CheapOnly)
                .is_none()
        );
        assert_eq!(probe.lock().unwrap().created, 0);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn identical_identity_derives_identical_keys() {
        let bitmap = rgba_bitmap(8, 8);
        let a = BitmapTextureMaker::new(bitmap.clone(), Cached::Yes, Fit::Exact);
        let b = BitmapTextureMaker::new(bitmap, Cached::Yes, Fit::Exact);
        assert_eq!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().is_some());
    }

    #[test]
    fn volatile_bitmap_is_never_keyed() {
        let (backend, probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let mut bitmap = rgba_bitmap(4, 4);
        bitmap.set_volatile(true);
        let maker = BitmapTextureMaker::new(bitmap.clone(), Cached::Yes, Fit::Exact);

        assert!(maker.cache_key().is_none());
        let first = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();
        assert_eq!(store.key_of(&first), None);
        assert_eq!(bitmap.pixel_ref().listener_count(), 0);

        // Nothing to look up, so a second resolve uploads again.
        let second = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();
        assert!(!second.is_same(&first));
        assert_eq!(probe.lock().unwrap().created, 2);
    }

    #[test]
    fn second_resolve_hits_the_cache() {
        let (backend, probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let maker = BitmapTextureMaker::new(rgba_bitmap(4, 4), Cached::Yes, Fit::Exact);

        let first = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();
        let second = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();
        assert!(second.is_same(&first));
        assert_eq!(probe.lock().unwrap().created, 1);
    }

    #[test]
    fn mip_request_is_satisfied_at_creation_when_supported() {
        let (backend, probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let maker = BitmapTextureMaker::new(rgba_bitmap(4, 4), Cached::Yes, Fit::Exact);

        let proxy = maker
            .resolve(&mut store, true, GenerationPolicy::Any)
            .unwrap();
        assert_eq!(proxy.mip_status(), MipStatus::Mipped);
        let probe = probe.lock().unwrap();
        assert_eq!(probe.created, 1);
        assert_eq!(probe.mip_copies, 0);
    }

    #[test]
    fn fresh_creation_upgrades_when_backend_lacks_mips_at_creation() {
        let caps = GpuCaps {
            mips_at_creation: false,
            ..GpuCaps::full()
        };
        let (backend, probe) = FlakyBackend::new(caps);
        let mut store = TextureStore::new(backend);
        let maker = BitmapTextureMaker::new(rgba_bitmap(4, 4), Cached::Yes, Fit::Exact);

        let proxy = maker
            .resolve(&mut store, true, GenerationPolicy::Any)
            .unwrap();
        assert_eq!(proxy.mip_status(), MipStatus::Mipped);
        assert_eq!(probe.lock().unwrap().mip_copies, 1);
        // The migrated key resolves to the mipped resource.
        let again = maker
            .resolve(&mut store, true, GenerationPolicy::Any)
            .unwrap();
        assert!(again.is_same(&proxy));
    }

    #[test]
    fn mip_upgrade_migrates_the_key() {
        let (backend, _probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let bitmap = rgba_bitmap(4, 4);
        let maker = BitmapTextureMaker::new(bitmap.clone(), Cached::Yes, Fit::Exact);

        let base = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();
        assert_eq!(base.mip_status(), MipStatus::NotMipped);

        let mipped = maker
            .resolve(&mut store, true, GenerationPolicy::Any)
            .unwrap();
        assert_eq!(mipped.mip_status(), MipStatus::Mipped);
        assert!(!mipped.is_same(&base));

        // Single point of truth: the key now names only the mipped one.
        assert_eq!(store.key_of(&base), None);
        let key = UniqueKey::Original(*maker.cache_key().unwrap());
        assert!(store.find_by_key(&key).unwrap().is_same(&mipped));
        // One live subscription survives the re-registration.
        assert_eq!(bitmap.pixel_ref().listener_count(), 1);

        // The old resource lives only while we hold it.
        drop(base);
        store.recycle_unreferenced();
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn failed_upgrade_degrades_to_the_unmipped_resource() {
        let (backend, probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let maker = BitmapTextureMaker::new(rgba_bitmap(4, 4), Cached::Yes, Fit::Exact);

        let base = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();

        probe.lock().unwrap().fail_mip_copy = true;
        let degraded = maker
            .resolve(&mut store, true, GenerationPolicy::Any)
            .unwrap();
        assert!(degraded.is_same(&base));
        assert_eq!(degraded.mip_status(), MipStatus::NotMipped);
        let key = UniqueKey::Original(*maker.cache_key().unwrap());
        assert!(store.find_by_key(&key).unwrap().is_same(&base));

        // A later call may still succeed in upgrading.
        probe.lock().unwrap().fail_mip_copy = false;
        let mipped = maker
            .resolve(&mut store, true, GenerationPolicy::Any)
            .unwrap();
        assert_eq!(mipped.mip_status(), MipStatus::Mipped);
        assert!(store.find_by_key(&key).unwrap().is_same(&mipped));
    }

    #[test]
    fn failed_creation_leaves_no_cache_state() {
        let (backend, probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let maker = BitmapTextureMaker::new(rgba_bitmap(4, 4), Cached::Yes, Fit::Exact);

        probe.lock().unwrap().fail_create = true;
        assert!(
            maker
                .resolve(&mut store, false, GenerationPolicy::Any)
                .is_none()
        );
        assert_eq!(store.live_count(), 0);
        let key = UniqueKey::Original(*maker.cache_key().unwrap());
        assert!(store.find_by_key(&key).is_none());
    }

    #[test]
    fn mutation_invalidates_the_cached_entry() {
        let (backend, _probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let bitmap = rgba_bitmap(4, 4);
        let maker = BitmapTextureMaker::new(bitmap.clone(), Cached::Yes, Fit::Exact);

        let proxy = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();
        let key = UniqueKey::Original(*maker.cache_key().unwrap());
        drop(proxy);

        bitmap.pixel_ref().mutate_pixels(|px| px[0] = 0xff);
        assert!(store.find_by_key(&key).is_none());
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn fallback_upload_then_hit_then_mip_upgrade() {
        // Native encoding the GPU cannot sample: the upload converts to
        // Rgba8888, but the cache identity stays the bitmap's own.
        let (backend, probe) = FlakyBackend::new(no_gray_caps());
        let mut store = TextureStore::new(backend);
        let maker = BitmapTextureMaker::new(gray_bitmap(64, 64), Cached::Yes, Fit::Exact);

        let base = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();
        assert_eq!(base.desc().encoding, ColorEncoding::Rgba8888);
        assert_eq!(base.mip_status(), MipStatus::NotMipped);
        assert_eq!(probe.lock().unwrap().created, 1);

        let hit = maker
            .resolve(&mut store, false, GenerationPolicy::Any)
            .unwrap();
        assert!(hit.is_same(&base));
        assert_eq!(probe.lock().unwrap().created, 1);

        let mipped = maker
            .resolve(&mut store, true, GenerationPolicy::Any)
            .unwrap();
        assert_eq!(mipped.mip_status(), MipStatus::Mipped);
        assert!(!mipped.is_same(&base));
        let key = UniqueKey::Original(*maker.cache_key().unwrap());
        assert!(store.find_by_key(&key).unwrap().is_same(&mipped));

        // Unreferenced unmipped original gets recycled once released.
        drop(base);
        drop(hit);
        store.recycle_unreferenced();
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn copy_key_follows_the_original_key() {
        let params = CopyParams {
            filter: FilterMode::Linear,
            wrap: WrapMode::Clamp,
            width: 16,
            height: 16,
        };

        let keyless = BitmapTextureMaker::new(rgba_bitmap(4, 4), Cached::No, Fit::Exact);
        assert!(keyless.copy_key(params).is_none());

        let keyed = BitmapTextureMaker::new(rgba_bitmap(4, 4), Cached::Yes, Fit::Exact);
        let copy_key = keyed.copy_key(params).unwrap();
        assert_eq!(copy_key.base, *keyed.cache_key().unwrap());
    }

    #[test]
    fn cached_copy_is_invalidated_with_its_source() {
        let (backend, _probe) = FlakyBackend::new(GpuCaps::full());
        let mut store = TextureStore::new(backend);
        let bitmap = rgba_bitmap(4, 4);
        let maker = BitmapTextureMaker::new(bitmap.clone(), Cached::Yes, Fit::Exact);
        let params = CopyParams {
            filter: FilterMode::Mipmap,
            wrap: WrapMode::Repeat,
            width: 8,
            height: 8,
        };
        let copy_key = maker.copy_key(params).unwrap();

        // A downstream consumer caches a derivative and notifies us.
        let derived = store
            .create_from_pixels(
                &TextureDesc::default()
                    .size(8, 8)
                    .encoding(ColorEncoding::Rgba8888),
                &[0u8; 8 * 8 * 4],
            )
            .unwrap();
        store.assign_key(UniqueKey::Copy(copy_key), &derived);
        maker.did_cache_copy(&copy_key, &store);
        drop(derived);

        bitmap.pixel_ref().mutate_pixels(|px| px[0] = 0x01);
        assert!(store.find_by_key(&UniqueKey::Copy(copy_key)).is_none());
    }
}
