use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use slotmap::SlotMap;

use crate::backend::TextureBackend;
use crate::caps::GpuCaps;
use crate::message::{InvalidationReceiver, InvalidationSender, invalidation_channel};
use crate::texture::{MipStatus, TextureDesc, TextureKey, TextureProxy, UniqueKey};

static NEXT_STORE_ID: AtomicU32 = AtomicU32::new(1);

struct StoreEntry {
    proxy: TextureProxy,
    unique_key: Option<UniqueKey>,
}

/// Proxy store: owns every live texture resource behind a slotmap pool and
/// maps unique keys onto them. Single-owner — all mutation goes through
/// `&mut self` on the thread that owns the backend.
pub struct TextureStore {
    id: u32,
    backend: Box<dyn TextureBackend>,
    entries: SlotMap<TextureKey, StoreEntry>,
    key_table: HashMap<UniqueKey, TextureKey>,
    invalidation_tx: InvalidationSender,
    invalidation_rx: InvalidationReceiver,
}

impl TextureStore {
    pub fn new(backend: impl TextureBackend + 'static) -> Self {
        let (invalidation_tx, invalidation_rx) = invalidation_channel();
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            backend: Box::new(backend),
            entries: SlotMap::with_key(),
            key_table: HashMap::new(),
            invalidation_tx,
            invalidation_rx,
        }
    }

    /// Store identity token; listeners use it to dedup subscriptions.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn caps(&self) -> &GpuCaps {
        self.backend.caps()
    }

    pub fn invalidation_sender(&self) -> InvalidationSender {
        self.invalidation_tx.clone()
    }

    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    /// The unique key currently assigned to a resource, if any.
    pub fn key_of(&self, proxy: &TextureProxy) -> Option<UniqueKey> {
        self.entries.get(proxy.key()).and_then(|e| e.unique_key)
    }

    /// Drains pending invalidation messages, dropping the keyed entries
    /// they name. Entries no outside holder still references are recycled
    /// backend-side.
    pub fn purge_invalidated(&mut self) {
        while let Ok(message) = self.invalidation_rx.try_recv() {
            if let Some(texture_key) = self.key_table.remove(&message.key) {
                log::debug!("invalidating {:?}", message.key);
                if let Some(entry) = self.entries.get_mut(texture_key) {
                    entry.unique_key = None;
                }
                self.try_recycle(texture_key);
            }
        }
    }

    /// Destroys every keyless entry whose only remaining reference is the
    /// store's own. Keyed entries are the cache and stay put; evicting
    /// those is someone else's policy.
    pub fn recycle_unreferenced(&mut self) {
        let stale: Vec<TextureKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.unique_key.is_none() && e.proxy.ref_count() == 1)
            .map(|(k, _)| k)
            .collect();
        for key in stale {
            self.try_recycle(key);
        }
    }

    pub fn find_by_key(&mut self, key: &UniqueKey) -> Option<TextureProxy> {
        self.purge_invalidated();
        let texture_key = *self.key_table.get(key)?;
        let entry = self
            .entries
            .get(texture_key)
            .expect("find_by_key: key table points at a dead entry");
        Some(entry.proxy.clone())
    }

    pub fn create_from_pixels(
        &mut self,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> anyhow::Result<TextureProxy> {
        let backend_id = self
            .backend
            .create_texture(desc, pixels)
            .context("failed to create texture")?;
        let key = self
            .entries
            .insert_with_key(|k| StoreEntry {
                proxy: TextureProxy::new(k, backend_id, *desc),
                unique_key: None,
            });
        Ok(self.entries[key].proxy.clone())
    }

    /// Points `key` at `proxy`. A key maps to at most one live resource;
    /// assigning over an existing mapping detaches the previous holder.
    pub fn assign_key(&mut self, key: UniqueKey, proxy: &TextureProxy) {
        if let Some(previous) = self.key_table.insert(key, proxy.key())
            && previous != proxy.key()
        {
            if let Some(entry) = self.entries.get_mut(previous) {
                entry.unique_key = None;
            }
            self.try_recycle(previous);
        }
        let entry = self
            .entries
            .get_mut(proxy.key())
            .expect("assign_key: stale TextureProxy");
        entry.unique_key = Some(key);
    }

    /// Removes whatever unique key `proxy` holds. The resource stays alive
    /// for as long as outside holders reference it.
    pub fn remove_key(&mut self, proxy: &TextureProxy) {
        let Some(entry) = self.entries.get_mut(proxy.key()) else {
            return;
        };
        if let Some(key) = entry.unique_key.take() {
            self.key_table.remove(&key);
        }
        self.try_recycle(proxy.key());
    }

    /// Allocates a mipped resource of the same base size, copies `proxy`'s
    /// base level into it and has the backend generate the rest.
    pub fn copy_base_into_mipped(
        &mut self,
        proxy: &TextureProxy,
    ) -> anyhow::Result<TextureProxy> {
        let desc = proxy.desc().mip_status(MipStatus::Mipped);
        let backend_id = self
            .backend
            .copy_base_into_mipped(proxy.backend_id(), &desc)
            .context("failed to copy base level into mipped texture")?;
        let key = self
            .entries
            .insert_with_key(|k| StoreEntry {
                proxy: TextureProxy::new(k, backend_id, desc),
                unique_key: None,
            });
        Ok(self.entries[key].proxy.clone())
    }

    fn try_recycle(&mut self, key: TextureKey) {
        let recyclable = self
            .entries
            .get(key)
            .is_some_and(|e| e.unique_key.is_none() && e.proxy.ref_count() == 1);
        if recyclable {
            let entry = self.entries.remove(key).expect("entry vanished");
            self.backend.destroy_texture(entry.proxy.backend_id());
        }
    }
}
