use std::collections::HashMap;

use anyhow::bail;

use crate::caps::GpuCaps;
use crate::pixel::ColorEncoding;
use crate::texture::{Fit, MipStatus, TextureDesc};

/// Opaque backend-side texture handle.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct BackendTextureId(pub u64);

/// Seam to the GPU collaborator: allocation, base-level copy with mip
/// generation, and capability introspection. Implementations are driven
/// from the thread owning the store; nothing here suspends.
pub trait TextureBackend {
    fn caps(&self) -> &GpuCaps;

    /// Uploads tightly-packed base-level pixels into a new texture. When
    /// `desc.mip_status` is `Mipped` the backend generates the full chain
    /// at creation; the store only asks for that when
    /// [`GpuCaps::mips_at_creation`] holds.
    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> anyhow::Result<BackendTextureId>;

    /// Allocates a mipped texture of the same base size, copies `src`'s
    /// base level into it and generates the remaining levels.
    fn copy_base_into_mipped(
        &mut self,
        src: BackendTextureId,
        desc: &TextureDesc,
    ) -> anyhow::Result<BackendTextureId>;

    fn destroy_texture(&mut self, id: BackendTextureId);
}

struct SoftwareTexture {
    width: u32,
    height: u32,
    encoding: ColorEncoding,
    /// Level 0 first, tightly packed at logical size. The padded Approx
    /// allocation is tracked only as a size.
    levels: Vec<Vec<u8>>,
    alloc_width: u32,
    alloc_height: u32,
}

/// CPU reference backend: textures are byte buffers. Useful for headless
/// operation and as the substrate the tests run against.
pub struct SoftwareBackend {
    caps: GpuCaps,
    next_id: u64,
    textures: HashMap<BackendTextureId, SoftwareTexture>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::with_caps(GpuCaps::full())
    }

    pub fn with_caps(caps: GpuCaps) -> Self {
        Self {
            caps,
            next_id: 1,
            textures: HashMap::new(),
        }
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn level_count(&self, id: BackendTextureId) -> Option<usize> {
        self.textures.get(&id).map(|t| t.levels.len())
    }

    pub fn allocated_size(&self, id: BackendTextureId) -> Option<(u32, u32)> {
        self.textures.get(&id).map(|t| (t.alloc_width, t.alloc_height))
    }

    pub fn base_pixels(&self, id: BackendTextureId) -> Option<&[u8]> {
        self.textures.get(&id).map(|t| t.levels[0].as_slice())
    }

    fn insert(&mut self, texture: SoftwareTexture) -> BackendTextureId {
        let id = BackendTextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(id, texture);
        id
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureBackend for SoftwareBackend {
    fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> anyhow::Result<BackendTextureId> {
        let expected =
            desc.width as usize * desc.height as usize * desc.encoding.bytes_per_pixel();
        if desc.width == 0 || desc.height == 0 || pixels.len() != expected {
            bail!("invalid upload: {} with {} bytes", desc, pixels.len());
        }

        let (alloc_width, alloc_height) = alloc_dims(desc);
        let mut levels = vec![pixels.to_vec()];
        if desc.mip_status == MipStatus::Mipped {
            generate_mip_chain(desc.width, desc.height, desc.encoding, &mut levels);
        }

        Ok(self.insert(SoftwareTexture {
            width: desc.width,
            height: desc.height,
            encoding: desc.encoding,
            levels,
            alloc_width,
            alloc_height,
        }))
    }

    fn copy_base_into_mipped(
        &mut self,
        src: BackendTextureId,
        desc: &TextureDesc,
    ) -> anyhow::Result<BackendTextureId> {
        let Some(source) = self.textures.get(&src) else {
            bail!("copy source {:?} does not exist", src);
        };
        if source.width != desc.width || source.height != desc.height {
            bail!("mipped copy must match base size of {:?}", src);
        }

        let (alloc_width, alloc_height) = alloc_dims(desc);
        let mut levels = vec![source.levels[0].clone()];
        let encoding = source.encoding;
        generate_mip_chain(desc.width, desc.height, encoding, &mut levels);

        Ok(self.insert(SoftwareTexture {
            width: desc.width,
            height: desc.height,
            encoding,
            levels,
            alloc_width,
            alloc_height,
        }))
    }

    fn destroy_texture(&mut self, id: BackendTextureId) {
        self.textures.remove(&id);
    }
}

fn alloc_dims(desc: &TextureDesc) -> (u32, u32) {
    match desc.fit {
        Fit::Exact => (desc.width, desc.height),
        Fit::Approx => (
            desc.width.next_power_of_two(),
            desc.height.next_power_of_two(),
        ),
    }
}

/// Appends downsampled levels until 1x1. 2x2 box filter for the 4-byte
/// encodings, nearest for the rest.
fn generate_mip_chain(
    width: u32,
    height: u32,
    encoding: ColorEncoding,
    levels: &mut Vec<Vec<u8>>,
) {
    let bpp = encoding.bytes_per_pixel();
    let mut w = width as usize;
    let mut h = height as usize;

    while w > 1 || h > 1 {
        let prev = levels.last().expect("mip chain has a base level");
        let nw = (w / 2).max(1);
        let nh = (h / 2).max(1);
        let mut level = vec![0u8; nw * nh * bpp];

        for y in 0..nh {
            for x in 0..nw {
                let sx = (x * 2).min(w - 1);
                let sy = (y * 2).min(h - 1);
                let dst = &mut level[(y * nw + x) * bpp..(y * nw + x + 1) * bpp];
                if bpp == 4 {
                    let sx1 = (sx + 1).min(w - 1);
                    let sy1 = (sy + 1).min(h - 1);
                    for c in 0..4 {
                        let sum = prev[(sy * w + sx) * 4 + c] as u32
                            + prev[(sy * w + sx1) * 4 + c] as u32
                            + prev[(sy1 * w + sx) * 4 + c] as u32
                            + prev[(sy1 * w + sx1) * 4 + c] as u32;
                        dst[c] = (sum / 4) as u8;
                    }
                } else {
                    dst.copy_from_slice(&prev[(sy * w + sx) * bpp..(sy * w + sx + 1) * bpp]);
                }
            }
        }

        levels.push(level);
        w = nw;
        h = nh;
    }
}
