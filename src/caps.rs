use crate::pixel::ColorEncoding;

/// Capability surface of a texture backend, queried during resolution to
/// decide between native upload and the Rgba8888 fallback.
#[derive(Debug, Clone)]
pub struct GpuCaps {
    pub non_renderable: Vec<ColorEncoding>,
    pub mips_at_creation: bool,
}

impl GpuCaps {
    /// Everything this crate knows how to encode is samplable.
    pub fn full() -> Self {
        Self {
            non_renderable: vec![
                ColorEncoding::Rgba8888,
                ColorEncoding::Bgra8888,
                ColorEncoding::Gray8,
                ColorEncoding::Alpha8,
                ColorEncoding::Rgb565,
            ],
            mips_at_creation: true,
        }
    }

    pub fn supports_non_renderable(&self, encoding: ColorEncoding) -> bool {
        self.non_renderable.contains(&encoding)
    }
}
