use std::fmt;

use anyhow::bail;

/// CPU-side pixel encodings this crate understands. `Rgba8888` doubles as
/// the general-purpose fallback when a GPU cannot sample an encoding
/// natively.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ColorEncoding {
    Rgba8888,
    Bgra8888,
    Gray8,
    Alpha8,
    Rgb565,
}

impl ColorEncoding {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorEncoding::Rgba8888 | ColorEncoding::Bgra8888 => 4,
            ColorEncoding::Rgb565 => 2,
            ColorEncoding::Gray8 | ColorEncoding::Alpha8 => 1,
        }
    }
}

impl fmt::Display for ColorEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColorEncoding::Rgba8888 => "Rgba8888",
            ColorEncoding::Bgra8888 => "Bgra8888",
            ColorEncoding::Gray8 => "Gray8",
            ColorEncoding::Alpha8 => "Alpha8",
            ColorEncoding::Rgb565 => "Rgb565",
        };
        f.write_str(s)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AlphaType {
    Opaque,
    Premul,
    Unpremul,
}

/// Offset + size view into a possibly larger pixel allocation. Part of
/// cache identity, so it hashes.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct SubsetRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SubsetRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl fmt::Display for SubsetRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{} {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Converts one row of pixels into `Rgba8888`. `dst` must hold exactly
/// 4 bytes per source pixel.
pub fn convert_row_to_rgba8888(
    encoding: ColorEncoding,
    src: &[u8],
    dst: &mut [u8],
) -> anyhow::Result<()> {
    let bpp = encoding.bytes_per_pixel();
    if !src.len().is_multiple_of(bpp) || dst.len() != (src.len() / bpp) * 4 {
        bail!(
            "row size mismatch converting {} ({} src bytes, {} dst bytes)",
            encoding,
            src.len(),
            dst.len()
        );
    }

    match encoding {
        ColorEncoding::Rgba8888 => dst.copy_from_slice(src),
        ColorEncoding::Bgra8888 => {
            for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                d[0] = s[2];
                d[1] = s[1];
                d[2] = s[0];
                d[3] = s[3];
            }
        }
        ColorEncoding::Gray8 => {
            for (&g, d) in src.iter().zip(dst.chunks_exact_mut(4)) {
                d[0] = g;
                d[1] = g;
                d[2] = g;
                d[3] = 0xff;
            }
        }
        ColorEncoding::Alpha8 => {
            for (&a, d) in src.iter().zip(dst.chunks_exact_mut(4)) {
                d[0] = 0;
                d[1] = 0;
                d[2] = 0;
                d[3] = a;
            }
        }
        ColorEncoding::Rgb565 => {
            // Rows can sit at odd offsets inside the allocation, so no
            // aligned u16 slice cast here.
            for (chunk, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
                let t: u16 = bytemuck::pod_read_unaligned(chunk);
                let r = ((t >> 11) & 0x1f) as u8;
                let g = ((t >> 5) & 0x3f) as u8;
                let b = (t & 0x1f) as u8;
                d[0] = (r << 3) | (r >> 2);
                d[1] = (g << 2) | (g >> 4);
                d[2] = (b << 3) | (b >> 2);
                d[3] = 0xff;
            }
        }
    }
    Ok(())
}
