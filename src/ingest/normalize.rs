use anyhow::{anyhow, Result};

/// Capture formats a camera may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }

    fn expected_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            Self::Rgb24 => pixels.checked_mul(3),
            Self::Yuyv => pixels.checked_mul(2),
            Self::Nv12 => pixels.checked_add(pixels / 2),
        }
    }

    /// Chroma is shared across pixel pairs, so subsampled formats need even sizes.
    fn supports_size(self, width: u32, height: u32) -> bool {
        match self {
            Self::Rgb24 => true,
            Self::Yuyv => width % 2 == 0,
            Self::Nv12 => width % 2 == 0 && height % 2 == 0,
        }
    }
}

/// Convert a captured buffer to packed RGB24.
///
/// Drivers may pad the buffer past the image; trailing bytes are ignored.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    if !format.supports_size(width, height) {
        return Err(anyhow!(
            "{:?} frame size {}x{} must be even",
            format,
            width,
            height
        ));
    }
    let expected = format
        .expected_len(width, height)
        .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", format))?;
    let pixels = pixels.get(..expected).ok_or_else(|| {
        anyhow!(
            "{:?} frame too short: expected {}, got {}",
            format,
            expected,
            pixels.len()
        )
    })?;

    Ok(match format {
        PixelFormat::Rgb24 => pixels.to_vec(),
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width as usize, height as usize),
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width as usize, height as usize),
    })
}

fn yuyv_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(w * h * 3);
    // Each 4-byte group Y0 U Y1 V covers two pixels.
    for group in pixels.chunks_exact(4) {
        let (u, v) = (group[1], group[3]);
        rgb.extend_from_slice(&yuv_to_rgb(group[0], u, v));
        rgb.extend_from_slice(&yuv_to_rgb(group[2], u, v));
    }
    rgb.truncate(w * h * 3);
    rgb
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let mut rgb = Vec::with_capacity(y_plane * 3);
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            rgb.extend_from_slice(&yuv_to_rgb(
                pixels[j * w + i],
                pixels[uv_index],
                pixels[uv_index + 1],
            ));
        }
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_to_u8(y + 1.402_f32 * v),
        clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v),
        clamp_to_u8(y + 1.772_f32 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_sizes_rejected_for_subsampled_formats() {
        let buffer = vec![128u8; 64];
        assert!(normalize_to_rgb(&buffer, 3, 2, PixelFormat::Nv12).is_err());
        assert!(normalize_to_rgb(&buffer, 2, 3, PixelFormat::Nv12).is_err());
        assert!(normalize_to_rgb(&buffer, 3, 2, PixelFormat::Yuyv).is_err());
        assert_eq!(normalize_to_rgb(&buffer, 3, 2, PixelFormat::Rgb24).unwrap().len(), 18);
    }

    #[test]
    fn neutral_chroma_is_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        assert_eq!(
            normalize_to_rgb(&nv12, 2, 2, PixelFormat::Nv12)?,
            vec![128u8; 12]
        );

        let yuyv = [90u8, 128, 200, 128];
        assert_eq!(
            normalize_to_rgb(&yuyv, 2, 1, PixelFormat::Yuyv)?,
            vec![90, 90, 90, 200, 200, 200]
        );
        Ok(())
    }

    #[test]
    fn short_buffers_are_rejected_and_padding_ignored() -> Result<()> {
        assert!(normalize_to_rgb(&[0u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
        let padded = vec![7u8; 12];
        assert_eq!(normalize_to_rgb(&padded, 1, 3, PixelFormat::Rgb24)?, vec![7u8; 9]);
        Ok(())
    }

    #[test]
    fn fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
