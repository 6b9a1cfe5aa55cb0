//! Pixel format conversion — YUYV / Y16 to grayscale, frame mirroring.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
/// Grayscale = every even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(ConvertError::BufferTooShort {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Convert 16-bit little-endian grayscale to 8-bit by dropping the low byte.
pub fn y16_to_grayscale(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ConvertError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if buf.len() < expected {
        return Err(ConvertError::BufferTooShort {
            expected,
            actual: buf.len(),
        });
    }
    let mut gray = Vec::with_capacity(pixels);
    for idx in 0..pixels {
        let low = buf[idx * 2] as u16;
        let high = buf[idx * 2 + 1] as u16;
        gray.push((((high << 8) | low) >> 8) as u8);
    }
    Ok(gray)
}

/// Mirror a grayscale frame horizontally in place, so the live feed
/// behaves like a mirror for the person being captured.
pub fn mirror_horizontal(gray: &mut [u8], width: u32, height: u32) {
    let w = width as usize;
    let h = height as usize;
    if gray.len() < w * h {
        return;
    }
    for row in gray.chunks_exact_mut(w).take(h) {
        row.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let gray = yuyv_to_grayscale(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_to_grayscale_4x2() {
        let yuyv: Vec<u8> = (0..16).collect();
        let gray = yuyv_to_grayscale(&yuyv, 4, 2).unwrap();
        assert_eq!(gray, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128];
        assert!(yuyv_to_grayscale(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_y16_to_grayscale() {
        // Two pixels little-endian: 0x0100 -> 1, 0xFF00 -> 255
        let buf = vec![0x00, 0x01, 0x00, 0xFF];
        let gray = y16_to_grayscale(&buf, 2, 1).unwrap();
        assert_eq!(gray, vec![1, 255]);
    }

    #[test]
    fn test_y16_invalid_length() {
        assert!(y16_to_grayscale(&[0x00], 2, 1).is_err());
    }

    #[test]
    fn test_mirror_horizontal() {
        let mut gray = vec![1, 2, 3, 4, 5, 6];
        mirror_horizontal(&mut gray, 3, 2);
        assert_eq!(gray, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_mirror_twice_is_identity() {
        let original: Vec<u8> = (0..12).collect();
        let mut gray = original.clone();
        mirror_horizontal(&mut gray, 4, 3);
        mirror_horizontal(&mut gray, 4, 3);
        assert_eq!(gray, original);
    }
}
