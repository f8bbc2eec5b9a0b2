//! YUYV to RGB conversion.
//!
//! YUYV (4:2:2 packed) stores two horizontally adjacent pixels in four bytes,
//! `[Y0 U Y1 V]`, with both pixels sharing the chroma pair. Conversion uses
//! the fixed-point ITU-R BT.601 studio-range formula, so results are exact
//! and reproducible across platforms.

/// Bytes of YUYV input per pixel pair.
const GROUP_LEN: usize = 4;
/// Bytes of RGB output per pixel pair.
const RGB_GROUP_LEN: usize = 6;

/// Number of RGB bytes produced from `yuyv_len` bytes of input.
///
/// A trailing partial group is ignored.
#[must_use]
pub const fn rgb_len(yuyv_len: usize) -> usize {
    yuyv_len / GROUP_LEN * RGB_GROUP_LEN
}

/// Decode a packed YUYV buffer into a new interleaved RGB buffer.
#[must_use]
pub fn decode_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::new();
    decode_rgb_into(yuyv, &mut rgb);
    rgb
}

/// Decode a packed YUYV buffer into `rgb`, reusing its allocation.
///
/// `rgb` is resized to exactly [`rgb_len`]`(yuyv.len())` bytes, so it can be
/// passed frame after frame even when the filled length varies.
pub fn decode_rgb_into(yuyv: &[u8], rgb: &mut Vec<u8>) {
    rgb.clear();
    rgb.reserve_exact(rgb_len(yuyv.len()));

    for group in yuyv.chunks_exact(GROUP_LEN) {
        if let [y0, u, y1, v] = *group {
            let (r, g, b) = yuv_to_rgb(y0, u, v);
            rgb.extend_from_slice(&[r, g, b]);
            let (r, g, b) = yuv_to_rgb(y1, u, v);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }
}

/// Extract the luma plane of a packed YUYV buffer (one byte per pixel).
#[must_use]
pub fn decode_luma(yuyv: &[u8]) -> Vec<u8> {
    yuyv.iter().step_by(2).copied().collect()
}

/// Convert one YUV sample to RGB.
///
/// ```
/// use yuyv_capture::convert::yuv_to_rgb;
///
/// assert_eq!(yuv_to_rgb(235, 128, 128), (255, 255, 255));
/// assert_eq!(yuv_to_rgb(16, 128, 128), (0, 0, 0));
/// ```
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let r = clip((298 * c + 409 * e + 128) >> 8);
    let g = clip((298 * c - 100 * d - 208 * e + 128) >> 8);
    let b = clip((298 * c + 516 * d + 128) >> 8);

    (r, g, b)
}

fn clip(value: i32) -> u8 {
    u8::try_from(value.clamp(0, 255)).unwrap_or(u8::MAX)
}
