/// Clipped rotate/scale/translate rasterizer for pasting one source tile
/// into a destination RGBA buffer.
///
/// the scan walks destination pixels inside the transformed tile's bounding
/// box and back-maps each one into source space via the inverse
/// rotation-scale matrix. per-pixel trig is avoided by stepping the source
/// coordinate incrementally in Q16.16 fixed point. destination pixels whose
/// back-mapped coordinate falls outside the source rectangle are left
/// untouched ("transparent" outside tile bounds, no fill color).
///
/// compositing is painter's-algorithm overwrite: a later paste simply
/// replaces whatever the destination held. this is deliberate - there is no
/// alpha blending anywhere in the pipeline.

const FIXED_SHIFT: i64 = 16;
const FIXED_ONE: f32 = 65536.0;

/// one tile placement in destination space.
/// `anchor` is the destination pixel position where the source `pivot` lands;
/// `angle` is in radians and `scale` is the source-to-destination pixel ratio.
#[derive(Clone, Copy, Debug)]
pub struct TileTransform {
    pub anchor_x: f32,
    pub anchor_y: f32,
    pub pivot_x: f32,
    pub pivot_y: f32,
    pub angle: f32,
    pub scale: f32,
}

/// the two running distance totals accumulated by [`score_tile`]:
/// `painted` is SAD(target, pixel that would be painted) and `existing` is
/// SAD(target, pixel currently occupying the destination), both restricted
/// to the tile footprint. `painted < existing` means committing the paste
/// would improve the match over the affected region.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScorePair {
    pub painted: u64,
    pub existing: u64,
}

/// precomputed scan state shared by the paint and score entry points.
struct Scan {
    min_x: i64,
    min_y: i64,
    max_x: i64,
    max_y: i64,
    // inverse-mapping steps and row origin, Q16.16
    du_row: i64,
    dv_row: i64,
    du_col: i64,
    dv_col: i64,
    row_u: i64,
    row_v: i64,
}

impl Scan {
    /// project the four source corners, clip the bounding box against the
    /// destination and precompute the fixed-point stepping deltas.
    /// returns None when nothing can be painted (empty destination or a
    /// footprint that misses it entirely).
    fn setup(dst_w: i64, dst_h: i64, src_w: i64, src_h: i64, t: &TileTransform) -> Option<Scan> {
        if dst_w <= 0 || dst_h <= 0 {
            return None;
        }

        // angle sign convention is normalized once here; everything below
        // works with the screen-space (y down) rotation
        let angle = -t.angle;
        let (sin_a, cos_a) = angle.sin_cos();
        let (px, py) = (t.pivot_x, t.pivot_y);
        let (ox, oy) = (t.anchor_x, t.anchor_y);
        let scale = t.scale;

        // where each source corner lands in the destination
        let corners = [
            (0.0, 0.0),
            (src_w as f32, 0.0),
            (src_w as f32, src_h as f32),
            (0.0, src_h as f32),
        ];

        let mut min_xf = f32::INFINITY;
        let mut min_yf = f32::INFINITY;
        let mut max_xf = f32::NEG_INFINITY;
        let mut max_yf = f32::NEG_INFINITY;
        for (cx, cy) in corners {
            let dx = (cos_a * (cx - px) + sin_a * (py - cy)) * scale + ox;
            let dy = (sin_a * (cx - px) + cos_a * (cy - py)) * scale + oy;
            min_xf = min_xf.min(dx);
            max_xf = max_xf.max(dx);
            min_yf = min_yf.min(dy);
            max_yf = max_yf.max(dy);
        }

        // clip the box to the destination; an inverted range after clipping
        // means the footprint lies entirely outside - a true no-op
        let min_x = (min_xf.floor() as i64).max(0);
        let min_y = (min_yf.floor() as i64).max(0);
        let max_x = (max_xf.ceil() as i64).min(dst_w - 1);
        let max_y = (max_yf.ceil() as i64).min(dst_h - 1);
        if min_x > max_x || min_y > max_y {
            return None;
        }

        // inverse mapping: one step right in the destination moves
        // (du_row, dv_row) in source space, one step down (du_col, dv_col)
        let dv_col = ((cos_a / scale) * FIXED_ONE) as i64;
        let du_col = ((sin_a / scale) * FIXED_ONE) as i64;
        let du_row = dv_col;
        let dv_row = -du_col;

        let px_i = (px * FIXED_ONE) as i64;
        let py_i = (py * FIXED_ONE) as i64;
        let start_u = px_i - (ox * dv_col as f32 + oy * du_col as f32) as i64;
        let start_v = py_i - (ox * dv_row as f32 + oy * du_row as f32) as i64;

        Some(Scan {
            min_x,
            min_y,
            max_x,
            max_y,
            du_row,
            dv_row,
            du_col,
            dv_col,
            row_u: start_u + min_y * du_col,
            row_v: start_v + min_y * dv_col,
        })
    }
}

#[inline]
fn check_buffer(len: usize, w: u32, h: u32, stride: u32, what: &str) {
    assert!(stride >= w, "{what}: stride {stride} < width {w}");
    assert!(
        len >= (stride as usize) * (h as usize) * 4,
        "{what}: buffer too small for {w}x{h} stride {stride}"
    );
}

/// paste `src` into `dst` under the given transform, clipped to the
/// destination. strides are in pixels. pixels outside the back-mapped source
/// rectangle are skipped, so anything already in `dst` shows through there.
#[allow(clippy::too_many_arguments)]
pub fn draw_tile(
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    dst_stride: u32,
    src: &[u8],
    src_w: u32,
    src_h: u32,
    src_stride: u32,
    t: &TileTransform,
) {
    profiling::scope!("draw_tile");
    check_buffer(dst.len(), dst_w, dst_h, dst_stride, "draw_tile dst");
    check_buffer(src.len(), src_w, src_h, src_stride, "draw_tile src");

    let Some(scan) = Scan::setup(dst_w as i64, dst_h as i64, src_w as i64, src_h as i64, t) else {
        return;
    };
    let (src_w, src_h) = (src_w as i64, src_h as i64);

    let mut row_u = scan.row_u;
    let mut row_v = scan.row_v;
    for y in scan.min_y..=scan.max_y {
        let mut u = row_u + scan.min_x * scan.du_row;
        let mut v = row_v + scan.min_x * scan.dv_row;

        for x in scan.min_x..=scan.max_x {
            let su = u >> FIXED_SHIFT;
            let sv = v >> FIXED_SHIFT;

            // reject, never wrap: coordinates outside [0, srcDim) leave the
            // destination pixel alone
            if su >= 0 && su < src_w && sv >= 0 && sv < src_h {
                let si = ((sv * src_stride as i64 + su) * 4) as usize;
                let di = ((y * dst_stride as i64 + x) * 4) as usize;
                dst[di..di + 4].copy_from_slice(&src[si..si + 4]);
            }

            u += scan.du_row;
            v += scan.dv_row;
        }

        row_u += scan.du_col;
        row_v += scan.dv_col;
    }
}

#[inline]
fn px_sad(a: &[u8], b: &[u8]) -> u64 {
    (a[0] as i32 - b[0] as i32).unsigned_abs() as u64
        + (a[1] as i32 - b[1] as i32).unsigned_abs() as u64
        + (a[2] as i32 - b[2] as i32).unsigned_abs() as u64
        + (a[3] as i32 - b[3] as i32).unsigned_abs() as u64
}

/// identical scan to [`draw_tile`] but writes nothing: for every destination
/// cell the tile would touch it accumulates SAD(target, source pixel that
/// would be painted) and SAD(target, composite pixel currently there).
///
/// this answers "would pasting here improve the match to the target over the
/// affected region" in O(tile footprint) instead of a paint plus a full-frame
/// rescan. `target` and `composite` share the destination geometry.
#[allow(clippy::too_many_arguments)]
pub fn score_tile(
    target: &[u8],
    dst_w: u32,
    dst_h: u32,
    dst_stride: u32,
    src: &[u8],
    src_w: u32,
    src_h: u32,
    src_stride: u32,
    composite: &[u8],
    t: &TileTransform,
) -> ScorePair {
    profiling::scope!("score_tile");
    check_buffer(target.len(), dst_w, dst_h, dst_stride, "score_tile target");
    check_buffer(src.len(), src_w, src_h, src_stride, "score_tile src");
    check_buffer(composite.len(), dst_w, dst_h, dst_stride, "score_tile composite");

    let mut pair = ScorePair::default();

    let Some(scan) = Scan::setup(dst_w as i64, dst_h as i64, src_w as i64, src_h as i64, t) else {
        return pair;
    };
    let (src_w, src_h) = (src_w as i64, src_h as i64);

    let mut row_u = scan.row_u;
    let mut row_v = scan.row_v;
    for y in scan.min_y..=scan.max_y {
        let mut u = row_u + scan.min_x * scan.du_row;
        let mut v = row_v + scan.min_x * scan.dv_row;

        for x in scan.min_x..=scan.max_x {
            let su = u >> FIXED_SHIFT;
            let sv = v >> FIXED_SHIFT;

            if su >= 0 && su < src_w && sv >= 0 && sv < src_h {
                let si = ((sv * src_stride as i64 + su) * 4) as usize;
                let di = ((y * dst_stride as i64 + x) * 4) as usize;
                pair.painted += px_sad(&target[di..di + 4], &src[si..si + 4]);
                pair.existing += px_sad(&target[di..di + 4], &composite[di..di + 4]);
            }

            u += scan.du_row;
            v += scan.dv_row;
        }

        row_u += scan.du_col;
        row_v += scan.dv_col;
    }

    pair
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::sad;

    fn identity_at(x: f32, y: f32) -> TileTransform {
        TileTransform {
            anchor_x: x,
            anchor_y: y,
            pivot_x: 0.0,
            pivot_y: 0.0,
            angle: 0.0,
            scale: 1.0,
        }
    }

    /// 4x4 RGBA tile where every byte is distinct
    fn patterned_tile() -> Vec<u8> {
        (0..4 * 4 * 4).map(|i| (i * 3 + 1) as u8).collect()
    }

    #[test]
    fn identity_paint_reproduces_source() {
        let src = patterned_tile();
        let mut dst = vec![0u8; 8 * 8 * 4];

        draw_tile(&mut dst, 8, 8, 8, &src, 4, 4, 4, &identity_at(2.0, 3.0));

        for y in 0..8i32 {
            for x in 0..8i32 {
                let di = ((y * 8 + x) * 4) as usize;
                let got = &dst[di..di + 4];
                if (2..6).contains(&x) && (3..7).contains(&y) {
                    let si = (((y - 3) * 4 + (x - 2)) * 4) as usize;
                    assert_eq!(got, &src[si..si + 4], "pixel ({x},{y})");
                } else {
                    assert_eq!(got, &[0, 0, 0, 0], "pixel ({x},{y}) should be untouched");
                }
            }
        }
    }

    #[test]
    fn offscreen_footprint_is_a_noop() {
        let src = patterned_tile();
        let mut dst: Vec<u8> = (0..8 * 8 * 4).map(|i| (i % 251) as u8).collect();
        let before = dst.clone();

        draw_tile(&mut dst, 8, 8, 8, &src, 4, 4, 4, &identity_at(100.0, 100.0));
        assert_eq!(dst, before);

        draw_tile(&mut dst, 8, 8, 8, &src, 4, 4, 4, &identity_at(-50.0, -50.0));
        assert_eq!(dst, before);
    }

    #[test]
    fn zero_sized_destination_is_a_noop() {
        let src = patterned_tile();
        let mut dst: Vec<u8> = Vec::new();
        draw_tile(&mut dst, 0, 0, 0, &src, 4, 4, 4, &identity_at(0.0, 0.0));
        assert!(dst.is_empty());
    }

    #[test]
    fn full_coverage_paint_and_sad() {
        // 4x4 destination of 0x00, one 4x4 tile of 0xFF at the origin:
        // the whole destination becomes 0xFF
        let src = vec![0xFFu8; 4 * 4 * 4];
        let mut dst = vec![0x00u8; 4 * 4 * 4];

        draw_tile(&mut dst, 4, 4, 4, &src, 4, 4, 4, &identity_at(0.0, 0.0));
        assert!(dst.iter().all(|&b| b == 0xFF));

        let zeros = vec![0x00u8; 4 * 4 * 4];
        let ones = vec![0xFFu8; 4 * 4 * 4];
        assert_eq!(sad(&dst, &zeros), 4 * 4 * 4 * 255);
        assert_eq!(sad(&dst, &ones), 0);
    }

    #[test]
    fn scale_two_duplicates_pixels() {
        // 2x2 tile scaled 2x covers 4x4; each source pixel becomes a 2x2 block
        let mut src = vec![0u8; 2 * 2 * 4];
        for (i, px) in [[10u8; 4], [20u8; 4], [30u8; 4], [40u8; 4]].iter().enumerate() {
            src[i * 4..i * 4 + 4].copy_from_slice(px);
        }
        let mut dst = vec![0u8; 4 * 4 * 4];

        let t = TileTransform { scale: 2.0, ..identity_at(0.0, 0.0) };
        draw_tile(&mut dst, 4, 4, 4, &src, 2, 2, 2, &t);

        for y in 0..4usize {
            for x in 0..4usize {
                let di = (y * 4 + x) * 4;
                let si = ((y / 2) * 2 + x / 2) * 4;
                assert_eq!(&dst[di..di + 4], &src[si..si + 4], "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn score_matches_paint_delta() {
        // the delta identity: painting changes the full-frame SAD by exactly
        // painted - existing, because nothing outside the footprint moves
        let src = patterned_tile();
        let target: Vec<u8> = (0..8 * 8 * 4).map(|i| (i * 7 % 256) as u8).collect();
        let composite: Vec<u8> = (0..8 * 8 * 4).map(|i| (i * 11 % 256) as u8).collect();

        let t = TileTransform {
            anchor_x: 3.0,
            anchor_y: 1.0,
            pivot_x: 1.0,
            pivot_y: 1.0,
            angle: 0.7,
            scale: 1.3,
        };

        let pair = score_tile(&target, 8, 8, 8, &src, 4, 4, 4, &composite, &t);

        let mut painted = composite.clone();
        draw_tile(&mut painted, 8, 8, 8, &src, 4, 4, 4, &t);

        let before = sad(&target, &composite);
        let after = sad(&target, &painted);
        assert_eq!(
            after as i64 - before as i64,
            pair.painted as i64 - pair.existing as i64
        );
    }

    #[test]
    fn score_offscreen_is_zero() {
        let src = patterned_tile();
        let target = vec![0u8; 8 * 8 * 4];
        let composite = vec![0xFFu8; 8 * 8 * 4];

        let pair = score_tile(
            &target,
            8,
            8,
            8,
            &src,
            4,
            4,
            4,
            &composite,
            &identity_at(500.0, 500.0),
        );
        assert_eq!(pair.painted, 0);
        assert_eq!(pair.existing, 0);
    }
}
