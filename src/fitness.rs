/// Sum of Absolute Differences (SAD) over raw RGBA bytes.
/// note: alpha participates like any other channel - an unpainted (alpha 0)
/// composite pixel is supposed to score badly against an opaque target.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

/// SIMD SAD over a 16-byte-aligned-length prefix using the PSADBW instruction.
/// caller guarantees both slices have the same length, a multiple of 16.
#[cfg(target_arch = "x86_64")]
#[inline]
unsafe fn sad_simd_chunk(a: &[u8], b: &[u8]) -> u64 {
    debug_assert_eq!(a.len(), b.len());
    debug_assert!(a.len() % 16 == 0);

    let mut sum = _mm_setzero_si128();
    let chunks = a.len() / 16;

    for i in 0..chunks {
        let offset = i * 16;

        let av = _mm_loadu_si128(a.as_ptr().add(offset) as *const __m128i);
        let bv = _mm_loadu_si128(b.as_ptr().add(offset) as *const __m128i);

        // PSADBW: 16 absolute byte differences summed into two u64 lanes
        let sad = _mm_sad_epu8(av, bv);
        sum = _mm_add_epi64(sum, sad);
    }

    let low = _mm_cvtsi128_si64(sum) as u64;
    let high = _mm_extract_epi64(sum, 1) as u64;
    low + high
}

/// aggregate absolute pixel difference between two equally sized byte buffers.
/// lower is better; zero iff the buffers are byte-identical.
///
/// the SIMD body is an optimization only - the result is bit-identical to the
/// scalar formula `sum(|a[i] - b[i]|)` on every platform.
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn sad(a: &[u8], b: &[u8]) -> u64 {
    assert_eq!(a.len(), b.len(), "sad: buffer length mismatch");

    // round down to the nearest multiple of 16 for the PSADBW body
    let simd_len = (a.len() / 16) * 16;

    let simd_sum = if simd_len > 0 {
        unsafe { sad_simd_chunk(&a[..simd_len], &b[..simd_len]) }
    } else {
        0
    };

    // scalar remainder loop (0..15 trailing bytes)
    let scalar_sum: u64 = a[simd_len..]
        .iter()
        .zip(&b[simd_len..])
        .map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs() as u64)
        .sum();

    simd_sum + scalar_sum
}

/// scalar fallback for non-x86_64 platforms.
#[cfg(not(target_arch = "x86_64"))]
#[inline]
pub fn sad(a: &[u8], b: &[u8]) -> u64 {
    assert_eq!(a.len(), b.len(), "sad: buffer length mismatch");

    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs() as u64)
        .sum()
}
