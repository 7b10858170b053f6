//! SIMD kernels for the f64 inner loops of hashing and distance computation.

use wide::f64x4;

/// Dot product over the common prefix of `a` and `b`.
///
/// Dimensions beyond the shorter slice contribute nothing, which is what the
/// zero-padding rule of the projection hashing needs.
pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);

    if len < 8 {
        return a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    }

    let mut acc = f64x4::splat(0.0);
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let remainder_a = chunks_a.remainder();
    let remainder_b = chunks_b.remainder();

    for (chunk_a, chunk_b) in chunks_a.zip(chunks_b) {
        let va = f64x4::from([chunk_a[0], chunk_a[1], chunk_a[2], chunk_a[3]]);
        let vb = f64x4::from([chunk_b[0], chunk_b[1], chunk_b[2], chunk_b[3]]);
        acc = acc + va * vb;
    }

    let lanes = acc.to_array();
    let mut total = lanes[0] + lanes[1] + lanes[2] + lanes[3];
    total += remainder_a
        .iter()
        .zip(remainder_b.iter())
        .map(|(x, y)| x * y)
        .sum::<f64>();
    total
}

/// Sum of squared element-wise differences of two equally long slices.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    if a.len() < 8 {
        return a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    }

    let mut acc = f64x4::splat(0.0);
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let remainder_a = chunks_a.remainder();
    let remainder_b = chunks_b.remainder();

    for (chunk_a, chunk_b) in chunks_a.zip(chunks_b) {
        let va = f64x4::from([chunk_a[0], chunk_a[1], chunk_a[2], chunk_a[3]]);
        let vb = f64x4::from([chunk_b[0], chunk_b[1], chunk_b[2], chunk_b[3]]);
        let diff = va - vb;
        acc = acc + diff * diff;
    }

    let lanes = acc.to_array();
    let mut total = lanes[0] + lanes[1] + lanes[2] + lanes[3];
    total += remainder_a
        .iter()
        .zip(remainder_b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>();
    total
}
