//! Separable subsurface scattering kernels.
//!
//! The diffusion profile is approximated by a sum of gaussians whose widths
//! scale per channel with the falloff colour. Sample offsets are distributed
//! with a quadratic falloff so more taps land near the center. Kernels are
//! symmetric; only the center and the positive half are stored.

use std::f32::consts::PI;

use glam::{Vec3, Vec4};

/// Stored taps (center plus positive half) of the three nested kernels.
pub const KERNEL_SIZES: [usize; 3] = [13, 9, 6];

/// Stored taps across all kernels.
pub const KERNEL_TEXELS: usize = KERNEL_SIZES[0] + KERNEL_SIZES[1] + KERNEL_SIZES[2];

const OFFSET_EXPONENT: f32 = 2.0;

/// (variance, weight) of each gaussian in the profile.
const PROFILE_GAUSSIANS: [(f32, f32); 5] = [
    (0.0484, 0.100),
    (0.187, 0.118),
    (0.567, 0.113),
    (1.99, 0.358),
    (7.41, 0.078),
];

fn gaussian(variance: f32, r: f32, falloff: Vec3) -> Vec3 {
    let g = |f: f32| {
        let rr = r / (0.001 + f);
        (-(rr * rr) / (2.0 * variance)).exp() / (2.0 * PI * variance)
    };
    Vec3::new(g(falloff.x), g(falloff.y), g(falloff.z))
}

fn profile(r: f32, falloff: Vec3) -> Vec3 {
    PROFILE_GAUSSIANS
        .iter()
        .fold(Vec3::ZERO, |acc, &(variance, weight)| {
            acc + weight * gaussian(variance, r, falloff)
        })
}

/// Sample range for a full kernel of `taps` samples.
#[must_use]
pub fn kernel_range(taps: usize) -> f32 {
    if taps > 20 { 3.0 } else { 2.0 }
}

/// Computes a mirrored kernel of `stored` taps.
///
/// Each tap holds rgb weights and, in `w`, its offset normalized to the
/// kernel range. Weights of the full symmetric kernel sum to one per
/// channel before `strength` lerps the center toward identity.
#[must_use]
pub fn mirrored_kernel(stored: usize, strength: Vec3, falloff: Vec3) -> Vec<Vec4> {
    if stored == 0 {
        return Vec::new();
    }
    let taps = stored * 2 - 1;
    let center = stored - 1;
    let range = kernel_range(taps);

    let offsets: Vec<f32> = if taps == 1 {
        vec![0.0]
    } else {
        (0..taps)
            .map(|i| {
                // t in [-1, 1], exactly zero at the center tap
                let t = (i as f32 - center as f32) / center as f32;
                range * t.signum() * t.abs().powf(OFFSET_EXPONENT)
            })
            .collect()
    };

    let mut weights: Vec<Vec3> = (0..taps)
        .map(|i| {
            let left = if i > 0 { (offsets[i] - offsets[i - 1]).abs() } else { 0.0 };
            let right = if i + 1 < taps {
                (offsets[i] - offsets[i + 1]).abs()
            } else {
                0.0
            };
            let area = (left + right) / 2.0;
            area * profile(offsets[i], falloff)
        })
        .collect();

    let sum: Vec3 = weights.iter().copied().sum();
    for w in &mut weights {
        *w = Vec3::select(sum.cmpgt(Vec3::ZERO), *w / sum, Vec3::ZERO);
    }
    if taps == 1 {
        weights[0] = Vec3::ONE;
    }

    weights[center] = weights[center] * strength + (Vec3::ONE - strength);
    for (i, w) in weights.iter_mut().enumerate() {
        if i != center {
            *w *= strength;
        }
    }

    (center..taps)
        .map(|i| weights[i].extend(offsets[i] / range))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirrored_sum(kernel: &[Vec4]) -> Vec3 {
        kernel[0].truncate() + 2.0 * kernel[1..].iter().map(|k| k.truncate()).sum::<Vec3>()
    }

    #[test]
    fn full_strength_kernel_is_normalized() {
        for stored in KERNEL_SIZES {
            let kernel = mirrored_kernel(stored, Vec3::ONE, Vec3::new(1.0, 0.37, 0.3));
            assert_eq!(kernel.len(), stored);
            let sum = mirrored_sum(&kernel);
            assert!((sum - Vec3::ONE).abs().max_element() < 1e-4, "sum {sum}");
        }
    }

    #[test]
    fn zero_strength_is_identity() {
        let kernel = mirrored_kernel(9, Vec3::ZERO, Vec3::ONE);
        assert_eq!(kernel[0].truncate(), Vec3::ONE);
        assert!(kernel[1..].iter().all(|k| k.truncate() == Vec3::ZERO));
    }

    #[test]
    fn offsets_increase_to_one() {
        let kernel = mirrored_kernel(13, Vec3::ONE, Vec3::ONE);
        assert_eq!(kernel[0].w, 0.0);
        assert!(kernel.windows(2).all(|w| w[0].w < w[1].w));
        assert!((kernel[12].w - 1.0).abs() < 1e-6);
    }
}
