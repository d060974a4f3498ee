//! Smooth 2D noise for the power blender
//!
//! A classic 2D simplex noise over a shuffled permutation table. Output is
//! rescaled from [-1, 1] to [0, 1].

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// A smooth noise function sampled by the blender
pub trait NoiseSource: Send + Sync {
    /// Sample at `(x, y)`; result lies in [0, 1]
    fn sample(&self, x: f64, y: f64) -> f64;
}

const GRADIENTS: [(f64, f64); 8] = [
    (1.0, 1.0),
    (-1.0, 1.0),
    (1.0, -1.0),
    (-1.0, -1.0),
    (1.0, 0.0),
    (-1.0, 0.0),
    (0.0, 1.0),
    (0.0, -1.0),
];

/// 2D simplex noise
#[derive(Debug, Clone)]
pub struct SimplexNoise {
    perm: Vec<usize>,
}

impl SimplexNoise {
    /// Noise with a random permutation table
    pub fn new() -> Self {
        Self::from_rng(&mut rand::thread_rng())
    }

    /// Reproducible noise
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(&mut StdRng::seed_from_u64(seed))
    }

    fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut table: Vec<usize> = (0..256).collect();
        table.shuffle(rng);
        let perm = table.iter().chain(table.iter()).copied().collect();
        Self { perm }
    }

    /// Raw simplex value in [-1, 1]
    pub fn raw(&self, x: f64, y: f64) -> f64 {
        let f2 = 0.5 * (3f64.sqrt() - 1.0);
        let g2 = (3.0 - 3f64.sqrt()) / 6.0;

        // Skew into simplex cell space
        let s = (x + y) * f2;
        let i = (x + s).floor();
        let j = (y + s).floor();
        let t = (i + j) * g2;
        let x0 = x - (i - t);
        let y0 = y - (j - t);

        let (i1, j1) = if x0 > y0 { (1, 0) } else { (0, 1) };

        let x1 = x0 - i1 as f64 + g2;
        let y1 = y0 - j1 as f64 + g2;
        let x2 = x0 - 1.0 + 2.0 * g2;
        let y2 = y0 - 1.0 + 2.0 * g2;

        let ii = (i as i64 & 255) as usize;
        let jj = (j as i64 & 255) as usize;
        let p = &self.perm;
        let g0 = p[ii + p[jj]] % 8;
        let g1 = p[ii + i1 + p[jj + j1]] % 8;
        let g2i = p[ii + 1 + p[jj + 1]] % 8;

        let n = corner(x0, y0, g0) + corner(x1, y1, g1) + corner(x2, y2, g2i);
        (70.0 * n).clamp(-1.0, 1.0)
    }
}

impl Default for SimplexNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseSource for SimplexNoise {
    fn sample(&self, x: f64, y: f64) -> f64 {
        (self.raw(x, y) + 1.0) / 2.0
    }
}

fn corner(x: f64, y: f64, gradient: usize) -> f64 {
    let t = 0.5 - x * x - y * y;
    if t < 0.0 {
        return 0.0;
    }
    let (gx, gy) = GRADIENTS[gradient];
    let t2 = t * t;
    t2 * t2 * (gx * x + gy * y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_stay_in_unit_range() {
        let noise = SimplexNoise::with_seed(7);
        for step in 0..2000 {
            let x = step as f64 * 0.173 - 50.0;
            let y = step as f64 * 0.031 - 10.0;
            let v = noise.sample(x, y);
            assert!((0.0..=1.0).contains(&v), "sample({}, {}) = {}", x, y, v);
        }
    }

    #[test]
    fn test_origin_is_midpoint() {
        // Every simplex corner contributes zero at a lattice point
        let noise = SimplexNoise::new();
        assert_eq!(noise.sample(0.0, 0.0), 0.5);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let a = SimplexNoise::with_seed(42);
        let b = SimplexNoise::with_seed(42);
        for r in [0.1, 0.25, 0.5, 0.9] {
            assert_eq!(a.sample(0.0, r), b.sample(0.0, r));
        }
    }

    #[test]
    fn test_noise_is_smooth() {
        let noise = SimplexNoise::with_seed(3);
        let a = noise.sample(0.0, 0.500);
        let b = noise.sample(0.0, 0.501);
        assert!((a - b).abs() < 0.05);
    }
}
