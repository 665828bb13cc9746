//! Synthetic images and helpers shared by the integration tests.

use gridcut::nbhood::{metric, Neighbourhood};
use gridcut::{DenseArray, Image};

/// Two-intensity image split into a left and a right half.
pub fn half_split(h: usize, w: usize, lo: f64, hi: f64) -> Image<f64, 2> {
    Image::from_fn([h, w], |c| if c[1] < w / 2 { lo } else { hi })
}

/// Unit-contrast checkerboard.
pub fn checkerboard(h: usize, w: usize) -> Image<f64, 2> {
    Image::from_fn([h, w], |c| ((c[0] + c[1]) % 2) as f64)
}

/// Gaussian blob centred in the image.
pub fn gaussian_blob(n: usize, sigma: f64) -> Image<f64, 2> {
    let centre = (n / 2) as f64;
    Image::from_fn([n, n], |c| {
        let dr = c[0] as f64 - centre;
        let dc = c[1] as f64 - centre;
        (-(dr * dr + dc * dc) / (2.0 * sigma * sigma)).exp()
    })
}

/// Three 10-column bands with the given means plus deterministic noise.
pub fn three_bands(means: [f64; 3], noise: f64) -> Image<f64, 2> {
    let mut rng = Lcg::new(0x5eed);
    Image::from_fn([10, 30], |c| {
        let band = c[1] / 10;
        means[band] + noise * rng.next_symmetric()
    })
}

/// Volume that is background except for one bright voxel.
pub fn single_voxel(n: usize, voxel: [usize; 3]) -> Image<f64, 3> {
    Image::from_fn([n, n, n], |c| if c == voxel { 1.0 } else { 0.0 })
}

/// Deterministic linear congruential generator for reproducible noise.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407),
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 33) as u32
    }

    /// Uniform value in [-1, 1].
    pub fn next_symmetric(&mut self) -> f64 {
        self.next_u32() as f64 / (u32::MAX as f64 / 2.0) - 1.0
    }
}

/// Chan-Vese energy of a labelling: weighted squared deviations plus the
/// metric length of the boundary.
pub fn chanvese_energy(
    img: &Image<f64, 2>,
    labels: &DenseArray<u8, 2>,
    nb_symbol: &str,
    lambda: f64,
    mu: f64,
    c1: f64,
    c2: f64,
) -> f64 {
    let nb = Neighbourhood::<2>::from_symbol(nb_symbol).unwrap();
    let weights: Vec<f64> = metric::cauchy_crofton(&nb).unwrap();
    let mut energy = 0.0;
    for v in 0..labels.len() {
        let x = img.data[v];
        energy += if labels[v] == 0 {
            lambda * (x - c1) * (x - c1)
        } else {
            lambda * (x - c2) * (x - c2)
        };
        let c = labels.coords(v);
        for i in (0..nb.len()).step_by(2) {
            if let Some(wc) = labels.offset_coords(c, nb.offset(i)) {
                if labels[labels.linear(wc)] != labels[v] {
                    energy += mu * weights[i];
                }
            }
        }
    }
    energy
}
