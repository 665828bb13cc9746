//! Neighbourhood offset systems and boundary metrics.
//!
//! Components
//! - `Neighbourhood`: ordered displacement vectors closed under negation,
//!   paired so the opposite of direction `i` sits at `i ^ 1`.
//! - `metric`: Cauchy-Crofton edge weight tables (isotropic, anisotropic
//!   spacing, general Riemannian transform).
//! - `sphere`: the hyperspherical Voronoi partition behind the weights.
//!
//! Offset systems are named by symbol: `N4`/`N8`/`N16`/`N32` in 2-D and
//! `N6`/`N18`/`N26`/`N98` in 3-D. Construction is deterministic so that
//! direction indices are stable across runs; solvers and drivers rely on the
//! pairing invariant when they flip an edge to its reverse.

pub mod metric;
pub mod sphere;

use crate::error::Error;

/// Ordered set of integer grid displacements, closed under negation.
///
/// Directions are stored as (d, -d) pairs at even/odd index positions, so
/// [`Neighbourhood::opposite`] is a single XOR.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Neighbourhood<const N: usize> {
    offsets: Vec<[isize; N]>,
}

impl<const N: usize> Neighbourhood<N> {
    /// Builds the offset system named by `symbol` ("N4", "N26", ...).
    ///
    /// The symbol must match the dimensionality `N`; anything else is
    /// rejected with [`Error::UnsupportedNeighbourhood`].
    pub fn from_symbol(symbol: &str) -> Result<Self, Error> {
        let size: Option<usize> = symbol.strip_prefix('N').and_then(|s| s.parse().ok());
        let reps: Option<Vec<[isize; N]>> = match (N, size) {
            (2, Some(k)) => representatives_2d(k)
                .map(|v| v.into_iter().map(|r| std::array::from_fn(|a| r[a])).collect()),
            (3, Some(k)) => representatives_3d(k)
                .map(|v| v.into_iter().map(|r| std::array::from_fn(|a| r[a])).collect()),
            _ => None,
        };
        match reps {
            Some(reps) => {
                let mut offsets = Vec::with_capacity(reps.len() * 2);
                for d in reps {
                    offsets.push(d);
                    offsets.push(negate(d));
                }
                Ok(Self { offsets })
            }
            None => Err(Error::UnsupportedNeighbourhood(symbol.to_string())),
        }
    }

    /// Wraps a custom offset list. The list must consist of nonzero (d, -d)
    /// pairs at even/odd positions.
    pub fn from_offsets(offsets: Vec<[isize; N]>) -> Result<Self, Error> {
        let nb = Self { offsets };
        if !nb.is_paired() {
            return Err(Error::InvalidArgument(
                "neighbourhood offsets must form nonzero (d, -d) pairs".to_string(),
            ));
        }
        Ok(nb)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    #[inline]
    pub fn offset(&self, i: usize) -> [isize; N] {
        self.offsets[i]
    }

    #[inline]
    pub fn offsets(&self) -> &[[isize; N]] {
        &self.offsets
    }

    /// Index of the direction opposite to `i`.
    #[inline]
    pub fn opposite(&self, i: usize) -> usize {
        i ^ 1
    }

    /// Checks the pairing invariant: even count, nonzero vectors, and
    /// `offset(i ^ 1) == -offset(i)` for every index.
    pub fn is_paired(&self) -> bool {
        if self.offsets.is_empty() || self.offsets.len() % 2 != 0 {
            return false;
        }
        self.offsets.iter().enumerate().all(|(i, &d)| {
            d.iter().any(|&x| x != 0) && self.offsets[i ^ 1] == negate(d)
        })
    }
}

#[inline]
fn negate<const N: usize>(d: [isize; N]) -> [isize; N] {
    std::array::from_fn(|a| -d[a])
}

/// Canonical representatives (first nonzero component positive) of the 2-D
/// systems; each expands to a (d, -d) pair.
fn representatives_2d(size: usize) -> Option<Vec<[isize; 2]>> {
    const UNIT: [[isize; 2]; 2] = [[0, 1], [1, 0]];
    const DIAG: [[isize; 2]; 2] = [[1, 1], [1, -1]];
    const KNIGHT: [[isize; 2]; 4] = [[1, 2], [2, 1], [1, -2], [2, -1]];
    const LONG: [[isize; 2]; 8] = [
        [1, 3],
        [3, 1],
        [1, -3],
        [3, -1],
        [2, 3],
        [3, 2],
        [2, -3],
        [3, -2],
    ];

    let mut reps = Vec::new();
    match size {
        4 | 8 | 16 | 32 => reps.extend_from_slice(&UNIT),
        _ => return None,
    }
    if size >= 8 {
        reps.extend_from_slice(&DIAG);
    }
    if size >= 16 {
        reps.extend_from_slice(&KNIGHT);
    }
    if size >= 32 {
        reps.extend_from_slice(&LONG);
    }
    Some(reps)
}

/// Canonical representatives of the 3-D systems. N98 is the 5x5x5 box with
/// collinear duplicates removed (a vector whose components are all even
/// doubles a shorter one).
fn representatives_3d(size: usize) -> Option<Vec<[isize; 3]>> {
    const UNIT: [[isize; 3]; 3] = [[0, 0, 1], [0, 1, 0], [1, 0, 0]];
    const EDGE: [[isize; 3]; 6] = [
        [0, 1, 1],
        [0, 1, -1],
        [1, 0, 1],
        [1, 0, -1],
        [1, 1, 0],
        [1, -1, 0],
    ];
    const CORNER: [[isize; 3]; 4] = [[1, 1, 1], [1, 1, -1], [1, -1, 1], [1, -1, -1]];

    match size {
        6 => Some(UNIT.to_vec()),
        18 => {
            let mut reps = UNIT.to_vec();
            reps.extend_from_slice(&EDGE);
            Some(reps)
        }
        26 => {
            let mut reps = UNIT.to_vec();
            reps.extend_from_slice(&EDGE);
            reps.extend_from_slice(&CORNER);
            Some(reps)
        }
        98 => {
            let mut reps = Vec::with_capacity(49);
            for a in -2isize..=2 {
                for b in -2isize..=2 {
                    for c in -2isize..=2 {
                        let v = [a, b, c];
                        if v == [0, 0, 0] {
                            continue;
                        }
                        if a % 2 == 0 && b % 2 == 0 && c % 2 == 0 {
                            continue;
                        }
                        if !is_canonical(v) {
                            continue;
                        }
                        reps.push(v);
                    }
                }
            }
            Some(reps)
        }
        _ => None,
    }
}

#[inline]
fn is_canonical(v: [isize; 3]) -> bool {
    for &x in &v {
        if x > 0 {
            return true;
        }
        if x < 0 {
            return false;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_system<const N: usize>(symbol: &str, expected: usize) {
        let nb = Neighbourhood::<N>::from_symbol(symbol).expect(symbol);
        assert_eq!(nb.len(), expected, "{symbol}");
        assert!(nb.is_paired(), "{symbol} must pair d with -d at i ^ 1");
        // Closure under negation with no duplicates.
        for i in 0..nb.len() {
            for j in 0..nb.len() {
                if i != j {
                    assert_ne!(nb.offset(i), nb.offset(j), "{symbol} duplicate offset");
                }
            }
        }
    }

    #[test]
    fn two_dimensional_systems() {
        check_system::<2>("N4", 4);
        check_system::<2>("N8", 8);
        check_system::<2>("N16", 16);
        check_system::<2>("N32", 32);
    }

    #[test]
    fn three_dimensional_systems() {
        check_system::<3>("N6", 6);
        check_system::<3>("N18", 18);
        check_system::<3>("N26", 26);
        check_system::<3>("N98", 98);
    }

    #[test]
    fn n98_has_no_collinear_duplicates() {
        let nb = Neighbourhood::<3>::from_symbol("N98").unwrap();
        for &d in nb.offsets() {
            let doubled = [d[0] * 2, d[1] * 2, d[2] * 2];
            assert!(
                !nb.offsets().contains(&doubled),
                "{d:?} and {doubled:?} are collinear"
            );
        }
    }

    #[test]
    fn unknown_symbols_are_rejected() {
        for sym in ["N5", "N0", "", "N", "foo", "n4"] {
            let err = Neighbourhood::<2>::from_symbol(sym).unwrap_err();
            assert!(err.to_string().contains("Unsupported neighbourhood"));
        }
        // Valid size in the wrong dimensionality.
        assert!(Neighbourhood::<3>::from_symbol("N4").is_err());
        assert!(Neighbourhood::<2>::from_symbol("N26").is_err());
    }

    #[test]
    fn custom_offsets_must_pair() {
        assert!(Neighbourhood::from_offsets(vec![[0isize, 1], [0, -1]]).is_ok());
        assert!(Neighbourhood::from_offsets(vec![[0isize, 1], [1, 0]]).is_err());
        assert!(Neighbourhood::from_offsets(vec![[0isize, 0], [0, 0]]).is_err());
        assert!(Neighbourhood::<2>::from_offsets(vec![]).is_err());
    }
}
