// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Raster cache keys.

use core::hash::{Hash, Hasher};

use kurbo::Affine;

const HASH_COMBINE_SEED: u64 = 0x0066_ccff;

/// Mixes `rhs` into `lhs` the way `boost::hash_combine` does.
fn hash_combine(lhs: u64, rhs: u64) -> u64 {
    lhs ^ rhs
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(lhs << 6)
        .wrapping_add(lhs >> 2)
}

/// Identity of cached content.
///
/// Two ids are equal when their hash values are equal.
#[derive(Clone, Copy, Debug)]
pub enum RasterCacheLayerId {
    /// A picture, by unique id.
    Picture(u64),
    /// A container, by the combined hash of its children.
    Container(u64),
}

impl RasterCacheLayerId {
    /// Id of a picture.
    #[must_use]
    pub fn picture(unique_id: u64) -> Self {
        Self::Picture(unique_id)
    }

    /// Id of a container made of `children`.
    #[must_use]
    pub fn container(children: &[Self]) -> Self {
        let hash = children
            .iter()
            .fold(HASH_COMBINE_SEED, |acc, child| hash_combine(acc, child.hash_value()));
        Self::Container(hash)
    }

    /// Hash value; for pictures this is the unique id itself.
    #[must_use]
    pub fn hash_value(&self) -> u64 {
        match self {
            Self::Picture(id) | Self::Container(id) => *id,
        }
    }

    /// Unique id of the picture, if this id names one.
    #[must_use]
    pub fn picture_unique_id(&self) -> Option<u64> {
        match self {
            Self::Picture(id) => Some(*id),
            Self::Container(_) => None,
        }
    }
}

impl PartialEq for RasterCacheLayerId {
    fn eq(&self, other: &Self) -> bool {
        self.hash_value() == other.hash_value()
    }
}

impl Eq for RasterCacheLayerId {}

impl Hash for RasterCacheLayerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_value());
    }
}

/// Key of a raster cache entry: content id plus drawing matrix.
///
/// The translation part of the matrix is dropped, so the same content drawn
/// at different positions shares an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterCacheKey {
    layer_id: RasterCacheLayerId,
    matrix_bits: [u64; 4],
}

impl RasterCacheKey {
    /// Creates a key for `layer_id` drawn under `matrix`.
    #[must_use]
    pub fn new(layer_id: RasterCacheLayerId, matrix: Affine) -> Self {
        let [a, b, c, d, _, _] = matrix.as_coeffs();
        // Normalize -0.0 so it hashes like 0.0.
        let bits = |v: f64| if v == 0.0 { 0 } else { v.to_bits() };
        Self {
            layer_id,
            matrix_bits: [bits(a), bits(b), bits(c), bits(d)],
        }
    }

    /// Content id.
    #[must_use]
    pub fn layer_id(&self) -> RasterCacheLayerId {
        self.layer_id
    }

    /// The matrix with translation removed.
    #[must_use]
    pub fn matrix(&self) -> Affine {
        let [a, b, c, d] = self.matrix_bits.map(f64::from_bits);
        Affine::new([a, b, c, d, 0.0, 0.0])
    }
}
