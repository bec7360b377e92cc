//! Bit-vector dependency words for sparsity propagation.
//!
//! Each nonzero carries one `u64`; bit `k` set means "depends on seed
//! direction `k`". One sweep therefore propagates 64 directions at once.

/// Dependency word attached to one nonzero.
pub type Bvec = u64;

/// Number of directions carried by a [`Bvec`].
pub const BVEC_WIDTH: usize = Bvec::BITS as usize;

/// OR `src` into `dst` elementwise.
#[inline]
pub fn or_into(dst: &mut [Bvec], src: &[Bvec]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d |= s;
    }
}

/// Seed words for a block of directions: entry `offset + k` gets bit `k`
/// for `k < BVEC_WIDTH`, everything else is zero.
pub fn unit_seeds(len: usize, offset: usize) -> Vec<Bvec> {
    (0..len)
        .map(|j| {
            if j >= offset && j - offset < BVEC_WIDTH {
                1 << (j - offset)
            } else {
                0
            }
        })
        .collect()
}

/// Indices of the set bits of `word`, lowest first.
pub fn set_bits(word: Bvec) -> impl Iterator<Item = usize> {
    let mut w = word;
    std::iter::from_fn(move || {
        if w == 0 {
            None
        } else {
            let k = w.trailing_zeros() as usize;
            w &= w - 1;
            Some(k)
        }
    })
}
