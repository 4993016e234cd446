//! Iteration over the bits of binding masks.

/// Returns an iterator over the indices of the set bits of `mask`, lowest first.
#[inline]
pub(crate) fn iter_bits(mut mask: u32) -> impl Iterator<Item = u32> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }

        let bit = mask.trailing_zeros();
        mask &= mask - 1;

        Some(bit)
    })
}

/// Returns an iterator over the runs of consecutive set bits of `mask`, as `(first, count)`.
#[inline]
pub(crate) fn iter_bit_ranges(mut mask: u32) -> impl Iterator<Item = (u32, u32)> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }

        let first = mask.trailing_zeros();
        let count = (mask >> first).trailing_ones();
        mask &= !(u32::MAX.checked_shl(count).map_or(u32::MAX, |m| !m) << first);

        Some((first, count))
    })
}

#[cfg(test)]
mod tests {
    use super::{iter_bit_ranges, iter_bits};

    #[test]
    fn bits() {
        assert_eq!(iter_bits(0).count(), 0);
        assert_eq!(iter_bits(0b1010_0001).collect::<Vec<_>>(), [0, 5, 7]);
        assert_eq!(iter_bits(1 << 31).collect::<Vec<_>>(), [31]);
    }

    #[test]
    fn ranges() {
        assert_eq!(
            iter_bit_ranges(0b0111_0011).collect::<Vec<_>>(),
            [(0, 2), (4, 3)],
        );
        assert_eq!(iter_bit_ranges(u32::MAX).collect::<Vec<_>>(), [(0, 32)]);
        assert_eq!(iter_bit_ranges(0).count(), 0);
    }
}
