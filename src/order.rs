use crate::error::Error;

use filters::{Ear, FilterKey};

/// Ambisonic order `N` in `1..=7`.
///
/// An order-`N` sound field carries `(N + 1)²` channels in ACN order: channel
/// `l² + l + m` holds the spherical harmonic of degree `l` and index
/// `m ∈ [-l, l]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AmbisonicOrder(u8);

impl AmbisonicOrder {
    pub const MIN: AmbisonicOrder = AmbisonicOrder(filters::MIN_ORDER);
    pub const MAX: AmbisonicOrder = AmbisonicOrder(filters::MAX_ORDER);

    pub fn new(order: usize) -> Result<Self, Error> {
        match order {
            1..=7 => Ok(AmbisonicOrder(order as u8)),
            _ => Err(Error::UnsupportedOrder(order)),
        }
    }

    /// Every supported order, lowest first.
    pub fn all() -> impl Iterator<Item = AmbisonicOrder> {
        (Self::MIN.0..=Self::MAX.0).map(AmbisonicOrder)
    }

    pub fn get(&self) -> usize {
        self.0 as usize
    }

    pub fn num_channels(&self) -> usize {
        num_channels(self.get())
    }

    /// Key of the filter set holding this order's HRIRs for `ear`.
    pub fn filter_key(&self, ear: Ear) -> FilterKey {
        FilterKey::new(self.0, ear).expect("every ambisonic order has a filter set")
    }
}

impl TryFrom<usize> for AmbisonicOrder {
    type Error = Error;

    fn try_from(order: usize) -> Result<Self, Self::Error> {
        AmbisonicOrder::new(order)
    }
}

/// Number of channels of a full sphere sound field of order `order`.
pub fn num_channels(order: usize) -> usize {
    (order + 1) * (order + 1)
}

/// ACN channel index of degree `l`, index `m`.
pub fn acn(l: usize, m: isize) -> usize {
    debug_assert!(m.unsigned_abs() <= l);
    (l * l + l).wrapping_add_signed(m)
}

/// Degree and index of ACN channel `channel`.
pub fn degree_and_index(channel: usize) -> (usize, isize) {
    let l = (channel as f64).sqrt() as usize;
    // guard against sqrt rounding just below a perfect square
    let l = if (l + 1) * (l + 1) <= channel { l + 1 } else { l };

    (l, channel as isize - (l * l + l) as isize)
}
