use std::ops::{Add, BitAnd, Div, Not, Rem, Sub};

use cfg_if::cfg_if;
use num_traits::{One, Zero};

cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub(crate) const DEFAULT_ALIGNMENT: usize = 32;
    } else {
        pub(crate) const DEFAULT_ALIGNMENT: usize = 16;
    }
}

pub fn align_to<T>(value: T, alignment: T) -> T
where
    T: Copy + Add<Output = T> + Sub<Output = T> + BitAnd<Output = T> + Not<Output = T> + One,
{
    (value + alignment - T::one()) & !(alignment - T::one())
}

pub fn div_ceil<T>(value: T, divisor: T) -> T
where
    T: Copy + Add<Output = T> + Div<Output = T> + Rem<Output = T> + PartialEq + One + Zero,
{
    let quotient = value / divisor;
    if value % divisor == T::zero() {
        quotient
    } else {
        quotient + T::one()
    }
}
