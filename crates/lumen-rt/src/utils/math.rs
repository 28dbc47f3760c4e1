use num_traits::PrimInt;

pub fn div_up<T: PrimInt>(a: T, b: T) -> T {
    (a + b - T::one()) / b
}

/// Rounds `value` up to the next multiple of `alignment`. `alignment` need not be a power of two.
pub fn align_up<T: PrimInt>(value: T, alignment: T) -> T {
    div_up(value, alignment) * alignment
}
