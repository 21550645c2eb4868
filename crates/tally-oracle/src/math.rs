//! Fixed-point helpers shared by every bound in the oracle.

use tally_types::{Price, BPS_DENOMINATOR};

/// Deviation of `value` from `reference` in basis points.
///
/// `|value - reference| * 10_000 / reference`, floored. The multiplication
/// saturates, so astronomically large gaps report `u128::MAX` rather than
/// wrapping. A zero `reference` yields `0` for a zero `value` and `u128::MAX`
/// otherwise.
pub fn deviation_bps(value: Price, reference: Price) -> u128 {
    let diff = value.abs_diff(reference);
    if reference == 0 {
        return if diff == 0 { 0 } else { u128::MAX };
    }
    diff.saturating_mul(u128::from(BPS_DENOMINATOR)) / reference
}

/// Median of `prices`, sorting the slice in place.
///
/// Odd counts take the middle element; even counts take the floor of the
/// mean of the two middle elements. Returns `None` for an empty slice.
pub fn median(prices: &mut [Price]) -> Option<Price> {
    if prices.is_empty() {
        return None;
    }
    prices.sort_unstable();

    let mid = prices.len() / 2;
    if prices.len() % 2 == 1 {
        return Some(prices[mid]);
    }

    let (a, b) = (prices[mid - 1], prices[mid]);
    // floor((a + b) / 2) without overflowing
    Some(a / 2 + b / 2 + (a % 2 + b % 2) / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_exact_ten_percent() {
        assert_eq!(deviation_bps(1100, 1000), 1000);
        assert_eq!(deviation_bps(900, 1000), 1000);
    }

    #[test]
    fn test_deviation_floors() {
        // 1101 vs 1000 = 10.01% -> 1001 bps
        assert_eq!(deviation_bps(1101, 1000), 1001);
        // 1 vs 3 = 66.66% -> 6666 bps
        assert_eq!(deviation_bps(1, 3), 6666);
    }

    #[test]
    fn test_deviation_zero_reference() {
        assert_eq!(deviation_bps(0, 0), 0);
        assert_eq!(deviation_bps(5, 0), u128::MAX);
    }

    #[test]
    fn test_deviation_saturates() {
        assert_eq!(deviation_bps(u128::MAX, 1), u128::MAX);
    }

    #[test]
    fn test_median_odd() {
        let mut prices = vec![950, 1050, 1000, 1000, 1050];
        assert_eq!(median(&mut prices), Some(1000));
        assert_eq!(prices, vec![950, 1000, 1000, 1050, 1050]);
    }

    #[test]
    fn test_median_even_floor_average() {
        let mut prices = vec![950, 1100, 1000, 1050, 1000, 1050];
        assert_eq!(median(&mut prices), Some(1025));

        let mut odd_sum = vec![1, 2];
        assert_eq!(median(&mut odd_sum), Some(1));
    }

    #[test]
    fn test_median_large_values() {
        let mut prices = vec![u128::MAX, u128::MAX];
        assert_eq!(median(&mut prices), Some(u128::MAX));

        let mut prices = vec![u128::MAX, u128::MAX - 1];
        assert_eq!(median(&mut prices), Some(u128::MAX - 1));
    }

    #[test]
    fn test_median_empty() {
        assert_eq!(median(&mut []), None);
    }
}
