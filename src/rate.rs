//! Rate Calculator

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// `numerator / denominator * 100` rounded to `decimals`; exactly 0 when the
/// denominator is 0.
pub fn percentage(numerator: f64, denominator: f64, decimals: u32) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let rate = round_to(numerator / denominator * 100.0, decimals);
    if rate.is_finite() {
        rate
    } else {
        0.0
    }
}

pub fn percentage_of(numerator: u64, denominator: u64, decimals: u32) -> f64 {
    percentage(numerator as f64, denominator as f64, decimals)
}

/// Sum of `(started + ended) / 2` over every record of the period. This is a
/// plain sum, not a time-weighted average.
pub fn average_workforce<I>(movements: I) -> f64
where
    I: IntoIterator<Item = (u64, u64)>,
{
    movements
        .into_iter()
        .map(|(started, ended)| (started + ended) as f64 / 2.0)
        .sum()
}

pub fn turnover_rate(finished: u64, average_workforce: f64) -> f64 {
    percentage(finished as f64, average_workforce, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_denominator() {
        assert_eq!(percentage(5.0, 0.0, 2), 0.0);
        assert_eq!(percentage_of(0, 0, 0), 0.0);
        assert_eq!(turnover_rate(3, 0.0), 0.0);
    }

    #[test]
    fn test_precision() {
        assert_eq!(percentage_of(1, 3, 0), 33.0);
        assert_eq!(percentage_of(1, 3, 1), 33.3);
        assert_eq!(percentage_of(2, 3, 2), 66.67);
        assert_eq!(round_to(2.5, 0), 3.0);
    }

    #[test]
    fn test_turnover_example() {
        let average = average_workforce([(10, 8)]);
        assert_eq!(average, 9.0);
        assert_eq!(turnover_rate(2, average), 22.22);
    }

    #[test]
    fn test_average_sums_group_records() {
        assert_eq!(average_workforce([(10, 8), (4, 6)]), 14.0);
        assert_eq!(average_workforce(Vec::new()), 0.0);
    }
}
