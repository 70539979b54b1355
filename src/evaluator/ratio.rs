use crate::error::{AppError, Result};
use crate::types::CollectionBalance;

/// Value signal for one listing: `balance / price`, rounded to 2 decimals.
/// A zero, negative or non-finite price has no ratio, and neither does a
/// price so small that the quotient overflows.
pub fn ratio(balance: CollectionBalance, price: f64) -> Result<f64> {
    if !price.is_finite() || price <= 0.0 {
        return Err(AppError::DivisionUndefined(price));
    }
    let r = round2(balance as f64 / price);
    if !r.is_finite() {
        return Err(AppError::DivisionUndefined(price));
    }
    Ok(r)
}

/// Inclusive: a ratio exactly at the threshold alerts.
pub fn should_alert(ratio: f64, threshold: f64) -> bool {
    ratio >= threshold
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underpriced_item_scenario() {
        let r = ratio(100_000, 4_000.0).unwrap();
        assert_eq!(r, 25.0);
        assert!(should_alert(r, 20.0));
    }

    #[test]
    fn fairly_priced_item_scenario() {
        let r = ratio(100_000, 6_000.0).unwrap();
        assert_eq!(r, 16.67);
        assert!(!should_alert(r, 20.0));
    }

    #[test]
    fn boundary_ratio_alerts() {
        let r = ratio(100_000, 5_000.0).unwrap();
        assert_eq!(r, 20.0);
        assert!(should_alert(r, 20.0));
        assert!(!should_alert(19.99, 20.0));
    }

    #[test]
    fn zero_balance_gives_zero_ratio() {
        assert_eq!(ratio(0, 12.5).unwrap(), 0.0);
        assert!(should_alert(0.0, 0.0));
    }

    #[test]
    fn zero_price_is_undefined() {
        assert!(matches!(ratio(100, 0.0), Err(AppError::DivisionUndefined(_))));
        assert!(matches!(ratio(100, -1.0), Err(AppError::DivisionUndefined(_))));
        assert!(matches!(ratio(100, f64::NAN), Err(AppError::DivisionUndefined(_))));
    }

    #[test]
    fn subnormal_price_overflows_to_undefined() {
        let price: f64 = "1e-320".parse().unwrap();
        assert!(price > 0.0);
        assert!(matches!(ratio(100_000, price), Err(AppError::DivisionUndefined(_))));
        // Zero balance stays defined at any positive price.
        assert_eq!(ratio(0, price).unwrap(), 0.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        for (balance, price) in [(1u64, 3.0), (2, 3.0), (12_345, 7.0), (99_999, 0.37)] {
            let expected = ((balance as f64 / price) * 100.0).round() / 100.0;
            assert_eq!(ratio(balance, price).unwrap(), expected);
        }
        assert_eq!(round2(1.004), 1.0);
        assert_eq!(round2(2.675_000_1), 2.68);
    }
}
