use crate::error::{AppError, ItemExtractionError, Result};
use crate::types::{CollectionBalance, RawListing};

/// A listing with a usable price and link, before ratio evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedListing {
    pub price: f64,
    pub link: String,
}

/// Turn a raw page record into a priced listing.
/// The converted price is always strictly positive on success.
pub fn extract_item(
    raw: &RawListing,
    conversion_rate: f64,
) -> std::result::Result<PricedListing, ItemExtractionError> {
    let text = raw.price_text.as_deref().ok_or(ItemExtractionError::MissingPrice)?;
    let listed = parse_price(text)?;
    let price = listed * conversion_rate;
    if !price.is_finite() || price <= 0.0 {
        return Err(ItemExtractionError::NonPositivePrice(price));
    }

    let link = raw
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or(ItemExtractionError::MissingLink)?;

    Ok(PricedListing { price, link: link.to_string() })
}

/// Parse a displayed price such as `"1,250.5"`.
pub fn parse_price(text: &str) -> std::result::Result<f64, ItemExtractionError> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ItemExtractionError::MalformedPrice(text.to_string())),
    }
}

/// Parse the balance indicator text such as `"100,000"`.
pub fn parse_balance(text: &str) -> Result<CollectionBalance> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    cleaned
        .parse::<CollectionBalance>()
        .map_err(|_| AppError::BalanceUnreadable(text.to_string()))
}
