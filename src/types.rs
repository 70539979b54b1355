use serde::Serialize;

/// Account-level balance read from the collection page once per cycle.
pub type CollectionBalance = u64;

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// One listing element as read from the page, before any parsing.
/// Either field is `None` when the corresponding sub-element was missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawListing {
    pub price_text: Option<String>,
    pub link: Option<String>,
}

/// One auction entry that survived extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingItem {
    /// Price in the base currency (listed price times the conversion rate).
    pub price: f64,
    pub link: String,
    pub ratio: f64,
}

/// Every item observed in one cycle, in page rendering order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleSnapshot {
    pub balance: CollectionBalance,
    pub items: Vec<ListingItem>,
}

impl CycleSnapshot {
    pub fn new(balance: CollectionBalance) -> Self {
        Self { balance, items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub price: f64,
    pub balance: CollectionBalance,
    pub ratio: f64,
    pub threshold: f64,
    pub link: String,
}

impl Alert {
    pub fn for_item(item: &ListingItem, balance: CollectionBalance, threshold: f64) -> Self {
        Self {
            price: item.price,
            balance,
            ratio: item.ratio,
            threshold,
            link: item.link.clone(),
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Auction ratio alert\nListing Price: {:.2}\nAccount Value: {}\nRatio: {:.2} (threshold {})\nLink: {}",
            self.price, self.balance, self.ratio, self.threshold, self.link,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_message_carries_every_field() {
        let item = ListingItem {
            price: 4000.0,
            link: "https://opensea.io/assets/1".to_string(),
            ratio: 25.0,
        };
        let text = Alert::for_item(&item, 100_000, 20.0).to_string();
        assert!(text.contains("Listing Price: 4000.00"));
        assert!(text.contains("Account Value: 100000"));
        assert!(text.contains("Ratio: 25.00 (threshold 20)"));
        assert!(text.contains("Link: https://opensea.io/assets/1"));
    }
}
