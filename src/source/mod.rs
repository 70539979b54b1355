//! Listing Source: reads the collection balance and the raw auction listings
//! from the rendered collection page.

pub mod extract;
pub mod webdriver;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CollectionBalance, RawListing};

pub use webdriver::WebDriverSource;

/// A rendering session over one collection page.
///
/// `open` is called once per run. `read_balance` and `read_items` are called
/// once per cycle, in that order. `close` must be called on every exit path.
#[async_trait]
pub trait ListingSource: Send {
    /// Navigate to the (already filtered) collection endpoint and wait for the
    /// page to render. Fails with `StartupWaitTimeout` if it never does.
    async fn open(&mut self, endpoint: &str) -> Result<()>;

    /// Wait for the balance indicator and read it. Fails with
    /// `StartupWaitTimeout` if the indicator never appears.
    async fn read_balance(&mut self) -> Result<CollectionBalance>;

    /// Wait for listing elements and read them in rendering order.
    /// Returns an empty vec when none appear within the wait window.
    async fn read_items(&mut self) -> Result<Vec<RawListing>>;

    async fn close(&mut self) -> Result<()>;
}
