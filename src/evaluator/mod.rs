pub mod ratio;

pub use ratio::{ratio, should_alert};
