pub mod health;
pub mod latency;
pub mod routes;

pub use health::MonitorStats;
pub use latency::CycleLatency;
