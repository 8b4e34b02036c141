pub mod counters;
pub mod sampler;

pub use counters::{CounterTotals, Rates, ThroughputCounters};
pub use sampler::{MetricsReport, MetricsSampler};
