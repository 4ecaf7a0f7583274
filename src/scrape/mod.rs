//! Rate-limited, bounded-concurrency scraping of the external schedule.

mod batch;
mod dedup;
mod period;
mod pool;
mod rate_limiter;

pub use batch::{BatchFetcher, ScrapedBatch, Unit, UnitError, UnitWarning, plan_units};
pub use dedup::DedupCache;
pub use period::YearMonth;
pub use pool::{Job, PoolConfig, PoolState, PoolStats, WorkerPool};
pub use rate_limiter::RateLimiter;
