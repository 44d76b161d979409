pub mod events;
pub mod manager;
pub mod rate_limiter;
pub mod types;


pub use events::{EVENT_CHANNEL_CAPACITY, RegistryEvent};
pub use manager::ProviderRegistry;
pub use rate_limiter::{SlidingWindowLimiter, WindowUsage};
pub use types::*;
