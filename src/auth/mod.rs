pub mod apikey;
pub mod context;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod rate_limit;

pub use context::{Principal, RequestContext};
pub use rate_limit::{RateLimiter, RateLimiters};
