pub mod connctx;
pub mod docsession;
pub mod persist;
pub mod ratelimit;
pub mod registry;
pub mod timer;
pub mod transport;
