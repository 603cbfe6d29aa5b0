//! Acquisition: HTTP transport, FlareSolverr, and anti-bot detection.
//!
//! Every network read in a run goes through a [`source::PageSource`], so a
//! site can switch between plain HTTP and FlareSolverr without the walker or
//! the extractors noticing.

pub mod backoff;
pub mod captcha;
pub mod flaresolverr;
pub mod http_client;
pub mod source;
