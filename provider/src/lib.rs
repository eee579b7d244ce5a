//! Cluster service SDK abstraction: a thin REST facade
//! (`HttpClusterServiceClient`) standing in for the managed cluster
//! service's own SDK, plus an in-memory `FakeClusterServiceClient` used by
//! every `scalectl-core` test. Retry uses `backoff`, the same
//! exponential-retry idiom the corpus reaches for around flaky HTTP calls.

pub mod fake;
pub mod http;

pub use fake::FakeClusterServiceClient;
pub use http::HttpClusterServiceClient;
