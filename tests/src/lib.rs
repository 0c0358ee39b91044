//! # Tower Messaging Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Recording sink, message types, messenger builders
//! └── integration/      # Behavioural properties of the messenger
//!     ├── ordering.rs
//!     ├── lifecycle.rs
//!     ├── dispatch.rs
//!     ├── concurrency.rs
//!     ├── state_bound.rs
//!     └── scopes.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p tower-tests
//!
//! # By category
//! cargo test -p tower-tests integration::concurrency::
//!
//! # Benchmarks
//! cargo bench -p tower-tests
//! ```

pub mod fixtures;
