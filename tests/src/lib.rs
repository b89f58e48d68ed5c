//! # cl-memory Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Lease and binding hot paths (criterion)
//! └── src/integration/
//!     ├── scenarios.rs  # End-to-end dispatch scenarios
//!     ├── leases.rs     # Lease protocol across strategies and queues
//!     ├── properties.rs # Randomised operation sequences (proptest)
//!     └── service.rs    # Async MemoryApi over a selected backend
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p cl-tests
//!
//! # By category
//! cargo test -p cl-tests integration::scenarios::
//!
//! # Benchmarks
//! cargo bench -p cl-tests
//! ```

pub mod fixtures;
pub mod integration;
