//! Common test utilities and fixtures.

pub mod fixtures;
pub mod index;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use index::*;
