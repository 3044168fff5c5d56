pub mod caption;
pub mod catalog;
pub mod clock;
pub mod composite;
pub mod config;
pub mod grid;
pub mod output;
pub mod publish;
pub mod quality;
pub mod retry;
pub mod scheduler;
pub mod selection;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
