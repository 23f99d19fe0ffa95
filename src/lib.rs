pub mod error;
pub mod event;
pub mod fetch;
pub mod loader;
pub mod plot;
pub mod report;
pub mod resample;
pub mod snapshot;
pub mod users;
