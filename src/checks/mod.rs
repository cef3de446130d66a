//! Read-only checks.

mod disk;
mod repositories;
mod services;

pub use disk::AvailableSpace;
pub use repositories::{NonRedHatRepository, ValidateRepositories};
pub use services::ServicesRunning;
