//! API request handlers

mod events;
mod health;
mod units;

pub use events::*;
pub use health::*;
pub use units::*;
