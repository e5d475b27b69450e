mod event;
mod event_day;
mod scoring;
mod user;

pub use event::*;
pub use event_day::*;
pub use scoring::*;
pub use user::*;

pub use strum::IntoEnumIterator;
