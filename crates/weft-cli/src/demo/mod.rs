//! Demo workflow modelled on ordering printed photos.

mod order;
mod time_sliced;

pub use order::{DemoSettings, OrderWorkflow};
pub use time_sliced::TimeSlicedWork;
