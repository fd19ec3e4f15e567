//! Foundation utilities shared by every layer of the viewer

pub mod logging;
pub mod math;
