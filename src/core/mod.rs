//! Core data types and I/O operations.

pub mod frame;
pub mod loaders;
pub mod writers;

pub use frame::{Frame, Point, RotationClock};
pub use loaders::{FrameSource, LoaderError, MemorySource, ReplaySource};
pub use writers::{write_history_csv, write_ply, MeasurementWriter, WriteError};
