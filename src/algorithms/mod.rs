//! Ranging and positioning algorithms

pub mod path_loss;
pub mod multilateration;

pub use path_loss::PathLossModel;
pub use multilateration::BlockSolver;
