//! Bundled step implementations.
//!
//! The engine treats these exactly like external plugins: they are
//! reached only through the [`Step`](crate::step::Step) trait and the
//! registry. They cover the roles every usable graph needs: a source,
//! an identity/entry step, a validating transform, and a collecting
//! sink. They double as reference implementations of the contract.

mod collector;
mod generator;
mod passthrough;
mod validator;

pub use collector::{Collector, CollectorHandle};
pub use generator::RowGenerator;
pub use passthrough::Passthrough;
pub use validator::FieldValidator;
