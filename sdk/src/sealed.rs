//! Private sealed trait module.
//!
//! Traits that list [`Sealed`] as a supertrait can only be implemented inside
//! this crate. The [`Logger`](crate::context::Logger) trait is sealed;
//! custom loggers are built with [`custom_logger`](crate::context::custom_logger)
//! and [`simple_custom_logger`](crate::context::simple_custom_logger).

/// Marker supertrait for sealed traits.
pub(crate) trait Sealed {}
