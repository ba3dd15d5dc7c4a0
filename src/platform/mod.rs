//! Platform collaborators for the pipeline.
//!
//! Peripheral byte sources and link-event sources live here. The core only
//! sees them through [`ByteSource`](crate::framer::ByteSource) and
//! [`LinkState`](crate::link::LinkState).

#[cfg(target_os = "espidf")]
pub mod esp;

#[cfg(not(target_os = "espidf"))]
pub mod host;
