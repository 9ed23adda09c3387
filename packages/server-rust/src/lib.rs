//! Tern server: resource services behind a uniform six-method contract.
//!
//! Services implement [`service::ServiceCore`], are registered by location
//! on an [`Application`], and are reached through a [`service::ServiceHandle`]
//! or the layered call pipeline.

pub mod app;
pub mod logging;
pub mod memory;
pub mod service;

pub use app::{Application, Route};
pub use memory::MemoryService;
pub use service::{ServiceCore, ServiceHandle, ServiceOptions};
