//! Device abstraction layer
//!
//! Provides the device trait consumed by the frame graph and the passes, the
//! types shared with implementations, and a dummy device for tests.

pub mod dummy;
pub mod traits;
pub mod types;

pub use dummy::{DeviceCommand, DeviceStats, DummyDevice, DummyMemory, KernelInvocation, SoftwareKernel};
pub use traits::*;
pub use types::*;
