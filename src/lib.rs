//! modbus_dev: character device layer for a Modbus RTU driver
//!
//! This crate registers a single character device node with a host environment
//! and routes user-space system calls on it to per-open-instance state:
//! - [`lifecycle`]: ordered acquisition and mirror-order release of the device
//!   identity, dispatch table, class and node
//! - [`instance`]: allocation and typed attachment of per-descriptor state
//! - [`dispatch`]: the dispatch table handed to the host
//! - [`protocol`]: the seam where Modbus transaction handling plugs in
//!
//! The host side lives in the `modbus_dev_host` package, which also provides
//! the simulated host used by the `modbus_dev` binary and the tests.

#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod protocol;
pub mod session;

pub use config::DriverConfig;
pub use dispatch::ModbusFileOps;
pub use error::DriverError;
pub use instance::{InstanceId, InstanceManager, InstanceState, IoCounters};
pub use lifecycle::{DeviceIdentity, ModbusDevice, ModbusDeviceBuilder};
pub use protocol::{ProtocolHandler, UnboundProtocol};
