//! Host environment abstractions for the modbus_dev driver
//!
//! This package models the part of the kernel a character-device driver talks to:
//! - Device-number allocation (`alloc_chrdev_region` / `unregister_chrdev_region`)
//! - Dispatch table registration (`cdev_add` / `cdev_del`)
//! - Device classes and device nodes (`class_create` / `device_create`)
//! - Open file objects with a per-file private data slot
//!
//! The [`Host`] trait is the seam the driver is written against. [`sim::SimHost`]
//! is a complete in-memory implementation with fault injection and an event
//! journal, used by the CLI and by the test suites.

pub mod dev_t;
pub mod errno;
pub mod file;
pub mod host;
pub mod sim;

pub use dev_t::DevT;
pub use errno::Errno;
pub use file::{Fd, FileOperations, Inode, OpenFile};
pub use host::{CdevId, ClassId, Host, NodeId};
pub use sim::{FailPoint, HeldResources, HostEvent, SimHost, SimHostConfig};
