use std::sync::Arc;

use serde::Serialize;

use crate::{DevT, Errno, FileOperations};

/// Handle to a registered dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CdevId(pub u64);

/// Handle to a device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClassId(pub u64);

/// Handle to a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub u64);

/// The registration surface a character-device driver uses.
///
/// Acquisition calls return a handle or an errno. Release calls never fail;
/// releasing something the host does not know about is logged and ignored.
pub trait Host: Send + Sync {
    /// Allocates a free major and reserves `count` minors starting at `first_minor`.
    fn alloc_chrdev_region(&self, first_minor: u32, count: u32, name: &str) -> Result<DevT, Errno>;

    fn unregister_chrdev_region(&self, first: DevT, count: u32);

    /// Makes `fops` reachable for opens of the `count` device numbers starting at `first`.
    fn cdev_add(&self, first: DevT, count: u32, fops: Arc<dyn FileOperations>) -> Result<CdevId, Errno>;

    fn cdev_del(&self, cdev: CdevId);

    fn class_create(&self, name: &str) -> Result<ClassId, Errno>;

    fn class_destroy(&self, class: ClassId);

    /// Creates the user-visible node `name` for `devt` under `class`.
    fn device_create(&self, class: ClassId, devt: DevT, name: &str) -> Result<NodeId, Errno>;

    fn device_destroy(&self, class: ClassId, devt: DevT);
}
