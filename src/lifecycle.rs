//! # Device Lifecycle Controller
//!
//! Loads the driver into a [`Host`] and unloads it again.
//!
//! ## Acquisition order
//!
//! 1. Device identity: one minor from a dynamically allocated major
//! 2. Dispatch table registration for that identity
//! 3. Device class
//! 4. Device node `<device_name><minor>`
//!
//! Each resource is held by a guard that releases it when dropped. If a step
//! fails, the guards acquired so far go out of scope in reverse order, so a
//! failed load leaves nothing behind. The node is created last, so user space
//! can never open it before the dispatch table is in place.
//!
//! ## Release order
//!
//! [`ModbusDevice::shutdown`] releases node, class, dispatch registration and
//! identity, the mirror of acquisition. Every slot is optional, so calling it
//! again (or dropping the device afterwards) does nothing.

use modbus_dev_host::{CdevId, ClassId, DevT, FileOperations, Host};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    config::{DriverConfig, MINOR_COUNT},
    dispatch::ModbusFileOps,
    error::DriverError,
    protocol::{ProtocolHandler, UnboundProtocol},
};

/// The device numbers held by a loaded driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub first: DevT,
    pub count: u32,
}

impl DeviceIdentity {
    pub fn major(&self) -> u32 {
        self.first.major()
    }

    pub fn minor(&self) -> u32 {
        self.first.minor()
    }
}

struct ChrdevRegion {
    host: Arc<dyn Host>,
    identity: DeviceIdentity,
}

impl ChrdevRegion {
    fn alloc(host: &Arc<dyn Host>, config: &DriverConfig) -> Result<Self, DriverError> {
        let first = host
            .alloc_chrdev_region(config.first_minor, MINOR_COUNT, &config.device_name)
            .map_err(|errno| {
                log::error!("Failed to allocate device region: {errno}");
                DriverError::IdentityExhausted { errno }
            })?;
        Ok(Self {
            host: host.clone(),
            identity: DeviceIdentity {
                first,
                count: MINOR_COUNT,
            },
        })
    }
}

impl Drop for ChrdevRegion {
    fn drop(&mut self) {
        log::debug!("Unregistering device region {}", self.identity.first);
        self.host
            .unregister_chrdev_region(self.identity.first, self.identity.count);
    }
}

struct CdevRegistration {
    host: Arc<dyn Host>,
    id: CdevId,
}

impl CdevRegistration {
    fn add(
        host: &Arc<dyn Host>,
        region: &ChrdevRegion,
        fops: Arc<dyn FileOperations>,
    ) -> Result<Self, DriverError> {
        let id = host
            .cdev_add(region.identity.first, region.identity.count, fops)
            .map_err(|errno| {
                log::error!("Unable to add cdev: {errno}");
                DriverError::DispatchRegistration { errno }
            })?;
        Ok(Self {
            host: host.clone(),
            id,
        })
    }
}

impl Drop for CdevRegistration {
    fn drop(&mut self) {
        log::debug!("Removing cdev {:?}", self.id);
        self.host.cdev_del(self.id);
    }
}

struct DeviceClass {
    host: Arc<dyn Host>,
    id: ClassId,
    name: String,
}

impl DeviceClass {
    fn create(host: &Arc<dyn Host>, name: &str) -> Result<Self, DriverError> {
        let id = host.class_create(name).map_err(|errno| {
            log::error!("Failed to register device class {name}: {errno}");
            DriverError::ClassCreation { errno }
        })?;
        Ok(Self {
            host: host.clone(),
            id,
            name: name.to_string(),
        })
    }
}

impl Drop for DeviceClass {
    fn drop(&mut self) {
        log::debug!("Destroying device class {}", self.name);
        self.host.class_destroy(self.id);
    }
}

struct DeviceNode {
    host: Arc<dyn Host>,
    class: ClassId,
    devt: DevT,
    name: String,
}

impl DeviceNode {
    fn create(host: &Arc<dyn Host>, class: &DeviceClass, devt: DevT, name: String) -> Result<Self, DriverError> {
        host.device_create(class.id, devt, &name).map_err(|errno| {
            log::error!("Failed to create the device {name}: {errno}");
            DriverError::NodeCreation { errno }
        })?;
        Ok(Self {
            host: host.clone(),
            class: class.id,
            devt,
            name,
        })
    }
}

impl Drop for DeviceNode {
    fn drop(&mut self) {
        log::debug!("Destroying device node {}", self.name);
        self.host.device_destroy(self.class, self.devt);
    }
}

/// Builder for loading the driver.
///
/// # Example
///
/// ```no_run
/// use modbus_dev::{ModbusDeviceBuilder, UnboundProtocol};
/// use modbus_dev_host::SimHost;
/// use std::sync::Arc;
///
/// let host = Arc::new(SimHost::new());
/// let mut device = ModbusDeviceBuilder::new()
///     .with_protocol(Arc::new(UnboundProtocol))
///     .init(host.clone())?;
/// assert!(host.node_exists(device.node_name()));
/// device.shutdown();
/// # Ok::<(), modbus_dev::DriverError>(())
/// ```
pub struct ModbusDeviceBuilder {
    config: DriverConfig,
    protocol: Arc<dyn ProtocolHandler>,
}

impl Default for ModbusDeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModbusDeviceBuilder {
    pub fn new() -> Self {
        Self {
            config: DriverConfig::default(),
            protocol: Arc::new(UnboundProtocol),
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the handler that serves ioctl, read and write.
    pub fn with_protocol(mut self, protocol: Arc<dyn ProtocolHandler>) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn init(self, host: Arc<dyn Host>) -> Result<ModbusDevice, DriverError> {
        ModbusDevice::init(host, self.config, self.protocol)
    }
}

/// A loaded driver: owns every resource registered with the host.
pub struct ModbusDevice {
    // Field order is release order.
    node: Option<DeviceNode>,
    class: Option<DeviceClass>,
    cdev: Option<CdevRegistration>,
    region: Option<ChrdevRegion>,
    identity: DeviceIdentity,
    node_name: String,
    config: DriverConfig,
    fops: Arc<ModbusFileOps>,
}

impl ModbusDevice {
    /// Registers the device with `host` and makes its node visible.
    ///
    /// Returns the step-specific error of the first failing step. Whatever was
    /// acquired before it has been released by the time this returns.
    pub fn init(
        host: Arc<dyn Host>,
        config: DriverConfig,
        protocol: Arc<dyn ProtocolHandler>,
    ) -> Result<Self, DriverError> {
        log::info!("{}_init() is called.", config.device_name);
        config.validate()?;

        let fops = Arc::new(ModbusFileOps::new(&config, protocol));

        let region = ChrdevRegion::alloc(&host, &config)?;
        let cdev = CdevRegistration::add(&host, &region, fops.clone())?;
        let class = DeviceClass::create(&host, &config.class_name)?;
        let identity = region.identity;
        let node_name = config.node_name(identity.minor());
        let node = DeviceNode::create(&host, &class, identity.first, node_name.clone())?;

        log::info!(
            "Succeeded in registering character device {}, Major={}, Minor={}, protocol={}",
            config.device_name,
            identity.major(),
            identity.minor(),
            fops.protocol_name()
        );

        Ok(Self {
            node: Some(node),
            class: Some(class),
            cdev: Some(cdev),
            region: Some(region),
            identity,
            node_name,
            config,
            fops,
        })
    }

    /// Releases everything [`init`](Self::init) acquired, in reverse order.
    pub fn shutdown(&mut self) {
        if !self.is_active() {
            return;
        }

        let open = self.fops.open_instances();
        if open > 0 {
            log::warn!("{}: unloading with {open} instance(s) still open", self.node_name);
        }

        drop(self.node.take());
        drop(self.class.take());
        drop(self.cdev.take());
        drop(self.region.take());

        log::info!("{}: Device unregistered.", self.node_name);
    }

    pub fn is_active(&self) -> bool {
        self.node.is_some() || self.class.is_some() || self.cdev.is_some() || self.region.is_some()
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The dispatch table registered for this device.
    pub fn file_operations(&self) -> Arc<ModbusFileOps> {
        self.fops.clone()
    }

    pub fn open_instances(&self) -> usize {
        self.fops.open_instances()
    }
}

impl Drop for ModbusDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modbus_dev_host::{Errno, FailPoint, HostEvent, SimHost};

    fn load(host: &Arc<SimHost>) -> Result<ModbusDevice, DriverError> {
        ModbusDeviceBuilder::new().init(host.clone())
    }

    #[test]
    fn test_init_acquires_in_order() {
        let host = Arc::new(SimHost::new());
        let device = load(&host).unwrap();

        let kinds: Vec<String> = host
            .lifecycle_journal()
            .iter()
            .map(|event| event.kind().to_string())
            .collect();
        assert_eq!(kinds, vec!["RegionAllocated", "CdevAdded", "ClassCreated", "NodeCreated"]);
        assert_eq!(device.node_name(), "modbus_dev0");
        assert_eq!(device.identity().count, 1);
        assert_eq!(device.identity().major(), 254);
    }

    #[test]
    fn test_shutdown_releases_in_reverse_order() {
        let host = Arc::new(SimHost::new());
        let mut device = load(&host).unwrap();
        let devt = device.identity().first;
        host.clear_journal();

        device.shutdown();

        assert_eq!(
            host.lifecycle_journal(),
            vec![
                HostEvent::NodeDestroyed {
                    name: "modbus_dev0".to_string(),
                    devt
                },
                HostEvent::ClassDestroyed {
                    name: "modbus_class".to_string()
                },
                HostEvent::CdevDeleted { first: devt },
                HostEvent::RegionReleased { first: devt, count: 1 },
            ]
        );
        assert!(!device.is_active());
        assert!(host.held_resources().is_empty());
    }

    #[test]
    fn test_shutdown_twice_is_harmless() {
        let host = Arc::new(SimHost::new());
        let mut device = load(&host).unwrap();
        device.shutdown();
        host.clear_journal();
        device.shutdown();
        drop(device);
        assert!(host.journal().is_empty());
    }

    #[test]
    fn test_drop_unloads() {
        let host = Arc::new(SimHost::new());
        {
            let _device = load(&host).unwrap();
            assert_eq!(host.held_resources().nodes, 1);
        }
        assert!(host.held_resources().is_empty());
    }

    #[test]
    fn test_node_failure_rolls_back_everything() {
        let host = Arc::new(SimHost::new());
        host.inject_fault(FailPoint::DeviceCreate, Errno::ENOMEM);

        let err = load(&host).err();
        assert_eq!(err, Some(DriverError::NodeCreation { errno: Errno::ENOMEM }));

        let kinds: Vec<String> = host
            .lifecycle_journal()
            .iter()
            .map(|event| event.kind().to_string())
            .collect();
        assert_eq!(
            kinds,
            vec![
                "RegionAllocated",
                "CdevAdded",
                "ClassCreated",
                "ClassDestroyed",
                "CdevDeleted",
                "RegionReleased"
            ]
        );
        assert!(host.held_resources().is_empty());
    }

    #[test]
    fn test_invalid_config_acquires_nothing() {
        let host = Arc::new(SimHost::new());
        let config = DriverConfig {
            class_name: String::new(),
            ..DriverConfig::default()
        };
        let result = ModbusDeviceBuilder::new().with_config(config).init(host.clone());
        assert!(matches!(result, Err(DriverError::InvalidConfig { .. })));
        assert!(host.journal().is_empty());
    }

    #[test]
    fn test_configured_first_minor_names_node() {
        let host = Arc::new(SimHost::new());
        let config = DriverConfig {
            first_minor: 5,
            ..DriverConfig::default()
        };
        let device = ModbusDeviceBuilder::new().with_config(config).init(host.clone()).unwrap();
        assert_eq!(device.identity().minor(), 5);
        assert!(host.node_exists("modbus_dev5"));
        assert_eq!(device.config().first_minor, 5);
    }

    #[test]
    fn test_out_of_range_first_minor_is_a_config_error() {
        let host = Arc::new(SimHost::new());
        let config = DriverConfig {
            first_minor: modbus_dev_host::dev_t::MINOR_MASK + 1,
            ..DriverConfig::default()
        };
        let result = ModbusDeviceBuilder::new().with_config(config).init(host.clone());
        assert!(matches!(result, Err(DriverError::InvalidConfig { .. })));
        assert!(host.journal().is_empty());
    }
}
