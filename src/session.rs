use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use modbus_dev_host::{Fd, FailPoint, HeldResources, HostEvent, SimHost};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    config::DriverConfig,
    lifecycle::{DeviceIdentity, ModbusDeviceBuilder},
};

/// What a session does against the loaded driver.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How many descriptors to open on the node
    pub opens: usize,
    /// Make this host call fail during load
    pub fail_at: Option<FailPoint>,
    /// Bytes written on every descriptor
    pub payload: Vec<u8>,
    /// Size of the buffer passed to read
    pub read_len: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            opens: 1,
            fail_at: None,
            // Read holding register 0, one register, station 1.
            payload: vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A],
            read_len: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub identity: DeviceIdentity,
    pub node: String,
    pub class: String,
    pub dev_path: String,
    pub sysfs_path: Option<String>,
    pub protocol: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    pub fd: Fd,
    pub read: usize,
    pub written: usize,
    pub ioctl: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub started_at: DateTime<Local>,
    pub device: Option<DeviceSummary>,
    pub init_error: Option<String>,
    pub instances: Vec<InstanceReport>,
    pub node_removed: bool,
    pub held_after_shutdown: HeldResources,
    pub journal: Vec<HostEvent>,
}

impl SessionReport {
    pub fn succeeded(&self) -> bool {
        self.init_error.is_none() && self.node_removed && self.held_after_shutdown.is_empty()
    }
}

/// Loads the driver into `host`, exercises every entry point and unloads it.
///
/// A failed load is reported in [`SessionReport::init_error`], not as an `Err`;
/// `Err` means a user-space call on a successfully loaded device failed.
pub fn run_session(host: &Arc<SimHost>, config: DriverConfig, options: &SessionOptions) -> Result<SessionReport> {
    let started_at = Local::now();
    if let Some(point) = options.fail_at {
        log::info!("Injecting failure at {point}");
        host.inject_fault(point, point.default_errno());
    }

    let mut device = match ModbusDeviceBuilder::new().with_config(config).init(host.clone()) {
        Ok(device) => device,
        Err(err) => {
            host.clear_faults();
            return Ok(SessionReport {
                started_at,
                device: None,
                init_error: Some(err.to_string()),
                instances: Vec::new(),
                node_removed: true,
                held_after_shutdown: host.held_resources(),
                journal: host.journal(),
            });
        }
    };

    let node = device.node_name().to_string();
    let dev_path = format!("/dev/{node}");
    let summary = DeviceSummary {
        identity: device.identity(),
        node: node.clone(),
        class: device.config().class_name.clone(),
        dev_path: dev_path.clone(),
        sysfs_path: host.sysfs_path(&node),
        protocol: device.file_operations().protocol_name().to_string(),
    };

    let mut fds = Vec::with_capacity(options.opens);
    for _ in 0..options.opens {
        let fd = host
            .open(&dev_path)
            .with_context(|| format!("open({dev_path}) failed"))?;
        fds.push(fd);
    }

    let mut instances = Vec::with_capacity(fds.len());
    for fd in &fds {
        let fd = *fd;
        let mut buf = vec![0u8; options.read_len];
        let read = host.read(fd, &mut buf).with_context(|| format!("read(fd {fd}) failed"))?;
        let written = host
            .write(fd, &options.payload)
            .with_context(|| format!("write(fd {fd}) failed"))?;
        let ioctl = host.ioctl(fd, 0, 0).with_context(|| format!("ioctl(fd {fd}) failed"))?;
        instances.push(InstanceReport {
            fd,
            read,
            written,
            ioctl,
        });
    }

    for fd in fds {
        host.close(fd).with_context(|| format!("close(fd {fd}) failed"))?;
    }

    device.shutdown();

    Ok(SessionReport {
        started_at,
        device: Some(summary),
        init_error: None,
        instances,
        node_removed: !host.node_exists(&node),
        held_after_shutdown: host.held_resources(),
        journal: host.journal(),
    })
}
