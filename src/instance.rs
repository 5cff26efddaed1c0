//! Per-open-instance state and its association with open files
//!
//! Each successful open gets its own [`InstanceState`], stored in the open
//! file's private data slot. The [`InstanceManager`] is the only code that puts
//! state into that slot or takes it out again, so every lookup is typed.

use modbus_dev_host::OpenFile;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DriverError;

/// Identifier handed to each instance, unique for the lifetime of the driver.
pub type InstanceId = u64;

/// Traffic seen on one open instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IoCounters {
    pub reads: u64,
    pub writes: u64,
    pub ioctls: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Most recent `(cmd, arg)` passed to ioctl.
    pub last_ioctl: Option<(u32, usize)>,
}

/// Private data of one open file descriptor.
#[derive(Debug, Default)]
pub struct InstanceState {
    id: InstanceId,
    counters: IoCounters,
    rx_buffer: Vec<u8>,
}

impl InstanceState {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn counters(&self) -> &IoCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut IoCounters {
        &mut self.counters
    }

    /// Receive buffer for decoded frames. Its capacity is reserved at open.
    pub fn rx_buffer(&self) -> &Vec<u8> {
        &self.rx_buffer
    }

    pub fn rx_buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.rx_buffer
    }
}

/// Allocates instance state and manages its attachment to open files.
#[derive(Debug)]
pub struct InstanceManager {
    rx_buffer_capacity: usize,
    next_id: AtomicU64,
}

impl InstanceManager {
    pub fn new(rx_buffer_capacity: usize) -> Self {
        Self {
            rx_buffer_capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates zero-initialized state for a new open.
    ///
    /// Fails with [`DriverError::OutOfMemory`] if the receive buffer cannot be reserved.
    pub fn allocate(&self) -> Result<InstanceState, DriverError> {
        let mut state = InstanceState::default();
        state
            .rx_buffer
            .try_reserve_exact(self.rx_buffer_capacity)
            .map_err(|err| {
                log::error!("Failed to allocate memory for private data: {err}");
                DriverError::OutOfMemory
            })?;
        state.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(state)
    }

    /// Attaches `state` to `file`.
    ///
    /// Any state already attached is dropped; the host never hands the same
    /// file to open twice.
    pub fn attach(file: &mut OpenFile, state: InstanceState) {
        if file.set_private_data(Box::new(state)).is_some() {
            log::warn!("fd {} already carried private data; replaced", file.fd());
        }
    }

    /// The state attached to `file`.
    pub fn state_mut(file: &mut OpenFile) -> Result<&mut InstanceState, DriverError> {
        let fd = file.fd();
        file.private_data_mut()
            .and_then(|data| data.downcast_mut::<InstanceState>())
            .ok_or_else(|| {
                log::error!("Failed to access memory for private data (fd {fd})");
                DriverError::MissingInstanceState
            })
    }

    /// Detaches and returns the state attached to `file`.
    ///
    /// Foreign data in the slot is left in place.
    pub fn detach(file: &mut OpenFile) -> Result<InstanceState, DriverError> {
        let fd = file.fd();
        let missing = || {
            log::error!("Failed to access memory for private data (fd {fd})");
            DriverError::MissingInstanceState
        };

        let data = file.take_private_data().ok_or_else(missing)?;
        match data.downcast::<InstanceState>() {
            Ok(state) => Ok(*state),
            Err(foreign) => {
                file.set_private_data(foreign);
                Err(missing())
            }
        }
    }
}
