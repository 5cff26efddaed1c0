//! Dispatch table for the device node
//!
//! [`ModbusFileOps`] is what the lifecycle controller registers with the host.
//! Every per-descriptor entry point first resolves the instance attached to the
//! file and refuses to proceed without it, then hands the call to the bound
//! [`ProtocolHandler`].

use modbus_dev_host::{Errno, FileOperations, Inode, OpenFile};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    config::DriverConfig,
    error::DriverError,
    instance::{InstanceId, InstanceManager},
    protocol::ProtocolHandler,
};

pub struct ModbusFileOps {
    device_name: String,
    instances: InstanceManager,
    protocol: Arc<dyn ProtocolHandler>,
    open_instances: AtomicUsize,
}

impl ModbusFileOps {
    pub fn new(config: &DriverConfig, protocol: Arc<dyn ProtocolHandler>) -> Self {
        Self {
            device_name: config.device_name.clone(),
            instances: InstanceManager::new(config.rx_buffer_capacity),
            protocol,
            open_instances: AtomicUsize::new(0),
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        self.protocol.name()
    }

    /// Number of instances currently attached to open files.
    pub fn open_instances(&self) -> usize {
        self.open_instances.load(Ordering::Acquire)
    }

    /// Allocates fresh state and attaches it to `file`.
    ///
    /// On failure nothing is attached and the file is left untouched.
    pub fn open_instance(&self, inode: &Inode, file: &mut OpenFile) -> Result<InstanceId, DriverError> {
        let mut state = self.instances.allocate()?;
        self.protocol.on_open(&mut state).map_err(|err| {
            log::error!("{}: protocol refused open on fd {}: {err}", self.device_name, file.fd());
            err
        })?;

        let id = state.id();
        InstanceManager::attach(file, state);
        self.open_instances.fetch_add(1, Ordering::AcqRel);

        log::info!(
            "{}_open() is called. node = {}, fd = {}, instance = {id}",
            self.device_name,
            inode.name(),
            file.fd()
        );
        Ok(id)
    }

    /// Detaches and releases the state attached to `file`.
    ///
    /// The host drops the descriptor whatever this returns, so the instance is
    /// no longer counted as open even when its state had gone missing.
    pub fn close_instance(&self, file: &mut OpenFile) -> Result<(), DriverError> {
        let detached = InstanceManager::detach(file);
        let _ = self
            .open_instances
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| open.checked_sub(1));
        let mut state = detached?;
        self.protocol.on_close(&mut state);

        log::info!(
            "{}_close() is called. fd = {}, instance = {}",
            self.device_name,
            file.fd(),
            state.id()
        );
        Ok(())
    }

    pub fn ioctl_instance(&self, file: &mut OpenFile, cmd: u32, arg: usize) -> Result<i64, DriverError> {
        let fd = file.fd();
        let state = InstanceManager::state_mut(file)?;
        log::info!("{}_ioctl() is called. fd = {fd}, cmd = {cmd}, arg = {arg}", self.device_name);

        let ret = self.protocol.ioctl(state, cmd, arg)?;
        let counters = state.counters_mut();
        counters.ioctls += 1;
        counters.last_ioctl = Some((cmd, arg));
        Ok(ret)
    }

    pub fn read_instance(
        &self,
        file: &mut OpenFile,
        buf: &mut [u8],
        pos: &mut i64,
    ) -> Result<usize, DriverError> {
        let fd = file.fd();
        let state = InstanceManager::state_mut(file)?;
        log::info!("{}_read() is called. fd = {fd}, len = {}", self.device_name, buf.len());

        let supplied = buf.len();
        let read = self.protocol.read(state, buf, pos)?;
        check_transfer(read, supplied)?;

        let counters = state.counters_mut();
        counters.reads += 1;
        counters.bytes_read += read as u64;
        Ok(read)
    }

    pub fn write_instance(
        &self,
        file: &mut OpenFile,
        buf: &[u8],
        pos: &mut i64,
    ) -> Result<usize, DriverError> {
        let fd = file.fd();
        let state = InstanceManager::state_mut(file)?;
        log::info!("{}_write() is called. fd = {fd}, len = {}", self.device_name, buf.len());

        let written = self.protocol.write(state, buf, pos)?;
        check_transfer(written, buf.len())?;

        let counters = state.counters_mut();
        counters.writes += 1;
        counters.bytes_written += written as u64;
        Ok(written)
    }
}

fn check_transfer(returned: usize, supplied: usize) -> Result<(), DriverError> {
    if returned > supplied {
        log::error!("Protocol handler reported {returned} bytes for a {supplied} byte buffer");
        return Err(DriverError::ProtocolContract { returned, supplied });
    }
    Ok(())
}

impl FileOperations for ModbusFileOps {
    fn open(&self, inode: &Inode, file: &mut OpenFile) -> Result<(), Errno> {
        self.open_instance(inode, file).map(|_| ()).map_err(Errno::from)
    }

    fn release(&self, _inode: &Inode, file: &mut OpenFile) -> Result<(), Errno> {
        self.close_instance(file).map_err(Errno::from)
    }

    fn unlocked_ioctl(&self, file: &mut OpenFile, cmd: u32, arg: usize) -> Result<i64, Errno> {
        self.ioctl_instance(file, cmd, arg).map_err(Errno::from)
    }

    fn read(&self, file: &mut OpenFile, buf: &mut [u8], pos: &mut i64) -> Result<usize, Errno> {
        self.read_instance(file, buf, pos).map_err(Errno::from)
    }

    fn write(&self, file: &mut OpenFile, buf: &[u8], pos: &mut i64) -> Result<usize, Errno> {
        self.write_instance(file, buf, pos).map_err(Errno::from)
    }
}
