//! Protocol seam - where Modbus RTU transactions plug into the dispatcher
//!
//! The dispatcher owns descriptor bookkeeping (state lookup, counters, transfer
//! limits). Everything that gives meaning to the bytes and ioctl commands is a
//! [`ProtocolHandler`]. Handlers see only the state of the descriptor the call
//! was made on.

use crate::{error::DriverError, instance::InstanceState};

/// Handler for the per-descriptor operations of an opened device.
///
/// Contract:
/// - `read` returns the number of bytes decoded into `buf`; `0` means no data yet.
/// - `write` returns the number of bytes consumed from `buf` and queued; never
///   more than `buf.len()`.
/// - `ioctl` returns a non-negative value on success.
///
/// Errors are returned as [`DriverError`], usually [`DriverError::Protocol`].
pub trait ProtocolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called after the instance is allocated and before it is attached.
    fn on_open(&self, _state: &mut InstanceState) -> Result<(), DriverError> {
        Ok(())
    }

    /// Called with the detached instance right before it is released.
    fn on_close(&self, _state: &mut InstanceState) {}

    fn ioctl(&self, state: &mut InstanceState, cmd: u32, arg: usize) -> Result<i64, DriverError>;

    fn read(
        &self,
        state: &mut InstanceState,
        buf: &mut [u8],
        pos: &mut i64,
    ) -> Result<usize, DriverError>;

    fn write(&self, state: &mut InstanceState, buf: &[u8], pos: &mut i64) -> Result<usize, DriverError>;
}

/// Handler used while no Modbus transaction layer is bound.
///
/// Accepts every command, never produces data and consumes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundProtocol;

impl ProtocolHandler for UnboundProtocol {
    fn name(&self) -> &'static str {
        "unbound"
    }

    fn ioctl(&self, state: &mut InstanceState, cmd: u32, arg: usize) -> Result<i64, DriverError> {
        log::debug!("instance {}: ioctl cmd = {cmd}, arg = {arg} ignored", state.id());
        Ok(0)
    }

    fn read(
        &self,
        _state: &mut InstanceState,
        _buf: &mut [u8],
        _pos: &mut i64,
    ) -> Result<usize, DriverError> {
        Ok(0)
    }

    fn write(&self, _state: &mut InstanceState, _buf: &[u8], _pos: &mut i64) -> Result<usize, DriverError> {
        Ok(0)
    }
}
