use derive_more::{Display, Error};
use modbus_dev_host::Errno;

/// Everything the driver can report to its caller.
///
/// Initialization failures are distinct per acquisition step so the caller can
/// tell which resource could not be obtained. Per-descriptor failures map onto
/// the errno user space sees through [`DriverError::errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum DriverError {
    #[display("invalid driver configuration: {reason}")]
    InvalidConfig { reason: &'static str },

    #[display("failed to allocate device region: {errno}")]
    IdentityExhausted { errno: Errno },

    #[display("unable to add cdev: {errno}")]
    DispatchRegistration { errno: Errno },

    #[display("failed to register device class: {errno}")]
    ClassCreation { errno: Errno },

    #[display("failed to create the device: {errno}")]
    NodeCreation { errno: Errno },

    #[display("failed to allocate memory for private data")]
    OutOfMemory,

    #[display("failed to access memory for private data")]
    MissingInstanceState,

    #[display("protocol handler reported {returned} bytes for a {supplied} byte buffer")]
    ProtocolContract { returned: usize, supplied: usize },

    #[display("protocol handler failed: {errno}")]
    Protocol { errno: Errno },
}

impl DriverError {
    /// The errno the host reports to user space for this error.
    pub fn errno(&self) -> Errno {
        match self {
            DriverError::InvalidConfig { .. } => Errno::EINVAL,
            DriverError::IdentityExhausted { errno }
            | DriverError::DispatchRegistration { errno }
            | DriverError::ClassCreation { errno }
            | DriverError::NodeCreation { errno }
            | DriverError::Protocol { errno } => *errno,
            DriverError::OutOfMemory | DriverError::MissingInstanceState => Errno::ENOMEM,
            DriverError::ProtocolContract { .. } => Errno::EIO,
        }
    }

    /// Negative status code, as a system call returns it.
    pub fn status(&self) -> i32 {
        self.errno().status()
    }
}

impl From<DriverError> for Errno {
    fn from(err: DriverError) -> Self {
        err.errno()
    }
}
