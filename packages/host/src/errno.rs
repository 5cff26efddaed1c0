use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;
use strum::IntoStaticStr;

/// Kernel error numbers surfaced to user space as negative status codes.
///
/// Only the values the character-device path can produce are listed.
#[repr(i32)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive, IntoStaticStr, Serialize,
)]
pub enum Errno {
    EPERM = 1,
    ENOENT = 2,
    EIO = 5,
    ENXIO = 6,
    EBADF = 9,
    ENOMEM = 12,
    EBUSY = 16,
    EEXIST = 17,
    ENODEV = 19,
    EINVAL = 22,
    ENOTTY = 25,
}

impl Errno {
    /// The negative status a system call returns for this error.
    pub fn status(self) -> i32 {
        -i32::from(self)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), i32::from(*self))
    }
}

impl std::error::Error for Errno {}
