use std::any::Any;

use crate::{DevT, Errno};

/// A file descriptor number in the simulated process file table.
pub type Fd = i32;

/// The filesystem item behind a device node.
///
/// There is one inode per device node, no matter how many times it is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    rdev: DevT,
    name: String,
}

impl Inode {
    pub fn new(rdev: DevT, name: &str) -> Self {
        Self {
            rdev,
            name: name.to_string(),
        }
    }

    pub fn rdev(&self) -> DevT {
        self.rdev
    }

    pub fn minor(&self) -> u32 {
        self.rdev.minor()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One opened instance of a device node.
///
/// A distinct `OpenFile` exists for every successful open. Drivers keep their
/// per-instance data in the private data slot.
pub struct OpenFile {
    fd: Fd,
    rdev: DevT,
    pos: i64,
    private_data: Option<Box<dyn Any + Send>>,
}

impl OpenFile {
    pub fn new(fd: Fd, rdev: DevT) -> Self {
        Self {
            fd,
            rdev,
            pos: 0,
            private_data: None,
        }
    }

    pub fn fd(&self) -> Fd {
        self.fd
    }

    pub fn rdev(&self) -> DevT {
        self.rdev
    }

    pub fn pos(&self) -> i64 {
        self.pos
    }

    pub fn pos_mut(&mut self) -> &mut i64 {
        &mut self.pos
    }

    pub fn has_private_data(&self) -> bool {
        self.private_data.is_some()
    }

    pub fn private_data_mut(&mut self) -> Option<&mut (dyn Any + Send)> {
        self.private_data.as_deref_mut()
    }

    /// Stores `data` in the private slot, returning whatever was there before.
    pub fn set_private_data(&mut self, data: Box<dyn Any + Send>) -> Option<Box<dyn Any + Send>> {
        self.private_data.replace(data)
    }

    pub fn take_private_data(&mut self) -> Option<Box<dyn Any + Send>> {
        self.private_data.take()
    }
}

impl std::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenFile")
            .field("fd", &self.fd)
            .field("rdev", &self.rdev)
            .field("pos", &self.pos)
            .field("has_private_data", &self.private_data.is_some())
            .finish()
    }
}

/// The dispatch table a driver registers for its device numbers.
///
/// The host calls these when user space issues the matching system call on a
/// file opened from one of the registered device numbers. Calls on the same
/// `OpenFile` are serialized by the host; calls on different files may run
/// concurrently.
pub trait FileOperations: Send + Sync {
    fn open(&self, inode: &Inode, file: &mut OpenFile) -> Result<(), Errno>;

    fn release(&self, inode: &Inode, file: &mut OpenFile) -> Result<(), Errno>;

    fn unlocked_ioctl(&self, file: &mut OpenFile, cmd: u32, arg: usize) -> Result<i64, Errno>;

    /// Returns the number of bytes placed in `buf`. Zero means no data yet.
    fn read(&self, file: &mut OpenFile, buf: &mut [u8], pos: &mut i64) -> Result<usize, Errno>;

    /// Returns the number of bytes consumed from `buf`.
    fn write(&self, file: &mut OpenFile, buf: &[u8], pos: &mut i64) -> Result<usize, Errno>;
}
