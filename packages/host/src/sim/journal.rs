use serde::Serialize;
use strum::AsRefStr;

use crate::{DevT, Fd};

/// Something the simulated host did on behalf of a driver or a process.
#[derive(Debug, Clone, PartialEq, Eq, AsRefStr, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    RegionAllocated { first: DevT, count: u32, name: String },
    RegionReleased { first: DevT, count: u32 },
    CdevAdded { first: DevT, count: u32 },
    CdevDeleted { first: DevT },
    ClassCreated { name: String },
    ClassDestroyed { name: String },
    NodeCreated { name: String, devt: DevT },
    NodeDestroyed { name: String, devt: DevT },
    FileOpened { fd: Fd, devt: DevT },
    FileReleased { fd: Fd, devt: DevT },
}

impl HostEvent {
    /// Whether this event belongs to driver registration rather than file traffic.
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, HostEvent::FileOpened { .. } | HostEvent::FileReleased { .. })
    }

    pub fn kind(&self) -> &str {
        self.as_ref()
    }
}

impl std::fmt::Display for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostEvent::RegionAllocated { first, count, name } => {
                write!(f, "region {first} (+{count}) allocated for {name}")
            }
            HostEvent::RegionReleased { first, count } => {
                write!(f, "region {first} (+{count}) released")
            }
            HostEvent::CdevAdded { first, count } => write!(f, "cdev {first} (+{count}) added"),
            HostEvent::CdevDeleted { first } => write!(f, "cdev {first} deleted"),
            HostEvent::ClassCreated { name } => write!(f, "class {name} created"),
            HostEvent::ClassDestroyed { name } => write!(f, "class {name} destroyed"),
            HostEvent::NodeCreated { name, devt } => write!(f, "node {name} ({devt}) created"),
            HostEvent::NodeDestroyed { name, devt } => write!(f, "node {name} ({devt}) destroyed"),
            HostEvent::FileOpened { fd, devt } => write!(f, "fd {fd} opened on {devt}"),
            HostEvent::FileReleased { fd, devt } => write!(f, "fd {fd} released on {devt}"),
        }
    }
}
