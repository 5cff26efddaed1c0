//! In-memory host that behaves like the kernel's character-device subsystem
//!
//! `SimHost` keeps the same bookkeeping the kernel does for a driver: reserved
//! device-number regions, registered dispatch tables, classes, device nodes, and
//! the open file table. It also exposes the user-space side (`open`, `read`, ...)
//! so a loaded driver can be driven end to end.
//!
//! Every registration call can be forced to fail with [`SimHost::inject_fault`],
//! and every state change is appended to a journal that tests can inspect.

mod fault;
mod journal;

pub use fault::FailPoint;
pub use journal::HostEvent;

use parking_lot::Mutex;
use serde::Serialize;
use std::{
    any::Any,
    collections::{BTreeMap, HashMap},
    ops::RangeInclusive,
    sync::Arc,
};

use crate::{
    dev_t::{MAJOR_MAX, MINOR_MASK},
    CdevId, ClassId, DevT, Errno, Fd, FileOperations, Host, Inode, NodeId, OpenFile,
};

/// Prefix under which device nodes appear in the simulated filesystem.
pub const DEV_ROOT: &str = "/dev";
/// Prefix under which classes appear in the simulated sysfs.
pub const SYSFS_CLASS_ROOT: &str = "/sys/class";

/// Tunables for the simulated host.
#[derive(Debug, Clone)]
pub struct SimHostConfig {
    /// Majors handed out by dynamic allocation, searched from the top down.
    pub dynamic_majors: RangeInclusive<u32>,
    /// First descriptor number handed to user space.
    pub first_fd: Fd,
}

impl Default for SimHostConfig {
    fn default() -> Self {
        // Same dynamic range the kernel searches first.
        Self {
            dynamic_majors: 234..=254,
            first_fd: 3,
        }
    }
}

/// Counts of registration resources currently held on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeldResources {
    pub regions: usize,
    pub cdevs: usize,
    pub classes: usize,
    pub nodes: usize,
}

impl HeldResources {
    pub fn is_empty(&self) -> bool {
        *self == HeldResources::default()
    }
}

struct Region {
    first: DevT,
    count: u32,
    name: String,
}

struct Cdev {
    first: DevT,
    count: u32,
    fops: Arc<dyn FileOperations>,
}

struct Class {
    name: String,
}

struct Node {
    id: NodeId,
    class: ClassId,
    devt: DevT,
}

struct Registry {
    regions: BTreeMap<u32, Region>,
    cdevs: HashMap<CdevId, Cdev>,
    classes: HashMap<ClassId, Class>,
    nodes: BTreeMap<String, Node>,
    fail_points: HashMap<FailPoint, Errno>,
    journal: Vec<HostEvent>,
    next_handle: u64,
}

impl Registry {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn check_fault(&self, point: FailPoint) -> Result<(), Errno> {
        match self.fail_points.get(&point) {
            Some(errno) => {
                log::debug!("SimHost: injected failure at {point}: {errno}");
                Err(*errno)
            }
            None => Ok(()),
        }
    }
}

struct FileEntry {
    inode: Inode,
    fops: Arc<dyn FileOperations>,
    file: Mutex<OpenFile>,
}

struct FileTable {
    files: BTreeMap<Fd, Arc<FileEntry>>,
    next_fd: Fd,
}

/// The simulated kernel.
pub struct SimHost {
    config: SimHostConfig,
    registry: Mutex<Registry>,
    files: Mutex<FileTable>,
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHost {
    pub fn new() -> Self {
        Self::with_config(SimHostConfig::default())
    }

    pub fn with_config(config: SimHostConfig) -> Self {
        let first_fd = config.first_fd;
        Self {
            config,
            registry: Mutex::new(Registry {
                regions: BTreeMap::new(),
                cdevs: HashMap::new(),
                classes: HashMap::new(),
                nodes: BTreeMap::new(),
                fail_points: HashMap::new(),
                journal: Vec::new(),
                next_handle: 0,
            }),
            files: Mutex::new(FileTable {
                files: BTreeMap::new(),
                next_fd: first_fd,
            }),
        }
    }

    /// Makes every later call at `point` fail with `errno` until cleared.
    pub fn inject_fault(&self, point: FailPoint, errno: Errno) {
        self.registry.lock().fail_points.insert(point, errno);
    }

    pub fn clear_faults(&self) {
        self.registry.lock().fail_points.clear();
    }

    pub fn journal(&self) -> Vec<HostEvent> {
        self.registry.lock().journal.clone()
    }

    /// Journal entries that concern registration, without file traffic.
    pub fn lifecycle_journal(&self) -> Vec<HostEvent> {
        self.registry
            .lock()
            .journal
            .iter()
            .filter(|event| event.is_lifecycle())
            .cloned()
            .collect()
    }

    pub fn clear_journal(&self) {
        self.registry.lock().journal.clear();
    }

    pub fn held_resources(&self) -> HeldResources {
        let registry = self.registry.lock();
        HeldResources {
            regions: registry.regions.len(),
            cdevs: registry.cdevs.len(),
            classes: registry.classes.len(),
            nodes: registry.nodes.len(),
        }
    }

    pub fn class_exists(&self, name: &str) -> bool {
        self.registry
            .lock()
            .classes
            .values()
            .any(|class| class.name == name)
    }

    pub fn node_exists(&self, name: &str) -> bool {
        self.registry.lock().nodes.contains_key(name)
    }

    /// `/dev/<name>` for every node currently visible.
    pub fn dev_nodes(&self) -> Vec<String> {
        self.registry
            .lock()
            .nodes
            .keys()
            .map(|name| format!("{DEV_ROOT}/{name}"))
            .collect()
    }

    /// `/sys/class/<class>/<node>` if the node exists.
    pub fn sysfs_path(&self, node: &str) -> Option<String> {
        let registry = self.registry.lock();
        let entry = registry.nodes.get(node)?;
        let class = registry.classes.get(&entry.class)?;
        Some(format!("{SYSFS_CLASS_ROOT}/{}/{node}", class.name))
    }

    pub fn open_file_count(&self) -> usize {
        self.files.lock().files.len()
    }

    /// Opens a device node the way `open(2)` would.
    ///
    /// Accepts either `/dev/<name>` or the bare node name.
    pub fn open(&self, path: &str) -> Result<Fd, Errno> {
        let name = path
            .strip_prefix(DEV_ROOT)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(path);

        let (devt, fops) = {
            let registry = self.registry.lock();
            let node = registry.nodes.get(name).ok_or(Errno::ENOENT)?;
            let fops = registry
                .cdevs
                .values()
                .find(|cdev| cdev.first.covers(cdev.count, node.devt))
                .map(|cdev| cdev.fops.clone())
                .ok_or(Errno::ENXIO)?;
            (node.devt, fops)
        };

        let inode = Inode::new(devt, name);
        let fd = {
            let mut table = self.files.lock();
            let fd = table.next_fd;
            table.next_fd += 1;
            fd
        };
        let mut file = OpenFile::new(fd, devt);

        // The table is not locked while the driver runs; a failed open leaves no entry.
        fops.open(&inode, &mut file)?;

        self.files.lock().files.insert(
            fd,
            Arc::new(FileEntry {
                inode,
                fops,
                file: Mutex::new(file),
            }),
        );

        self.registry
            .lock()
            .journal
            .push(HostEvent::FileOpened { fd, devt });
        log::debug!("SimHost: opened {name} as fd {fd}");
        Ok(fd)
    }

    /// Closes a descriptor the way `close(2)` would, reporting the driver's release status.
    pub fn close(&self, fd: Fd) -> Result<(), Errno> {
        let entry = self.files.lock().files.remove(&fd).ok_or(Errno::EBADF)?;
        let result = {
            let mut file = entry.file.lock();
            entry.fops.release(&entry.inode, &mut file)
        };
        self.registry.lock().journal.push(HostEvent::FileReleased {
            fd,
            devt: entry.inode.rdev(),
        });
        result
    }

    pub fn ioctl(&self, fd: Fd, cmd: u32, arg: usize) -> Result<i64, Errno> {
        let entry = self.file_entry(fd)?;
        let mut file = entry.file.lock();
        entry.fops.unlocked_ioctl(&mut file, cmd, arg)
    }

    pub fn read(&self, fd: Fd, buf: &mut [u8]) -> Result<usize, Errno> {
        let entry = self.file_entry(fd)?;
        let mut file = entry.file.lock();
        let mut pos = file.pos();
        let read = entry.fops.read(&mut file, buf, &mut pos)?;
        *file.pos_mut() = pos;
        Ok(read)
    }

    pub fn write(&self, fd: Fd, buf: &[u8]) -> Result<usize, Errno> {
        let entry = self.file_entry(fd)?;
        let mut file = entry.file.lock();
        let mut pos = file.pos();
        let written = entry.fops.write(&mut file, buf, &mut pos)?;
        *file.pos_mut() = pos;
        Ok(written)
    }

    /// Removes the private data the driver attached to `fd`, as a fault injection.
    pub fn take_private_data(&self, fd: Fd) -> Result<Option<Box<dyn Any + Send>>, Errno> {
        let entry = self.file_entry(fd)?;
        let mut file = entry.file.lock();
        Ok(file.take_private_data())
    }

    /// Runs `f` with the open file behind `fd` locked.
    pub fn with_file<R>(&self, fd: Fd, f: impl FnOnce(&mut OpenFile) -> R) -> Result<R, Errno> {
        let entry = self.file_entry(fd)?;
        let mut file = entry.file.lock();
        Ok(f(&mut file))
    }

    fn file_entry(&self, fd: Fd) -> Result<Arc<FileEntry>, Errno> {
        self.files.lock().files.get(&fd).cloned().ok_or(Errno::EBADF)
    }
}

impl Host for SimHost {
    fn alloc_chrdev_region(&self, first_minor: u32, count: u32, name: &str) -> Result<DevT, Errno> {
        let mut registry = self.registry.lock();
        registry.check_fault(FailPoint::AllocChrdevRegion)?;

        if count == 0 || u64::from(first_minor) + u64::from(count) > u64::from(MINOR_MASK) + 1 {
            return Err(Errno::EINVAL);
        }

        let major = self
            .config
            .dynamic_majors
            .clone()
            .rev()
            .filter(|major| *major <= MAJOR_MAX)
            .find(|major| !registry.regions.contains_key(major))
            .ok_or_else(|| {
                log::warn!("SimHost: no free dynamic major for {name}");
                Errno::EBUSY
            })?;

        let first = DevT::new(major, first_minor);
        registry.regions.insert(
            major,
            Region {
                first,
                count,
                name: name.to_string(),
            },
        );
        registry.journal.push(HostEvent::RegionAllocated {
            first,
            count,
            name: name.to_string(),
        });
        log::debug!("SimHost: allocated region {first} (+{count}) for {name}");
        Ok(first)
    }

    fn unregister_chrdev_region(&self, first: DevT, count: u32) {
        let mut registry = self.registry.lock();
        let matches = registry
            .regions
            .get(&first.major())
            .map(|region| region.first == first && region.count == count)
            .unwrap_or(false);
        if !matches {
            log::warn!("SimHost: unregister of unknown region {first} (+{count})");
            return;
        }
        if let Some(region) = registry.regions.remove(&first.major()) {
            log::debug!("SimHost: released region {first} held by {}", region.name);
        }
        registry
            .journal
            .push(HostEvent::RegionReleased { first, count });
    }

    fn cdev_add(&self, first: DevT, count: u32, fops: Arc<dyn FileOperations>) -> Result<CdevId, Errno> {
        let mut registry = self.registry.lock();
        registry.check_fault(FailPoint::CdevAdd)?;

        if count == 0 || first.end(count) > u64::from(MINOR_MASK) + 1 {
            return Err(Errno::EINVAL);
        }
        let overlaps = registry
            .cdevs
            .values()
            .any(|cdev| cdev.first.overlaps(cdev.count, first, count));
        if overlaps {
            return Err(Errno::EBUSY);
        }

        let id = CdevId(registry.next_handle());
        registry.cdevs.insert(id, Cdev { first, count, fops });
        registry.journal.push(HostEvent::CdevAdded { first, count });
        Ok(id)
    }

    fn cdev_del(&self, cdev: CdevId) {
        let mut registry = self.registry.lock();
        match registry.cdevs.remove(&cdev) {
            Some(removed) => registry.journal.push(HostEvent::CdevDeleted {
                first: removed.first,
            }),
            None => log::warn!("SimHost: cdev_del of unknown cdev {cdev:?}"),
        }
    }

    fn class_create(&self, name: &str) -> Result<ClassId, Errno> {
        let mut registry = self.registry.lock();
        registry.check_fault(FailPoint::ClassCreate)?;

        if name.is_empty() || name.contains('/') {
            return Err(Errno::EINVAL);
        }
        if registry.classes.values().any(|class| class.name == name) {
            return Err(Errno::EEXIST);
        }

        let id = ClassId(registry.next_handle());
        registry.classes.insert(
            id,
            Class {
                name: name.to_string(),
            },
        );
        registry.journal.push(HostEvent::ClassCreated {
            name: name.to_string(),
        });
        Ok(id)
    }

    fn class_destroy(&self, class: ClassId) {
        let mut registry = self.registry.lock();
        let Some(removed) = registry.classes.remove(&class) else {
            log::warn!("SimHost: class_destroy of unknown class {class:?}");
            return;
        };

        let orphans: Vec<String> = registry
            .nodes
            .iter()
            .filter(|(_, node)| node.class == class)
            .map(|(name, _)| name.clone())
            .collect();
        for name in orphans {
            if let Some(node) = registry.nodes.remove(&name) {
                log::warn!("SimHost: class {} destroyed with node {name} still present", removed.name);
                registry.journal.push(HostEvent::NodeDestroyed {
                    name,
                    devt: node.devt,
                });
            }
        }

        registry
            .journal
            .push(HostEvent::ClassDestroyed { name: removed.name });
    }

    fn device_create(&self, class: ClassId, devt: DevT, name: &str) -> Result<NodeId, Errno> {
        let mut registry = self.registry.lock();
        registry.check_fault(FailPoint::DeviceCreate)?;

        if !registry.classes.contains_key(&class) {
            return Err(Errno::ENODEV);
        }
        if name.is_empty() || name.contains('/') {
            return Err(Errno::EINVAL);
        }
        if registry.nodes.contains_key(name) {
            return Err(Errno::EEXIST);
        }

        let id = NodeId(registry.next_handle());
        registry
            .nodes
            .insert(name.to_string(), Node { id, class, devt });
        registry.journal.push(HostEvent::NodeCreated {
            name: name.to_string(),
            devt,
        });
        Ok(id)
    }

    fn device_destroy(&self, class: ClassId, devt: DevT) {
        let mut registry = self.registry.lock();
        let found = registry
            .nodes
            .iter()
            .find(|(_, node)| node.class == class && node.devt == devt)
            .map(|(name, node)| (name.clone(), node.id));
        match found {
            Some((name, id)) => {
                registry.nodes.remove(&name);
                log::debug!("SimHost: destroyed node {name} ({id:?})");
                registry
                    .journal
                    .push(HostEvent::NodeDestroyed { name, devt });
            }
            None => log::warn!("SimHost: device_destroy of unknown node {devt}"),
        }
    }
}
