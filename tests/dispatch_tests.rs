use std::{collections::HashSet, sync::Arc};

use modbus_dev::{
    DriverConfig, DriverError, InstanceManager, InstanceState, ModbusDeviceBuilder, ProtocolHandler,
};
use modbus_dev_host::{Errno, SimHost};

const NODE: &str = "/dev/modbus_dev0";

/// Stores written bytes in the instance and returns them on read.
struct LoopbackProtocol;

impl ProtocolHandler for LoopbackProtocol {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn ioctl(&self, state: &mut InstanceState, _cmd: u32, _arg: usize) -> Result<i64, DriverError> {
        Ok(state.id() as i64)
    }

    fn read(&self, state: &mut InstanceState, buf: &mut [u8], _pos: &mut i64) -> Result<usize, DriverError> {
        let count = buf.len().min(state.rx_buffer().len());
        buf[..count].copy_from_slice(&state.rx_buffer()[..count]);
        state.rx_buffer_mut().drain(..count);
        Ok(count)
    }

    fn write(&self, state: &mut InstanceState, buf: &[u8], _pos: &mut i64) -> Result<usize, DriverError> {
        state.rx_buffer_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
}

fn loopback_host() -> (Arc<SimHost>, modbus_dev::ModbusDevice) {
    let host = Arc::new(SimHost::new());
    let device = ModbusDeviceBuilder::new()
        .with_protocol(Arc::new(LoopbackProtocol))
        .init(host.clone())
        .unwrap();
    (host, device)
}

/// Scenario A: load, open, read nothing, close, unload, node gone.
#[test]
fn test_basic_session() {
    let host = Arc::new(SimHost::new());
    let mut device = ModbusDeviceBuilder::new().init(host.clone()).unwrap();
    assert!(host.node_exists("modbus_dev0"));
    assert_eq!(
        host.sysfs_path("modbus_dev0").as_deref(),
        Some("/sys/class/modbus_class/modbus_dev0")
    );

    let fd = host.open(NODE).unwrap();
    let mut buf = [0u8; 32];
    assert_eq!(host.read(fd, &mut buf), Ok(0));
    assert_eq!(host.write(fd, &[0x01, 0x03]), Ok(0));
    assert_eq!(host.ioctl(fd, 0x4D00, 0), Ok(0));
    assert_eq!(host.close(fd), Ok(()));

    device.shutdown();
    assert!(!host.node_exists("modbus_dev0"));
    assert_eq!(host.open(NODE), Err(Errno::ENOENT));
}

/// Instance independence: N opens give N distinct instances and traffic on one
/// is invisible on the others.
#[test]
fn test_instances_are_independent() {
    let (host, device) = loopback_host();

    let fds: Vec<i32> = (0..4).map(|_| host.open(NODE).unwrap()).collect();
    let ids: HashSet<i64> = fds.iter().map(|fd| host.ioctl(*fd, 0, 0).unwrap()).collect();
    assert_eq!(ids.len(), fds.len());
    assert_eq!(device.open_instances(), 4);

    assert_eq!(host.write(fds[0], b"frame-a"), Ok(7));
    let mut buf = [0u8; 16];
    assert_eq!(host.read(fds[1], &mut buf), Ok(0));
    assert_eq!(host.read(fds[0], &mut buf), Ok(7));
    assert_eq!(&buf[..7], b"frame-a");

    for fd in fds {
        host.close(fd).unwrap();
    }
    assert_eq!(device.open_instances(), 0);
}

/// Close safety: closing one descriptor releases only its own instance.
#[test]
fn test_close_releases_only_own_state() {
    let (host, device) = loopback_host();
    let a = host.open(NODE).unwrap();
    let b = host.open(NODE).unwrap();
    host.write(b, b"keep").unwrap();

    assert_eq!(host.close(a), Ok(()));
    assert_eq!(device.open_instances(), 1);
    assert_eq!(host.ioctl(a, 0, 0), Err(Errno::EBADF));

    let mut buf = [0u8; 8];
    assert_eq!(host.read(b, &mut buf), Ok(4));
    assert_eq!(&buf[..4], b"keep");
    assert_eq!(host.close(b), Ok(()));
}

/// Every per-descriptor operation refuses to run without its instance state.
#[test]
fn test_missing_state_is_a_consistency_error() {
    let (host, device) = loopback_host();
    let fd = host.open(NODE).unwrap();
    let stolen = host.take_private_data(fd).unwrap();
    assert!(stolen.is_some());

    let mut buf = [0u8; 8];
    assert_eq!(host.ioctl(fd, 1, 1), Err(Errno::ENOMEM));
    assert_eq!(host.read(fd, &mut buf), Err(Errno::ENOMEM));
    assert_eq!(host.write(fd, b"x"), Err(Errno::ENOMEM));

    let fops = device.file_operations();
    let direct = host
        .with_file(fd, |file| fops.read_instance(file, &mut buf, &mut 0))
        .unwrap();
    assert_eq!(direct, Err(DriverError::MissingInstanceState));

    assert_eq!(host.close(fd), Err(Errno::ENOMEM));
    assert_eq!(host.open_file_count(), 0);
    assert_eq!(device.open_instances(), 0);
}

/// An open that cannot allocate its state fails cleanly and leaves no descriptor.
#[test]
fn test_open_out_of_memory() {
    let host = Arc::new(SimHost::new());
    let config = DriverConfig {
        rx_buffer_capacity: usize::MAX,
        ..DriverConfig::default()
    };
    let device = ModbusDeviceBuilder::new().with_config(config).init(host.clone()).unwrap();

    assert_eq!(host.open(NODE), Err(Errno::ENOMEM));
    assert_eq!(host.open_file_count(), 0);
    assert_eq!(device.open_instances(), 0);
    assert!(host.node_exists("modbus_dev0"));
}

/// Scenario C: concurrent openers close independently.
#[test]
fn test_concurrent_open_and_close() {
    let (host, device) = loopback_host();
    let long_lived = host.open(NODE).unwrap();
    host.write(long_lived, b"survivor").unwrap();

    std::thread::scope(|scope| {
        for worker in 0..8u8 {
            let host = &host;
            scope.spawn(move || {
                for round in 0..16u8 {
                    let fd = host.open(NODE).unwrap();
                    let payload = [worker, round];
                    assert_eq!(host.write(fd, &payload), Ok(2));
                    let mut buf = [0u8; 4];
                    assert_eq!(host.read(fd, &mut buf), Ok(2));
                    assert_eq!(&buf[..2], &payload);
                    assert_eq!(host.close(fd), Ok(()));
                }
            });
        }
    });

    assert_eq!(device.open_instances(), 1);
    let mut buf = [0u8; 16];
    assert_eq!(host.read(long_lived, &mut buf), Ok(8));
    assert_eq!(&buf[..8], b"survivor");
    assert_eq!(host.close(long_lived), Ok(()));
}

/// Descriptors opened before unload keep their own state; new opens fail.
#[test]
fn test_unload_with_open_descriptor() {
    let (host, mut device) = loopback_host();
    let fd = host.open(NODE).unwrap();

    device.shutdown();
    assert_eq!(host.open(NODE), Err(Errno::ENOENT));
    assert_eq!(host.write(fd, b"late"), Ok(4));
    assert_eq!(host.close(fd), Ok(()));
    assert!(host.held_resources().is_empty());
}

#[test]
fn test_state_accessible_through_file() {
    let (host, _device) = loopback_host();
    let fd = host.open(NODE).unwrap();
    host.write(fd, &[1, 2, 3]).unwrap();

    let buffered = host
        .with_file(fd, |file| {
            InstanceManager::state_mut(file).map(|state| state.rx_buffer().clone())
        })
        .unwrap()
        .unwrap();
    assert_eq!(buffered, vec![1, 2, 3]);
    host.close(fd).unwrap();
}
