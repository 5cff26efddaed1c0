use anyhow::{bail, Result};
use log::LevelFilter;
use std::sync::Arc;

use modbus_dev::{
    boot, cli,
    config::DriverConfig,
    session::{run_session, SessionOptions, SessionReport},
};
use modbus_dev_host::{FailPoint, SimHost};

fn main() -> Result<()> {
    let matches = cli::parse_args();

    let level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    boot::init_logger(level);

    let config = match matches.get_one::<String>("config") {
        Some(path) => DriverConfig::from_file(path)?,
        None => DriverConfig::default(),
    };

    let fail_at = matches.get_one::<FailPoint>("fail-at").copied();

    let options = SessionOptions {
        opens: matches.get_one::<usize>("opens").copied().unwrap_or(1),
        fail_at,
        ..SessionOptions::default()
    };

    let host = Arc::new(SimHost::new());
    let report = run_session(&host, config, &options)?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.succeeded() {
        bail!(
            "Session failed: {}",
            report.init_error.as_deref().unwrap_or("resources left behind after shutdown")
        );
    }
    Ok(())
}

fn print_report(report: &SessionReport) {
    println!("Session started at {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    match &report.device {
        Some(device) => {
            println!(
                "Registered {} in class {} (Major={}, Minor={}) protocol={}",
                device.dev_path,
                device.class,
                device.identity.major(),
                device.identity.minor(),
                device.protocol
            );
            if let Some(path) = &device.sysfs_path {
                println!("  sysfs: {path}");
            }
        }
        None => println!("Device not registered"),
    }
    if let Some(err) = &report.init_error {
        println!("  init failed: {err}");
    }
    for instance in &report.instances {
        println!(
            "  fd {}: read={} written={} ioctl={}",
            instance.fd, instance.read, instance.written, instance.ioctl
        );
    }
    println!("Host events:");
    for event in &report.journal {
        println!("  {event}");
    }
    println!(
        "Node removed: {}, resources held after shutdown: {:?}",
        report.node_removed, report.held_after_shutdown
    );
}
