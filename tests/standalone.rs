mod common;

use common::*;
use lgmux::protocol::product_ids;
use lgmux::{
    AttachError, Config, DeviceManager, DriverRegistry, InlineSpawn, MatchKey, RequestError,
    ScrollMode, ScrollModeError, ScrollModeSetting, VirtualTransport,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn mx_revolution(id: &str) -> Arc<VirtualTransport> {
    Arc::new(VirtualTransport::new(
        id,
        MatchKey::bluetooth(product_ids::MX_REVOLUTION),
    ))
}

#[test]
fn unknown_transport_is_rejected() {
    let manager = inline_manager(Config::default());
    let transport = Arc::new(VirtualTransport::new("/dev/hidraw9", MatchKey::usb(0xdead)));
    let err = manager.attach(transport.clone()).unwrap_err();
    assert!(matches!(err, AttachError::NoMatchingDriver(_)));
    assert_eq!(transport.start_count(), 0);
    assert!(manager.devices().is_empty());
}

#[test]
fn transport_start_failure_unwinds() {
    let manager = inline_manager(Config::default());
    let transport = mx_revolution("/dev/hidraw1");
    transport.fail_next_start();

    let err = manager.attach(transport.clone()).unwrap_err();
    assert!(matches!(err, AttachError::TransportStart(_)));
    assert!(manager.device("/dev/hidraw1").is_none());

    // Nothing was left behind; a retry attaches cleanly.
    manager.attach(transport.clone()).unwrap();
    assert_eq!(transport.start_count(), 1);
}

#[test]
fn driver_init_failure_stops_transport() {
    let registry = Arc::new(DriverRegistry::with_default_drivers());
    let counting = CountingDriver::new(0x0010, None);
    counting.fail_init.store(true, Ordering::SeqCst);
    registry.register(counting.clone()).unwrap();
    let manager = DeviceManager::new(Config::default(), registry, Arc::new(InlineSpawn));

    let transport = Arc::new(VirtualTransport::new("/dev/hidraw2", MatchKey::usb(0x0010)));
    let err = manager.attach(transport.clone()).unwrap_err();
    assert!(matches!(err, AttachError::DriverInit { driver: "counting", .. }));
    assert_eq!(transport.start_count(), 1);
    assert_eq!(transport.stop_count(), 1);
    assert!(!transport.is_started());
    assert!(manager.device("/dev/hidraw2").is_none());
    assert_eq!(counting.exits(), 0);
}

#[test]
fn double_attach_and_double_detach() {
    let manager = inline_manager(Config::default());
    let transport = mx_revolution("/dev/hidraw3");
    manager.attach(transport.clone()).unwrap();
    assert!(matches!(
        manager.attach(transport.clone()),
        Err(AttachError::AlreadyAttached(_))
    ));

    assert!(manager.detach("/dev/hidraw3"));
    assert!(!manager.detach("/dev/hidraw3"));
    assert_eq!(transport.stop_count(), 1);
    assert!(!manager.detach("/dev/never-attached"));
}

#[test]
fn standalone_mouse_battery_and_timeout() {
    let manager = inline_manager(Config::from_toml_str("[requests]\ntimeout_ms = 30").unwrap());
    let transport = mx_revolution("/dev/hidraw4");
    let mouse = manager.attach(transport.clone()).unwrap();
    assert_eq!(mouse.device_number(), 0x01);
    assert_eq!(mouse.transport_id(), Some("/dev/hidraw4"));

    assert!(matches!(
        mouse.battery(),
        Err(RequestError::TimedOut { timeout_ms: 30, .. })
    ));

    transport.respond_with(battery_responder(77));
    assert_eq!(mouse.battery(), Ok(77));
}

#[test]
fn scroll_mode_is_cached_and_updated_by_echo() {
    let manager = inline_manager(Config::default());
    let transport = mx_revolution("/dev/hidraw5");
    let mouse = manager.attach(transport.clone()).unwrap();
    transport.respond_with(|w: &[u8]| match (w[2], w[3]) {
        (0x81, 0x56) => Some(vec![0x10, w[1], 0x81, 0x56, 0x85, 0x0a, 0x14]),
        (0x80, 0x56) => Some(w.to_vec()),
        _ => None,
    });

    let mode = mouse.scroll_mode().unwrap();
    assert_eq!(mode.to_string(), "default freespin above 10 up and 20 down");
    mouse.scroll_mode().unwrap();
    assert_eq!(transport.take_writes().len(), 1);

    let toggle = ScrollModeSetting::new(ScrollMode::ButtonToggle { button: 6 }, false);
    mouse.set_scroll_mode(&toggle).unwrap();
    assert_eq!(
        transport.take_writes(),
        vec![vec![0x10, 0x01, 0x80, 0x56, 0x08, 0x00, 0x06]]
    );
    assert_eq!(mouse.scroll_mode().unwrap(), toggle);
    assert!(transport.take_writes().is_empty());

    let bad = ScrollModeSetting::new(ScrollMode::ButtonSwitch { freespin: 1, click: 20 }, false);
    assert_eq!(
        mouse.set_scroll_mode(&bad),
        Err(RequestError::ScrollMode(ScrollModeError::ButtonOutOfRange(20)))
    );
}

#[test]
fn vx_revolution_has_battery_only() {
    let manager = inline_manager(Config::default());
    let transport = Arc::new(VirtualTransport::new(
        "/dev/hidraw6",
        MatchKey::usb(product_ids::VX_REVOLUTION),
    ));
    transport.respond_with(battery_responder(90));
    let mouse = manager.attach(transport.clone()).unwrap();

    assert_eq!(mouse.battery(), Ok(90));
    assert!(matches!(mouse.scroll_mode(), Err(RequestError::Unsupported(_))));
    // Scroll traffic is unhandled for this model.
    transport.inject(&[0x10, 0x01, 0x81, 0x56, 0x01, 0x00, 0x00]);
    assert_eq!(mouse.as_mouse().unwrap().scroll_mode.get(), None);
}

#[test]
fn oversized_reports_are_dropped_not_dispatched() {
    let manager = inline_manager(Config::from_toml_str("[queue]\nmax_report_len = 8").unwrap());
    let transport = mx_revolution("/dev/hidraw7");
    let mouse = manager.attach(transport.clone()).unwrap();

    let mut long = vec![0x10, 0x01, 0x81, 0x0d, 0x22];
    long.resize(9, 0);
    transport.inject(&long);
    assert_eq!(mouse.as_mouse().unwrap().battery.get(), None);
    assert_eq!(mouse.inbound().unwrap().dropped(), 1);
}

#[test]
fn dropping_manager_detaches_everything() {
    let transport = mx_revolution("/dev/hidraw8");
    {
        let manager = inline_manager(Config::default());
        manager.attach(transport.clone()).unwrap();
        assert!(transport.is_started());
    }
    assert!(!transport.is_started());
    assert_eq!(transport.stop_count(), 1);
}
