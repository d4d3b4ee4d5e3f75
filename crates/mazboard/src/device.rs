//! Keyboard device access using evdev
//!
//! The physical keyboard is read directly from its `/dev/input/event*` node.
//! The same node is used to grab the keyboard away from the OS (so MIDI
//! playing does not also type) and to drive its lock-key LEDs.

use crate::dispatcher::KeyEvent;
use crate::error::{Error, Result};
use evdev::{Device, EventType, InputEvent, InputEventKind, Key, LedType};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default vendor id of the prototype board
pub const DEFAULT_VENDOR_ID: u16 = 0x258a;

/// Default product id of the prototype board
pub const DEFAULT_PRODUCT_ID: u16 = 0x0026;

/// Exclusive capture of the keyboard
pub trait GrabControl {
    /// Withhold key events from the OS (typing disabled)
    fn grab(&mut self) -> Result<()>;

    /// Hand key events back to the OS (typing enabled)
    fn ungrab(&mut self) -> Result<()>;
}

/// Keyboard indicator LEDs
pub trait LedControl {
    fn set_led(&mut self, led: LedType, on: bool) -> Result<()>;
}

/// Where key events come from
///
/// The source is also the device that is grabbed and whose LEDs are driven.
pub trait KeySource: GrabControl + LedControl {
    /// Wait at most `timeout` for key events. An empty batch means nothing
    /// arrived in time.
    fn poll_key_events(&mut self, timeout: Duration) -> Result<Vec<KeyEvent>>;
}

/// Wait until `fd` has data to read or `timeout` passes. A signal arriving
/// during the wait counts as a timeout.
pub fn wait_readable(fd: RawFd, timeout: Duration) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    // SAFETY: one valid pollfd, count matches
    let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
    if ready < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device went away"));
    }
    Ok(ready > 0)
}

/// Switch an LED, logging instead of failing
pub(crate) fn switch_led<D: LedControl + ?Sized>(device: &mut D, key: Key, led: LedType, on: bool) {
    match device.set_led(led, on) {
        Ok(()) => log::debug!("LED {} for key: {:?}", if on { "on" } else { "off" }, key),
        Err(e) => log::warn!("Failed to switch {:?} for key {:?}: {}", led, key, e),
    }
}

/// Identity of an input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceInfo {
    fn from_device(path: PathBuf, device: &Device) -> Self {
        let id = device.input_id();
        Self {
            path,
            name: device.name().unwrap_or("unknown").to_string(),
            vendor_id: id.vendor(),
            product_id: id.product(),
        }
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} [{:04x}:{:04x}]",
            self.path.display(),
            self.name,
            self.vendor_id,
            self.product_id
        )
    }
}

/// List every input device we are allowed to open
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices: Vec<DeviceInfo> = evdev::enumerate()
        .map(|(path, device)| DeviceInfo::from_device(path, &device))
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}

/// An evdev keyboard: the input source, grab controller and LED controller
pub struct KeyboardDevice {
    device: Device,
    info: DeviceInfo,
}

impl KeyboardDevice {
    /// Open a device node directly
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let device = Device::open(&path)?;
        let info = DeviceInfo::from_device(path, &device);
        Ok(Self { device, info })
    }

    /// Find the keyboard by USB vendor and product id
    ///
    /// Boards usually expose several event nodes under the same id (keys,
    /// media keys, mouse). A node that reports letter keys wins; otherwise the
    /// first node in path order is used.
    pub fn find(vendor_id: u16, product_id: u16) -> Result<Self> {
        let mut candidates: Vec<(DeviceInfo, Device)> = evdev::enumerate()
            .map(|(path, device)| (DeviceInfo::from_device(path, &device), device))
            .filter(|(info, _)| info.matches(vendor_id, product_id))
            .collect();
        candidates.sort_by(|a, b| a.0.path.cmp(&b.0.path));
        if candidates.is_empty() {
            return Err(Error::DeviceNotFound { vendor_id, product_id });
        }

        let index = candidates
            .iter()
            .position(|(_, device)| {
                device
                    .supported_keys()
                    .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_TAB))
            })
            .unwrap_or(0);
        let (info, device) = candidates.swap_remove(index);
        log::info!("Found keyboard device: {} at {}", info.name, info.path.display());
        Ok(Self { device, info })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Block until the device delivers events, returning the key presses
    /// and releases among them
    pub fn fetch_key_events(&mut self) -> Result<Vec<KeyEvent>> {
        let events = self.device.fetch_events()?;
        Ok(events.filter_map(|event| key_event(&event)).collect())
    }
}

/// Extract a press or release from a raw event; repeats and non-key events
/// yield `None`
pub fn key_event(event: &InputEvent) -> Option<KeyEvent> {
    match event.kind() {
        InputEventKind::Key(key) => KeyEvent::from_raw(key, event.value()),
        _ => None,
    }
}

impl KeySource for KeyboardDevice {
    fn poll_key_events(&mut self, timeout: Duration) -> Result<Vec<KeyEvent>> {
        if wait_readable(self.device.as_raw_fd(), timeout)? {
            self.fetch_key_events()
        } else {
            Ok(Vec::new())
        }
    }
}

impl GrabControl for KeyboardDevice {
    fn grab(&mut self) -> Result<()> {
        self.device.grab().map_err(Error::Grab)
    }

    fn ungrab(&mut self) -> Result<()> {
        self.device.ungrab().map_err(Error::Ungrab)
    }
}

impl LedControl for KeyboardDevice {
    fn set_led(&mut self, led: LedType, on: bool) -> Result<()> {
        let event = InputEvent::new(EventType::LED, led.0, i32::from(on));
        self.device.send_events(&[event]).map_err(Error::Led)
    }
}
