//! Transport mediums and their bandwidth tiers.
//!
//! The tier table in [`classify`] is fixed: callers branch on the returned
//! [`Quality`], so the mapping must not drift between releases.

use serde::{Deserialize, Serialize};

/// A physical or radio transport.
///
/// Discriminants follow the wire numbering used by the connections protocol,
/// see [`Medium::from_proto`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Medium {
    Unknown = 0,
    Mdns = 1,
    Bluetooth = 2,
    WifiHotspot = 3,
    Ble = 4,
    WifiLan = 5,
    WifiAware = 6,
    Nfc = 7,
    WifiDirect = 8,
    WebRtc = 9,
    BleL2cap = 10,
    Usb = 11,
    WebRtcNonCellular = 12,
}

impl Medium {
    /// Decode a raw medium number. Values outside the known range decode to
    /// [`Medium::Unknown`].
    pub fn from_proto(value: i32) -> Self {
        match value {
            1 => Medium::Mdns,
            2 => Medium::Bluetooth,
            3 => Medium::WifiHotspot,
            4 => Medium::Ble,
            5 => Medium::WifiLan,
            6 => Medium::WifiAware,
            7 => Medium::Nfc,
            8 => Medium::WifiDirect,
            9 => Medium::WebRtc,
            10 => Medium::BleL2cap,
            11 => Medium::Usb,
            12 => Medium::WebRtcNonCellular,
            _ => Medium::Unknown,
        }
    }

    pub fn as_proto(self) -> i32 {
        self as i32
    }

    /// Bandwidth tier of this medium. Shorthand for [`classify`].
    pub fn quality(self) -> Quality {
        classify(self)
    }
}

impl std::fmt::Display for Medium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Medium::Unknown => "UNKNOWN_MEDIUM",
            Medium::Mdns => "MDNS",
            Medium::Bluetooth => "BLUETOOTH",
            Medium::WifiHotspot => "WIFI_HOTSPOT",
            Medium::Ble => "BLE",
            Medium::WifiLan => "WIFI_LAN",
            Medium::WifiAware => "WIFI_AWARE",
            Medium::Nfc => "NFC",
            Medium::WifiDirect => "WIFI_DIRECT",
            Medium::WebRtc => "WEB_RTC",
            Medium::BleL2cap => "BLE_L2CAP",
            Medium::Usb => "USB",
            Medium::WebRtcNonCellular => "WEB_RTC_NON_CELLULAR",
        };
        f.write_str(name)
    }
}

/// Qualitative bandwidth tier of a medium.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Unknown,
    Low,
    Medium,
    High,
}

/// Map a medium to its bandwidth tier.
pub fn classify(medium: Medium) -> Quality {
    match medium {
        Medium::Usb | Medium::Unknown => Quality::Unknown,
        Medium::Ble | Medium::Nfc => Quality::Low,
        Medium::Bluetooth | Medium::BleL2cap => Quality::Medium,
        Medium::WifiHotspot
        | Medium::WifiLan
        | Medium::WifiAware
        | Medium::WifiDirect
        | Medium::WebRtc => Quality::High,
        Medium::Mdns | Medium::WebRtcNonCellular => Quality::Unknown,
    }
}

/// Per-medium allow list used by the option structs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediumSelector {
    pub bluetooth: bool,
    pub ble: bool,
    pub web_rtc: bool,
    pub wifi_lan: bool,
    pub wifi_hotspot: bool,
    pub wifi_direct: bool,
    pub wifi_aware: bool,
}

impl MediumSelector {
    /// Selector with every medium set to `value`.
    pub fn all(value: bool) -> Self {
        Self {
            bluetooth: value,
            ble: value,
            web_rtc: value,
            wifi_lan: value,
            wifi_hotspot: value,
            wifi_direct: value,
            wifi_aware: value,
        }
    }

    /// Selector allowing exactly one medium.
    pub fn only(medium: Medium) -> Self {
        let mut selector = Self::all(false);
        selector.set(medium, true);
        selector
    }

    pub fn set(&mut self, medium: Medium, value: bool) {
        match medium {
            Medium::Bluetooth => self.bluetooth = value,
            Medium::Ble => self.ble = value,
            Medium::WebRtc => self.web_rtc = value,
            Medium::WifiLan => self.wifi_lan = value,
            Medium::WifiHotspot => self.wifi_hotspot = value,
            Medium::WifiDirect => self.wifi_direct = value,
            Medium::WifiAware => self.wifi_aware = value,
            _ => {}
        }
    }

    pub fn is_allowed(&self, medium: Medium) -> bool {
        self.mediums().contains(&medium)
    }

    /// True if at least one medium is allowed.
    pub fn any(&self) -> bool {
        self.count() > 0
    }

    pub fn count(&self) -> usize {
        self.mediums().len()
    }

    /// Allowed mediums in preference order.
    pub fn mediums(&self) -> Vec<Medium> {
        let mut out = Vec::with_capacity(7);
        if self.wifi_aware {
            out.push(Medium::WifiAware);
        }
        if self.wifi_lan {
            out.push(Medium::WifiLan);
        }
        if self.wifi_direct {
            out.push(Medium::WifiDirect);
        }
        if self.wifi_hotspot {
            out.push(Medium::WifiHotspot);
        }
        if self.web_rtc {
            out.push(Medium::WebRtc);
        }
        if self.bluetooth {
            out.push(Medium::Bluetooth);
        }
        if self.ble {
            out.push(Medium::Ble);
        }
        out
    }
}
