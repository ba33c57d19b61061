//! Advertising, discovery, connection and listening options.

use serde::{Deserialize, Serialize};

use crate::medium::{Medium, MediumSelector};

/// Default keep-alive interval applied by [`ConnectionOptions::compatible_options`].
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MILLIS: u32 = 5_000;

/// Default keep-alive timeout applied by [`ConnectionOptions::compatible_options`].
pub const DEFAULT_KEEP_ALIVE_TIMEOUT_MILLIS: u32 = 30_000;

/// Connection topology.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    P2pCluster,
    P2pStar,
    P2pPointToPoint,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvertisingOptions {
    pub strategy: Strategy,
    pub allowed: MediumSelector,
    pub auto_upgrade_bandwidth: bool,
    pub enforce_topology_constraints: bool,
    pub low_power: bool,
    pub enable_bluetooth_listening: bool,
    pub enable_webrtc_listening: bool,
    /// Advertising intended to be paired with endpoint injection
    pub is_out_of_band_connection: bool,
    pub fast_advertisement_service_uuid: Option<String>,
}

impl AdvertisingOptions {
    /// Copy with normalised mediums.
    ///
    /// Out-of-band advertising keeps exactly one medium, Bluetooth when none
    /// was chosen. Otherwise an empty selector means every medium.
    pub fn compatible_options(&self) -> Self {
        let mut out = self.clone();
        out.allowed = normalize_allowed(&self.allowed, self.is_out_of_band_connection);
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub strategy: Strategy,
    pub allowed: MediumSelector,
    pub low_power: bool,
    pub is_out_of_band_connection: bool,
    pub fast_advertisement_service_uuid: Option<String>,
}

impl DiscoveryOptions {
    /// Same normalisation as [`AdvertisingOptions::compatible_options`].
    pub fn compatible_options(&self) -> Self {
        let mut out = self.clone();
        out.allowed = normalize_allowed(&self.allowed, self.is_out_of_band_connection);
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub strategy: Strategy,
    pub allowed: MediumSelector,
    pub auto_upgrade_bandwidth: bool,
    pub enforce_topology_constraints: bool,
    pub low_power: bool,
    pub remote_bluetooth_mac_address: Option<Vec<u8>>,
    /// 0 means "use the default"
    pub keep_alive_interval_millis: u32,
    /// 0 means "use the default"
    pub keep_alive_timeout_millis: u32,
}

impl ConnectionOptions {
    /// Copy with default keep-alive values filled in and an empty medium
    /// selector widened to every medium.
    pub fn compatible_options(&self) -> Self {
        let mut out = self.clone();
        if out.keep_alive_interval_millis == 0 {
            out.keep_alive_interval_millis = DEFAULT_KEEP_ALIVE_INTERVAL_MILLIS;
        }
        if out.keep_alive_timeout_millis == 0 {
            out.keep_alive_timeout_millis = DEFAULT_KEEP_ALIVE_TIMEOUT_MILLIS;
        }
        out.allowed = normalize_allowed(&self.allowed, false);
        out
    }

    /// Allowed mediums in preference order.
    pub fn mediums(&self) -> Vec<Medium> {
        self.allowed.mediums()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionListeningOptions {
    pub strategy: Strategy,
    pub enable_ble_listening: bool,
    pub enable_bluetooth_listening: bool,
    pub enable_wlan_listening: bool,
}

fn normalize_allowed(allowed: &MediumSelector, out_of_band: bool) -> MediumSelector {
    if out_of_band {
        return match allowed.mediums().first() {
            Some(medium) => MediumSelector::only(*medium),
            None => MediumSelector::only(Medium::Bluetooth),
        };
    }
    if allowed.any() {
        *allowed
    } else {
        MediumSelector::all(true)
    }
}
