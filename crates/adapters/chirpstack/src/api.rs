//! ChirpStack API port and response models.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::ChirpstackError;

/// One page of a list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default)]
    pub total_count: u32,
    #[serde(default = "Vec::new")]
    pub result: Vec<T>,
}

/// Id/name pair returned by the tenant and application lists.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedItem {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(default)]
    pub external_power_source: bool,
    #[serde(default)]
    pub battery_level: f64,
}

/// Device as returned by the device list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListItem {
    pub dev_eui: String,
    #[serde(default)]
    pub name: String,
    pub device_profile_id: String,
    #[serde(default)]
    pub device_status: Option<DeviceStatus>,
}

/// Device details.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub dev_eui: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_disabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Measurement {
    #[serde(default)]
    pub name: String,
}

/// Device profile details.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    #[serde(default)]
    pub name: String,
    /// Enum name, e.g. `LORAWAN_1_0_3`.
    #[serde(default)]
    pub mac_version: String,
    #[serde(default)]
    pub payload_codec_script: String,
    #[serde(default)]
    pub measurements: BTreeMap<String, Measurement>,
}

/// Read access to the ChirpStack API.
pub trait ChirpstackApi: Send + Sync {
    /// Tenant ids keyed by name.
    fn list_tenants(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, ChirpstackError>> + Send;

    /// Application ids of a tenant keyed by name.
    fn list_applications(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, ChirpstackError>> + Send;

    fn list_devices(
        &self,
        application_id: &str,
    ) -> impl Future<Output = Result<Vec<DeviceListItem>, ChirpstackError>> + Send;

    fn get_device(
        &self,
        dev_eui: &str,
    ) -> impl Future<Output = Result<Device, ChirpstackError>> + Send;

    fn get_device_profile(
        &self,
        profile_id: &str,
    ) -> impl Future<Output = Result<DeviceProfile, ChirpstackError>> + Send;
}

impl<T: ChirpstackApi> ChirpstackApi for Arc<T> {
    fn list_tenants(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, ChirpstackError>> + Send {
        (**self).list_tenants()
    }

    fn list_applications(
        &self,
        tenant_id: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, ChirpstackError>> + Send {
        (**self).list_applications(tenant_id)
    }

    fn list_devices(
        &self,
        application_id: &str,
    ) -> impl Future<Output = Result<Vec<DeviceListItem>, ChirpstackError>> + Send {
        (**self).list_devices(application_id)
    }

    fn get_device(
        &self,
        dev_eui: &str,
    ) -> impl Future<Output = Result<Device, ChirpstackError>> + Send {
        (**self).get_device(dev_eui)
    }

    fn get_device_profile(
        &self,
        profile_id: &str,
    ) -> impl Future<Output = Result<DeviceProfile, ChirpstackError>> + Send {
        (**self).get_device_profile(profile_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_decode_device_list_page() {
        let page: ListResponse<DeviceListItem> = serde_json::from_value(serde_json::json!({
            "totalCount": 2,
            "result": [
                {
                    "devEui": "0004a30b001c0530",
                    "name": "Garden",
                    "deviceProfileId": "p1",
                    "deviceStatus": {"externalPowerSource": false, "batteryLevel": 93.0}
                },
                {"devEui": "0004a30b001c0531", "deviceProfileId": "p1"}
            ]
        }))
        .unwrap();
        assert_eq!(page.total_count, 2);
        let status = page.result[0].device_status.as_ref().unwrap();
        assert!((status.battery_level - 93.0).abs() < f64::EPSILON);
        assert!(page.result[1].device_status.is_none());
        assert!(page.result[1].name.is_empty());
    }

    #[test]
    fn should_decode_profile_with_measurements() {
        let profile: DeviceProfile = serde_json::from_value(serde_json::json!({
            "name": "TH",
            "macVersion": "LORAWAN_1_0_3",
            "payloadCodecScript": "function getHaDeviceInfo() {}",
            "measurements": {"temp": {"name": "Temperature", "kind": "GAUGE"}}
        }))
        .unwrap();
        assert_eq!(profile.mac_version, "LORAWAN_1_0_3");
        assert_eq!(profile.measurements["temp"].name, "Temperature");
    }

    #[test]
    fn should_default_missing_list_fields() {
        let page: ListResponse<NamedItem> = serde_json::from_str("{}").unwrap();
        assert_eq!(page.total_count, 0);
        assert!(page.result.is_empty());
    }
}
