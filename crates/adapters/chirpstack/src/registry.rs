//! [`DeviceRegistry`] backed by the ChirpStack API.

use std::collections::BTreeMap;
use std::future::Future;

use tracing::{debug, error, info, instrument};

use chirpbridge_app::ports::registry::DeviceRegistry;
use chirpbridge_domain::device::DeviceRecord;
use chirpbridge_domain::entity::EntitySchema;
use chirpbridge_domain::error::BridgeError;

use crate::api::{ChirpstackApi, DeviceListItem, DeviceProfile};
use crate::codec::{self, DiscoverySchema};
use crate::config::ChirpstackConfig;
use crate::error::{ChirpstackError, SchemaError};

/// Field restored from the last reported device status.
pub const BATTERY_LEVEL_FIELD: &str = "batteryLevel";

/// Devices of one ChirpStack application.
#[derive(Debug, Clone)]
pub struct ChirpstackRegistry<A> {
    api: A,
    application_id: String,
}

impl<A: ChirpstackApi> ChirpstackRegistry<A> {
    pub fn new(api: A, application_id: impl Into<String>) -> Self {
        Self {
            api,
            application_id: application_id.into(),
        }
    }

    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    #[instrument(skip(self), fields(application_id = %self.application_id))]
    async fn fetch(&self) -> Result<Vec<DeviceRecord>, ChirpstackError> {
        let listed = self.api.list_devices(&self.application_id).await?;
        let mut profiles: BTreeMap<String, DeviceProfile> = BTreeMap::new();
        let mut records = Vec::with_capacity(listed.len());

        for item in listed {
            let device = self.api.get_device(&item.dev_eui).await?;
            if device.is_disabled {
                debug!(dev_eui = %item.dev_eui, "device disabled, skipped");
                continue;
            }

            if !profiles.contains_key(&item.device_profile_id) {
                let profile = self.api.get_device_profile(&item.device_profile_id).await?;
                profiles.insert(item.device_profile_id.clone(), profile);
            }
            let Some(profile) = profiles.get(&item.device_profile_id) else {
                continue;
            };

            match build_record(&item, profile) {
                Ok(record) => records.push(record),
                Err(err) => {
                    error!(
                        dev_eui = %item.dev_eui,
                        device = %item.name,
                        profile = %profile.name,
                        error = %err,
                        "discovery codec missing or faulty, device ignored"
                    );
                    if let SchemaError::InvalidJson { json, .. } = &err {
                        debug!(profile = %profile.name, %json, "codec converted to");
                    }
                }
            }
        }

        info!(count = records.len(), "devices fetched");
        Ok(records)
    }
}

impl<A: ChirpstackApi> DeviceRegistry for ChirpstackRegistry<A> {
    fn current_devices(
        &self,
    ) -> impl Future<Output = Result<Vec<DeviceRecord>, BridgeError>> + Send {
        async move { self.fetch().await.map_err(ChirpstackError::into_domain) }
    }
}

/// Assemble a device record from a listed device and its profile.
fn build_record(item: &DeviceListItem, profile: &DeviceProfile) -> Result<DeviceRecord, SchemaError> {
    let DiscoverySchema { device, entities } = codec::parse_schema(&profile.payload_codec_script)?;

    let mut builder = DeviceRecord::builder()
        .dev_eui(&item.dev_eui)
        .name(&item.name)
        .device(device);
    if let Some(version) = format_mac_version(&profile.mac_version) {
        builder = builder.mac_version(version);
    }
    for entity in &entities {
        if let Some(measurement) = profile.measurements.get(&entity.entity_id) {
            builder = builder.measurement_name(&entity.entity_id, &measurement.name);
        }
    }
    if let Some(status) = item
        .device_status
        .as_ref()
        .filter(|status| !status.external_power_source)
    {
        builder = builder.previous_value(BATTERY_LEVEL_FIELD, status.battery_level);
    }

    builder
        .entities(entities.into_iter().map(EntitySchema::with_default_value_template))
        .build()
        .map_err(SchemaError::from)
}

/// `LORAWAN_1_0_3` becomes `LORAWAN 1.0.3`.
fn format_mac_version(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    Some(raw.replacen('_', " ", 1).replace('_', "."))
}

/// Resolve the application id from configuration.
///
/// An explicit `application_id` wins. Otherwise the tenant and application
/// are looked up by name; a single candidate is selected regardless of its
/// name.
///
/// # Errors
///
/// Returns an error when nothing can be listed or no name matches.
#[instrument(skip_all)]
pub async fn resolve_application_id<A: ChirpstackApi>(
    api: &A,
    config: &ChirpstackConfig,
) -> Result<String, ChirpstackError> {
    if let Some(id) = config.application_id.as_deref().filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }

    let tenants = api.list_tenants().await?;
    let tenant_id = select(tenants, &config.tenant)
        .map_err(|missing| missing.map_or(ChirpstackError::NoTenants, ChirpstackError::TenantNotFound))?;

    let applications = api.list_applications(&tenant_id).await?;
    let application_id = select(applications, &config.application).map_err(|missing| {
        missing.map_or(ChirpstackError::NoApplications, ChirpstackError::ApplicationNotFound)
    })?;

    info!(%tenant_id, %application_id, "application resolved");
    Ok(application_id)
}

/// Pick an id by name. `Err(None)` when empty, `Err(Some(name))` when no match.
fn select(candidates: BTreeMap<String, String>, wanted: &str) -> Result<String, Option<String>> {
    if candidates.len() == 1 {
        return candidates.into_values().next().ok_or(None);
    }
    if candidates.is_empty() {
        return Err(None);
    }
    candidates
        .into_iter()
        .find_map(|(name, id)| (name == wanted).then_some(id))
        .ok_or_else(|| Some(wanted.to_string()))
}
