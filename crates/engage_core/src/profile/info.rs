//! Typed device and person profiles.

use super::record::ProfileRecord;
use engage_codec::{Map, Value};
use serde::{Deserialize, Serialize};

/// Information about the device the host app runs on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Operating system name.
    pub os_name: Option<String>,
    /// Operating system version.
    pub os_version: Option<String>,
    /// Operating system build.
    pub os_build: Option<String>,
    /// Platform API level.
    pub os_api_level: Option<String>,
    /// Manufacturer.
    pub manufacturer: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Board name.
    pub board: Option<String>,
    /// Product name.
    pub product: Option<String>,
    /// Brand.
    pub brand: Option<String>,
    /// CPU ABI.
    pub cpu: Option<String>,
    /// Device code name.
    pub device: Option<String>,
    /// Stable per-install identifier.
    pub uuid: Option<String>,
    /// Build type, such as `user`.
    pub build_type: Option<String>,
    /// Build id.
    pub build_id: Option<String>,
    /// SIM carrier.
    pub carrier: Option<String>,
    /// Network carrier.
    pub current_carrier: Option<String>,
    /// Network type.
    pub network_type: Option<String>,
    /// Bootloader version.
    pub bootloader_version: Option<String>,
    /// Radio firmware version.
    pub radio_version: Option<String>,
    /// Locale country code.
    pub locale_country_code: Option<String>,
    /// Locale language code.
    pub locale_language_code: Option<String>,
    /// Full locale string.
    pub locale_raw: Option<String>,
    /// UTC offset in seconds.
    pub utc_offset: Option<String>,
    /// App-supplied custom data.
    #[serde(default)]
    pub custom_data: Map,
    /// Third-party integration settings.
    #[serde(default)]
    pub integration_config: Map,
}

impl DeviceInfo {
    /// Converts to a profile record. Unset fields are omitted; both submaps
    /// are always present.
    pub fn to_record(&self) -> ProfileRecord {
        let fields = [
            ("os_name", &self.os_name),
            ("os_version", &self.os_version),
            ("os_build", &self.os_build),
            ("os_api_level", &self.os_api_level),
            ("manufacturer", &self.manufacturer),
            ("model", &self.model),
            ("board", &self.board),
            ("product", &self.product),
            ("brand", &self.brand),
            ("cpu", &self.cpu),
            ("device", &self.device),
            ("uuid", &self.uuid),
            ("build_type", &self.build_type),
            ("build_id", &self.build_id),
            ("carrier", &self.carrier),
            ("current_carrier", &self.current_carrier),
            ("network_type", &self.network_type),
            ("bootloader_version", &self.bootloader_version),
            ("radio_version", &self.radio_version),
            ("locale_country_code", &self.locale_country_code),
            ("locale_language_code", &self.locale_language_code),
            ("locale_raw", &self.locale_raw),
            ("utc_offset", &self.utc_offset),
        ];
        let mut record = text_fields(fields);
        record.insert("custom_data", Value::Map(self.custom_data.clone()));
        record.insert(
            "integration_config",
            Value::Map(self.integration_config.clone()),
        );
        record
    }
}

/// Information about the app user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonInfo {
    /// Host-assigned user id.
    pub id: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Facebook id.
    pub facebook_id: Option<String>,
    /// Phone number.
    pub phone_number: Option<String>,
    /// Street address.
    pub street: Option<String>,
    /// City.
    pub city: Option<String>,
    /// Postal code.
    pub zip: Option<String>,
    /// Country.
    pub country: Option<String>,
    /// Birthday, as supplied by the host.
    pub birthday: Option<String>,
    /// App-supplied custom data.
    #[serde(default)]
    pub custom_data: Map,
}

impl PersonInfo {
    /// Converts to a profile record. Unset fields are omitted; `custom_data`
    /// is always present.
    pub fn to_record(&self) -> ProfileRecord {
        let fields = [
            ("id", &self.id),
            ("email", &self.email),
            ("name", &self.name),
            ("facebook_id", &self.facebook_id),
            ("phone_number", &self.phone_number),
            ("street", &self.street),
            ("city", &self.city),
            ("zip", &self.zip),
            ("country", &self.country),
            ("birthday", &self.birthday),
        ];
        let mut record = text_fields(fields);
        record.insert("custom_data", Value::Map(self.custom_data.clone()));
        record
    }
}

fn text_fields<'a, I>(fields: I) -> ProfileRecord
where
    I: IntoIterator<Item = (&'static str, &'a Option<String>)>,
{
    let mut record = ProfileRecord::new();
    for (key, value) in fields {
        if let Some(value) = value {
            record.insert(key, value.as_str());
        }
    }
    record
}
