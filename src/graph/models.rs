//! Typed mirrors of the Graph resources intunectl reads.
//!
//! Only the fields the commands use are declared; everything else in the
//! Graph payload is ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generic paginated response from Graph API
///
/// Standard OData collection with `value` array and `@odata.nextLink`
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.count")]
    pub count: Option<i64>,
}

/// `microsoft.graph.managedDevice`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedDevice {
    pub id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub compliance_state: Option<String>,
    #[serde(default)]
    pub last_sync_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_storage_space_in_bytes: Option<i64>,
    #[serde(default)]
    pub free_storage_space_in_bytes: Option<i64>,
}

impl ManagedDevice {
    pub fn display_name(&self) -> &str {
        self.device_name.as_deref().unwrap_or(&self.id)
    }
}

/// `microsoft.graph.deviceHealthScript` (beta)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHealthScript {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub run_as_account: Option<String>,
    #[serde(default, rename = "runAs32Bit")]
    pub run_as_32_bit: bool,
    #[serde(default)]
    pub enforce_signature_check: bool,
    #[serde(default)]
    pub is_global_script: bool,
    #[serde(default)]
    pub detection_script_content: Option<String>,
    #[serde(default)]
    pub remediation_script_content: Option<String>,
    #[serde(default)]
    pub last_modified_date_time: Option<DateTime<Utc>>,
}

/// `microsoft.graph.deviceCompliancePolicy` and its platform subtypes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompliancePolicy {
    pub id: String,
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    pub display_name: String,
    #[serde(default)]
    pub os_minimum_version: Option<String>,
    #[serde(default)]
    pub os_maximum_version: Option<String>,
    #[serde(default)]
    pub valid_operating_system_build_ranges: Option<Vec<OperatingSystemBuildRange>>,
}

/// `microsoft.graph.operatingSystemVersionRange`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperatingSystemBuildRange {
    #[serde(default)]
    pub description: Option<String>,
    pub lowest_version: String,
    pub highest_version: String,
}

/// `microsoft.graph.deviceAndAppManagementAssignmentFilter`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFilter {
    #[serde(default)]
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub platform: String,
    pub rule: String,
}

/// `microsoft.graph.deviceManagementConfigurationPolicy` (beta)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationPolicy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub platforms: Option<String>,
    #[serde(default)]
    pub technologies: Option<String>,
    #[serde(default)]
    pub setting_count: Option<i64>,
    #[serde(default)]
    pub template_reference: Option<Value>,
}

/// `microsoft.graph.printerShare`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintShare {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub printer: Option<PrinterRef>,
    #[serde(default)]
    pub allow_all_users: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterRef {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_managed_device_parses_graph_payload() {
        let raw = json!({
            "id": "0d5a1c0e-2b3f-4f0a-9f6b-5e1c8a7d4a11",
            "deviceName": "DESKTOP-4QF1",
            "userPrincipalName": "ada@contoso.com",
            "operatingSystem": "Windows",
            "osVersion": "10.0.22631.4317",
            "model": "Latitude 7440",
            "manufacturer": "Dell Inc.",
            "serialNumber": "8XK2M34",
            "complianceState": "compliant",
            "lastSyncDateTime": "2024-10-01T08:15:30Z",
            "totalStorageSpaceInBytes": 511_101_108_224i64,
            "freeStorageSpaceInBytes": 12_884_901_888i64,
            "azureADDeviceId": "ignored"
        });

        let device: ManagedDevice = serde_json::from_value(raw).unwrap();
        assert_eq!(device.display_name(), "DESKTOP-4QF1");
        assert_eq!(device.os_version.as_deref(), Some("10.0.22631.4317"));
        assert_eq!(device.total_storage_space_in_bytes, Some(511_101_108_224));
        assert_eq!(device.free_storage_space_in_bytes, Some(12_884_901_888));
        assert_eq!(
            device.last_sync_date_time.unwrap().to_rfc3339(),
            "2024-10-01T08:15:30+00:00"
        );
    }

    #[test]
    fn test_managed_device_tolerates_missing_fields() {
        let device: ManagedDevice = serde_json::from_value(json!({ "id": "abc" })).unwrap();
        assert_eq!(device.display_name(), "abc");
        assert!(device.free_storage_space_in_bytes.is_none());
    }

    #[test]
    fn test_health_script_run_as_32_bit_rename() {
        let script: DeviceHealthScript = serde_json::from_value(json!({
            "id": "1",
            "displayName": "Fix",
            "runAs32Bit": true,
            "isGlobalScript": false
        }))
        .unwrap();
        assert!(script.run_as_32_bit);
    }
}
