//! Intune Graph API operations
//!
//! Thin endpoint wrappers over [`GraphClient`] for the resources the
//! commands touch. Device health scripts, assignment filters and Settings
//! Catalog policies only exist on the beta endpoint.

use crate::error::Result;
use crate::graph::GraphClient;
use crate::graph::models::{
    AssignmentFilter, CompliancePolicy, ConfigurationPolicy, DeviceHealthScript, ManagedDevice,
    PrintShare,
};
use serde_json::{Value, json};

const HEALTH_SCRIPTS: &str = "deviceManagement/deviceHealthScripts";
const COMPLIANCE_POLICIES: &str = "deviceManagement/deviceCompliancePolicies";
const ASSIGNMENT_FILTERS: &str = "deviceManagement/assignmentFilters";
const CONFIGURATION_POLICIES: &str = "deviceManagement/configurationPolicies";
const MANAGED_DEVICES: &str = "deviceManagement/managedDevices";

/// Fields requested when fetching a single device's storage figures
pub const DEVICE_STORAGE_SELECT: &str = "id,deviceName,userPrincipalName,operatingSystem,osVersion,model,manufacturer,serialNumber,lastSyncDateTime,totalStorageSpaceInBytes,freeStorageSpaceInBytes";

// Device health scripts

pub async fn list_health_scripts(client: &GraphClient) -> Result<Vec<DeviceHealthScript>> {
    client.get_all_pages_beta(HEALTH_SCRIPTS).await
}

pub async fn get_health_script(client: &GraphClient, id: &str) -> Result<DeviceHealthScript> {
    client.get_beta(&format!("{}/{}", HEALTH_SCRIPTS, id)).await
}

pub async fn create_health_script(
    client: &GraphClient,
    body: &Value,
) -> Result<DeviceHealthScript> {
    client.post_beta(HEALTH_SCRIPTS, body).await
}

pub async fn update_health_script(client: &GraphClient, id: &str, body: &Value) -> Result<()> {
    let _: Value = client
        .patch_beta(&format!("{}/{}", HEALTH_SCRIPTS, id), body)
        .await?;
    Ok(())
}

/// Assign a health script to a group with a daily schedule
pub async fn assign_health_script(client: &GraphClient, id: &str, group_id: &str) -> Result<()> {
    let assignment = json!({
        "deviceHealthScriptAssignments": [{
            "@odata.type": "#microsoft.graph.deviceHealthScriptAssignment",
            "target": {
                "@odata.type": "#microsoft.graph.groupAssignmentTarget",
                "groupId": group_id
            },
            "runRemediationScript": true,
            "runSchedule": {
                "@odata.type": "#microsoft.graph.deviceHealthScriptDailySchedule",
                "interval": 1,
                "time": "01:00:00.0000000",
                "useUtc": true
            }
        }]
    });

    let _: Value = client
        .post_beta(&format!("{}/{}/assign", HEALTH_SCRIPTS, id), &assignment)
        .await?;
    Ok(())
}

// Compliance policies

pub async fn list_compliance_policies(client: &GraphClient) -> Result<Vec<CompliancePolicy>> {
    client.get_all_pages_beta(COMPLIANCE_POLICIES).await
}

pub async fn update_compliance_policy(client: &GraphClient, id: &str, body: &Value) -> Result<()> {
    let _: Value = client
        .patch_beta(&format!("{}/{}", COMPLIANCE_POLICIES, id), body)
        .await?;
    Ok(())
}

// Assignment filters

pub async fn list_assignment_filters(client: &GraphClient) -> Result<Vec<AssignmentFilter>> {
    client.get_all_pages_beta(ASSIGNMENT_FILTERS).await
}

pub async fn create_assignment_filter(
    client: &GraphClient,
    filter: &AssignmentFilter,
) -> Result<AssignmentFilter> {
    let body = json!({
        "displayName": filter.display_name,
        "description": filter.description,
        "platform": filter.platform,
        "rule": filter.rule,
        "roleScopeTags": ["0"]
    });
    client.post_beta(ASSIGNMENT_FILTERS, &body).await
}

pub async fn update_assignment_filter_rule(
    client: &GraphClient,
    id: &str,
    rule: &str,
) -> Result<()> {
    let _: Value = client
        .patch_beta(
            &format!("{}/{}", ASSIGNMENT_FILTERS, id),
            &json!({ "rule": rule }),
        )
        .await?;
    Ok(())
}

// Settings Catalog configuration policies

pub async fn list_configuration_policies(client: &GraphClient) -> Result<Vec<ConfigurationPolicy>> {
    client.get_all_pages_beta(CONFIGURATION_POLICIES).await
}

/// Settings of a policy with their definitions expanded (display names)
pub async fn get_configuration_policy_settings(
    client: &GraphClient,
    id: &str,
) -> Result<Vec<Value>> {
    client
        .get_all_pages_beta(&format!(
            "{}/{}/settings?$expand=settingDefinitions",
            CONFIGURATION_POLICIES, id
        ))
        .await
}

pub async fn create_configuration_policy(
    client: &GraphClient,
    body: &Value,
) -> Result<ConfigurationPolicy> {
    client.post_beta(CONFIGURATION_POLICIES, body).await
}

pub async fn assign_configuration_policy(
    client: &GraphClient,
    id: &str,
    group_id: &str,
) -> Result<()> {
    let assignment = json!({
        "assignments": [{
            "target": {
                "@odata.type": "#microsoft.graph.groupAssignmentTarget",
                "groupId": group_id
            }
        }]
    });
    let _: Value = client
        .post_beta(&format!("{}/{}/assign", CONFIGURATION_POLICIES, id), &assignment)
        .await?;
    Ok(())
}

// Managed devices

/// List managed devices, optionally filtered by operating system
pub async fn list_managed_devices(
    client: &GraphClient,
    operating_system: Option<&str>,
) -> Result<Vec<ManagedDevice>> {
    let endpoint = match operating_system {
        Some(os) => format!(
            "{}?$filter=operatingSystem eq '{}'&$select=id,deviceName,userPrincipalName,operatingSystem,osVersion",
            MANAGED_DEVICES,
            escape_odata_literal(os)
        ),
        None => format!(
            "{}?$select=id,deviceName,userPrincipalName,operatingSystem,osVersion",
            MANAGED_DEVICES
        ),
    };
    client.get_all_pages(&endpoint).await
}

/// Single device read; the only way Graph returns free storage space
pub async fn get_managed_device_storage(client: &GraphClient, id: &str) -> Result<ManagedDevice> {
    client
        .get(&format!(
            "{}/{}?$select={}",
            MANAGED_DEVICES, id, DEVICE_STORAGE_SELECT
        ))
        .await
}

// Universal Print

pub async fn list_print_shares(client: &GraphClient) -> Result<Vec<PrintShare>> {
    client.get_all_pages("print/shares?$expand=printer").await
}

/// Quote a value for use inside an OData string literal
pub fn escape_odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}
