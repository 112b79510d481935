//! Command flows against a mocked Graph
//!
//! Each test drives a command's library entry point with a real
//! `GraphClient` pointed at wiremock.

use base64::{Engine as _, engine::general_purpose};
use intunectl::cmd::baseline::{self, DiffStatus};
use intunectl::cmd::compliance::{self, OsTargets};
use intunectl::cmd::devices::{self, DiskStatus, DiskThreshold};
use intunectl::cmd::health_scripts::{self, SyncOptions};
use intunectl::cmd::printers;
use intunectl::graph::GraphClient;
use intunectl::graph::models::PrintShare;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    let client = GraphClient::with_base_urls(
        "test-token".into(),
        &format!("{}/v1.0", server.uri()),
        &format!("{}/beta", server.uri()),
    );
    (server, client)
}

fn ok(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

// Health scripts

fn write_package(root: &Path, name: &str, detection: &str, remediation: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("detect.ps1"), detection).unwrap();
    fs::write(dir.join("remediate.ps1"), remediation).unwrap();
}

fn remote_script(id: &str, name: &str, detection: &str, remediation: &str) -> Value {
    json!({
        "id": id,
        "displayName": name,
        "description": format!("Synced from {}", name),
        "publisher": "IT Department",
        "runAsAccount": "system",
        "runAs32Bit": false,
        "enforceSignatureCheck": false,
        "isGlobalScript": false,
        "detectionScriptContent": general_purpose::STANDARD.encode(detection),
        "remediationScriptContent": general_purpose::STANDARD.encode(remediation)
    })
}

#[tokio::test]
async fn test_sync_creates_new_and_skips_unchanged() {
    let (server, client) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "Fix-Spooler", "exit 1", "Restart-Service Spooler");
    write_package(dir.path(), "Clear-Temp", "exit 0", "Remove-Item $env:TEMP\\*");

    // Names match case-insensitively
    let mut existing = remote_script("hs-1", "Clear-Temp", "exit 0", "Remove-Item $env:TEMP\\*");
    existing["displayName"] = json!("clear-temp");

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ok(json!({ "value": [existing] })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .and(body_partial_json(json!({
            "displayName": "Fix-Spooler",
            "roleScopeTagIds": ["0"],
            "detectionScriptContent": general_purpose::STANDARD.encode("exit 1")
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "hs-new",
            "displayName": "Fix-Spooler"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let (packages, skipped) = health_scripts::discover_packages(dir.path()).unwrap();
    assert!(skipped.is_empty());

    let summary = health_scripts::sync_packages(&client, &packages, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.created, vec!["Fix-Spooler".to_string()]);
    assert_eq!(summary.unchanged, vec!["Clear-Temp".to_string()]);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn test_sync_patches_changed_script_with_package_body() {
    let (server, client) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "Fix-Spooler", "exit 1 # v2", "Restart-Service Spooler");

    let (packages, _) = health_scripts::discover_packages(dir.path()).unwrap();
    let expected_body = health_scripts::patch_body(&packages[0], "IT Department");

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ok(json!({
            "value": [{ "id": "hs-1", "displayName": "Fix-Spooler", "isGlobalScript": false }]
        })))
        .mount(&server)
        .await;

    // List responses without script bodies force a full read
    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/deviceHealthScripts/hs-1"))
        .respond_with(ok(remote_script("hs-1", "Fix-Spooler", "exit 1", "Restart-Service Spooler")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/beta/deviceManagement/deviceHealthScripts/hs-1"))
        .and(body_json(&expected_body))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let summary = health_scripts::sync_packages(&client, &packages, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.updated, vec!["Fix-Spooler".to_string()]);
}

#[tokio::test]
async fn test_sync_never_touches_global_scripts_and_counts_failures() {
    let (server, client) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "Restart Office Click-to-run service", "exit 1", "x");
    write_package(dir.path(), "Broken-Upload", "exit 1", "x");

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ok(json!({
            "value": [{
                "id": "ms-1",
                "displayName": "Restart Office Click-to-run service",
                "publisher": "Microsoft",
                "isGlobalScript": true
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "BadRequest", "message": "Invalid script" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (packages, _) = health_scripts::discover_packages(dir.path()).unwrap();
    let summary = health_scripts::sync_packages(&client, &packages, &SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.skipped, vec!["Restart Office Click-to-run service".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "Broken-Upload");
}

async fn mount_create(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ok(json!({ "value": [] })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "hs-new",
            "displayName": "Fix-Spooler"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sync_assigns_created_scripts_daily() {
    let (server, client) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "Fix-Spooler", "exit 1", "x");
    mount_create(&server).await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts/hs-new/assign"))
        .and(body_partial_json(json!({
            "deviceHealthScriptAssignments": [{
                "target": { "groupId": "grp-1" },
                "runRemediationScript": true,
                "runSchedule": {
                    "@odata.type": "#microsoft.graph.deviceHealthScriptDailySchedule",
                    "interval": 1
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let (packages, _) = health_scripts::discover_packages(dir.path()).unwrap();
    let options = SyncOptions {
        group_id: Some("grp-1".into()),
        ..Default::default()
    };
    let summary = health_scripts::sync_packages(&client, &packages, &options).await.unwrap();
    assert_eq!(summary.created, vec!["Fix-Spooler".to_string()]);
    assert!(summary.failed.is_empty());
}

#[tokio::test]
async fn test_sync_counts_failed_assignment() {
    let (server, client) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "Fix-Spooler", "exit 1", "x");
    mount_create(&server).await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/deviceHealthScripts/hs-new/assign"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "BadRequest", "message": "Group not found" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (packages, _) = health_scripts::discover_packages(dir.path()).unwrap();
    let options = SyncOptions {
        group_id: Some("missing-group".into()),
        ..Default::default()
    };
    let summary = health_scripts::sync_packages(&client, &packages, &options).await.unwrap();
    assert!(summary.created.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "Fix-Spooler");
}

#[tokio::test]
async fn test_sync_dry_run_writes_nothing() {
    let (server, client) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    write_package(dir.path(), "Fix-Spooler", "exit 1", "x");

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/deviceHealthScripts"))
        .respond_with(ok(json!({ "value": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let (packages, _) = health_scripts::discover_packages(dir.path()).unwrap();
    let options = SyncOptions {
        dry_run: true,
        ..Default::default()
    };
    let summary = health_scripts::sync_packages(&client, &packages, &options).await.unwrap();
    assert_eq!(summary.created.len(), 1);
}

// Compliance

#[tokio::test]
async fn test_os_targets_patch_only_drifted_policies() {
    let (server, client) = setup().await;
    let builds = compliance::parse_builds(&["10.0.22631.4317".to_string()]).unwrap();
    let current_ranges = serde_json::to_value(compliance::build_ranges(&builds)).unwrap();

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/deviceCompliancePolicies"))
        .respond_with(ok(json!({
            "value": [
                {
                    "id": "win-old",
                    "@odata.type": "#microsoft.graph.windows10CompliancePolicy",
                    "displayName": "CP - Windows",
                    "validOperatingSystemBuildRanges": []
                },
                {
                    "id": "win-current",
                    "@odata.type": "#microsoft.graph.windows10CompliancePolicy",
                    "displayName": "CP - Windows Kiosk",
                    "validOperatingSystemBuildRanges": current_ranges
                },
                {
                    "id": "ios",
                    "@odata.type": "#microsoft.graph.iosCompliancePolicy",
                    "displayName": "CP - iOS",
                    "osMinimumVersion": "16.0"
                },
                {
                    "id": "other",
                    "@odata.type": "#microsoft.graph.windows10CompliancePolicy",
                    "displayName": "Legacy Windows",
                    "validOperatingSystemBuildRanges": []
                }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/beta/deviceManagement/deviceCompliancePolicies/win-old"))
        .and(body_partial_json(json!({
            "@odata.type": "#microsoft.graph.windows10CompliancePolicy",
            "validOperatingSystemBuildRanges": [{
                "description": "Windows 11 23H2 minimum 10.0.22631.4317",
                "lowestVersion": "10.0.22631.4317",
                "highestVersion": "10.0.22631.99999"
            }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/beta/deviceManagement/deviceCompliancePolicies/ios"))
        .and(body_json(json!({
            "@odata.type": "#microsoft.graph.iosCompliancePolicy",
            "osMinimumVersion": "17.6"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let targets = OsTargets {
        windows: Some(builds),
        ios: Some("17.6".into()),
        ..Default::default()
    };
    let summary = compliance::apply_os_targets(&client, &targets, Some("CP - "), false)
        .await
        .unwrap();
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_os_targets_ignore_platforms_without_a_target() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/deviceCompliancePolicies"))
        .respond_with(ok(json!({
            "value": [
                {
                    "id": "win",
                    "@odata.type": "#microsoft.graph.windows10CompliancePolicy",
                    "displayName": "CP - Windows",
                    "validOperatingSystemBuildRanges": []
                },
                {
                    "id": "ios",
                    "@odata.type": "#microsoft.graph.iosCompliancePolicy",
                    "displayName": "CP - iOS",
                    "osMinimumVersion": "17.6"
                }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let targets = OsTargets {
        ios: Some("17.6".into()),
        ..Default::default()
    };
    let summary = compliance::apply_os_targets(&client, &targets, None, false)
        .await
        .unwrap();
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.unchanged, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_release_filters_created_and_fixed() {
    let (server, client) = setup().await;
    let builds =
        compliance::parse_builds(&["10.0.22631.4317,10.0.26100.2033".to_string()]).unwrap();

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/assignmentFilters"))
        .respond_with(ok(json!({
            "value": [{
                "id": "f-1",
                "displayName": "Windows build 22631",
                "platform": "windows10AndLater",
                "rule": "(device.osVersion -startsWith \"10.0.2263\")"
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/beta/deviceManagement/assignmentFilters/f-1"))
        .and(body_json(json!({ "rule": "(device.osVersion -startsWith \"10.0.22631\")" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/assignmentFilters"))
        .and(body_partial_json(json!({
            "displayName": "Windows build 26100",
            "platform": "windows10AndLater"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "f-2",
            "displayName": "Windows build 26100",
            "platform": "windows10AndLater",
            "rule": "(device.osVersion -startsWith \"10.0.26100\")"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = compliance::sync_filters(&client, &builds, false).await.unwrap();
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.failed, 0);
}

// Baseline comparison

fn simple_setting(id: &str, value: &str) -> Value {
    json!({
        "id": "0",
        "settingInstance": {
            "@odata.type": "#microsoft.graph.deviceManagementConfigurationSimpleSettingInstance",
            "settingDefinitionId": id,
            "simpleSettingValue": { "value": value }
        },
        "settingDefinitions": [{ "id": id, "displayName": format!("Display {}", id) }]
    })
}

#[tokio::test]
async fn test_compare_policies_by_name() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/configurationPolicies"))
        .respond_with(ok(json!({
            "value": [
                { "id": "p1", "name": "Baseline 23H2" },
                { "id": "p2", "name": "Baseline 24H2" }
            ]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/configurationPolicies/p1/settings"))
        .respond_with(ok(json!({
            "value": [simple_setting("a", "1"), simple_setting("b", "1"), simple_setting("c", "x")]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/configurationPolicies/p2/settings"))
        .respond_with(ok(json!({
            "value": [simple_setting("a", "1"), simple_setting("b", "2"), simple_setting("d", "y")]
        })))
        .mount(&server)
        .await;

    let comparison = baseline::compare_policies(&client, "baseline 23h2", "p2")
        .await
        .unwrap();
    assert_eq!(comparison.name1, "Baseline 23H2");
    assert_eq!(comparison.name2, "Baseline 24H2");

    let statuses: Vec<(&str, DiffStatus)> = comparison
        .diffs
        .iter()
        .map(|d| (d.key.as_str(), d.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("a", DiffStatus::Same),
            ("b", DiffStatus::Different),
            ("c", DiffStatus::OnlyInBaseline1),
            ("d", DiffStatus::OnlyInBaseline2),
        ]
    );
    assert_eq!(comparison.names.setting("c"), "Display c");
}

// Disk space

#[tokio::test]
async fn test_disk_space_fans_out_and_counts_failures() {
    let (server, client) = setup().await;
    const GB: i64 = 1024 * 1024 * 1024;

    Mock::given(method("GET"))
        .and(path("/v1.0/deviceManagement/managedDevices"))
        .respond_with(ok(json!({
            "value": [
                { "id": "d1", "deviceName": "PC-LOW" },
                { "id": "d2", "deviceName": "PC-OK" },
                { "id": "d3", "deviceName": "PC-GONE" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    for (id, name, free) in [("d1", "PC-LOW", 4 * GB), ("d2", "PC-OK", 120 * GB)] {
        Mock::given(method("GET"))
            .and(path(format!("/v1.0/deviceManagement/managedDevices/{}", id)))
            .respond_with(ok(json!({
                "id": id,
                "deviceName": name,
                "totalStorageSpaceInBytes": 256 * GB,
                "freeStorageSpaceInBytes": free
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/v1.0/deviceManagement/managedDevices/d3"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let threshold = DiskThreshold {
        min_free_gb: 10.0,
        min_free_percent: None,
    };
    let report = devices::disk_space_report(&client, Some("Windows"), &threshold, 2)
        .await
        .unwrap();

    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[0].device.display_name(), "PC-LOW");
    assert_eq!(report.rows[0].status, DiskStatus::Low);
    assert_eq!(report.rows[1].status, DiskStatus::Ok);
    assert_eq!(report.low_count(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "PC-GONE");
}

// Printers

#[tokio::test]
async fn test_provision_skips_existing_policies_and_assigns() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/beta/deviceManagement/configurationPolicies"))
        .respond_with(ok(json!({
            "value": [{ "id": "existing", "name": "Printer - HQ" }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/configurationPolicies"))
        .and(body_partial_json(json!({
            "name": "Printer - Lab",
            "platforms": "windows10",
            "technologies": "mdm"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "new-policy",
            "name": "Printer - Lab"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/beta/deviceManagement/configurationPolicies/new-policy/assign"))
        .and(body_partial_json(json!({
            "assignments": [{ "target": { "groupId": "grp-1" } }]
        })))
        .respond_with(ok(json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let shares: Vec<PrintShare> = serde_json::from_value(json!([
        { "id": "s1", "displayName": "HQ", "printer": { "id": "p1" } },
        { "id": "s2", "displayName": "Lab", "printer": { "id": "p2" } },
        { "id": "s3", "displayName": "Orphan" }
    ]))
    .unwrap();
    let selected: Vec<&PrintShare> = shares.iter().collect();

    let summary = printers::provision_shares(&client, &selected, "Printer - ", Some("grp-1"), false)
        .await
        .unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.existing, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
}
