//! Functional tests for file-based configuration, snapshot inspection and
//! wave discovery against a catalog.

use pretty_assertions::assert_eq;
use quota_core::{
    classify_waves, inspect, EditorConfig, QuotaError, Snapshot, WaveDiscovery, WaveIssueKind,
};
use quota_model::{Instance, InstanceId, Variable, VariableId, VariableKind, WeightingPlan, WeightingTarget};
use quota_test_utils::{month, nested_root, region, StaticCatalog};
use quota_tree::CatalogSnapshot;
use std::io::Write;
use tempfile::NamedTempFile;

fn tracker() -> Variable {
    Variable::new("Tracker", vec![Instance::new(1, "Q1")]).with_kind(VariableKind::Composite)
}

/// A TOML file only needs the keys it changes.
#[test]
fn config_file_overrides_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "max_quota_cells = 5000").unwrap();
    writeln!(file, "[thresholds]").unwrap();
    writeln!(file, "min_efficiency = 0.5").unwrap();

    let config = EditorConfig::load(file.path()).unwrap();
    assert_eq!(config.max_quota_cells, 5000);
    assert!((config.thresholds.min_efficiency - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.rounding_places, EditorConfig::default().rounding_places);
}

/// Unreadable files are configuration errors.
#[test]
fn missing_config_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EditorConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, QuotaError::Config(_)));
}

/// A snapshot written to disk inspects cleanly.
#[test]
fn snapshot_file_inspects() {
    let snapshot = Snapshot {
        root: nested_root(),
        catalog: CatalogSnapshot::new()
            .with_variable(month())
            .with_variable(region())
            .with_variable(quota_test_utils::age())
            .with_variable(quota_test_utils::gender()),
        label: None,
    };
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(&snapshot).unwrap().as_bytes())
        .unwrap();

    let loaded = Snapshot::load(file.path()).unwrap();
    assert_eq!(loaded, snapshot);

    let report = inspect(&loaded, &EditorConfig::default());
    assert!(report.is_healthy());
    assert_eq!(report.quota_cells, 3);
    let text = report.to_string();
    assert!(text.starts_with("UK [root]\n  Month [plan-5]\n    Jan [target-201]\n"));
    assert!(text.ends_with("no shape issues\n"));
}

/// A grouping built on one wave variable resolves to its waves.
#[tokio::test]
async fn composite_tracker_resolves_waves() {
    let catalog = StaticCatalog::new(vec![tracker(), month(), region()])
        .with_components("Tracker", &["Region", "Month"]);
    let discovery = WaveDiscovery::new(&catalog, 8);

    let waves = discovery.discover(&VariableId::new("Tracker")).await.unwrap();
    let ids: Vec<InstanceId> = waves.iter().map(|w| w.id).collect();
    assert_eq!(ids, vec![InstanceId(101), InstanceId(102), InstanceId(103)]);
}

/// Two wave variables below a grouping are ambiguous.
#[tokio::test]
async fn ambiguous_tracker_has_no_waves() {
    let survey = Variable::new("Survey", vec![Instance::new(501, "Wave 1")])
        .with_kind(VariableKind::SurveyId);
    let catalog = StaticCatalog::new(vec![tracker(), month(), survey])
        .with_components("Tracker", &["Month", "Survey"]);

    let waves = WaveDiscovery::new(&catalog, 8)
        .discover(&VariableId::new("Tracker"))
        .await
        .unwrap();
    assert!(waves.is_empty());
}

/// Waves without weights are reported per kind.
#[tokio::test]
async fn wave_health_report() {
    let catalog = StaticCatalog::new(vec![month()]);
    let waves = WaveDiscovery::new(&catalog, 8)
        .discover(&VariableId::new("Month"))
        .await
        .unwrap();

    let plan = WeightingPlan::new("Month").with_id(5).with_targets(vec![
        WeightingTarget::percentage(InstanceId(101), 1.0).with_id(1),
        WeightingTarget::new(InstanceId(102)).with_id(2),
    ]);
    let snapshot = CatalogSnapshot::new().with_variable(month());
    let report = classify_waves(&plan, &waves, &snapshot);

    let kinds: Vec<WaveIssueKind> = report.issues.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![WaveIssueKind::Unweighted, WaveIssueKind::UnweightedNoTarget]
    );
    assert!(!report.warnings_only);
    assert_eq!(report.issues[0].message, "Unweighted Feb.");
}
