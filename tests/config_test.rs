// ==========================================
// 配置驱动导入集成测试
// ==========================================
// 测试目标: config_kv 中的配置经 ConfigManager 快照后作用于导入行为
// ==========================================


use erp_import_connector::config::{config_keys, ConfigManager};
use erp_import_connector::domain::{
    CodeMappingEntry, EntityKind, ImportScope, RunMode, RunStatus, StageKind, StageStatus,
};
use erp_import_connector::logging;
use erp_import_connector::{ImportError, ImportOrchestrator, ImportRunRepository};
use test_helpers::{
    create_orchestrator, create_test_db, fixture, part_row, production_row, routing_row,
    seed_mappings,
};

#[test]
fn test_settings_persist_across_connections() {
    let db = create_test_db();
    ConfigManager::from_connection(db.conn.clone())
        .set_global_config_value(config_keys::IMPORT_WORKER_COUNT, "8")
        .unwrap();

    // 通过路径重新打开
    let settings = ConfigManager::new(&db.path())
        .unwrap()
        .load_settings()
        .unwrap();
    assert_eq!(settings.import.worker_count, 8);
    assert_eq!(settings.sources.routing.filter.as_deref(), Some("Type = 'S'"));
}

#[test]
fn test_invalid_pattern_reported_with_key() {
    let db = create_test_db();
    let config = ConfigManager::from_connection(db.conn.clone());
    config
        .set_global_config_value(config_keys::ROUTING_SKIP_PATTERNS, r#"["^UEB", "("]"#)
        .unwrap();

    match config.load_settings() {
        Err(ImportError::ConfigValue { key, value, .. }) => {
            assert_eq!(key, config_keys::ROUTING_SKIP_PATTERNS);
            assert_eq!(value, "(");
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_invalid_config_yields_aborted_report() {
    let db = create_test_db();
    let config = ConfigManager::from_connection(db.conn.clone());
    config
        .set_global_config_value(config_keys::ROUTING_SKIP_PATTERNS, r#"["[UEB"]"#)
        .unwrap();

    let err = match config.load_settings() {
        Err(e @ ImportError::ConfigValue { .. }) => e,
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    };
    let report =
        ImportOrchestrator::rejected_report(RunMode::Execute, &ImportScope::all(), &err.to_string());

    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(report.stages.len(), 3);
    assert!(report
        .stages
        .iter()
        .all(|s| s.status == StageStatus::NotStarted));
    assert!(report
        .fatal_error
        .as_deref()
        .unwrap()
        .contains(config_keys::ROUTING_SKIP_PATTERNS));

    // 中止的执行同样进入运行历史
    let history = ImportRunRepository::new(db.conn.clone());
    history.insert_run(&report).unwrap();
    let runs = history.recent_runs(5).unwrap();
    assert_eq!(runs[0].status, RunStatus::Aborted);
    assert_eq!(runs[0].totals.rows_seen, 0);
}

#[tokio::test]
async fn test_configured_rules_drive_routing_and_production() {
    logging::init_test();
    let db = create_test_db();
    seed_mappings(&db, &[CodeMappingEntry::prefix("EX", 80000020)]);

    let config = ConfigManager::from_connection(db.conn.clone());
    config
        .set_global_config_value(config_keys::ROUTING_COOPERATION_PATTERNS, r#"["^EXT"]"#)
        .unwrap();
    config
        .set_global_config_value(config_keys::PRODUCTION_REQUIRE_OPERATION, "false")
        .unwrap();
    config
        .set_global_config_value(config_keys::REMOTE_PAGE_SIZE, "1")
        .unwrap();
    let settings = config.load_settings().unwrap();

    let remote = fixture(
        vec![part_row("D123", "Shaft")],
        vec![routing_row("D123", 10, "EXT5", None)],
        // 工序 40 不存在,但已关闭工序依赖
        vec![production_row("J200", "D123", 40, "20240305")],
    );
    let report = create_orchestrator(&db, remote, settings)
        .execute(&ImportScope::all())
        .await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.stage(StageKind::Production).unwrap().created, 1);

    let store = db.store();
    let operations = store.list_operations("D123").unwrap();
    assert!(operations[0].is_cooperation);
    assert_eq!(operations[0].work_center_id, Some(80000020));
    assert_eq!(operations[0].planned_time, 0.0);
    assert_eq!(store.count(EntityKind::ProductionRecord).unwrap(), 1);
}
