//! Integration tests for schema provisioning on the embedded backend.

use project_db::DatabaseManager;
use project_db::config::Settings;
use project_db::models::{ColumnSpec, LogicalType, SchemaDefinition, TableSpec};
use serde_json::json;
use tempfile::TempDir;

fn embedded(dir: &TempDir) -> Settings {
    let mut settings = Settings::embedded_only(dir.path().join("project.db").to_string_lossy());
    settings.seed.bcrypt_rounds = 4;
    settings
}

#[tokio::test]
async fn test_first_run_creates_and_seeds() {
    let dir = TempDir::new().unwrap();
    let db = DatabaseManager::new(embedded(&dir));

    let report = db.ensure_schema().await.unwrap();
    assert!(!report.already_provisioned);
    assert!(report.is_complete(), "failed: {:?}", report.failed_tables);
    assert_eq!(report.created_tables.len(), 10);
    assert_eq!(report.created_tables[0], "Users");
    // One administrator plus the default settings
    assert_eq!(report.seeded_rows, 11);
    assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let db = DatabaseManager::new(embedded(&dir));
    db.ensure_schema().await.unwrap();

    let again = db.ensure_schema().await.unwrap();
    assert!(again.already_provisioned);
    assert!(again.created_tables.is_empty());
    assert_eq!(again.seeded_rows, 0);
    assert_eq!(
        db.execute_scalar("SELECT COUNT(*) FROM Users", &[]).await,
        Some(json!(1))
    );
}

#[tokio::test]
async fn test_rerun_recreates_missing_tables() {
    let dir = TempDir::new().unwrap();
    let db = DatabaseManager::new(embedded(&dir));
    db.ensure_schema().await.unwrap();
    db.execute("DROP TABLE Attachments", &[]).await.unwrap();

    let again = db.ensure_schema().await.unwrap();
    assert!(again.already_provisioned);
    assert_eq!(again.created_tables, vec!["Attachments".to_string()]);
    assert_eq!(again.seeded_rows, 0);
    assert_eq!(db.table_info("Attachments").await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_seeded_rows_content() {
    let dir = TempDir::new().unwrap();
    let db = DatabaseManager::new(embedded(&dir));
    db.ensure_schema().await.unwrap();

    let hash = db
        .execute_scalar(
            "SELECT PasswordHash FROM Users WHERE Username = ?",
            &["admin".into()],
        )
        .await
        .unwrap();
    let hash = hash.as_str().unwrap();
    assert!(hash.starts_with("$2"));
    assert!(bcrypt::verify("admin123", hash).unwrap());

    let role = db
        .execute_scalar("SELECT Role FROM Users WHERE Username = ?", &["admin".into()])
        .await;
    assert_eq!(role, Some(json!("Admin")));

    assert_eq!(
        db.execute_scalar("SELECT COUNT(*) FROM Settings", &[]).await,
        Some(json!(10))
    );
    assert_eq!(
        db.execute_scalar(
            "SELECT SettingValue FROM Settings WHERE SettingKey = ?",
            &["app_name".into()]
        )
        .await,
        Some(json!("Project Manager Pro"))
    );
}

#[tokio::test]
async fn test_defaults_applied_on_insert() {
    let dir = TempDir::new().unwrap();
    let db = DatabaseManager::new(embedded(&dir));
    db.ensure_schema().await.unwrap();

    let id = db
        .execute_insert(
            "INSERT INTO Projects (ProjectName, CreatedBy) VALUES (?, ?)",
            &["Website Redesign".into(), 1i64.into()],
        )
        .await
        .unwrap();
    assert_eq!(id, Some(1));
    assert_eq!(
        db.execute_scalar("SELECT Status FROM Projects WHERE ProjectID = 1", &[])
            .await,
        Some(json!("Planning"))
    );
}

#[tokio::test]
async fn test_table_failure_does_not_stop_provisioning() {
    let dir = TempDir::new().unwrap();
    let schema = SchemaDefinition {
        tables: vec![
            TableSpec::new("Broken")
                .column(ColumnSpec::new("ID", LogicalType::IdentityInt))
                .column(ColumnSpec::new("Name", LogicalType::Text(20)))
                .column(ColumnSpec::new("Name", LogicalType::Text(20))),
            TableSpec::new("Labels")
                .column(ColumnSpec::new("LabelID", LogicalType::IdentityInt))
                .column(ColumnSpec::new("Name", LogicalType::Text(50)).not_null()),
        ],
        marker_table: "Labels".to_string(),
    };
    let db = DatabaseManager::with_schema(embedded(&dir), schema);

    let report = db.ensure_schema().await.unwrap();
    assert_eq!(report.failed_tables, vec!["Broken".to_string()]);
    assert_eq!(report.created_tables, vec!["Labels".to_string()]);
    assert!(!report.is_complete());
    assert!(report.warnings.iter().any(|w| w.starts_with("Broken")));

    // No Users table in this schema, so the seed is reported, not fatal
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.starts_with("administrator seed"))
    );
    assert_eq!(db.table_info("Labels").await.unwrap().len(), 2);
}
