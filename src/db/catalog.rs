//! The project-management schema.
//!
//! Tables are listed in creation order so every foreign key points at a table
//! that already exists. Backups export them in the same order.

use crate::models::{
    ColumnDefault, ColumnSpec, IndexSpec, LogicalType, SchemaDefinition, TableSpec,
};

/// Table whose presence means the schema was provisioned.
pub const MARKER_TABLE: &str = "Users";

/// A baseline application setting seeded on first provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultSetting {
    pub key: &'static str,
    pub value: &'static str,
    pub data_type: &'static str,
    pub category: &'static str,
}

const fn setting(
    key: &'static str,
    value: &'static str,
    data_type: &'static str,
    category: &'static str,
) -> DefaultSetting {
    DefaultSetting {
        key,
        value,
        data_type,
        category,
    }
}

pub const DEFAULT_SETTINGS: &[DefaultSetting] = &[
    setting("app_name", "Project Manager Pro", "string", "general"),
    setting("app_version", "1.0.0", "string", "general"),
    setting("default_theme", "auto", "string", "appearance"),
    setting("default_language", "en", "string", "general"),
    setting("maintenance_mode", "false", "boolean", "system"),
    setting("session_timeout", "60", "integer", "security"),
    setting("items_per_page", "20", "integer", "appearance"),
    setting("max_upload_size", "50", "integer", "files"),
    setting("max_login_attempts", "5", "integer", "security"),
    setting("password_min_length", "8", "integer", "security"),
];

fn id(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, LogicalType::IdentityInt)
}

fn text(name: &str, len: u32) -> ColumnSpec {
    ColumnSpec::new(name, LogicalType::Text(len))
}

fn long_text(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, LogicalType::LongText)
}

fn int(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, LogicalType::Integer)
}

fn flag(name: &str, default: bool) -> ColumnSpec {
    ColumnSpec::new(name, LogicalType::Boolean).default_value(ColumnDefault::Bool(default))
}

fn date(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, LogicalType::Date)
}

fn timestamp(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, LogicalType::Timestamp)
}

fn created(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, LogicalType::TimestampNowDefault)
}

fn text_default(name: &str, len: u32, default: &str) -> ColumnSpec {
    text(name, len).default_value(ColumnDefault::Text(default.to_string()))
}

fn int_default(name: &str, default: i64) -> ColumnSpec {
    int(name).default_value(ColumnDefault::Int(default))
}

fn user_ref(name: &str) -> ColumnSpec {
    int(name).references("Users", "UserID")
}

fn users() -> TableSpec {
    TableSpec::new("Users")
        .column(id("UserID"))
        .column(text("Username", 50).not_null().unique())
        .column(text("PasswordHash", 255).not_null())
        .column(text("Email", 255).unique())
        .column(text("FirstName", 50))
        .column(text("LastName", 50))
        .column(text_default("Role", 20, "User"))
        .column(flag("Active", true))
        .column(created("CreatedDate"))
        .column(timestamp("LastLoginDate"))
        .column(timestamp("PasswordChangedDate"))
        .column(text("ProfilePicture", 255))
        .column(text("Phone", 20))
        .column(text("Department", 50))
        .column(text("JobTitle", 100))
        .column(int_default("FailedLoginAttempts", 0))
        .column(timestamp("LockedUntil"))
        .column(created("LastModifiedDate"))
}

fn projects() -> TableSpec {
    TableSpec::new("Projects")
        .column(id("ProjectID"))
        .column(text("ProjectName", 100).not_null())
        .column(long_text("Description"))
        .column(date("StartDate"))
        .column(date("EndDate"))
        .column(text_default("Status", 50, "Planning"))
        .column(text_default("Priority", 20, "Medium"))
        .column(ColumnSpec::new("Budget", LogicalType::Decimal(15, 2)))
        .column(
            ColumnSpec::new("ActualCost", LogicalType::Decimal(15, 2))
                .default_value(ColumnDefault::Int(0)),
        )
        .column(text("ClientName", 100))
        .column(text("ClientEmail", 255))
        .column(text("Tags", 500))
        .column(int_default("Progress", 0))
        .column(ColumnSpec::new("EstimatedHours", LogicalType::Decimal(8, 2)))
        .column(
            ColumnSpec::new("ActualHours", LogicalType::Decimal(8, 2))
                .default_value(ColumnDefault::Int(0)),
        )
        .column(created("CreatedDate"))
        .column(user_ref("CreatedBy"))
        .column(created("LastModifiedDate"))
        .column(user_ref("LastModifiedBy"))
        .column(timestamp("CompletedDate"))
        .column(flag("IsTemplate", false))
        .column(int("TemplateID"))
        .column(text_default("Color", 7, "#667eea"))
        .index(IndexSpec::new("IX_Projects_Status", &["Status"]))
        .index(IndexSpec::new("IX_Projects_CreatedBy", &["CreatedBy"]))
}

fn tasks() -> TableSpec {
    TableSpec::new("Tasks")
        .column(id("TaskID"))
        .column(
            int("ProjectID")
                .not_null()
                .references_cascade("Projects", "ProjectID"),
        )
        .column(text("TaskName", 100).not_null())
        .column(long_text("Description"))
        .column(date("StartDate"))
        .column(date("EndDate"))
        .column(user_ref("AssigneeID"))
        .column(text_default("Status", 50, "To Do"))
        .column(text_default("Priority", 20, "Medium"))
        .column(int_default("Progress", 0))
        .column(ColumnSpec::new("EstimatedHours", LogicalType::Decimal(5, 1)))
        .column(
            ColumnSpec::new("ActualHours", LogicalType::Decimal(5, 1))
                .default_value(ColumnDefault::Int(0)),
        )
        .column(long_text("Dependencies"))
        .column(text("Labels", 255))
        .column(int("ParentTaskID").references("Tasks", "TaskID"))
        .column(int_default("Order_Index", 0))
        .column(created("CreatedDate"))
        .column(user_ref("CreatedBy"))
        .column(created("LastModifiedDate"))
        .column(user_ref("LastModifiedBy"))
        .column(timestamp("CompletedDate"))
        .column(date("DueDate"))
        .column(flag("IsRecurring", false))
        .column(text("RecurrencePattern", 100))
        .index(IndexSpec::new("IX_Tasks_ProjectID", &["ProjectID"]))
        .index(IndexSpec::new("IX_Tasks_AssigneeID", &["AssigneeID"]))
        .index(IndexSpec::new("IX_Tasks_Status", &["Status"]))
}

fn project_members() -> TableSpec {
    TableSpec::new("ProjectMembers")
        .column(id("ProjectMemberID"))
        .column(
            int("ProjectID")
                .not_null()
                .references_cascade("Projects", "ProjectID"),
        )
        .column(int("UserID").not_null().references_cascade("Users", "UserID"))
        .column(text_default("Role", 50, "Member"))
        .column(created("JoinedDate"))
        .column(flag("IsActive", true))
        .unique_together(&["ProjectID", "UserID"])
}

fn comments() -> TableSpec {
    TableSpec::new("Comments")
        .column(id("CommentID"))
        .column(int("ProjectID").references_cascade("Projects", "ProjectID"))
        .column(int("TaskID").references_cascade("Tasks", "TaskID"))
        .column(user_ref("UserID").not_null())
        .column(long_text("Comment").not_null())
        .column(created("CreatedDate"))
        .column(timestamp("LastModifiedDate"))
        .column(flag("IsDeleted", false))
}

fn time_logs() -> TableSpec {
    TableSpec::new("TimeLogs")
        .column(id("TimeLogID"))
        .column(int("TaskID").not_null().references_cascade("Tasks", "TaskID"))
        .column(user_ref("UserID").not_null())
        .column(timestamp("StartTime").not_null())
        .column(timestamp("EndTime"))
        .column(ColumnSpec::new("Duration", LogicalType::Decimal(5, 2)))
        .column(text("Description", 500))
        .column(date("LogDate"))
        .column(created("CreatedDate"))
        .column(flag("IsBillable", true))
        .index(IndexSpec::new("IX_TimeLogs_TaskID", &["TaskID"]))
        .index(IndexSpec::new("IX_TimeLogs_UserID", &["UserID"]))
}

fn attachments() -> TableSpec {
    TableSpec::new("Attachments")
        .column(id("AttachmentID"))
        .column(int("ProjectID").references_cascade("Projects", "ProjectID"))
        .column(int("TaskID").references_cascade("Tasks", "TaskID"))
        .column(text("FileName", 255).not_null())
        .column(text("FilePath", 500).not_null())
        .column(ColumnSpec::new("FileSize", LogicalType::BigInteger))
        .column(text("FileType", 50))
        .column(user_ref("UploadedBy").not_null())
        .column(created("UploadedDate"))
        .column(flag("IsDeleted", false))
}

fn notifications() -> TableSpec {
    TableSpec::new("Notifications")
        .column(id("NotificationID"))
        .column(int("UserID").not_null().references_cascade("Users", "UserID"))
        .column(text("Type", 50).not_null())
        .column(text("Title", 200).not_null())
        .column(long_text("Message"))
        .column(text_default("Priority", 20, "Medium"))
        .column(flag("IsRead", false))
        .column(created("CreatedDate"))
        .column(text("ActionUrl", 500))
}

fn activity_logs() -> TableSpec {
    TableSpec::new("ActivityLogs")
        .column(id("ActivityLogID"))
        .column(user_ref("UserID").not_null())
        .column(int("ProjectID").references("Projects", "ProjectID"))
        .column(int("TaskID").references("Tasks", "TaskID"))
        .column(text("Action", 100).not_null())
        .column(long_text("Details"))
        .column(text("IPAddress", 45))
        .column(text("UserAgent", 500))
        .column(created("CreatedDate"))
        .index(IndexSpec::new("IX_ActivityLogs_UserID", &["UserID"]))
        .index(IndexSpec::new("IX_ActivityLogs_ProjectID", &["ProjectID"]))
}

fn settings() -> TableSpec {
    TableSpec::new("Settings")
        .column(id("SettingID"))
        .column(text("SettingKey", 100).not_null().unique())
        .column(long_text("SettingValue"))
        .column(text_default("DataType", 20, "string"))
        .column(text_default("Category", 50, "general"))
        .column(created("CreatedDate"))
        .column(created("LastModifiedDate"))
}

/// The full application schema.
pub fn default_schema() -> SchemaDefinition {
    SchemaDefinition {
        tables: vec![
            users(),
            projects(),
            tasks(),
            project_members(),
            comments(),
            time_logs(),
            attachments(),
            notifications(),
            activity_logs(),
            settings(),
        ],
        marker_table: MARKER_TABLE.to_string(),
    }
}
