use chrono::{DateTime, Utc};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use chat_gateway::client::UserProfile;

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

/// Two-column table describing a user
pub fn profile_table(profile: &UserProfile) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Field", "Value"]);

    if let Some(id) = profile.id {
        table.add_row(["ID", &id.to_string()]);
    }
    table.add_row(["Name", profile.name.as_str()]);
    table.add_row(["Email", profile.email.as_str()]);

    for (key, value) in &profile.extra {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => "-".to_string(),
            other => other.to_string(),
        };
        table.add_row([key.as_str(), rendered.as_str()]);
    }

    table
}
