//! `status` subcommand: tabulate the state file.

use std::path::Path;

use anyhow::Result;
use cfsync_core::identity::external_name;
use cfsync_core::{Condition, ConditionStatus, ConditionType, DeclaredResource};
use tabled::{Table, Tabled};

use crate::state_file;

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "EXTERNAL NAME")]
    external_name: String,
    #[tabled(rename = "READY")]
    ready: String,
    #[tabled(rename = "SYNCED")]
    synced: String,
    #[tabled(rename = "GEN")]
    generation: String,
    #[tabled(rename = "MESSAGE")]
    message: String,
}

fn format_condition(cond: Option<&Condition>) -> String {
    match cond {
        None => "-".to_string(),
        Some(c) => {
            let status = match c.status {
                ConditionStatus::True => "True",
                ConditionStatus::False => "False",
                ConditionStatus::Unknown => "Unknown",
            };
            format!("{} ({})", status, c.reason)
        }
    }
}

impl From<&DeclaredResource> for ResourceRow {
    fn from(res: &DeclaredResource) -> Self {
        let ready = res.condition(ConditionType::Ready);
        let synced = res.condition(ConditionType::Synced);
        // The first failing condition explains the state best.
        let message = [synced, ready]
            .into_iter()
            .flatten()
            .find_map(|c| c.message.clone())
            .unwrap_or_default();

        let mut name = res.name().to_string();
        if res.deletion_requested() {
            name.push_str(" (deleting)");
        }

        Self {
            kind: res.kind.clone(),
            name,
            external_name: match external_name(res) {
                "" => "-".to_string(),
                ext => ext.to_string(),
            },
            ready: format_condition(ready),
            synced: format_condition(synced),
            generation: format!(
                "{}/{}",
                res.status.observed_generation, res.metadata.generation
            ),
            message,
        }
    }
}

pub async fn print(path: &Path) -> Result<()> {
    let resources = state_file::load(path).await?;
    if resources.is_empty() {
        println!("No declared resources");
        return Ok(());
    }

    let rows: Vec<ResourceRow> = resources.iter().map(ResourceRow::from).collect();
    println!("{}", Table::new(rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfsync_core::Reason;
    use cfsync_core::identity::set_external_name;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_row_for_failed_update() {
        let now = Utc::now();
        let mut res = DeclaredResource::new("Record", "www", json!({}));
        set_external_name(&mut res, "z1/r1");
        res.metadata.generation = 2;
        res.status.observed_generation = 2;
        res.status.conditions = vec![
            Condition::ready(now),
            Condition::not_synced(Reason::ReconcileError, Some("HTTP 400".to_string()), now),
        ];

        let row = ResourceRow::from(&res);
        assert_eq!(row.external_name, "z1/r1");
        assert_eq!(row.ready, "True (Available)");
        assert_eq!(row.synced, "False (ReconcileError)");
        assert_eq!(row.generation, "2/2");
        assert_eq!(row.message, "HTTP 400");
    }

    #[test]
    fn test_row_for_unreconciled() {
        let res = DeclaredResource::new("Zone", "example", json!({}));
        let row = ResourceRow::from(&res);
        assert_eq!(row.external_name, "-");
        assert_eq!(row.ready, "-");
        assert_eq!(row.generation, "0/1");
    }
}
