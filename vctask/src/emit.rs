//! Emit sinks for reported tasks
//!
//! Three output modes: a human log line, one JSON object per line on
//! stdout, or an HTTP POST of the same JSON to a collector. Emit failures
//! are surfaced to the caller; the poll driver logs them and moves on.

use anyhow::{Context, Result};
use tracing::info;

use crate::model::TaskRecord;

pub enum Emitter {
    /// Human-readable line via the log layer.
    Log,
    /// One JSON object per line on stdout.
    Structured,
    /// POST the JSON record to a collector URL.
    Forward { client: reqwest::Client, url: String },
}

impl Emitter {
    pub async fn emit(&self, record: &TaskRecord) -> Result<()> {
        match self {
            Emitter::Log => {
                info!(
                    "[{}] {} on {}: {} ({})",
                    record.start_time.to_rfc3339(),
                    record.description_id,
                    record.entity_name,
                    record.state,
                    record.reason
                );
                Ok(())
            }
            Emitter::Structured => {
                println!("{}", serde_json::to_string(record)?);
                Ok(())
            }
            Emitter::Forward { client, url } => {
                client
                    .post(url)
                    .json(record)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .with_context(|| format!("Failed to forward task {} to {}", record.id, url))?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::model::{ReasonKind, TaskState};

    #[test]
    fn test_structured_record_shape() {
        let record = TaskRecord {
            id: "5001".to_string(),
            start_time: DateTime::from_timestamp(100, 0).unwrap().fixed_offset(),
            complete_time: None,
            state: TaskState::Success,
            entity_name: "vm-42".to_string(),
            description_id: "VirtualMachine.powerOn".to_string(),
            reason: ReasonKind::User {
                user_name: "admin".to_string(),
            },
        };

        let line = serde_json::to_string(&record).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["id"], "5001");
        assert_eq!(parsed["state"], "success");
        assert_eq!(parsed["reason"]["kind"], "user");
        assert_eq!(parsed["reason"]["userName"], "admin");
        assert!(!line.contains('\n'));
    }
}
