//! List command implementation.

use super::CommandResult;
use meetsync_engine::{Published, SyncEngine};
use meetsync_model::{Category, Entity, EntityKind, Meeting, RemoteStore, Stakeholder};
use meetsync_storage::TableStore;

/// One line of text output.
pub trait Row {
    /// Formats the record for a terminal.
    fn row(&self) -> String;
}

impl Row for Meeting {
    fn row(&self) -> String {
        let mut line = format!(
            "{}  {}  ({} stakeholders, {} categories)",
            self.id(),
            self.fields.title,
            self.fields.stakeholder_ids.len(),
            self.fields.category_ids.len()
        );
        if self.has_binary() {
            line.push_str(&format!("  [{} bytes local media]", self.binary_len()));
        }
        line
    }
}

impl Row for Stakeholder {
    fn row(&self) -> String {
        match &self.fields.email {
            Some(email) => format!("{}  {} <{}>", self.id(), self.fields.name, email),
            None => format!("{}  {}", self.id(), self.fields.name),
        }
    }
}

impl Row for Category {
    fn row(&self) -> String {
        format!("{}  {}  {}", self.id(), self.fields.key, self.fields.label)
    }
}

/// Runs the list command.
pub fn run<B: TableStore, S: RemoteStore>(
    engine: &SyncEngine<B, S>,
    kind: EntityKind,
    include_deleted: bool,
    format: &str,
) -> CommandResult<()> {
    match kind {
        EntityKind::Meeting => print_records(&collect::<_, _, Meeting>(engine, include_deleted)?, format),
        EntityKind::Stakeholder => {
            print_records(&collect::<_, _, Stakeholder>(engine, include_deleted)?, format)
        }
        EntityKind::Category => print_records(&collect::<_, _, Category>(engine, include_deleted)?, format),
    }
}

/// Published records, or every stored record when `include_deleted` is set.
pub fn collect<B: TableStore, S: RemoteStore, R: Published>(
    engine: &SyncEngine<B, S>,
    include_deleted: bool,
) -> CommandResult<Vec<R>> {
    if include_deleted {
        Ok(engine.local().get_all::<R>()?)
    } else {
        Ok(engine.records::<R>())
    }
}

fn print_records<R: Entity + Row>(records: &[R], format: &str) -> CommandResult<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(records)?);
        }
        _ => {
            if records.is_empty() {
                println!("No {}", R::KIND);
            }
            for record in records {
                if record.is_deleted() {
                    println!("{}  [deleted]", record.row());
                } else {
                    println!("{}", record.row());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meetsync_cloud::CloudStore;
    use meetsync_engine::SyncConfig;
    use meetsync_model::{Blob, MeetingFields, RecordMeta, StakeholderFields, Timestamp};
    use meetsync_storage::InMemoryTableStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn engine() -> SyncEngine<InMemoryTableStore, CloudStore> {
        SyncEngine::new(
            SyncConfig::new()
                .with_remote_enabled(false)
                .with_interaction_release_delay(Duration::ZERO),
            InMemoryTableStore::new(),
            Arc::new(CloudStore::in_memory()),
        )
    }

    #[test]
    fn rows_describe_records() {
        let meta = RecordMeta::created("m1".into(), Timestamp::from_millis(0));
        let meeting = Meeting::new(
            meta,
            MeetingFields {
                title: "Kickoff".into(),
                audio: Some(Blob::new("audio/webm", vec![0; 10])),
                ..MeetingFields::default()
            },
        );
        assert_eq!(
            meeting.row(),
            "m1  Kickoff  (0 stakeholders, 0 categories)  [10 bytes local media]"
        );

        let meta = RecordMeta::created("s1".into(), Timestamp::from_millis(0));
        let stakeholder = Stakeholder::new(
            meta,
            StakeholderFields {
                name: "Grace".into(),
                email: Some("grace@example.com".into()),
                ..StakeholderFields::default()
            },
        );
        assert_eq!(stakeholder.row(), "s1  Grace <grace@example.com>");
    }

    #[test]
    fn deleted_records_need_all_flag() {
        let engine = engine();
        let kept = engine
            .mutations()
            .add::<Stakeholder>(StakeholderFields {
                name: "Kept".into(),
                ..StakeholderFields::default()
            })
            .unwrap()
            .record;
        let gone = engine
            .mutations()
            .add::<Stakeholder>(StakeholderFields {
                name: "Gone".into(),
                ..StakeholderFields::default()
            })
            .unwrap()
            .record;
        engine.mutations().soft_delete::<Stakeholder>(gone.id()).unwrap();

        let visible = collect::<_, _, Stakeholder>(&engine, false).unwrap();
        assert_eq!(visible, vec![kept]);
        let all = collect::<_, _, Stakeholder>(&engine, true).unwrap();
        assert_eq!(all.len(), 2);
        assert!(run(&engine, EntityKind::Stakeholder, true, "json").is_ok());
    }
}
