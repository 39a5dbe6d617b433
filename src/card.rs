use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::sm2::{self, SchedulingState};

const HEADER: [&str; 11] = [
    "id",
    "user",
    "lesson",
    "front",
    "back",
    "example",
    "ease_factor",
    "repetitions",
    "interval_days",
    "due_at",
    "created_at",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub user_id: String,
    pub lesson_id: Option<String>,
    pub front: String,
    pub back: String,
    pub example: String,
    #[serde(flatten)]
    pub schedule: SchedulingState,
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// A fresh card in the default scheduling state, due at `now`.
    pub fn new(
        user_id: &str,
        lesson_id: Option<&str>,
        front: &str,
        back: &str,
        example: &str,
        now: DateTime<Utc>,
    ) -> Card {
        Card {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            lesson_id: lesson_id.map(str::to_string),
            front: front.trim().to_string(),
            back: back.trim().to_string(),
            example: example.to_string(),
            schedule: SchedulingState::new(now),
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_due(now)
    }

    pub fn in_lesson(&self, lesson_id: &str) -> bool {
        self.lesson_id.as_deref() == Some(lesson_id)
    }
}

/// Column positions looked up by header name, so files with reordered or
/// missing columns still load into the right fields.
struct Columns(Vec<Option<usize>>);

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Columns {
        Columns(
            HEADER
                .iter()
                .map(|name| headers.iter().position(|h| h.trim() == *name))
                .collect(),
        )
    }

    fn has(&self, name: &str) -> bool {
        self.index(name).is_some()
    }

    fn index(&self, name: &str) -> Option<usize> {
        let slot = HEADER.iter().position(|h| *h == name)?;
        self.0[slot]
    }

    fn get(&self, record: &csv::StringRecord, name: &str) -> String {
        self.index(name)
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .to_string()
    }
}

fn parse_or<T: std::str::FromStr>(s: &str, default: T) -> T {
    let s = s.trim();
    if s.is_empty() {
        default
    } else {
        s.parse().unwrap_or(default)
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Loads the card store file. Blank scheduling columns fall back to the
/// defaults for a card created at `now`. Rows without a user are ignored
/// here and dropped the next time the store is written.
pub fn load_csv(path: &Path, now: DateTime<Utc>) -> Result<Vec<Card>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = Columns::from_headers(reader.headers()?);
    if !columns.has("user") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: missing \"user\" column", path.display()),
        )
        .into());
    }

    let mut cards = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let field = |name: &str| columns.get(&record, name);

        let user_id = field("user");
        if user_id.trim().is_empty() {
            log::warn!(
                "{}: ignoring row {} without a user; it is dropped on the next write",
                path.display(),
                line + 2
            );
            continue;
        }

        let id = Uuid::parse_str(field("id").trim()).unwrap_or_else(|_| Uuid::new_v4());
        let created_at = parse_timestamp(&field("created_at")).unwrap_or(now);
        let ease_factor: f64 = parse_or(&field("ease_factor"), sm2::DEFAULT_EASE);

        cards.push(Card {
            id,
            user_id,
            lesson_id: non_empty(field("lesson")),
            front: field("front"),
            back: field("back"),
            example: field("example"),
            schedule: SchedulingState {
                ease_factor: ease_factor.max(sm2::MIN_EASE),
                repetitions: parse_or(&field("repetitions"), 0),
                interval_days: parse_or(&field("interval_days"), 0),
                due_at: parse_timestamp(&field("due_at")).unwrap_or(now),
            },
            created_at,
        });
    }
    Ok(cards)
}

pub fn save_csv<'a>(
    path: &Path,
    cards: impl IntoIterator<Item = &'a Card>,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADER)?;

    for card in cards {
        writer.write_record([
            &card.id.to_string(),
            &card.user_id,
            &card.lesson_id.clone().unwrap_or_default(),
            &card.front,
            &card.back,
            &card.example,
            &card.schedule.ease_factor.to_string(),
            &card.schedule.repetitions.to_string(),
            &card.schedule.interval_days.to_string(),
            &card.schedule.due_at.to_rfc3339(),
            &card.created_at.to_rfc3339(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
