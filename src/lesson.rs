//! Read-only lesson vocabulary.
//!
//! Each lesson is one CSV file named after the lesson id, with the columns
//! `ru,tj,example_ru,example_tj`. Lessons are authored elsewhere; this module
//! only reads them so their vocabulary can be turned into cards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LessonError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("lesson {0} is defined more than once")]
    Duplicate(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VocabEntry {
    pub ru: String,
    pub tj: String,
    pub example_ru: String,
    pub example_tj: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lesson {
    pub id: String,
    pub vocab: Vec<VocabEntry>,
}

/// Front/back/example triple ready to become a card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardDraft {
    pub front: String,
    pub back: String,
    pub example: String,
}

/// Entries missing either side of the translation are dropped.
pub fn vocab_to_cards(vocab: &[VocabEntry]) -> Vec<CardDraft> {
    vocab
        .iter()
        .filter(|v| !v.ru.trim().is_empty() && !v.tj.trim().is_empty())
        .map(|v| CardDraft {
            front: v.ru.trim().to_string(),
            back: v.tj.trim().to_string(),
            example: v.example_ru.clone(),
        })
        .collect()
}

fn get_field(record: &csv::StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").to_string()
}

pub fn load_lesson(path: &Path) -> Result<Lesson, LessonError> {
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default")
        .to_string();

    let wrap = |source| LessonError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(wrap)?;

    let mut vocab = Vec::new();
    for result in reader.records() {
        let record = result.map_err(wrap)?;
        vocab.push(VocabEntry {
            ru: get_field(&record, 0),
            tj: get_field(&record, 1),
            example_ru: get_field(&record, 2),
            example_tj: get_field(&record, 3),
        });
    }
    Ok(Lesson { id, vocab })
}

/// Loads every lesson found under `paths`, keyed by lesson id.
pub fn load_lessons(paths: &[PathBuf]) -> Result<BTreeMap<String, Lesson>, LessonError> {
    let mut lessons = BTreeMap::new();
    for file in discover_files(paths) {
        let lesson = load_lesson(&file)?;
        if lessons.contains_key(&lesson.id) {
            return Err(LessonError::Duplicate(lesson.id));
        }
        log::debug!("Loaded lesson {} ({} words)", lesson.id, lesson.vocab.len());
        lessons.insert(lesson.id.clone(), lesson);
    }
    Ok(lessons)
}

pub fn discover_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_csv_recursive(path, &mut files);
        } else if is_csv(path) {
            files.push(path.clone());
        }
    }
    files.sort();
    files
}

fn is_csv(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("csv")
}

fn collect_csv_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_csv_recursive(&path, files);
        } else if is_csv(&path) {
            files.push(path);
        }
    }
}
