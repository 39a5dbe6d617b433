//! In-memory card store, optionally backed by a CSV file that is rewritten
//! after every mutation.
//!
//! The store is not synchronised. Callers that share it must serialise
//! read-modify-write sequences (the web layer keeps it behind a mutex and
//! holds the lock for the whole review).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::card::{self, Card};
use crate::review;
use crate::sm2::Grade;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("card not found: {0}")]
    CardNotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Default)]
pub struct CardStore {
    cards: Vec<Card>,
    path: Option<PathBuf>,
}

impl CardStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the store file for reading and writing. A missing file is
    /// created empty; an existing one is left as it is until the first
    /// mutation.
    pub fn open(path: &Path, now: DateTime<Utc>) -> Result<Self> {
        let store = if path.exists() {
            Self {
                cards: read_cards(path, now)?,
                path: Some(path.to_path_buf()),
            }
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = Self {
                cards: Vec::new(),
                path: Some(path.to_path_buf()),
            };
            store.write(&store.cards)?;
            store
        };
        log::debug!("Loaded {} cards from {}", store.cards.len(), path.display());
        Ok(store)
    }

    /// Loads the store file without ever writing to it. A missing file reads
    /// as an empty store.
    pub fn read_only(path: &Path, now: DateTime<Utc>) -> Result<Self> {
        let cards = if path.exists() {
            read_cards(path, now)?
        } else {
            Vec::new()
        };
        Ok(Self { cards, path: None })
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, user_id: &str, card_id: Uuid) -> Option<&Card> {
        self.cards
            .iter()
            .find(|c| c.id == card_id && c.user_id == user_id)
    }

    pub fn insert(&mut self, card: Card) -> Result<Card> {
        let mut next = self.cards.clone();
        next.push(card.clone());
        self.commit(next)?;
        Ok(card)
    }

    /// Grades one of the user's cards. A card that is missing or owned by
    /// someone else is reported as not found and left untouched.
    pub fn review(
        &mut self,
        user_id: &str,
        card_id: Uuid,
        grade: Grade,
        now: DateTime<Utc>,
    ) -> Result<Card> {
        let index = self
            .cards
            .iter()
            .position(|c| c.id == card_id && c.user_id == user_id)
            .ok_or(StoreError::CardNotFound(card_id))?;
        let mut next = self.cards.clone();
        review::apply_review(&mut next[index], grade, now);
        let updated = next[index].clone();
        self.commit(next)?;
        Ok(updated)
    }

    /// Discards every card the user holds for the lesson and stores `fresh`
    /// in their place. Scheduling progress for the lesson starts over.
    pub fn replace_lesson_cards(
        &mut self,
        user_id: &str,
        lesson_id: &str,
        fresh: Vec<Card>,
    ) -> Result<usize> {
        let mut next: Vec<Card> = self
            .cards
            .iter()
            .filter(|c| !(c.user_id == user_id && c.in_lesson(lesson_id)))
            .cloned()
            .collect();
        log::debug!(
            "Replacing {} cards of {user_id} in lesson {lesson_id} with {}",
            self.cards.len() - next.len(),
            fresh.len()
        );
        let created = fresh.len();
        next.extend(fresh);
        self.commit(next)?;
        Ok(created)
    }

    // Memory only changes once the file write has gone through.
    fn commit(&mut self, next: Vec<Card>) -> Result<()> {
        self.write(&next)?;
        self.cards = next;
        Ok(())
    }

    fn write(&self, cards: &[Card]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        card::save_csv(path, cards).map_err(|source| StoreError::Csv {
            path: path.clone(),
            source,
        })
    }
}

fn read_cards(path: &Path, now: DateTime<Utc>) -> Result<Vec<Card>> {
    card::load_csv(path, now).map_err(|source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    })
}
