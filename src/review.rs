use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::card::Card;
use crate::sm2::{self, Grade};

/// Which of a user's cards a query should consider.
#[derive(Debug, Clone, Copy)]
pub struct CardFilter<'a> {
    pub user_id: &'a str,
    pub lesson_id: Option<&'a str>,
    pub due_before: Option<DateTime<Utc>>,
}

impl<'a> CardFilter<'a> {
    pub fn user(user_id: &'a str) -> Self {
        CardFilter {
            user_id,
            lesson_id: None,
            due_before: None,
        }
    }

    pub fn lesson(mut self, lesson_id: Option<&'a str>) -> Self {
        self.lesson_id = lesson_id;
        self
    }

    pub fn due(mut self, now: DateTime<Utc>) -> Self {
        self.due_before = Some(now);
        self
    }

    pub fn matches(&self, card: &Card) -> bool {
        card.user_id == self.user_id
            && self.lesson_id.is_none_or(|l| card.in_lesson(l))
            && self.due_before.is_none_or(|now| card.is_due(now))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonSummary {
    pub lesson: Option<String>,
    pub total: usize,
    pub due: usize,
    pub learning: usize,
}

/// Cards matching `filter`, earliest due first (so the most overdue card
/// leads), newest first among cards due at the same instant.
pub fn list_cards<'c>(cards: &'c [Card], filter: CardFilter<'_>, limit: usize) -> Vec<&'c Card> {
    let mut matching: Vec<&Card> = cards.iter().filter(|c| filter.matches(c)).collect();
    matching.sort_by_key(|c| (c.schedule.due_at, Reverse(c.created_at)));
    matching.truncate(limit);
    matching
}

pub fn due_cards<'c>(
    cards: &'c [Card],
    user_id: &str,
    lesson_id: Option<&str>,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<&'c Card> {
    let filter = CardFilter::user(user_id).lesson(lesson_id).due(now);
    list_cards(cards, filter, limit)
}

pub fn lesson_summaries(cards: &[Card], user_id: &str, now: DateTime<Utc>) -> Vec<LessonSummary> {
    let mut lessons: BTreeMap<Option<String>, LessonSummary> = BTreeMap::new();
    for card in cards.iter().filter(|c| c.user_id == user_id) {
        let entry = lessons
            .entry(card.lesson_id.clone())
            .or_insert_with(|| LessonSummary {
                lesson: card.lesson_id.clone(),
                total: 0,
                due: 0,
                learning: 0,
            });
        entry.total += 1;
        if card.is_due(now) {
            entry.due += 1;
        }
        if !card.schedule.is_lapsed() {
            entry.learning += 1;
        }
    }
    lessons.into_values().collect()
}

pub fn apply_review(card: &mut Card, grade: Grade, now: DateTime<Utc>) {
    let before = card.schedule;
    card.schedule = sm2::review(before, grade, now);
    log::debug!(
        "{} {} ease={:.2} reps={} interval={}d due={}",
        card.id,
        grade.as_str(),
        card.schedule.ease_factor,
        card.schedule.repetitions,
        card.schedule.interval_days,
        card.schedule.due_at
    );
}
