//! Per-agent FIFO of pending announcements with subject-based
//! cancellation.

use std::collections::VecDeque;

/// What a queued announcement says about its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementKind {
    Welcome,
    Goodbye,
}

/// One pending announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub kind: AnnouncementKind,
    pub subject: String,
}

impl Announcement {
    /// The line handed to synthesis.
    pub fn text(&self) -> String {
        match self.kind {
            AnnouncementKind::Welcome => format!("Welcome {}", self.subject),
            AnnouncementKind::Goodbye => format!("Goodbye {}", self.subject),
        }
    }
}

/// Ordered queue of announcements, never holding more than one entry per
/// subject.
///
/// Adding a welcome cancels a pending goodbye for the same subject and
/// vice versa, so someone who leaves and rejoins before the agent gets to
/// speak triggers exactly one net announcement instead of an awkward
/// pair.
#[derive(Debug, Default)]
pub struct GreeterQueue {
    entries: VecDeque<Announcement>,
}

impl GreeterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any pending goodbye for `subject`, then appends a welcome.
    pub fn add_welcome(&mut self, subject: &str) {
        self.add(AnnouncementKind::Welcome, AnnouncementKind::Goodbye, subject);
    }

    /// Cancels any pending welcome for `subject`, then appends a goodbye.
    pub fn add_goodbye(&mut self, subject: &str) {
        self.add(AnnouncementKind::Goodbye, AnnouncementKind::Welcome, subject);
    }

    fn add(&mut self, kind: AnnouncementKind, cancels: AnnouncementKind, subject: &str) {
        self.entries
            .retain(|entry| !(entry.kind == cancels && entry.subject == subject));
        self.entries.push_back(Announcement {
            kind,
            subject: subject.to_string(),
        });
    }

    pub fn peek_front(&self) -> Option<&Announcement> {
        self.entries.front()
    }

    pub fn pop_front(&mut self) -> Option<Announcement> {
        self.entries.pop_front()
    }

    /// Drops every entry. Used when the agent itself changes rooms or
    /// when a drain finds the room empty of real occupants.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Copy of the pending entries, front first.
    pub fn entries(&self) -> Vec<Announcement> {
        self.entries.iter().cloned().collect()
    }
}
