//! Newest-first log of received request events

use hookscope_common::RequestEvent;
use std::collections::VecDeque;

/// Maximum number of events kept per view
pub const MAX_EVENTS: usize = 500;

/// A received event with its arrival sequence number
#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub seq: u64,
    pub event: RequestEvent,
}

/// Ordered event log with a selection cursor
///
/// Index 0 is always the most recently received event.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LoggedEvent>,
    capacity: usize,
    next_seq: u64,
    selected: Option<u64>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            next_seq: 1,
            selected: None,
        }
    }

    /// Prepend an event, returning its sequence number
    ///
    /// The event becomes the selection if nothing was selected yet. When the
    /// log is full the oldest event is dropped.
    pub fn push(&mut self, event: RequestEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.entries.push_front(LoggedEvent { seq, event });

        if self.selected.is_none() {
            self.selected = Some(seq);
        }

        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                if self.selected == Some(evicted.seq) {
                    self.selected = self.entries.back().map(|e| e.seq);
                }
            }
        }

        seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Events, newest first
    pub fn iter(&self) -> impl Iterator<Item = &LoggedEvent> {
        self.entries.iter()
    }

    pub fn get(&self, seq: u64) -> Option<&LoggedEvent> {
        self.entries.iter().find(|e| e.seq == seq)
    }

    pub fn selected(&self) -> Option<&LoggedEvent> {
        self.selected.and_then(|seq| self.get(seq))
    }

    /// Position of the selected event in newest-first order
    pub fn selected_index(&self) -> Option<usize> {
        let seq = self.selected?;
        self.entries.iter().position(|e| e.seq == seq)
    }

    /// Move the selection one step toward newer events
    pub fn select_newer(&mut self) {
        if let Some(index) = self.selected_index() {
            let index = index.saturating_sub(1);
            self.selected = self.entries.get(index).map(|e| e.seq);
        } else {
            self.select_newest();
        }
    }

    /// Move the selection one step toward older events
    pub fn select_older(&mut self) {
        if let Some(index) = self.selected_index() {
            if let Some(entry) = self.entries.get(index + 1) {
                self.selected = Some(entry.seq);
            }
        } else {
            self.select_newest();
        }
    }

    pub fn select_newest(&mut self) {
        self.selected = self.entries.front().map(|e| e.seq);
    }

    pub fn select_oldest(&mut self) {
        self.selected = self.entries.back().map(|e| e.seq);
    }
}
