use crate::types::{Command, LogEntry, LogIndex, Term};

/// In-memory replicated log with commit/apply cursors. Indices are 1-based
/// and contiguous; index 0 stands for "before the first entry".
#[derive(Debug, Clone, Default)]
pub struct LogStore {
    entries: Vec<LogEntry>,
    commit_index: LogIndex,
    last_applied: LogIndex,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_index(&self) -> LogIndex {
        self.entries.last().map(|e| e.index).unwrap_or(0)
    }

    pub fn last_term(&self) -> Term {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn get(&self, index: LogIndex) -> Option<&LogEntry> {
        if index == 0 {
            return None;
        }
        self.entries.get((index - 1) as usize)
    }

    /// Term of the entry at `index`; 0 for index 0, `None` past the end.
    pub fn term_at(&self, index: LogIndex) -> Option<Term> {
        if index == 0 {
            return Some(0);
        }
        self.get(index).map(|e| e.term)
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Up to `max` entries starting at `start` (inclusive).
    pub fn entries_from(&self, start: LogIndex, max: usize) -> Vec<LogEntry> {
        let start = start.max(1);
        if start > self.last_index() {
            return Vec::new();
        }
        self.entries[(start - 1) as usize..]
            .iter()
            .take(max)
            .cloned()
            .collect()
    }

    /// Appends a locally originated command at the next index.
    pub fn append_command(&mut self, term: Term, command: Command) -> &LogEntry {
        let index = self.last_index() + 1;
        self.entries.push(LogEntry {
            term,
            index,
            command,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Appends replicated entries, skipping any whose index is already
    /// present. Returns how many entries were added.
    pub fn append_new(&mut self, entries: &[LogEntry]) -> usize {
        let mut added = 0;
        for entry in entries {
            if entry.index == self.last_index() + 1 {
                self.entries.push(entry.clone());
                added += 1;
            }
        }
        added
    }

    /// Appends replicated entries, first discarding the suffix that starts at
    /// the first entry whose term conflicts with what is stored.
    pub fn append_truncating(&mut self, entries: &[LogEntry]) -> usize {
        for entry in entries {
            match self.term_at(entry.index) {
                Some(term) if term != entry.term => {
                    self.truncate_from(entry.index);
                    break;
                }
                _ => {}
            }
        }
        self.append_new(entries)
    }

    fn truncate_from(&mut self, index: LogIndex) {
        if index == 0 {
            return;
        }
        self.entries.truncate((index - 1) as usize);
        self.commit_index = self.commit_index.min(self.last_index());
        self.last_applied = self.last_applied.min(self.commit_index);
    }

    /// Moves the commit index forward, never past the last entry and never
    /// backward. Returns true if it moved.
    pub fn commit_to(&mut self, index: LogIndex) -> bool {
        let target = index.min(self.last_index());
        if target > self.commit_index {
            self.commit_index = target;
            true
        } else {
            false
        }
    }

    /// Advances `last_applied` to the commit index, returning the entries
    /// that became applied.
    pub fn apply_committed(&mut self) -> Vec<LogEntry> {
        let mut applied = Vec::new();
        while self.last_applied < self.commit_index {
            self.last_applied += 1;
            if let Some(entry) = self.get(self.last_applied) {
                applied.push(entry.clone());
            }
        }
        applied
    }

    /// True if a log ending at (`last_index`, `last_term`) is at least as
    /// up to date as this one.
    pub fn is_up_to_date(&self, last_index: LogIndex, last_term: Term) -> bool {
        last_term > self.last_term()
            || (last_term == self.last_term() && last_index >= self.last_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: Term, index: LogIndex) -> LogEntry {
        LogEntry {
            term,
            index,
            command: Command::new(index, format!("cmd-{}", index)),
        }
    }

    #[test]
    fn empty_log_cursors() {
        let log = LogStore::new();
        assert_eq!(log.last_index(), 0);
        assert_eq!(log.last_term(), 0);
        assert_eq!(log.term_at(0), Some(0));
        assert_eq!(log.term_at(1), None);
        assert!(log.entries_from(1, 10).is_empty());
    }

    #[test]
    fn append_command_assigns_contiguous_indices() {
        let mut log = LogStore::new();
        log.append_command(1, Command::new(1, "a"));
        let second = log.append_command(2, Command::new(2, "b")).clone();
        assert_eq!(second.index, 2);
        assert_eq!(log.last_term(), 2);
        assert_eq!(log.term_at(1), Some(1));
    }

    #[test]
    fn entries_from_respects_batch_limit() {
        let mut log = LogStore::new();
        for i in 1..=5 {
            log.append_command(1, Command::new(i, "x"));
        }
        let batch = log.entries_from(2, 2);
        assert_eq!(batch.iter().map(|e| e.index).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(log.entries_from(0, 10).len(), 5);
    }

    #[test]
    fn append_new_is_idempotent() {
        let mut log = LogStore::new();
        let batch = vec![entry(1, 1), entry(1, 2)];
        assert_eq!(log.append_new(&batch), 2);
        assert_eq!(log.append_new(&batch), 0);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn append_truncating_replaces_conflicting_suffix() {
        let mut log = LogStore::new();
        log.append_new(&[entry(1, 1), entry(1, 2), entry(1, 3)]);
        log.commit_to(1);

        let added = log.append_truncating(&[entry(2, 2)]);
        assert_eq!(added, 1);
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.term_at(2), Some(2));
        assert_eq!(log.commit_index(), 1);
    }

    #[test]
    fn commit_never_passes_last_index_or_moves_back() {
        let mut log = LogStore::new();
        log.append_new(&[entry(1, 1), entry(1, 2)]);
        assert!(log.commit_to(10));
        assert_eq!(log.commit_index(), 2);
        assert!(!log.commit_to(1));
        assert_eq!(log.commit_index(), 2);
    }

    #[test]
    fn apply_committed_catches_up() {
        let mut log = LogStore::new();
        log.append_new(&[entry(1, 1), entry(1, 2), entry(1, 3)]);
        log.commit_to(2);
        let applied = log.apply_committed();
        assert_eq!(applied.len(), 2);
        assert_eq!(log.last_applied(), 2);
        assert!(log.apply_committed().is_empty());
    }

    #[test]
    fn up_to_date_compares_term_then_index() {
        let mut log = LogStore::new();
        log.append_new(&[entry(1, 1), entry(2, 2)]);
        assert!(log.is_up_to_date(1, 3));
        assert!(log.is_up_to_date(2, 2));
        assert!(!log.is_up_to_date(1, 2));
        assert!(!log.is_up_to_date(5, 1));
    }
}
