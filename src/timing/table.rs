use crate::{ReadalongError, Result};
use serde::{Deserialize, Serialize};

/// A single aligned word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    /// Start time in seconds from the beginning of the segment audio
    pub start: f64,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start: f64) -> Self {
        Self {
            word: word.into(),
            start,
        }
    }
}

/// Ordered word start times for one segment
///
/// Word `i` is active on `[start_i, start_{i+1})`; the last word stays active
/// until the end of the audio. Starts must never go backwards. Forced
/// alignment repeats the previous start when it misses a word, so equal
/// neighbours are accepted and simply give the earlier word an empty interval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingTable {
    entries: Vec<WordTiming>,
}

impl TimingTable {
    pub fn new(entries: Vec<WordTiming>) -> Result<Self> {
        for (i, entry) in entries.iter().enumerate() {
            if !entry.start.is_finite() || entry.start < 0.0 {
                return Err(ReadalongError::ResourceUnavailable(format!(
                    "Invalid start time {} for word {}",
                    entry.start, i
                )));
            }
            if i > 0 && entry.start < entries[i - 1].start {
                return Err(ReadalongError::ResourceUnavailable(format!(
                    "Start times go backwards at word {} ({} < {})",
                    i,
                    entry.start,
                    entries[i - 1].start
                )));
            }
        }
        Ok(Self { entries })
    }

    /// The explicit "no timing available" table
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[WordTiming] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&WordTiming> {
        self.entries.get(index)
    }

    /// Recorded start time of a word
    pub fn start_of(&self, index: usize) -> Option<f64> {
        self.entries.get(index).map(|e| e.start)
    }

    /// Whether `time` falls inside word `index`'s interval
    pub fn contains(&self, index: usize, time: f64) -> bool {
        let Some(entry) = self.entries.get(index) else {
            return false;
        };
        if time < entry.start {
            return false;
        }
        match self.entries.get(index + 1) {
            Some(next) => time < next.start,
            None => true,
        }
    }

    /// Full scan from the first word
    pub fn lookup(&self, time: f64) -> Option<usize> {
        (0..self.entries.len()).find(|&i| self.contains(i, time))
    }

    /// Forward scan from the last resolved word, falling back to a full scan
    ///
    /// Playback nearly always moves to the word right after `hint`, so the
    /// forward scan usually stops after one or two comparisons. A backward
    /// seek leaves nothing ahead of the hint and drops to the full scan.
    pub fn lookup_from(&self, hint: Option<usize>, time: f64) -> Option<usize> {
        if let Some(start) = hint {
            for i in start..self.entries.len() {
                if self.contains(i, time) {
                    return Some(i);
                }
                if self.entries[i].start > time {
                    break;
                }
            }
        }
        self.lookup(time)
    }
}
