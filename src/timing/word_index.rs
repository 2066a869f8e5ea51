//! Global word numbering across segments
//!
//! Built once from the catalog's word counts. `prefix[i]` is the global index
//! of segment `i`'s first word and `prefix[n]` is the total.

use crate::{ReadalongError, Result};

/// A word addressed by segment position and index within the segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordLocation {
    pub segment: usize,
    pub local: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordIndex {
    prefix: Vec<usize>,
}

impl WordIndex {
    pub fn from_counts(counts: &[usize]) -> Result<Self> {
        if counts.is_empty() {
            return Err(ReadalongError::ConfigError(
                "Cannot index an article with no segments".into(),
            ));
        }
        let mut prefix = Vec::with_capacity(counts.len() + 1);
        let mut total = 0usize;
        prefix.push(0);
        for &count in counts {
            total += count;
            prefix.push(total);
        }
        Ok(Self { prefix })
    }

    pub fn total_words(&self) -> usize {
        *self.prefix.last().unwrap_or(&0)
    }

    pub fn segment_count(&self) -> usize {
        self.prefix.len() - 1
    }

    pub fn word_count(&self, segment: usize) -> usize {
        match (self.prefix.get(segment), self.prefix.get(segment + 1)) {
            (Some(start), Some(end)) => end - start,
            _ => 0,
        }
    }

    pub fn to_global(&self, segment: usize, local: usize) -> Option<usize> {
        if local < self.word_count(segment) {
            Some(self.prefix[segment] + local)
        } else {
            None
        }
    }

    pub fn resolve(&self, global: usize) -> Option<WordLocation> {
        if global >= self.total_words() {
            return None;
        }
        // Last segment whose first word is at or before `global`. Empty
        // segments share their start with the next one and are skipped.
        let segment = self.prefix.partition_point(|&p| p <= global) - 1;
        Some(WordLocation {
            segment,
            local: global - self.prefix[segment],
        })
    }

    /// Global index for a fraction of the article in `0.0..=1.0`
    pub fn global_at_fraction(&self, fraction: f64) -> Option<usize> {
        let total = self.total_words();
        if total == 0 {
            return None;
        }
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        Some(((fraction * total as f64).floor() as usize).min(total - 1))
    }

    /// Progress through the article as a percentage
    pub fn progress_percent(&self, global: usize) -> f32 {
        let total = self.total_words();
        if total == 0 {
            return 0.0;
        }
        (global as f64 / total as f64 * 100.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_two_segments() {
        let index = WordIndex::from_counts(&[10, 5]).unwrap();
        assert_eq!(index.resolve(12), Some(WordLocation { segment: 1, local: 2 }));
        assert_eq!(index.to_global(1, 2), Some(12));
    }

    #[test]
    fn test_sum_matches_total_and_prefix_increases() {
        let counts = [7, 3, 12, 1, 40];
        let index = WordIndex::from_counts(&counts).unwrap();
        assert_eq!(index.total_words(), counts.iter().sum::<usize>());
        for w in index.prefix.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn test_round_trip_every_word() {
        let index = WordIndex::from_counts(&[4, 1, 9, 6]).unwrap();
        for g in 0..index.total_words() {
            let loc = index.resolve(g).unwrap();
            assert_eq!(index.to_global(loc.segment, loc.local), Some(g));
        }
    }

    #[test]
    fn test_empty_segment_is_skipped() {
        let index = WordIndex::from_counts(&[2, 0, 3]).unwrap();
        assert_eq!(index.resolve(2), Some(WordLocation { segment: 2, local: 0 }));
        assert_eq!(index.to_global(1, 0), None);
    }

    #[test]
    fn test_out_of_range() {
        let index = WordIndex::from_counts(&[10, 5]).unwrap();
        assert_eq!(index.resolve(15), None);
        assert_eq!(index.to_global(0, 10), None);
        assert_eq!(index.to_global(2, 0), None);
    }

    #[test]
    fn test_no_segments_rejected() {
        assert!(WordIndex::from_counts(&[]).is_err());
    }

    #[test]
    fn test_fraction_and_progress() {
        let index = WordIndex::from_counts(&[10, 10]).unwrap();
        assert_eq!(index.global_at_fraction(0.0), Some(0));
        assert_eq!(index.global_at_fraction(0.5), Some(10));
        assert_eq!(index.global_at_fraction(1.0), Some(19));
        assert_eq!(index.global_at_fraction(7.0), Some(19));
        assert!((index.progress_percent(5) - 25.0).abs() < f32::EPSILON);
    }
}
