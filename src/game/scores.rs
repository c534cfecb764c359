use crate::core::store::{RANKING_KEY, Store};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const RANKING_SIZE: usize = 5;
/// Shorter runs still get a score but never reach the board.
pub const RANKING_MIN_NOTES: usize = 100;

const SCORE_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearResult {
    pub note_count: usize,
    pub miss_count: u32,
    pub elapsed_seconds: f64,
    /// Notes per second.
    pub rate: f64,
    /// 0.0 to 1.0
    pub accuracy: f64,
    pub score: u64,
}

impl ClearResult {
    #[inline(always)]
    pub fn qualifies_for_ranking(&self) -> bool {
        self.note_count >= RANKING_MIN_NOTES
    }
}

/// Scores a cleared run. `elapsed` already includes every miss penalty.
///
/// score = round(rate * accuracy^3 * 10000)
pub fn compute(note_count: usize, miss_count: u32, elapsed: Duration) -> ClearResult {
    let elapsed_seconds = elapsed.as_secs_f64().max(0.001);
    let notes = note_count.max(1) as f64;
    let rate = note_count as f64 / elapsed_seconds;
    let accuracy = ((notes - f64::from(miss_count)) / notes).clamp(0.0, 1.0);
    let score = (rate * accuracy.powi(3) * SCORE_SCALE).round().max(0.0) as u64;

    ClearResult {
        note_count,
        miss_count,
        elapsed_seconds,
        rate,
        accuracy,
        score,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub score: u64,
}

/// Top scores, best first, at most [`RANKING_SIZE`] long.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranking {
    entries: Vec<RankingEntry>,
}

impl Ranking {
    pub fn entries(&self) -> &[RankingEntry] {
        &self.entries
    }

    /// Reads the board from the store. Anything unreadable counts as empty.
    pub fn load(store: &dyn Store) -> Self {
        let Some(json) = store.get(RANKING_KEY) else {
            return Self::default();
        };
        match serde_json::from_str::<Vec<RankingEntry>>(&json) {
            Ok(entries) => {
                let mut ranking = Self { entries };
                ranking.normalize();
                ranking
            }
            Err(e) => {
                warn!("Discarding unreadable ranking: {}", e);
                Self::default()
            }
        }
    }

    fn normalize(&mut self) {
        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
        self.entries.truncate(RANKING_SIZE);
    }

    /// Adds a score to the board and persists it. Returns the position it
    /// landed on, or `None` when it did not make the cut.
    pub fn submit(&mut self, score: u64, store: &mut dyn Store) -> Option<usize> {
        self.entries.push(RankingEntry { score });
        self.entries.sort_by(|a, b| b.score.cmp(&a.score));
        // The sort is stable, so the new entry is the last of its ties.
        let position = self
            .entries
            .iter()
            .rposition(|e| e.score == score)
            .filter(|&pos| pos < RANKING_SIZE);
        self.entries.truncate(RANKING_SIZE);

        match serde_json::to_string(&self.entries) {
            Ok(json) => {
                if let Err(e) = store.set(RANKING_KEY, &json) {
                    warn!("Failed to save ranking: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode ranking: {}", e),
        }
        if let Some(pos) = position {
            info!("Score {} entered the ranking at #{}.", score, pos + 1);
        }
        position
    }

    pub fn reset(&mut self, store: &mut dyn Store) {
        self.entries.clear();
        if let Err(e) = store.remove(RANKING_KEY) {
            warn!("Failed to clear saved ranking: {}", e);
        }
        info!("Ranking reset.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;

    #[test]
    fn clean_hundred_in_twenty_seconds() {
        let r = compute(100, 0, Duration::from_secs(20));
        assert!((r.rate - 5.0).abs() < 1e-9);
        assert_eq!(r.accuracy, 1.0);
        assert_eq!(r.score, 50_000);
        assert!(r.qualifies_for_ranking());
    }

    #[test]
    fn ten_misses_cost_the_cube_of_accuracy() {
        let r = compute(100, 10, Duration::from_secs(20));
        assert!((r.accuracy - 0.9).abs() < 1e-12);
        assert_eq!(r.score, 36_450);
    }

    #[test]
    fn more_misses_than_notes_scores_zero() {
        let r = compute(10, 25, Duration::from_secs(30));
        assert_eq!(r.accuracy, 0.0);
        assert_eq!(r.score, 0);
    }

    #[test]
    fn short_runs_do_not_qualify() {
        assert!(!compute(50, 0, Duration::from_secs(5)).qualifies_for_ranking());
        assert!(compute(RANKING_MIN_NOTES, 0, Duration::from_secs(5)).qualifies_for_ranking());
    }

    #[test]
    fn ranking_stays_sorted_and_bounded() {
        let mut store = MemoryStore::new();
        let mut ranking = Ranking::default();
        for score in [300, 100, 500, 200, 400, 50, 600] {
            ranking.submit(score, &mut store);
        }
        let scores: Vec<u64> = ranking.entries().iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![600, 500, 400, 300, 200]);

        let reloaded = Ranking::load(&store);
        assert_eq!(reloaded, ranking);
    }

    #[test]
    fn submit_reports_the_landing_position() {
        let mut store = MemoryStore::new();
        let mut ranking = Ranking::default();
        assert_eq!(ranking.submit(1000, &mut store), Some(0));
        assert_eq!(ranking.submit(2000, &mut store), Some(0));
        assert_eq!(ranking.submit(1500, &mut store), Some(1));
        for s in [3000, 4000, 5000] {
            ranking.submit(s, &mut store);
        }
        assert_eq!(ranking.submit(10, &mut store), None);
    }

    #[test]
    fn tie_lands_below_equal_scores() {
        let mut store = MemoryStore::new();
        let mut ranking = Ranking::default();
        for s in [5, 4, 3, 2] {
            ranking.submit(s, &mut store);
        }
        assert_eq!(ranking.submit(3, &mut store), Some(3));
        // Full board: a tie with the last entry does not make the cut.
        assert_eq!(ranking.submit(2, &mut store), None);
        let scores: Vec<u64> = ranking.entries().iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![5, 4, 3, 3, 2]);
    }

    #[test]
    fn saved_json_matches_the_board_format() {
        let mut store = MemoryStore::new();
        let mut ranking = Ranking::default();
        ranking.submit(42, &mut store);
        assert_eq!(store.get(RANKING_KEY).as_deref(), Some(r#"[{"score":42}]"#));
    }

    #[test]
    fn unsorted_or_oversized_saved_board_is_normalized() {
        let mut store = MemoryStore::new();
        store
            .set(RANKING_KEY, r#"[{"score":1},{"score":9},{"score":5},{"score":7},{"score":3},{"score":8}]"#)
            .unwrap();
        let ranking = Ranking::load(&store);
        let scores: Vec<u64> = ranking.entries().iter().map(|e| e.score).collect();
        assert_eq!(scores, vec![9, 8, 7, 5, 3]);
    }

    #[test]
    fn corrupt_saved_board_loads_empty() {
        let mut store = MemoryStore::new();
        store.set(RANKING_KEY, "[{\"score\":").unwrap();
        assert!(Ranking::load(&store).entries().is_empty());
    }

    #[test]
    fn reset_clears_memory_and_store() {
        let mut store = MemoryStore::new();
        let mut ranking = Ranking::default();
        ranking.submit(7, &mut store);
        ranking.reset(&mut store);
        assert!(ranking.entries().is_empty());
        assert_eq!(store.get(RANKING_KEY), None);
    }
}
