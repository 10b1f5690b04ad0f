//! Latency and throughput accounting.

use oxbow_common::{OpKind, SimTime};
use oxbow_compute::{Completion, Outcome};

/// Latency accumulator for one operation kind.
#[derive(Debug, Default, Clone)]
pub struct LatencyStats {
    pub count: u64,
    pub failed: u64,
    pub total_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
}

impl LatencyStats {
    fn record(&mut self, latency: SimTime, failed: bool) {
        if failed {
            self.failed += 1;
            return;
        }
        if self.count == 0 || latency < self.min_ns {
            self.min_ns = latency;
        }
        if latency > self.max_ns {
            self.max_ns = latency;
        }
        self.count += 1;
        self.total_ns += latency;
    }

    /// Mean latency over successful operations, or 0 with none.
    pub fn mean_ns(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_ns / self.count
        }
    }
}

/// Aggregated statistics for one simulation run.
#[derive(Debug, Default, Clone)]
pub struct SimStats {
    pub inserts: LatencyStats,
    pub searches: LatencyStats,
    pub deletes: LatencyStats,
    pub searches_found: u64,
    pub searches_missed: u64,
}

impl SimStats {
    /// Folds one terminal record into the accumulators.
    pub fn record(&mut self, completion: &Completion) {
        let failed = completion.outcome == Outcome::Failed;
        match completion.kind {
            OpKind::Insert => self.inserts.record(completion.latency, failed),
            OpKind::Search => {
                self.searches.record(completion.latency, failed);
                match completion.outcome {
                    Outcome::Found(_) => self.searches_found += 1,
                    Outcome::NotFound => self.searches_missed += 1,
                    _ => {}
                }
            }
            OpKind::Delete => self.deletes.record(completion.latency, failed),
            // Split kinds never surface in completions.
            OpKind::SplitLeaf | OpKind::SplitInternal => {}
        }
    }

    /// Total operations that reached a terminal state.
    pub fn completed(&self) -> u64 {
        self.inserts.count + self.searches.count + self.deletes.count
    }

    /// Total operations that completed as failed.
    pub fn failed(&self) -> u64 {
        self.inserts.failed + self.searches.failed + self.deletes.failed
    }

    /// Human-readable run summary.
    pub fn summary(&self) -> String {
        format!(
            "ops={} failed={} | insert n={} mean={}ns max={}ns | search n={} mean={}ns (found={} missed={}) | delete n={} mean={}ns",
            self.completed(),
            self.failed(),
            self.inserts.count,
            self.inserts.mean_ns(),
            self.inserts.max_ns,
            self.searches.count,
            self.searches.mean_ns(),
            self.searches_found,
            self.searches_missed,
            self.deletes.count,
            self.deletes.mean_ns(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(kind: OpKind, outcome: Outcome, latency: u64) -> Completion {
        Completion {
            kind,
            key: 1,
            outcome,
            latency,
        }
    }

    #[test]
    fn test_latency_accumulation() {
        let mut stats = SimStats::default();
        stats.record(&completion(OpKind::Insert, Outcome::Inserted, 100));
        stats.record(&completion(OpKind::Insert, Outcome::Updated, 300));
        stats.record(&completion(OpKind::Insert, Outcome::Inserted, 200));

        assert_eq!(stats.inserts.count, 3);
        assert_eq!(stats.inserts.min_ns, 100);
        assert_eq!(stats.inserts.max_ns, 300);
        assert_eq!(stats.inserts.mean_ns(), 200);
    }

    #[test]
    fn test_failures_do_not_skew_latency() {
        let mut stats = SimStats::default();
        stats.record(&completion(OpKind::Search, Outcome::Found(5), 100));
        stats.record(&completion(OpKind::Search, Outcome::Failed, 999_999));

        assert_eq!(stats.searches.count, 1);
        assert_eq!(stats.searches.failed, 1);
        assert_eq!(stats.searches.max_ns, 100);
        assert_eq!(stats.failed(), 1);
    }

    #[test]
    fn test_search_hit_and_miss_counters() {
        let mut stats = SimStats::default();
        stats.record(&completion(OpKind::Search, Outcome::Found(1), 10));
        stats.record(&completion(OpKind::Search, Outcome::NotFound, 10));
        stats.record(&completion(OpKind::Search, Outcome::NotFound, 10));

        assert_eq!(stats.searches_found, 1);
        assert_eq!(stats.searches_missed, 2);
    }

    #[test]
    fn test_completed_spans_kinds() {
        let mut stats = SimStats::default();
        stats.record(&completion(OpKind::Insert, Outcome::Inserted, 10));
        stats.record(&completion(OpKind::Search, Outcome::NotFound, 10));
        stats.record(&completion(OpKind::Delete, Outcome::Deleted, 10));
        assert_eq!(stats.completed(), 3);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let mut stats = SimStats::default();
        stats.record(&completion(OpKind::Insert, Outcome::Inserted, 10));
        let summary = stats.summary();
        assert!(summary.contains("ops=1"));
        assert!(summary.contains("insert n=1"));
    }
}
