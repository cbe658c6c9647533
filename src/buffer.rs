use crate::catalog::MatchInfo;
use crate::ledger::ProcessedLedger;

pub const DEFAULT_BUFFER_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    AlreadyProcessed,
    Buffered { len: usize },
    Flush(Vec<MatchInfo>),
}

/// Ordered, bounded buffer of matches awaiting a batch.
///
/// Accumulates until `threshold` matches are held, then hands the whole buffer
/// out as one batch. At rest it never holds `threshold` or more matches.
#[derive(Debug, Clone)]
pub struct MatchBuffer {
    pending: Vec<MatchInfo>,
    threshold: usize,
}

impl MatchBuffer {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            pending: Vec::with_capacity(threshold),
            threshold,
        }
    }

    pub fn offer(&mut self, m: MatchInfo, ledger: &mut ProcessedLedger) -> Offer {
        if !ledger.mark(m.id) {
            return Offer::AlreadyProcessed;
        }
        self.pending.push(m);
        if self.pending.len() >= self.threshold {
            return Offer::Flush(std::mem::take(&mut self.pending));
        }
        Offer::Buffered {
            len: self.pending.len(),
        }
    }

    /// Drains the final partial batch of a discovery round.
    pub fn finish_round(&mut self) -> Option<Vec<MatchInfo>> {
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for MatchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(id: u64) -> MatchInfo {
        MatchInfo::new(id, 11, 1)
    }

    #[test]
    fn flushes_exactly_at_threshold() {
        let mut ledger = ProcessedLedger::in_memory(64);
        let mut buffer = MatchBuffer::new(3);

        assert_eq!(buffer.offer(m(1), &mut ledger), Offer::Buffered { len: 1 });
        assert_eq!(buffer.offer(m(2), &mut ledger), Offer::Buffered { len: 2 });
        let Offer::Flush(batch) = buffer.offer(m(3), &mut ledger) else {
            panic!("third match should flush");
        };
        assert_eq!(batch.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn seen_matches_are_never_buffered_twice() {
        let mut ledger = ProcessedLedger::in_memory(64);
        let mut buffer = MatchBuffer::new(5);

        assert_eq!(buffer.offer(m(7), &mut ledger), Offer::Buffered { len: 1 });
        assert_eq!(buffer.offer(m(7), &mut ledger), Offer::AlreadyProcessed);
        assert_eq!(buffer.len(), 1);

        let rest = buffer.finish_round().expect("one match pending");
        assert_eq!(rest.len(), 1);
        assert_eq!(buffer.offer(m(7), &mut ledger), Offer::AlreadyProcessed);
    }

    #[test]
    fn finish_round_flushes_remainder_regardless_of_size() {
        let mut ledger = ProcessedLedger::in_memory(64);
        let mut buffer = MatchBuffer::new(5);
        assert!(buffer.finish_round().is_none());

        buffer.offer(m(1), &mut ledger);
        buffer.offer(m(2), &mut ledger);
        let rest = buffer.finish_round().expect("two matches pending");
        assert_eq!(rest.len(), 2);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let mut ledger = ProcessedLedger::in_memory(4);
        let mut buffer = MatchBuffer::new(0);
        assert_eq!(buffer.threshold(), 1);
        assert!(matches!(buffer.offer(m(1), &mut ledger), Offer::Flush(_)));
    }
}
