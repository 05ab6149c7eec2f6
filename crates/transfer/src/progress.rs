/// Progress of a chunk transfer, reported after every completed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Chunks finished so far.
    pub completed: usize,
    /// Chunks in the whole operation.
    pub total: usize,
    /// Bytes moved so far.
    pub bytes: u64,
}

impl TransferProgress {
    /// Completion in percent (0.0–100.0). An empty transfer counts as done.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 / self.total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_of_total() {
        let p = TransferProgress {
            completed: 1,
            total: 4,
            bytes: 10,
        };
        assert!((p.percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_transfer_is_complete() {
        let p = TransferProgress {
            completed: 0,
            total: 0,
            bytes: 0,
        };
        assert!((p.percentage() - 100.0).abs() < f64::EPSILON);
    }
}
