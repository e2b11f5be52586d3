//! Classification result reported by the daemon.

/// Largest magnitude accepted for a score or threshold.
pub const SCORE_LIMIT: f32 = 1e10;

/// Result of the daemon's `Spam:` header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    /// Whether the message crossed the threshold.
    pub is_spam: bool,
    /// Message score.
    pub score: f32,
    /// Spam threshold.
    pub threshold: f32,
}

impl Verdict {
    /// Creates a verdict, clamping score and threshold to ±[`SCORE_LIMIT`].
    #[must_use]
    pub fn new(is_spam: bool, score: f32, threshold: f32) -> Self {
        Self {
            is_spam,
            score: score.clamp(-SCORE_LIMIT, SCORE_LIMIT),
            threshold: threshold.clamp(-SCORE_LIMIT, SCORE_LIMIT),
        }
    }

    /// Formats the one-line `score/threshold` summary.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!("{:.1}/{:.1}\n", self.score, self.threshold)
    }
}

/// Summary written when no verdict could be obtained.
pub const EMPTY_SUMMARY: &[u8] = b"0/0\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        let verdict = Verdict::new(true, 12.3, 5.0);
        assert_eq!(verdict.summary_line(), "12.3/5.0\n");
    }

    #[test]
    fn test_summary_line_negative() {
        let verdict = Verdict::new(false, -1.3, 5.0);
        assert_eq!(verdict.summary_line(), "-1.3/5.0\n");
    }

    #[test]
    fn test_clamps_extremes() {
        let verdict = Verdict::new(true, 1e20, -1e20);
        assert!((verdict.score - SCORE_LIMIT).abs() < f32::EPSILON);
        assert!((verdict.threshold + SCORE_LIMIT).abs() < f32::EPSILON);
    }
}
