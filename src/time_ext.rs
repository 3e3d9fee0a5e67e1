use std::time::Duration as StdDuration;

pub(crate) trait TimeDurationExt {
    /// Negative durations clamp to zero. Durations beyond `u64::MAX` nanoseconds saturate.
    fn to_std_duration(self) -> StdDuration;
}

impl TimeDurationExt for time::Duration {
    fn to_std_duration(self) -> StdDuration {
        if self.is_negative() {
            return StdDuration::ZERO;
        }
        u64::try_from(self.whole_nanoseconds())
            .map(StdDuration::from_nanos)
            .unwrap_or(StdDuration::MAX)
    }
}
