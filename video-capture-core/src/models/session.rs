/// How one recorder session ended.
///
/// ```text
/// waiting (connected) → clock check ─┬→ ClockSkew
///                                    └→ capturing → reconnect ─┬→ Recorded
///                                                               └→ Discarded
/// shutdown at any point → Interrupted
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Capture ran and its shards were kept.
    Recorded {
        session: String,
        shards: u32,
        intervals: u32,
    },

    /// A single fresh shard shorter than the minimum was deleted.
    Discarded { session: String, intervals: u32 },

    /// Existing shards claim to be from the future; capture was not started.
    ClockSkew { newest: String },

    /// Shutdown was requested.
    Interrupted,
}

impl SessionOutcome {
    /// Whether the recorder should back off before the next attempt.
    pub fn needs_backoff(&self) -> bool {
        matches!(self, Self::ClockSkew { .. })
    }
}
