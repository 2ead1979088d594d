/// Recognized keys in the `SystemState` key-value table.
///
/// Stored and read back as plain strings; the typed accessors on
/// `rfctl-store`'s `Store` parse/format these, this enum just names the
/// canonical keys so callers don't hand-write them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStateKey {
    Paused,
    AutoPaused,
    InitialSetupRequired,
    DayStart,
    EndOfDay,
    AutoPauseDaily,
}

impl SystemStateKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::AutoPaused => "auto_paused",
            Self::InitialSetupRequired => "initial_setup_required",
            Self::DayStart => "day_start",
            Self::EndOfDay => "end_of_day",
            Self::AutoPauseDaily => "auto_pause_daily",
        }
    }
}

impl std::fmt::Display for SystemStateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
