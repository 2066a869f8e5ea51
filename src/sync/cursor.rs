use std::time::Duration;

/// Where narration playback currently is
///
/// Owned by the sync engine. `hint` is the table index of the last resolved
/// word in the current segment and seeds the next forward scan; it is cleared
/// on every segment change and seek.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackCursor {
    pub segment: usize,
    pub hint: Option<usize>,
    pub global: Option<usize>,
    pub last_manual_scroll: Option<Duration>,
    pub auto_scroll_until: Option<Duration>,
    /// The last segment has played to the end
    pub finished: bool,
}

impl PlaybackCursor {
    /// Forget the resolved word so the next frame resolves and emits afresh
    pub fn clear_resolution(&mut self) {
        self.hint = None;
        self.global = None;
        self.finished = false;
    }
}
