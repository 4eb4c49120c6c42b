use crate::model::NavigationState;

/// Caller-side counters handed to [`NavigationHistory::can_go_back`].
///
/// The history only spans the current phase's remote session, so the caller
/// reports where it stands in the overall schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub phase: u32,
    pub question_in_phase: u32,
}

/// Ordered log of visited states with a back/forward cursor.
///
/// Pushing while the cursor sits behind the newest entry discards every entry
/// after the cursor first: taking a new path loses the old future. All
/// operations are total; running out of history is reported as `None`/`false`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationHistory {
    entries: Vec<NavigationState>,
    // index of the active entry; None while empty
    cursor: Option<usize>,
}

impl NavigationHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `state` after the cursor, truncating any abandoned future.
    pub fn push(&mut self, state: NavigationState) {
        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }
        self.entries.push(state);
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Step one entry back. Returns `None` when already at the oldest entry.
    pub fn back(&mut self) -> Option<&NavigationState> {
        match self.cursor {
            Some(cursor) if cursor > 0 => {
                self.cursor = Some(cursor - 1);
                self.entries.get(cursor - 1)
            }
            _ => None,
        }
    }

    /// Step one entry forward. Returns `None` when already at the newest entry.
    pub fn forward(&mut self) -> Option<&NavigationState> {
        match self.cursor {
            Some(cursor) if cursor + 1 < self.entries.len() => {
                self.cursor = Some(cursor + 1);
                self.entries.get(cursor + 1)
            }
            _ => None,
        }
    }

    /// True if there is an earlier entry here, or the caller's counters show
    /// earlier material outside this history (earlier questions or phases).
    #[must_use]
    pub fn can_go_back(&self, position: Position) -> bool {
        self.cursor.is_some_and(|cursor| cursor > 0)
            || position.question_in_phase > 1
            || position.phase > 1
    }

    #[must_use]
    pub fn can_go_forward(&self) -> bool {
        self.cursor
            .is_some_and(|cursor| cursor + 1 < self.entries.len())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    #[must_use]
    pub fn current(&self) -> Option<&NavigationState> {
        self.cursor.and_then(|cursor| self.entries.get(cursor))
    }

    /// Entry right after the cursor, if any.
    #[must_use]
    pub fn peek_forward(&self) -> Option<&NavigationState> {
        self.cursor.and_then(|cursor| self.entries.get(cursor + 1))
    }

    /// Cursor position, `-1` when empty.
    #[must_use]
    pub fn cursor(&self) -> isize {
        self.cursor
            .map_or(-1, |cursor| isize::try_from(cursor).unwrap_or(isize::MAX))
    }

    /// Number of entries before the cursor.
    #[must_use]
    pub fn steps_behind(&self) -> usize {
        self.cursor.unwrap_or(0)
    }

    #[must_use]
    pub fn entries(&self) -> &[NavigationState] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
