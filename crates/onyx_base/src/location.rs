use crate::position::Position;

/// A spanning location comprised of a start and an optional end position.
/// When the end is present it is lexicographically >= the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub start: Position,
    pub end: Option<Position>,
}

impl Location {
    pub fn new(start: Position, end: Position) -> Self {
        debug_assert!(end >= start, "location end precedes start");
        Self { start, end: Some(end) }
    }

    pub fn point(start: Position) -> Self {
        Self { start, end: None }
    }

    /// Merge two locations into one spanning both.
    pub fn merge(self, other: Location) -> Location {
        let start = self.start.min(other.start);
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a.max(other.start)),
            (None, Some(b)) => Some(b.max(self.start)),
            (None, None) => Some(self.start.max(other.start)),
        };
        Location { start, end }
    }
}
