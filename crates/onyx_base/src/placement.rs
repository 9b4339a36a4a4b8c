use crate::location::Location;
use crate::position::Position;
use crate::source::{SourceMap, UnitId};

/// A [`Location`] within a compilation unit. This is what diagnostics point
/// at; the unit id resolves through the program's [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub unit: UnitId,
    pub location: Location,
}

impl Placement {
    pub fn new(unit: UnitId, location: Location) -> Self {
        Self { unit, location }
    }

    pub fn point(unit: UnitId, position: Position) -> Self {
        Self {
            unit,
            location: Location::point(position),
        }
    }

    /// Merge with another placement of the same unit, spanning both.
    pub fn merge(self, other: Placement) -> Placement {
        debug_assert_eq!(self.unit, other.unit, "merging placements across units");
        Placement {
            unit: self.unit,
            location: self.location.merge(other.location),
        }
    }

    /// Render as `unit:row:col` for the end user, resolving the chain of
    /// containing units so the outermost frame comes first.
    pub fn describe(&self, map: &SourceMap) -> String {
        let absolute = map.absolute_position(self.unit, self.location.start);
        let root = map
            .path(*self)
            .first()
            .map(|outer| outer.unit)
            .unwrap_or(self.unit);
        format!("{}:{}", map.name(root), absolute)
    }
}
