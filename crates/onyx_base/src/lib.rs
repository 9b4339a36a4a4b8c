//! Structural atoms shared by every stage of the fnxc pipeline: source
//! positions and spans, the unit arena, diagnostics and the safety model.

pub mod location;
pub mod panic;
pub mod placement;
pub mod position;
pub mod safety;
pub mod source;
pub mod style;

pub use location::Location;
pub use panic::{LinkerFailure, Note, Panic, PanicId, Unimplemented};
pub use placement::Placement;
pub use position::Position;
pub use safety::{Safety, Storage};
pub use source::{SourceMap, Unit, UnitId};
pub use style::Style;
