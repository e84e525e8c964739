pub mod manifest;
pub mod pattern;
pub mod question;
pub mod rendered;

pub use manifest::{ManifestEntry, OutputManifest, PatternOutput};
pub use pattern::{Pattern, PatternCollection, VariableDefinition, VariableKind};
pub use question::{QuestionInstance, QuestionSet, SolvabilityStatus};
pub use rendered::RenderedDiagram;
