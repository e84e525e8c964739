pub mod diagram_compiler;
pub mod document_assembler;
pub mod fallback;
pub mod llm_service;
pub mod pattern_source;
pub mod question_source;
pub mod recovery;
pub mod retry;
pub mod sanitizer;
pub mod storage;
pub mod validator;

pub use diagram_compiler::{CompileStage, CompilerSettings, DiagramCompiler, RenderResult};
pub use document_assembler::{DocumentAssembler, MarkdownAssembler};
pub use llm_service::{LlmService, TextGenerator};
pub use pattern_source::PatternSource;
pub use question_source::QuestionSource;
pub use recovery::{recover, Recovered, RecoveryEngine};
pub use retry::{linear_backoff, retry, AttemptError, RetryFailure};
pub use sanitizer::{sanitize, SanitizeError, SanitizedSource};
pub use storage::ArtifactStore;
pub use validator::{validate_batch, ValidationReport};
