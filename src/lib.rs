// Library exports for the binaries and integration tests

pub mod classify;
pub mod config;
pub mod error;
pub mod footer;
pub mod images;
pub mod navigation;
pub mod pipeline;
pub mod segment;
pub mod source;
pub mod toc;
pub mod window;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{ConfigError, FooterPatternError, SourceError};
pub use footer::FooterPatternSet;
pub use images::{ImageBucket, ImageGroups, ImageId, ImageRecord};
pub use navigation::{NavigationIndex, Span};
pub use pipeline::{Pipeline, ProcessedDocument, TocEntry};
pub use segment::{RuleSentenceTokenizer, SentenceTokenizer};
pub use source::SourceKind;
