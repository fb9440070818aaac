//! bpmodel: schema-driven data-model engine
//!
//! Ingests a declarative data model expressed in XML, validates it against
//! the bundled meta-schema, resolves every internal reference and serves
//! the resolved model to backend projections and bulk-ingest validation.
//!
//! ## Features
//!
//! - **Atomic Loading**: a load returns a fully resolved model or a single
//!   error; a partial model is never observable
//! - **Content Addressing**: SHA-1 digests over the schema, the model and
//!   the external CV stream, verified against packaged archives
//! - **Controlled Vocabularies**: inline, external-file and URI-referenced
//!   term sets with alias and parent/ancestor closure
//! - **Concept Resolution**: concept-type chains, in-domain inheritance,
//!   weak-entity identification and cross-domain foreign-key propagation
//! - **Backend Projection**: document collections with indices, or typed
//!   search mappings, with size-aware fragmentation of oversize CVs
//!
//! ## Architecture
//!
//! ```text
//! bp-model.xml ──► load ──► Model ──► project::document
//!        │          │         │  └──► project::search
//! cv/*.cv┘          │         └─────► validate (bulk ingest)
//!                   │
//! package.zip ──► archive (digest-verified) ──┘
//! ```

pub mod archive;
pub mod config;
pub mod cv;
pub mod digest;
pub mod error;
pub mod load;
pub mod model;
pub mod pattern;
pub mod project;
pub mod types;
pub mod validate;

pub use archive::{emit_package, load_package, load_package_with};
pub use config::EngineConfig;
pub use cv::{Cv, CvEntry, CvTerm, MetaCv};
pub use digest::{DigestSet, Sha1Hex};
pub use error::{ModelError, Result};
pub use load::{load_path, load_path_with, LoadOptions};
pub use model::{Model, ModelStats};
pub use pattern::{FilenamePattern, PatternMatch};
pub use types::{Primitive, TypeTable};
pub use validate::{BatchValidator, RecordValidator};
