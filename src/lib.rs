//! # groundswell-meta
//!
//! AI-assisted image metadata tagging. An uploaded JPEG or PNG is described
//! by a vision model, the description is mapped onto branded EXIF, IPTC and
//! XMP fields, the user reviews and edits them, and the finalized image is
//! returned with the metadata embedded.
//!
//! ## Quick Start
//!
//! Run the whole flow in-process through [`pipeline::MetadataService`]:
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use groundswell_meta::config::Config;
//! use groundswell_meta::pipeline::MetadataService;
//! use std::collections::BTreeMap;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load(Some("config.json".as_ref()))?;
//!     config.apply_env();
//!     config.validate()?;
//!
//!     let service = MetadataService::from_config(&config);
//!     let image = Bytes::from(std::fs::read("storefront.jpg")?);
//!
//!     let outcome = service.analyze("storefront.jpg", image).await?;
//!     println!("{} suggested: {:?}", outcome.ai_service, outcome.analysis.title);
//!
//!     let mut edits = BTreeMap::new();
//!     edits.insert("XMP.Title".to_string(), "Main Street Storefront".to_string());
//!     service.edit(outcome.session_id, &edits).await?;
//!
//!     let finalized = service.finalize(outcome.session_id, None).await?;
//!     std::fs::write(&finalized.filename, &finalized.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! Or serve it over HTTP with [`server::router`].
//!
//! ## Lower-Level Usage
//!
//! The mapper and the sink are plain functions over owned data:
//!
//! ```rust,no_run
//! use groundswell_meta::ai::AnalysisResult;
//! use groundswell_meta::config::BrandProfile;
//! use groundswell_meta::metadata::map_fields;
//! use groundswell_meta::sink::{ImageKind, MetadataSink, NativeSink};
//!
//! # fn main() -> anyhow::Result<()> {
//! let brand = BrandProfile::default();
//! let analysis = AnalysisResult {
//!     description: "A storefront at dusk".into(),
//!     keywords: vec!["storefront".into(), "retail".into()],
//!     ..Default::default()
//! };
//! let fields = map_fields(&analysis, "storefront-photo-01.jpg", &brand)?;
//!
//! let image = std::fs::read("storefront-photo-01.jpg")?;
//! let tagged = NativeSink::new(&brand).embed(&image, ImageKind::Jpeg, &fields)?;
//! std::fs::write("tagged.jpg", tagged)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Written metadata |
//! |--------|------------------|
//! | JPEG (`.jpg`, `.jpeg`) | EXIF APP1, XMP APP1, IPTC-IIM in APP13 |
//! | PNG (`.png`) | `eXIf`, XMP `iTXt`, plain `iTXt` text chunks |
//!
//! ## Modules
//!
//! - [`ai`]: description source trait and implementations (Anthropic, OpenAI, Gemini)
//! - [`config`]: configuration types and loading/saving
//! - [`error`]: the typed service error
//! - [`metadata`]: field vocabulary, mapper and edit merge
//! - [`pipeline`]: the analyze/edit/finalize service
//! - [`server`]: axum routes over the service
//! - [`session`]: session state machine and TTL store
//! - [`sink`]: native EXIF/IPTC/XMP writers

pub mod ai;
pub mod config;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod sink;
