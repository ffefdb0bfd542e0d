//! The upload → analyze → edit → finalize flow.
//!
//! [`MetadataService`] ties the description chain, field mapper, session
//! store and metadata sink together. The HTTP layer and tests drive it
//! through the same methods.

use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ai::{self, AnalysisResult, DescriptionSource};
use crate::config::{BrandProfile, Config};
use crate::error::{MetadataError, Result};
use crate::metadata::{self, FieldKey, MetadataFieldSet, XmpField};
use crate::session::{FinalizeInput, Session, SessionState, SessionStore};
use crate::sink::{ImageKind, MetadataSink, NativeSink};

/// Longest sanitized title used in output filenames, in characters.
const FILENAME_TITLE_MAX: usize = 50;

/// Build the AI service chain from config, in `service_order`.
///
/// Enabled services without an API key are skipped with a warning. Each
/// service's HTTP requests are bounded by `ai_timeout_seconds`.
///
/// # Example
///
/// ```rust,no_run
/// use groundswell_meta::config::Config;
/// use groundswell_meta::pipeline::build_service_chain;
///
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
/// let services = build_service_chain(&config);
/// println!("Configured {} AI services", services.len());
/// ```
pub fn build_service_chain(config: &Config) -> Vec<Box<dyn DescriptionSource>> {
    let mut services: Vec<Box<dyn DescriptionSource>> = Vec::new();

    for name in config.enabled_services() {
        match name.as_str() {
            "anthropic" => {
                let service = &config.ai_services.anthropic;
                if service.api_key.is_empty() {
                    log::warn!("Anthropic enabled but no API key configured");
                    continue;
                }
                services.push(Box::new(
                    ai::AnthropicService::new(service.api_key.clone(), service.model.clone())
                        .with_timeout(config.ai_timeout()),
                ));
            }
            "openai" => {
                let service = &config.ai_services.openai;
                if service.api_key.is_empty() {
                    log::warn!("OpenAI enabled but no API key configured");
                    continue;
                }
                services.push(Box::new(
                    ai::OpenAiService::new(service.api_key.clone(), service.model.clone())
                        .with_timeout(config.ai_timeout()),
                ));
            }
            "gemini" => {
                let service = &config.ai_services.gemini;
                if service.api_key.is_empty() {
                    log::warn!("Gemini enabled but no API key configured");
                    continue;
                }
                services.push(Box::new(
                    ai::GeminiService::new(service.api_key.clone(), service.model.clone())
                        .with_timeout(config.ai_timeout()),
                ));
            }
            other => log::warn!("Unknown AI service in service_order: {other}"),
        }
    }

    services
}

/// Response to a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeOutcome {
    pub session_id: Uuid,
    pub ai_service: String,
    pub analysis: AnalysisResult,
    pub fields: MetadataFieldSet,
}

/// Read-only snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: SessionState,
    pub filename: String,
    pub ai_service: Option<String>,
    pub analysis: Option<AnalysisResult>,
    pub fields: Option<MetadataFieldSet>,
}

/// Fields after an edit or reset.
#[derive(Debug, Clone, Serialize)]
pub struct FieldsView {
    pub state: SessionState,
    pub fields: MetadataFieldSet,
}

/// A finalized image ready to be sent to the client.
#[derive(Debug, Clone)]
pub struct FinalizedImage {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Bytes,
}

/// The metadata service: one per process, shared behind an `Arc`.
pub struct MetadataService {
    brand: Arc<BrandProfile>,
    sources: Vec<Box<dyn DescriptionSource>>,
    sink: Arc<dyn MetadataSink>,
    store: SessionStore,
    ai_timeout: Duration,
    sink_timeout: Duration,
}

impl MetadataService {
    pub fn new(
        config: &Config,
        sources: Vec<Box<dyn DescriptionSource>>,
        sink: Arc<dyn MetadataSink>,
    ) -> Self {
        Self {
            brand: Arc::new(config.brand_profile.clone()),
            sources,
            sink,
            store: SessionStore::new(config.session_ttl(), config.max_sessions),
            ai_timeout: config.ai_timeout(),
            sink_timeout: config.sink_timeout(),
        }
    }

    /// The configured AI chain and the native sink.
    pub fn from_config(config: &Config) -> Self {
        let sink = Arc::new(NativeSink::new(&config.brand_profile));
        Self::new(config, build_service_chain(config), sink)
    }

    pub fn brand(&self) -> &BrandProfile {
        &self.brand
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn session_count(&self) -> usize {
        self.store.len().await
    }

    /// Accept an upload, describe it and map the description to fields.
    ///
    /// The format is checked before a session is created. Once the session
    /// exists, a failing or timed-out chain moves it to `Failed`.
    pub async fn analyze(&self, filename: &str, image: Bytes) -> Result<AnalyzeOutcome> {
        let kind = ImageKind::detect(&image, filename)?;
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(&image);
        let id = self.store.insert(Session::new(filename, kind, image)).await;
        log::info!("Session {id}: analyzing {filename} ({kind:?})");

        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let described = match tokio::time::timeout(
            self.ai_timeout,
            self.describe(&image_base64, filename, kind, &today),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MetadataError::upstream(format!(
                "AI analysis timed out after {}s",
                self.ai_timeout.as_secs_f32()
            ))),
        };
        let (ai_service, mut analysis) = match described {
            Ok(found) => found,
            Err(e) => return Err(self.fail(id, e).await),
        };
        analysis.create_date.get_or_insert(today);

        let fields = match metadata::map_fields(&analysis, filename, &self.brand) {
            Ok(fields) => fields,
            Err(e) => return Err(self.fail(id, e).await),
        };

        self.store
            .with_session(id, |session| {
                session.mark_analyzed(ai_service.clone(), analysis.clone(), fields.clone())
            })
            .await?;

        Ok(AnalyzeOutcome {
            session_id: id,
            ai_service,
            analysis,
            fields,
        })
    }

    /// Try each source in order; the first success wins.
    ///
    /// The AI budget is split evenly between the sources, so a hung source
    /// still leaves time for the next one. When no source succeeds but one
    /// of them replied without any JSON, the upload is described from its
    /// filename and credited to that source.
    async fn describe(
        &self,
        image_base64: &str,
        filename: &str,
        kind: ImageKind,
        today: &str,
    ) -> Result<(String, AnalysisResult)> {
        if self.sources.is_empty() {
            return Err(MetadataError::upstream("no AI services configured"));
        }

        let prompt = ai::build_prompt(filename, today, &self.brand);
        let per_source = self.ai_timeout / self.sources.len() as u32;

        let mut errors = Vec::new();
        let mut unparseable = None;
        for source in &self.sources {
            log::info!("  Trying {}...", source.name());
            let attempt = tokio::time::timeout(
                per_source,
                source.analyze(image_base64, &prompt, kind.mime_type()),
            )
            .await
            .unwrap_or_else(|_| {
                Err(anyhow::anyhow!(
                    "timed out after {}s",
                    per_source.as_secs_f32()
                ))
            });
            match attempt {
                Ok(analysis) => {
                    log::info!("  {} succeeded", source.name());
                    return Ok((source.name().to_string(), analysis));
                }
                Err(e) => {
                    log::warn!("  {} failed: {e:#}", source.name());
                    if unparseable.is_none() && e.is::<ai::UnparseableReply>() {
                        unparseable = Some(source.name());
                    }
                    errors.push(format!("{}: {e}", source.name()));
                }
            }
        }

        if let Some(name) = unparseable {
            if let Some(analysis) = ai::filename_analysis(filename, today, &self.brand) {
                log::info!("  No usable AI reply, describing {filename} from its name");
                return Ok((name.to_string(), analysis));
            }
        }

        Err(MetadataError::upstream(format!(
            "All AI services failed: {}",
            errors.join("; ")
        )))
    }

    pub async fn session_view(&self, id: Uuid) -> Result<SessionView> {
        self.store
            .with_session(id, |session| {
                Ok(SessionView {
                    session_id: session.id(),
                    state: session.state(),
                    filename: session.filename().to_string(),
                    ai_service: session.ai_service().map(str::to_string),
                    analysis: session.analysis().cloned(),
                    fields: session.fields().cloned(),
                })
            })
            .await
    }

    pub async fn edit(&self, id: Uuid, edits: &BTreeMap<String, String>) -> Result<FieldsView> {
        self.store
            .with_session(id, |session| {
                let fields = session.apply_edits(edits)?.clone();
                Ok(FieldsView {
                    state: session.state(),
                    fields,
                })
            })
            .await
    }

    pub async fn reset(&self, id: Uuid) -> Result<FieldsView> {
        self.store
            .with_session(id, |session| {
                let fields = session.reset()?.clone();
                Ok(FieldsView {
                    state: session.state(),
                    fields,
                })
            })
            .await
    }

    /// Apply any last edits, write the metadata and finalize the session.
    ///
    /// The session moves to `Finalizing` before the write, so the fields
    /// written are the fields kept. The write runs on the blocking pool
    /// outside the store lock. A failed or timed-out write moves the session
    /// to `Failed`.
    pub async fn finalize(
        &self,
        id: Uuid,
        edits: Option<&BTreeMap<String, String>>,
    ) -> Result<FinalizedImage> {
        let input = self
            .store
            .with_session(id, |session| {
                if let Some(edits) = edits.filter(|e| !e.is_empty()) {
                    session.apply_edits(edits)?;
                }
                session.begin_finalize()
            })
            .await?;

        let output = match self.write(input).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(id, e).await),
        };
        log::info!("Session {id}: finalized, {} bytes", output.len());

        let brand = Arc::clone(&self.brand);
        self.store
            .with_session(id, move |session| {
                session.mark_finalized(output)?;
                finalized_image(session, &brand)
            })
            .await
    }

    async fn write(&self, input: FinalizeInput) -> Result<Bytes> {
        let sink = Arc::clone(&self.sink);
        let task = tokio::task::spawn_blocking(move || {
            sink.embed(&input.image, input.kind, &input.fields)
        });

        match tokio::time::timeout(self.sink_timeout, task).await {
            Ok(Ok(Ok(bytes))) => Ok(Bytes::from(bytes)),
            Ok(Ok(Err(e))) => Err(MetadataError::upstream(format!(
                "metadata write failed: {e:#}"
            ))),
            Ok(Err(e)) => Err(MetadataError::upstream(format!(
                "metadata write task failed: {e}"
            ))),
            Err(_) => Err(MetadataError::upstream(format!(
                "metadata write timed out after {}s",
                self.sink_timeout.as_secs_f32()
            ))),
        }
    }

    /// The output of a finalized session, until its TTL elapses.
    pub async fn download(&self, id: Uuid) -> Result<FinalizedImage> {
        let brand = Arc::clone(&self.brand);
        self.store
            .with_session(id, move |session| finalized_image(session, &brand))
            .await
    }

    /// Record `err` on the session and hand it back.
    async fn fail(&self, id: Uuid, err: MetadataError) -> MetadataError {
        log::warn!("Session {id}: {err}");
        let kind = err.kind();
        if let Err(e) = self.store.with_session(id, |s| s.fail(kind)).await {
            log::debug!("Session {id}: could not record failure: {e}");
        }
        err
    }
}

fn finalized_image(session: &Session, brand: &BrandProfile) -> Result<FinalizedImage> {
    let bytes = session.output()?;
    let title = session
        .fields()
        .map(|f| f.text(FieldKey::Xmp(XmpField::Title)))
        .unwrap_or_default();
    let extension = Path::new(session.filename())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{e}"))
        .unwrap_or_else(|| session.kind().extension().to_string());
    Ok(FinalizedImage {
        filename: output_filename(&title, &brand.organization, &extension),
        content_type: session.kind().mime_type(),
        bytes,
    })
}

/// Download filename: sanitized title, organization slug and extension.
///
/// The title keeps ASCII alphanumerics, spaces, `-` and `_`; spaces become
/// `_` and the result is capped at 50 characters. An empty result becomes
/// `image`.
pub fn output_filename(title: &str, organization: &str, extension: &str) -> String {
    let mut safe: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .map(|c| if c == ' ' { '_' } else { c })
        .take(FILENAME_TITLE_MAX)
        .collect();
    if safe.is_empty() {
        safe.push_str("image");
    }

    let slug: String = organization
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let extension: String = extension
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();

    if slug.is_empty() {
        format!("{safe}{extension}")
    } else {
        format!("{safe}_{slug}{extension}")
    }
}
