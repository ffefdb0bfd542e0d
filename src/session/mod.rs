//! Per-upload session state.
//!
//! A [`Session`] moves through
//! `Created → Analyzed → Edited* → Finalizing → Finalized`, or into `Failed`
//! from any non-terminal state. While `Finalizing` the written fields are
//! frozen: edits, resets and a second finalize are rejected. Every transition checks
//! the current state and rejects the call with
//! [`MetadataError::InvalidInput`] otherwise; there are no backward
//! transitions. Sessions live in a [`SessionStore`].

mod store;

pub use store::SessionStore;

use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::ai::AnalysisResult;
use crate::error::{ErrorKind, MetadataError, Result};
use crate::metadata::{self, MetadataFieldSet};
use crate::sink::ImageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Upload accepted, no analysis yet.
    Created,
    Analyzed,
    Edited,
    /// The metadata writer is running on a snapshot of the fields.
    Finalizing,
    /// Output bytes are ready for download.
    Finalized,
    Failed(ErrorKind),
}

impl SessionState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed(_))
    }

    fn is_editable(self) -> bool {
        matches!(self, Self::Analyzed | Self::Edited)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Analyzed => f.write_str("analyzed"),
            Self::Edited => f.write_str("edited"),
            Self::Finalizing => f.write_str("finalizing"),
            Self::Finalized => f.write_str("finalized"),
            Self::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// Everything the metadata writer needs, copied out of a session so the
/// write can run without holding the store lock.
#[derive(Debug, Clone)]
pub struct FinalizeInput {
    pub image: Bytes,
    pub kind: ImageKind,
    pub fields: MetadataFieldSet,
}

/// One uploaded image and the metadata generated for it.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    filename: String,
    kind: ImageKind,
    image: Bytes,
    created_at: Instant,
    state: SessionState,
    ai_service: Option<String>,
    analysis: Option<AnalysisResult>,
    /// Mapper output, restored by [`Session::reset`].
    original: Option<MetadataFieldSet>,
    fields: Option<MetadataFieldSet>,
    output: Option<Bytes>,
}

impl Session {
    pub fn new(filename: impl Into<String>, kind: ImageKind, image: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            kind,
            image,
            created_at: Instant::now(),
            state: SessionState::Created,
            ai_service: None,
            analysis: None,
            original: None,
            fields: None,
            output: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn image(&self) -> &Bytes {
        &self.image
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn ai_service(&self) -> Option<&str> {
        self.ai_service.as_deref()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn fields(&self) -> Option<&MetadataFieldSet> {
        self.fields.as_ref()
    }

    /// Record a successful analysis. Only valid from `Created`.
    pub fn mark_analyzed(
        &mut self,
        ai_service: impl Into<String>,
        analysis: AnalysisResult,
        fields: MetadataFieldSet,
    ) -> Result<()> {
        if self.state != SessionState::Created {
            return Err(self.rejected("record an analysis"));
        }
        self.ai_service = Some(ai_service.into());
        self.analysis = Some(analysis);
        self.original = Some(fields.clone());
        self.fields = Some(fields);
        self.state = SessionState::Analyzed;
        Ok(())
    }

    /// Merge user edits into the current fields.
    pub fn apply_edits(&mut self, edits: &BTreeMap<String, String>) -> Result<&MetadataFieldSet> {
        if !self.state.is_editable() {
            return Err(self.rejected("edit"));
        }
        let current = self.fields.as_ref().ok_or_else(|| self.rejected("edit"))?;
        let updated = metadata::apply_edits(current, edits);
        self.state = SessionState::Edited;
        Ok(self.fields.insert(updated))
    }

    /// Restore the mapper's original output. Counts as an edit.
    pub fn reset(&mut self) -> Result<&MetadataFieldSet> {
        if !self.state.is_editable() {
            return Err(self.rejected("reset"));
        }
        let original = self.original.clone().ok_or_else(|| self.rejected("reset"))?;
        self.state = SessionState::Edited;
        Ok(self.fields.insert(original))
    }

    /// Move to `Finalizing` and snapshot the image and fields for the
    /// metadata writer. The fields cannot change until the write completes.
    pub fn begin_finalize(&mut self) -> Result<FinalizeInput> {
        if !self.state.is_editable() {
            return Err(self.rejected("finalize"));
        }
        let fields = self.fields.clone().ok_or_else(|| self.rejected("finalize"))?;
        self.state = SessionState::Finalizing;
        Ok(FinalizeInput {
            image: self.image.clone(),
            kind: self.kind,
            fields,
        })
    }

    /// Store the written image. Only valid after [`Session::begin_finalize`].
    pub fn mark_finalized(&mut self, output: Bytes) -> Result<()> {
        if self.state != SessionState::Finalizing {
            return Err(self.rejected("finalize"));
        }
        self.output = Some(output);
        self.state = SessionState::Finalized;
        Ok(())
    }

    /// Move to `Failed`. Terminal sessions keep their state.
    pub fn fail(&mut self, kind: ErrorKind) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.rejected("fail"));
        }
        log::debug!("Session {} failed: {kind}", self.id);
        self.state = SessionState::Failed(kind);
        Ok(())
    }

    /// The written image of a finalized session.
    pub fn output(&self) -> Result<Bytes> {
        match (&self.state, &self.output) {
            (SessionState::Finalized, Some(bytes)) => Ok(bytes.clone()),
            _ => Err(self.rejected("download")),
        }
    }

    fn rejected(&self, action: &str) -> MetadataError {
        MetadataError::invalid(format!(
            "cannot {action} session {} in state {}",
            self.id, self.state
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldKey, FieldValue, XmpField};

    fn fields(title: &str) -> MetadataFieldSet {
        let mut set = MetadataFieldSet::default();
        set.set(FieldKey::Xmp(XmpField::Title), FieldValue::Text(title.into()));
        set
    }

    fn analyzed() -> Session {
        let mut session = Session::new("a.jpg", ImageKind::Jpeg, Bytes::from_static(b"img"));
        session
            .mark_analyzed("Stub", AnalysisResult::default(), fields("Original"))
            .unwrap();
        session
    }

    fn edits(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn happy_path_walks_every_state() {
        let mut session = Session::new("a.jpg", ImageKind::Jpeg, Bytes::from_static(b"img"));
        assert_eq!(session.state(), SessionState::Created);

        session
            .mark_analyzed("Stub", AnalysisResult::default(), fields("Original"))
            .unwrap();
        assert_eq!(session.state(), SessionState::Analyzed);
        assert_eq!(session.ai_service(), Some("Stub"));

        session.apply_edits(&edits(&[("XMP.Title", "One")])).unwrap();
        session.apply_edits(&edits(&[("XMP.Title", "Two")])).unwrap();
        assert_eq!(session.state(), SessionState::Edited);

        let input = session.begin_finalize().unwrap();
        assert_eq!(session.state(), SessionState::Finalizing);
        assert_eq!(input.fields.text(FieldKey::Xmp(XmpField::Title)), "Two");
        assert_eq!(input.image, Bytes::from_static(b"img"));

        session.mark_finalized(Bytes::from_static(b"out")).unwrap();
        assert_eq!(session.state(), SessionState::Finalized);
        assert_eq!(session.output().unwrap(), Bytes::from_static(b"out"));
        // downloadable again
        assert_eq!(session.output().unwrap(), Bytes::from_static(b"out"));
    }

    #[test]
    fn created_session_rejects_edits_and_finalize() {
        let mut session = Session::new("a.png", ImageKind::Png, Bytes::new());
        assert!(matches!(
            session.apply_edits(&BTreeMap::new()),
            Err(MetadataError::InvalidInput(_))
        ));
        assert!(session.reset().is_err());
        assert!(session.begin_finalize().is_err());
        assert!(session.output().is_err());
    }

    #[test]
    fn reset_restores_mapper_output() {
        let mut session = analyzed();
        session.apply_edits(&edits(&[("XMP.Title", "Changed")])).unwrap();
        let restored = session.reset().unwrap();
        assert_eq!(restored, &fields("Original"));
        assert_eq!(session.state(), SessionState::Edited);
    }

    #[test]
    fn finalized_session_is_read_only() {
        let mut session = analyzed();
        session.begin_finalize().unwrap();
        session.mark_finalized(Bytes::from_static(b"out")).unwrap();

        assert!(session.apply_edits(&edits(&[("XMP.Title", "Late")])).is_err());
        assert!(session.reset().is_err());
        assert!(session.mark_finalized(Bytes::new()).is_err());
        assert!(session.fail(ErrorKind::UpstreamUnavailable).is_err());
        assert!(session.mark_analyzed("Stub", AnalysisResult::default(), fields("x")).is_err());
        assert_eq!(session.state(), SessionState::Finalized);
    }

    #[test]
    fn failed_session_accepts_nothing() {
        let mut session = analyzed();
        session.fail(ErrorKind::UpstreamUnavailable).unwrap();
        assert_eq!(
            session.state(),
            SessionState::Failed(ErrorKind::UpstreamUnavailable)
        );
        assert!(session.apply_edits(&BTreeMap::new()).is_err());
        assert!(session.begin_finalize().is_err());
        assert!(session.output().is_err());
        assert!(session.fail(ErrorKind::InvalidInput).is_err());
    }

    #[test]
    fn finalizing_session_freezes_its_fields() {
        let mut session = analyzed();
        let input = session.begin_finalize().unwrap();

        assert!(matches!(
            session.apply_edits(&edits(&[("XMP.Title", "Late")])),
            Err(MetadataError::InvalidInput(_))
        ));
        assert!(session.reset().is_err());
        assert!(session.begin_finalize().is_err());
        assert!(session.output().is_err());
        assert_eq!(session.fields(), Some(&input.fields));
        assert_eq!(session.state(), SessionState::Finalizing);

        session.mark_finalized(Bytes::from_static(b"out")).unwrap();
        assert_eq!(session.fields(), Some(&fields("Original")));
    }

    #[test]
    fn failed_write_leaves_finalizing() {
        let mut session = analyzed();
        session.begin_finalize().unwrap();
        session.fail(ErrorKind::UpstreamUnavailable).unwrap();
        assert_eq!(
            session.state(),
            SessionState::Failed(ErrorKind::UpstreamUnavailable)
        );
    }

    #[test]
    fn mark_finalized_requires_a_snapshot() {
        let mut session = analyzed();
        assert!(session.mark_finalized(Bytes::from_static(b"out")).is_err());
        assert_eq!(session.state(), SessionState::Analyzed);
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(SessionState::Edited).unwrap(),
            serde_json::json!("edited")
        );
        assert_eq!(
            serde_json::to_value(SessionState::Failed(ErrorKind::UpstreamUnavailable)).unwrap(),
            serde_json::json!({"failed": "upstream_unavailable"})
        );
    }
}
