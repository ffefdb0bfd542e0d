//! The metadata vocabulary and the transformations over it.
//!
//! - [`map_fields`]: turn an AI analysis plus the brand profile into a
//!   [`MetadataFieldSet`] for EXIF, IPTC and XMP
//! - [`apply_edits`]: merge user edits into a field set
//!
//! Field names are fixed per schema ([`ExifField`], [`IptcField`],
//! [`XmpField`]) and addressed on the wire as `"<SCHEMA>.<Field>"`.

mod edit;
mod mapper;
mod schema;

pub use edit::apply_edits;
pub use mapper::{
    fallback_title, map_fields, normalize_keywords, overlay_brand, truncate_list, truncate_utf8,
    KEYWORD_SEPARATOR,
};
pub use schema::{
    ExifField, FieldKey, FieldValue, IptcField, MetadataFieldSet, UnknownField, XmpField,
};
