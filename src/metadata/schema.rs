use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// EXIF fields written by the sink. IFD0 except `UserComment` (Exif IFD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ExifField {
    Artist,
    Copyright,
    ImageDescription,
    UserComment,
}

/// IPTC-IIM application record (2:xx) fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IptcField {
    ObjectName,
    Headline,
    CaptionAbstract,
    Keywords,
    #[serde(rename = "By-line")]
    ByLine,
    Credit,
    CopyrightNotice,
    Contact,
}

/// XMP properties (dc, photoshop and xmp namespaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum XmpField {
    Label,
    Title,
    Headline,
    Description,
    Subject,
    Creator,
    Credit,
    Rights,
    Source,
    Category,
    SupplementalCategories,
}

impl ExifField {
    pub const ALL: [ExifField; 4] = [
        Self::Artist,
        Self::Copyright,
        Self::ImageDescription,
        Self::UserComment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Artist => "Artist",
            Self::Copyright => "Copyright",
            Self::ImageDescription => "ImageDescription",
            Self::UserComment => "UserComment",
        }
    }
}

impl IptcField {
    pub const ALL: [IptcField; 8] = [
        Self::ObjectName,
        Self::Headline,
        Self::CaptionAbstract,
        Self::Keywords,
        Self::ByLine,
        Self::Credit,
        Self::CopyrightNotice,
        Self::Contact,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ObjectName => "ObjectName",
            Self::Headline => "Headline",
            Self::CaptionAbstract => "CaptionAbstract",
            Self::Keywords => "Keywords",
            Self::ByLine => "By-line",
            Self::Credit => "Credit",
            Self::CopyrightNotice => "CopyrightNotice",
            Self::Contact => "Contact",
        }
    }

    /// IIM dataset number within record 2.
    pub fn dataset(self) -> u8 {
        match self {
            Self::ObjectName => 5,
            Self::Keywords => 25,
            Self::ByLine => 80,
            Self::Headline => 105,
            Self::Credit => 110,
            Self::CopyrightNotice => 116,
            Self::Contact => 118,
            Self::CaptionAbstract => 120,
        }
    }
}

impl XmpField {
    pub const ALL: [XmpField; 11] = [
        Self::Label,
        Self::Title,
        Self::Headline,
        Self::Description,
        Self::Subject,
        Self::Creator,
        Self::Credit,
        Self::Rights,
        Self::Source,
        Self::Category,
        Self::SupplementalCategories,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Label => "Label",
            Self::Title => "Title",
            Self::Headline => "Headline",
            Self::Description => "Description",
            Self::Subject => "Subject",
            Self::Creator => "Creator",
            Self::Credit => "Credit",
            Self::Rights => "Rights",
            Self::Source => "Source",
            Self::Category => "Category",
            Self::SupplementalCategories => "SupplementalCategories",
        }
    }
}

/// A field of any schema, addressed as `"<SCHEMA>.<Field>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Exif(ExifField),
    Iptc(IptcField),
    Xmp(XmpField),
}

impl FieldKey {
    /// Every key in the vocabulary, EXIF first.
    pub fn all() -> impl Iterator<Item = FieldKey> {
        ExifField::ALL
            .into_iter()
            .map(FieldKey::Exif)
            .chain(IptcField::ALL.into_iter().map(FieldKey::Iptc))
            .chain(XmpField::ALL.into_iter().map(FieldKey::Xmp))
    }

    pub fn schema(self) -> &'static str {
        match self {
            Self::Exif(_) => "EXIF",
            Self::Iptc(_) => "IPTC",
            Self::Xmp(_) => "XMP",
        }
    }

    pub fn field_name(self) -> &'static str {
        match self {
            Self::Exif(f) => f.as_str(),
            Self::Iptc(f) => f.as_str(),
            Self::Xmp(f) => f.as_str(),
        }
    }

    /// Byte budget for the value. For list fields this bounds the
    /// `", "`-joined form.
    pub fn max_len(self) -> usize {
        match self {
            Self::Exif(ExifField::Artist | ExifField::Copyright) => 255,
            Self::Exif(ExifField::ImageDescription | ExifField::UserComment) => 2000,
            Self::Iptc(IptcField::ObjectName) => 64,
            Self::Iptc(IptcField::Headline) => 256,
            Self::Iptc(IptcField::CaptionAbstract) => 2000,
            Self::Iptc(IptcField::Keywords) => 512,
            Self::Iptc(IptcField::ByLine | IptcField::Credit) => 32,
            Self::Iptc(IptcField::CopyrightNotice | IptcField::Contact) => 128,
            Self::Xmp(XmpField::Label) => 64,
            Self::Xmp(XmpField::Title | XmpField::Headline | XmpField::Category) => 256,
            Self::Xmp(XmpField::Description | XmpField::Subject) => 2000,
            Self::Xmp(XmpField::SupplementalCategories) => 1000,
            Self::Xmp(
                XmpField::Creator | XmpField::Credit | XmpField::Rights | XmpField::Source,
            ) => 255,
        }
    }

    pub fn is_list(self) -> bool {
        matches!(
            self,
            Self::Iptc(IptcField::Keywords)
                | Self::Xmp(XmpField::Subject | XmpField::SupplementalCategories)
        )
    }

    /// Keys owned by the brand overlay. Edits may change them but never
    /// blank them.
    pub fn is_branding(self) -> bool {
        matches!(
            self,
            Self::Exif(ExifField::Artist | ExifField::Copyright)
                | Self::Iptc(
                    IptcField::ByLine
                        | IptcField::Credit
                        | IptcField::CopyrightNotice
                        | IptcField::Contact
                )
                | Self::Xmp(
                    XmpField::Creator
                        | XmpField::Credit
                        | XmpField::Rights
                        | XmpField::Source
                        | XmpField::Category
                        | XmpField::SupplementalCategories
                )
        )
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema(), self.field_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metadata field `{0}`")]
pub struct UnknownField(pub String);

impl FromStr for FieldKey {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownField(s.to_string());
        let (schema, name) = s.split_once('.').ok_or_else(unknown)?;
        let key = match schema {
            "EXIF" => ExifField::ALL
                .into_iter()
                .find(|f| f.as_str() == name)
                .map(FieldKey::Exif),
            "IPTC" => IptcField::ALL
                .into_iter()
                .find(|f| f.as_str() == name)
                .map(FieldKey::Iptc),
            "XMP" => XmpField::ALL
                .into_iter()
                .find(|f| f.as_str() == name)
                .map(FieldKey::Xmp),
            _ => None,
        };
        key.ok_or_else(unknown)
    }
}

/// A field value: scalar text or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            Self::Text(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }

    /// Single-string rendering; lists are joined with `", "`.
    pub fn joined(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(", "),
        }
    }
}

/// The editable metadata of one image, split per schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataFieldSet {
    pub exif: BTreeMap<ExifField, FieldValue>,
    pub iptc: BTreeMap<IptcField, FieldValue>,
    pub xmp: BTreeMap<XmpField, FieldValue>,
}

impl MetadataFieldSet {
    pub fn get(&self, key: FieldKey) -> Option<&FieldValue> {
        match key {
            FieldKey::Exif(f) => self.exif.get(&f),
            FieldKey::Iptc(f) => self.iptc.get(&f),
            FieldKey::Xmp(f) => self.xmp.get(&f),
        }
    }

    pub fn set(&mut self, key: FieldKey, value: FieldValue) {
        match key {
            FieldKey::Exif(f) => {
                self.exif.insert(f, value);
            }
            FieldKey::Iptc(f) => {
                self.iptc.insert(f, value);
            }
            FieldKey::Xmp(f) => {
                self.xmp.insert(f, value);
            }
        }
    }

    /// Text of a scalar field, or the joined form of a list field.
    pub fn text(&self, key: FieldKey) -> String {
        self.get(key).map(FieldValue::joined).unwrap_or_default()
    }

    /// Items of a list field; empty for missing or scalar fields.
    pub fn list(&self, key: FieldKey) -> &[String] {
        self.get(key).and_then(FieldValue::as_list).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_parses_back_from_its_display_form() {
        for key in FieldKey::all() {
            assert_eq!(key.to_string().parse::<FieldKey>(), Ok(key));
        }
        assert_eq!(FieldKey::all().count(), 23);
    }

    #[test]
    fn byline_uses_hyphenated_name() {
        let key: FieldKey = "IPTC.By-line".parse().unwrap();
        assert_eq!(key, FieldKey::Iptc(IptcField::ByLine));
        assert!("IPTC.ByLine".parse::<FieldKey>().is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        for raw in ["", "Artist", "EXIF.", "exif.Artist", "XMP.Website", "GPS.Latitude"] {
            assert!(raw.parse::<FieldKey>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn list_fields_match_the_vocabulary() {
        let lists: Vec<String> = FieldKey::all()
            .filter(|k| k.is_list())
            .map(|k| k.to_string())
            .collect();
        assert_eq!(lists, ["IPTC.Keywords", "XMP.Subject", "XMP.SupplementalCategories"]);
    }

    #[test]
    fn field_set_serializes_with_wire_names() {
        let mut set = MetadataFieldSet::default();
        set.set(
            FieldKey::Iptc(IptcField::ByLine),
            FieldValue::Text("GroundSwell".into()),
        );
        set.set(
            FieldKey::Xmp(XmpField::Subject),
            FieldValue::List(vec!["a".into(), "b".into()]),
        );
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["iptc"]["By-line"], "GroundSwell");
        assert_eq!(json["xmp"]["Subject"], serde_json::json!(["a", "b"]));
        assert!(json["exif"].as_object().unwrap().is_empty());
    }

    #[test]
    fn text_joins_lists() {
        let mut set = MetadataFieldSet::default();
        set.set(
            FieldKey::Iptc(IptcField::Keywords),
            FieldValue::List(vec!["storefront".into(), "retail".into()]),
        );
        assert_eq!(set.text(FieldKey::Iptc(IptcField::Keywords)), "storefront, retail");
        assert_eq!(set.list(FieldKey::Iptc(IptcField::Keywords)).len(), 2);
        assert!(set.list(FieldKey::Exif(ExifField::Artist)).is_empty());
    }
}
