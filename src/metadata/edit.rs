use std::collections::BTreeMap;

use super::mapper::{normalize_keywords, set_list, set_text};
use super::schema::{FieldKey, MetadataFieldSet};

/// Apply user edits to a field set, returning a new set.
///
/// Keys are `"<SCHEMA>.<Field>"` names from the fixed vocabulary; anything
/// else is skipped. List fields take a comma-separated string. Values are
/// truncated like mapper output. An empty value clears a field unless the
/// field is a branding key, in which case the edit is skipped.
pub fn apply_edits(
    original: &MetadataFieldSet,
    edits: &BTreeMap<String, String>,
) -> MetadataFieldSet {
    let mut updated = original.clone();

    for (raw_key, value) in edits {
        let Ok(key) = raw_key.parse::<FieldKey>() else {
            log::debug!("Ignoring unknown edit key {raw_key:?}");
            continue;
        };

        if key.is_list() {
            let items: Vec<&str> = value.split(',').collect();
            let items = normalize_keywords(&items);
            if items.is_empty() && key.is_branding() {
                log::debug!("Ignoring empty edit for branding field {key}");
                continue;
            }
            set_list(&mut updated, key, items);
        } else {
            if value.trim().is_empty() && key.is_branding() {
                log::debug!("Ignoring empty edit for branding field {key}");
                continue;
            }
            set_text(&mut updated, key, value);
        }
    }

    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AnalysisResult;
    use crate::config::BrandProfile;
    use crate::metadata::{map_fields, FieldValue, IptcField, XmpField};

    fn mapped() -> MetadataFieldSet {
        let analysis = AnalysisResult {
            title: "Storefront view".to_string(),
            description: "A bright shopfront".to_string(),
            keywords: vec!["storefront".to_string(), "retail".to_string()],
            ..AnalysisResult::default()
        };
        map_fields(&analysis, "storefront-photo-01.jpg", &BrandProfile::default()).unwrap()
    }

    fn edits(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unknown_key_is_ignored_and_valid_key_applied() {
        let original = mapped();
        let updated = apply_edits(
            &original,
            &edits(&[("XMP.Website", "example.com"), ("XMP.Description", "Updated caption")]),
        );

        for key in FieldKey::all() {
            if key == FieldKey::Xmp(XmpField::Description) {
                assert_eq!(updated.text(key), "Updated caption");
            } else {
                assert_eq!(updated.get(key), original.get(key), "{key} changed");
            }
        }
    }

    #[test]
    fn original_is_left_untouched() {
        let original = mapped();
        let snapshot = original.clone();
        let _ = apply_edits(&original, &edits(&[("IPTC.ObjectName", "Changed")]));
        assert_eq!(original, snapshot);
    }

    #[test]
    fn legacy_form_keys_are_ignored() {
        let original = mapped();
        let updated = apply_edits(
            &original,
            &edits(&[("xmp_description", "x"), ("exif_artist", "y"), ("", "z")]),
        );
        assert_eq!(updated, original);
    }

    #[test]
    fn list_edit_is_split_and_normalized() {
        let updated = apply_edits(
            &mapped(),
            &edits(&[("IPTC.Keywords", "shop, Retail ,, retail, window")]),
        );
        assert_eq!(
            updated.list(FieldKey::Iptc(IptcField::Keywords)),
            ["shop", "Retail", "window"]
        );
    }

    #[test]
    fn edited_values_are_truncated() {
        let updated = apply_edits(&mapped(), &edits(&[("IPTC.ObjectName", &"é".repeat(40))]));
        let name = updated.text(FieldKey::Iptc(IptcField::ObjectName));
        assert_eq!(name.len(), 64);
        assert_eq!(name.chars().count(), 32);
    }

    #[test]
    fn branding_fields_can_be_changed_but_not_blanked() {
        let original = mapped();
        let updated = apply_edits(
            &original,
            &edits(&[
                ("IPTC.Credit", "Photo: J. Doe"),
                ("EXIF.Copyright", "   "),
                ("XMP.SupplementalCategories", " , "),
            ]),
        );
        assert_eq!(updated.text(FieldKey::Iptc(IptcField::Credit)), "Photo: J. Doe");
        assert_eq!(
            updated.get("EXIF.Copyright".parse().unwrap()),
            original.get("EXIF.Copyright".parse().unwrap())
        );
        assert_eq!(
            updated.get(FieldKey::Xmp(XmpField::SupplementalCategories)),
            original.get(FieldKey::Xmp(XmpField::SupplementalCategories))
        );
    }

    #[test]
    fn non_branding_fields_can_be_cleared() {
        let updated = apply_edits(&mapped(), &edits(&[("XMP.Headline", ""), ("XMP.Subject", "")]));
        assert_eq!(
            updated.get(FieldKey::Xmp(XmpField::Headline)),
            Some(&FieldValue::Text(String::new()))
        );
        assert!(updated.list(FieldKey::Xmp(XmpField::Subject)).is_empty());
    }
}
