use std::collections::HashSet;

use super::schema::{ExifField, FieldKey, FieldValue, IptcField, MetadataFieldSet, XmpField};
use crate::ai::AnalysisResult;
use crate::config::BrandProfile;
use crate::error::{MetadataError, Result};

/// Separator for keywords flattened into a single scalar field.
pub const KEYWORD_SEPARATOR: &str = ", ";

/// Map an AI analysis onto the EXIF, IPTC and XMP field sets.
///
/// Pure and deterministic. The title falls back to one derived from
/// `filename_hint`; description and headline fall back to the title.
/// Every value is truncated to its field's byte budget, then the brand
/// overlay overwrites the branding keys. The copyright year comes from the
/// analysis `create_date`.
///
/// Fails with [`MetadataError::InvalidInput`] only when the analysis has
/// neither title nor description and the filename yields no title either.
pub fn map_fields(
    analysis: &AnalysisResult,
    filename_hint: &str,
    brand: &BrandProfile,
) -> Result<MetadataFieldSet> {
    let description = analysis.description.trim();
    let title = match analysis.title.trim() {
        "" => fallback_title(filename_hint),
        t => t.to_string(),
    };

    if title.is_empty() && description.is_empty() {
        return Err(MetadataError::invalid(
            "analysis has no title or description and the filename gives no fallback",
        ));
    }

    let description = if description.is_empty() { title.as_str() } else { description };
    let headline = match analysis.headline.trim() {
        "" => title.as_str(),
        h => h,
    };
    let keywords = normalize_keywords(&analysis.keywords);

    let mut set = MetadataFieldSet::default();
    let mut text = |key: FieldKey, value: &str| set_text(&mut set, key, value);

    text(FieldKey::Exif(ExifField::ImageDescription), title.as_str());
    text(
        FieldKey::Exif(ExifField::UserComment),
        &keywords.join(KEYWORD_SEPARATOR),
    );
    text(FieldKey::Iptc(IptcField::ObjectName), title.as_str());
    text(FieldKey::Iptc(IptcField::Headline), headline);
    text(FieldKey::Iptc(IptcField::CaptionAbstract), description);
    text(FieldKey::Xmp(XmpField::Label), title.as_str());
    text(FieldKey::Xmp(XmpField::Title), title.as_str());
    text(FieldKey::Xmp(XmpField::Headline), headline);
    text(FieldKey::Xmp(XmpField::Description), description);

    set_list(&mut set, FieldKey::Iptc(IptcField::Keywords), keywords.clone());
    set_list(&mut set, FieldKey::Xmp(XmpField::Subject), keywords);

    overlay_brand(&mut set, brand, creation_year(analysis));
    Ok(set)
}

/// Overwrite the branding keys from the brand profile.
pub fn overlay_brand(set: &mut MetadataFieldSet, brand: &BrandProfile, year: Option<&str>) {
    let copyright = brand.copyright_notice(year);
    let scalars = [
        (FieldKey::Exif(ExifField::Artist), &brand.creator),
        (FieldKey::Exif(ExifField::Copyright), &copyright),
        (FieldKey::Iptc(IptcField::ByLine), &brand.creator),
        (FieldKey::Iptc(IptcField::Credit), &brand.credit),
        (FieldKey::Iptc(IptcField::CopyrightNotice), &copyright),
        (FieldKey::Iptc(IptcField::Contact), &brand.website),
        (FieldKey::Xmp(XmpField::Creator), &brand.creator),
        (FieldKey::Xmp(XmpField::Credit), &brand.credit),
        (FieldKey::Xmp(XmpField::Rights), &copyright),
        (FieldKey::Xmp(XmpField::Source), &brand.source),
        (FieldKey::Xmp(XmpField::Category), &brand.category),
    ];
    for (key, value) in scalars {
        set_text(set, key, value);
    }
    set_list(
        set,
        FieldKey::Xmp(XmpField::SupplementalCategories),
        normalize_keywords(&brand.supplemental_categories),
    );
}

/// The leading four-digit year of `create_date`, if it has one.
fn creation_year(analysis: &AnalysisResult) -> Option<&str> {
    let date = analysis.create_date.as_deref()?.trim();
    let year = date.get(..4)?;
    year.bytes().all(|b| b.is_ascii_digit()).then_some(year)
}

/// Derive a display title from a filename.
///
/// Takes the last path component, strips the final extension, turns
/// separators into single spaces and capitalizes each word. Never fails;
/// returns an empty string when nothing usable remains.
///
/// ```rust
/// use groundswell_meta::metadata::fallback_title;
///
/// assert_eq!(fallback_title("storefront-photo-01.jpg"), "Storefront Photo 01");
/// assert_eq!(fallback_title("uploads/fractal_flywheel.v2.png"), "Fractal Flywheel V2");
/// assert_eq!(fallback_title(".jpg"), "Jpg");
/// assert_eq!(fallback_title(""), "");
/// ```
pub fn fallback_title(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = match name.rfind('.') {
        Some(pos) if pos > 0 && !name[..pos].chars().all(|c| c == '.') => &name[..pos],
        _ => name,
    };

    stem.split(|c: char| c == '-' || c == '_' || c == '.' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Trim, drop empties, and deduplicate case-insensitively keeping the
/// first-seen casing and order.
pub fn normalize_keywords<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Cut `value` to at most `max` bytes at a char boundary.
pub fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Fit a list into `max` bytes measured on its `", "`-joined form.
///
/// Whole items are kept while they fit; the first item that does not is
/// cut to the remaining budget and everything after it is dropped.
pub fn truncate_list(items: Vec<String>, max: usize) -> Vec<String> {
    let mut used = 0;
    let mut out = Vec::with_capacity(items.len());

    for item in items {
        let sep = if out.is_empty() { 0 } else { KEYWORD_SEPARATOR.len() };
        if used + sep + item.len() <= max {
            used += sep + item.len();
            out.push(item);
            continue;
        }
        let remaining = max.saturating_sub(used + sep);
        let cut = truncate_utf8(&item, remaining);
        if !cut.is_empty() {
            out.push(cut.to_string());
        }
        break;
    }

    out
}

pub(crate) fn set_text(set: &mut MetadataFieldSet, key: FieldKey, value: &str) {
    let value = truncate_utf8(value.trim(), key.max_len());
    set.set(key, FieldValue::Text(value.to_string()));
}

pub(crate) fn set_list(set: &mut MetadataFieldSet, key: FieldKey, items: Vec<String>) {
    set.set(key, FieldValue::List(truncate_list(items, key.max_len())));
}
