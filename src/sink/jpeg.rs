use anyhow::{Result, anyhow};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::{Bytes, ImageEXIF};

use super::iptc::{self, IPTC_HEADER};
use super::xmp::{self, XMP_HEADER};
use super::{BrandContact, tiff};
use crate::metadata::MetadataFieldSet;

const APP1: u8 = 0xE1;
const APP13: u8 = 0xED;

const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// Embed metadata into a JPEG: EXIF APP1, XMP APP1 and IPTC in APP13.
///
/// Works on the segment list only, so the compressed image data and any
/// unrelated segments come out byte-identical.
pub fn embed(image: &[u8], fields: &MetadataFieldSet, contact: &BrandContact) -> Result<Vec<u8>> {
    let mut jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(image))
        .map_err(|e| anyhow!("Failed to parse JPEG: {e}"))?;

    // Remember where the EXIF segment was originally positioned
    let orig_exif_pos = find_segment(&jpeg, APP1, EXIF_PREFIX);
    let existing_exif = jpeg.exif();
    let tiff = tiff::write_exif(existing_exif.as_deref(), fields)?;
    jpeg.set_exif(Some(Bytes::from(tiff)));

    // set_exif() inserts at a fixed position, which may land after XMP.
    // EXIF must come first for many readers.
    if let Some(new_pos) = find_segment(&jpeg, APP1, EXIF_PREFIX) {
        let target_pos = orig_exif_pos.unwrap_or(1).min(new_pos);
        if target_pos < new_pos {
            let segments = jpeg.segments_mut();
            let seg = segments.remove(new_pos);
            segments.insert(target_pos, seg);
        }
    }

    let packet = xmp::build_packet(fields, contact);
    let mut contents = Vec::with_capacity(XMP_HEADER.len() + packet.len());
    contents.extend_from_slice(XMP_HEADER);
    contents.extend_from_slice(packet.as_bytes());
    let after_exif = find_segment(&jpeg, APP1, EXIF_PREFIX).map(|p| p + 1);
    replace_or_insert(
        &mut jpeg,
        JpegSegment::new_with_contents(APP1, Bytes::from(contents)),
        XMP_HEADER,
        after_exif,
    );

    let existing_iptc = find_segment(&jpeg, APP13, IPTC_HEADER)
        .map(|pos| jpeg.segments()[pos].contents().clone());
    let app13 = iptc::build_app13(existing_iptc.as_deref(), fields);
    let after_xmp = find_segment(&jpeg, APP1, XMP_HEADER).map(|p| p + 1);
    replace_or_insert(
        &mut jpeg,
        JpegSegment::new_with_contents(APP13, Bytes::from(app13)),
        IPTC_HEADER,
        after_xmp,
    );

    Ok(jpeg.encoder().bytes().to_vec())
}

/// Position of the first segment with `marker` whose contents start with
/// `prefix`.
fn find_segment(jpeg: &Jpeg, marker: u8, prefix: &[u8]) -> Option<usize> {
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == marker && s.contents().starts_with(prefix))
}

/// Replace the segment identified by the new segment's marker and `prefix`,
/// or insert it at `fallback_pos` (clamped to the segment count).
fn replace_or_insert(
    jpeg: &mut Jpeg,
    segment: JpegSegment,
    prefix: &[u8],
    fallback_pos: Option<usize>,
) {
    let existing = find_segment(jpeg, segment.marker(), prefix);
    let segments = jpeg.segments_mut();
    match existing {
        Some(pos) => segments[pos] = segment,
        None => {
            let pos = fallback_pos.unwrap_or(1).min(segments.len());
            segments.insert(pos, segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ExifField, FieldKey, FieldValue, IptcField, XmpField};
    use std::io::Cursor;

    fn jpeg_bytes() -> Vec<u8> {
        let img = image::RgbImage::new(4, 4);
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    fn contact() -> BrandContact {
        BrandContact {
            website: "www.groundswell.co".into(),
            phone: "435-214-2997".into(),
        }
    }

    fn fields(title: &str) -> MetadataFieldSet {
        let mut set = MetadataFieldSet::default();
        for key in [
            FieldKey::Xmp(XmpField::Title),
            FieldKey::Iptc(IptcField::ObjectName),
        ] {
            set.set(key, FieldValue::Text(title.into()));
        }
        set.set(
            FieldKey::Exif(ExifField::Artist),
            FieldValue::Text("GroundSwell".into()),
        );
        set
    }

    fn count(jpeg: &Jpeg, marker: u8, prefix: &[u8]) -> usize {
        jpeg.segments()
            .iter()
            .filter(|s| s.marker() == marker && s.contents().starts_with(prefix))
            .count()
    }

    #[test]
    fn embeds_all_three_schemas() {
        let out = embed(&jpeg_bytes(), &fields("Storefront view"), &contact()).unwrap();
        let jpeg = Jpeg::from_bytes(Bytes::from(out.clone())).unwrap();

        let exif = jpeg.exif().expect("EXIF segment");
        assert_eq!(
            tiff::read_ascii(&exif, tiff::TAG_ARTIST).as_deref(),
            Some("GroundSwell")
        );

        let xmp_pos = find_segment(&jpeg, APP1, XMP_HEADER).expect("XMP segment");
        let packet = &jpeg.segments()[xmp_pos].contents()[XMP_HEADER.len()..];
        let packet = std::str::from_utf8(packet).unwrap();
        assert!(packet.contains("Storefront view"));
        assert!(packet.contains("435-214-2997"));

        let iptc_pos = find_segment(&jpeg, APP13, IPTC_HEADER).expect("APP13 segment");
        let datasets = iptc::read_datasets(jpeg.segments()[iptc_pos].contents());
        assert!(datasets.contains(&(5, "Storefront view".to_string())));

        let exif_pos = find_segment(&jpeg, APP1, EXIF_PREFIX).unwrap();
        assert!(exif_pos < xmp_pos);
        assert!(xmp_pos < iptc_pos);

        assert!(image::load_from_memory(&out).is_ok());
    }

    #[test]
    fn re_embedding_replaces_segments() {
        let first = embed(&jpeg_bytes(), &fields("First"), &contact()).unwrap();
        let second = embed(&first, &fields("Second"), &contact()).unwrap();
        let jpeg = Jpeg::from_bytes(Bytes::from(second)).unwrap();

        assert_eq!(count(&jpeg, APP1, EXIF_PREFIX), 1);
        assert_eq!(count(&jpeg, APP1, XMP_HEADER), 1);
        assert_eq!(count(&jpeg, APP13, IPTC_HEADER), 1);

        let pos = find_segment(&jpeg, APP13, IPTC_HEADER).unwrap();
        let datasets = iptc::read_datasets(jpeg.segments()[pos].contents());
        assert!(datasets.contains(&(5, "Second".to_string())));
        assert!(!datasets.contains(&(5, "First".to_string())));
    }

    #[test]
    fn scan_data_is_untouched() {
        let original = jpeg_bytes();
        let out = embed(&original, &fields("T"), &contact()).unwrap();
        let before = Jpeg::from_bytes(Bytes::from(original)).unwrap();
        let after = Jpeg::from_bytes(Bytes::from(out)).unwrap();
        let sos = |j: &Jpeg| {
            j.segments()
                .iter()
                .filter(|s| s.marker() == 0xDA)
                .map(|s| s.contents().clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(sos(&before), sos(&after));
    }

    #[test]
    fn rejects_non_jpeg() {
        assert!(embed(b"\x89PNG\r\n\x1a\n", &fields("T"), &contact()).is_err());
    }
}
