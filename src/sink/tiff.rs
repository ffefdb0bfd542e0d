//! EXIF TIFF block writing.
//!
//! New tags are injected into the original TIFF data: rebuilt IFDs and value
//! blobs are appended after the existing bytes and the header is pointed at
//! the new IFD0, so every untouched offset stays valid. Images without EXIF,
//! or with a block that cannot be walked, start from an empty TIFF.

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;

use crate::metadata::{ExifField, FieldKey, MetadataFieldSet};

pub(crate) const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
pub(crate) const TAG_ARTIST: u16 = 0x013B;
pub(crate) const TAG_COPYRIGHT: u16 = 0x8298;
const TAG_EXIF_IFD: u16 = 0x8769;
pub(crate) const TAG_USER_COMMENT: u16 = 0x9286;

const FORMAT_ASCII: u16 = 2;
const FORMAT_LONG: u16 = 4;
const FORMAT_UNDEFINED: u16 = 7;

/// Little-endian header, empty IFD0, no next IFD.
const EMPTY_TIFF: &[u8] = b"II*\0\x08\0\0\0\0\0\0\0\0\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn of(tiff: &[u8]) -> Result<Self> {
        match tiff.get(0..4) {
            Some(b"II*\0") => Ok(Self::Little),
            Some(b"MM\0*") => Ok(Self::Big),
            _ => bail!("Invalid TIFF header"),
        }
    }

    fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        }
    }

    fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }

    fn encode_u16(self, val: u16) -> [u8; 2] {
        match self {
            Self::Little => val.to_le_bytes(),
            Self::Big => val.to_be_bytes(),
        }
    }

    fn encode_u32(self, val: u32) -> [u8; 4] {
        match self {
            Self::Little => val.to_le_bytes(),
            Self::Big => val.to_be_bytes(),
        }
    }
}

/// Bounds-checked view over a TIFF block.
struct Tiff<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

/// An IFD as raw 12-byte entries keyed by tag.
struct Ifd {
    entries: BTreeMap<u16, [u8; 12]>,
    next: u32,
}

impl<'a> Tiff<'a> {
    fn parse(data: &'a [u8]) -> Result<Self> {
        let order = ByteOrder::of(data)?;
        Ok(Self { data, order })
    }

    fn read_u16(&self, offset: usize) -> Result<u16> {
        let bytes = self
            .data
            .get(offset..offset + 2)
            .context("TIFF read out of bounds")?;
        Ok(self.order.u16([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, offset: usize) -> Result<u32> {
        let bytes = self
            .data
            .get(offset..offset + 4)
            .context("TIFF read out of bounds")?;
        Ok(self.order.u32([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn ifd0_offset(&self) -> Result<usize> {
        Ok(self.read_u32(4)? as usize)
    }

    fn read_ifd(&self, offset: usize) -> Result<Ifd> {
        let count = self.read_u16(offset)? as usize;
        let start = offset + 2;
        let end = start + count * 12;
        if end + 4 > self.data.len() {
            bail!("IFD at {offset} extends beyond TIFF data");
        }

        let mut entries = BTreeMap::new();
        for chunk in self.data[start..end].chunks_exact(12) {
            let mut raw = [0u8; 12];
            raw.copy_from_slice(chunk);
            entries.insert(self.order.u16([raw[0], raw[1]]), raw);
        }
        Ok(Ifd {
            entries,
            next: self.read_u32(end)?,
        })
    }

    fn entry_value_offset(&self, raw: &[u8; 12]) -> usize {
        self.order.u32([raw[8], raw[9], raw[10], raw[11]]) as usize
    }
}

/// A tag value to write, already encoded.
struct Entry {
    tag: u16,
    format: u16,
    count: u32,
    data: Vec<u8>,
}

impl Entry {
    fn ascii(tag: u16, value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            format: FORMAT_ASCII,
            count: data.len() as u32,
            data,
        }
    }

    /// UserComment with its 8-byte character code prefix. Non-ASCII text is
    /// stored as UTF-16 in the block's byte order.
    fn user_comment(value: &str, order: ByteOrder) -> Self {
        let mut data = Vec::with_capacity(8 + value.len() * 2);
        if value.is_ascii() {
            data.extend_from_slice(b"ASCII\0\0\0");
            data.extend_from_slice(value.as_bytes());
        } else {
            data.extend_from_slice(b"UNICODE\0");
            for unit in value.encode_utf16() {
                data.extend_from_slice(&order.encode_u16(unit));
            }
        }
        Self {
            tag: TAG_USER_COMMENT,
            format: FORMAT_UNDEFINED,
            count: data.len() as u32,
            data,
        }
    }

    fn long(tag: u16, value: u32, order: ByteOrder) -> Self {
        Self {
            tag,
            format: FORMAT_LONG,
            count: 1,
            data: order.encode_u32(value).to_vec(),
        }
    }

    /// Encode as a raw IFD entry, appending the value to `out` when it does
    /// not fit inline.
    fn encode(&self, out: &mut Vec<u8>, order: ByteOrder) -> [u8; 12] {
        let mut raw = [0u8; 12];
        raw[0..2].copy_from_slice(&order.encode_u16(self.tag));
        raw[2..4].copy_from_slice(&order.encode_u16(self.format));
        raw[4..8].copy_from_slice(&order.encode_u32(self.count));
        if self.data.len() <= 4 {
            raw[8..8 + self.data.len()].copy_from_slice(&self.data);
        } else {
            align(out);
            raw[8..12].copy_from_slice(&order.encode_u32(out.len() as u32));
            out.extend_from_slice(&self.data);
        }
        raw
    }
}

fn align(out: &mut Vec<u8>) {
    if out.len() % 2 != 0 {
        out.push(0);
    }
}

/// Append an IFD to `out` and return its offset.
fn append_ifd(
    out: &mut Vec<u8>,
    entries: &BTreeMap<u16, [u8; 12]>,
    next: u32,
    order: ByteOrder,
) -> u32 {
    align(out);
    let offset = out.len() as u32;
    out.extend_from_slice(&order.encode_u16(entries.len() as u16));
    for raw in entries.values() {
        out.extend_from_slice(raw);
    }
    out.extend_from_slice(&order.encode_u32(next));
    offset
}

/// Inject IFD0 and Exif IFD entries into `original`, creating the Exif IFD
/// (and its pointer in IFD0) when the block has none.
fn inject(original: &[u8], ifd0_new: Vec<Entry>, exif_new: Vec<Entry>) -> Result<Vec<u8>> {
    let tiff = Tiff::parse(original)?;
    let order = tiff.order;
    let ifd0 = tiff.read_ifd(tiff.ifd0_offset()?)?;

    let exif_ifd = match ifd0.entries.get(&TAG_EXIF_IFD) {
        Some(raw) => Some(
            tiff.read_ifd(tiff.entry_value_offset(raw))
                .context("Failed to read Exif IFD")?,
        ),
        None => None,
    };
    let (mut exif_entries, exif_next) = match exif_ifd {
        Some(ifd) => (ifd.entries, ifd.next),
        None => (BTreeMap::new(), 0),
    };

    let mut out = original.to_vec();

    for entry in &exif_new {
        exif_entries.insert(entry.tag, entry.encode(&mut out, order));
    }
    let exif_offset = append_ifd(&mut out, &exif_entries, exif_next, order);

    let mut ifd0_new = ifd0_new;
    ifd0_new.push(Entry::long(TAG_EXIF_IFD, exif_offset, order));
    let mut ifd0_entries = ifd0.entries;
    for entry in &ifd0_new {
        ifd0_entries.insert(entry.tag, entry.encode(&mut out, order));
    }
    let ifd0_offset = append_ifd(&mut out, &ifd0_entries, ifd0.next, order);

    out[4..8].copy_from_slice(&order.encode_u32(ifd0_offset));
    Ok(out)
}

/// Build the EXIF TIFF block for `fields`.
///
/// Writes Artist, Copyright and ImageDescription to IFD0 and UserComment to
/// the Exif IFD, keeping every other tag of `existing`. A malformed existing
/// block is replaced rather than failing the write.
pub fn write_exif(existing: Option<&[u8]>, fields: &MetadataFieldSet) -> Result<Vec<u8>> {
    let Some(tiff) = existing else {
        return inject_fields(EMPTY_TIFF, fields);
    };
    if ByteOrder::of(tiff).is_err() {
        log::warn!("Existing EXIF is not a TIFF block, replacing it");
        return inject_fields(EMPTY_TIFF, fields);
    }

    inject_fields(tiff, fields).or_else(|e| {
        log::warn!("Could not update existing EXIF ({e:#}), replacing it");
        inject_fields(EMPTY_TIFF, fields)
    })
}

fn inject_fields(base: &[u8], fields: &MetadataFieldSet) -> Result<Vec<u8>> {
    let order = ByteOrder::of(base)?;
    let text = |field| fields.text(FieldKey::Exif(field));

    let ifd0 = vec![
        Entry::ascii(TAG_IMAGE_DESCRIPTION, &text(ExifField::ImageDescription)),
        Entry::ascii(TAG_ARTIST, &text(ExifField::Artist)),
        Entry::ascii(TAG_COPYRIGHT, &text(ExifField::Copyright)),
    ];
    let exif = vec![Entry::user_comment(&text(ExifField::UserComment), order)];
    inject(base, ifd0, exif)
}

/// Read the raw value of `tag` from IFD0 or the Exif IFD.
#[cfg(test)]
pub(crate) fn read_tag(data: &[u8], tag: u16) -> Option<Vec<u8>> {
    let tiff = Tiff::parse(data).ok()?;
    let ifd0 = tiff.read_ifd(tiff.ifd0_offset().ok()?).ok()?;
    let raw = match ifd0.entries.get(&tag) {
        Some(raw) => *raw,
        None => {
            let pointer = ifd0.entries.get(&TAG_EXIF_IFD)?;
            let exif = tiff.read_ifd(tiff.entry_value_offset(pointer)).ok()?;
            *exif.entries.get(&tag)?
        }
    };
    let count = tiff.order.u32([raw[4], raw[5], raw[6], raw[7]]) as usize;
    if count <= 4 {
        return Some(raw[8..8 + count].to_vec());
    }
    let offset = tiff.entry_value_offset(&raw);
    data.get(offset..offset + count).map(<[u8]>::to_vec)
}

/// Read an ASCII tag without its NUL terminator.
#[cfg(test)]
pub(crate) fn read_ascii(data: &[u8], tag: u16) -> Option<String> {
    let mut bytes = read_tag(data, tag)?;
    if bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldValue;

    fn fields(artist: &str, comment: &str) -> MetadataFieldSet {
        let mut set = MetadataFieldSet::default();
        set.set(FieldKey::Exif(ExifField::Artist), FieldValue::Text(artist.into()));
        set.set(
            FieldKey::Exif(ExifField::Copyright),
            FieldValue::Text("Copyright GroundSwell".into()),
        );
        set.set(
            FieldKey::Exif(ExifField::ImageDescription),
            FieldValue::Text("Storefront view".into()),
        );
        set.set(FieldKey::Exif(ExifField::UserComment), FieldValue::Text(comment.into()));
        set
    }

    /// Big-endian TIFF with IFD0 = { Make: "Acme" } and no Exif IFD.
    fn big_endian_with_make() -> Vec<u8> {
        let mut tiff = b"MM\0*\0\0\0\x08".to_vec();
        tiff.extend_from_slice(&1u16.to_be_bytes());
        tiff.extend_from_slice(&0x010Fu16.to_be_bytes());
        tiff.extend_from_slice(&FORMAT_ASCII.to_be_bytes());
        tiff.extend_from_slice(&5u32.to_be_bytes());
        tiff.extend_from_slice(&26u32.to_be_bytes());
        tiff.extend_from_slice(&0u32.to_be_bytes());
        tiff.extend_from_slice(b"Acme\0");
        tiff
    }

    #[test]
    fn empty_tiff_gets_all_tags() {
        let out = inject_fields(EMPTY_TIFF, &fields("GroundSwell", "storefront, retail")).unwrap();
        assert_eq!(read_ascii(&out, TAG_ARTIST).as_deref(), Some("GroundSwell"));
        assert_eq!(read_ascii(&out, TAG_COPYRIGHT).as_deref(), Some("Copyright GroundSwell"));
        assert_eq!(
            read_ascii(&out, TAG_IMAGE_DESCRIPTION).as_deref(),
            Some("Storefront view")
        );
        assert_eq!(
            read_tag(&out, TAG_USER_COMMENT).unwrap(),
            b"ASCII\0\0\0storefront, retail"
        );
    }

    #[test]
    fn existing_tags_and_byte_order_are_kept() {
        let original = big_endian_with_make();
        let out = inject_fields(&original, &fields("GroundSwell", "x")).unwrap();
        assert!(out.starts_with(b"MM\0*"));
        assert_eq!(read_ascii(&out, 0x010F).as_deref(), Some("Acme"));
        assert_eq!(read_ascii(&out, TAG_ARTIST).as_deref(), Some("GroundSwell"));
        assert_eq!(read_tag(&out, TAG_USER_COMMENT).unwrap(), b"ASCII\0\0\0x");
    }

    #[test]
    fn rewriting_replaces_previous_values() {
        let first = inject_fields(EMPTY_TIFF, &fields("First", "a")).unwrap();
        let second = inject_fields(&first, &fields("Second", "b")).unwrap();
        assert_eq!(read_ascii(&second, TAG_ARTIST).as_deref(), Some("Second"));
        assert_eq!(read_tag(&second, TAG_USER_COMMENT).unwrap(), b"ASCII\0\0\0b");
    }

    #[test]
    fn ifd_entries_stay_sorted_by_tag() {
        let out = inject_fields(&big_endian_with_make(), &fields("A", "b")).unwrap();
        let tiff = Tiff::parse(&out).unwrap();
        let offset = tiff.ifd0_offset().unwrap();
        let count = tiff.read_u16(offset).unwrap() as usize;
        let tags: Vec<u16> = (0..count)
            .map(|i| tiff.read_u16(offset + 2 + i * 12).unwrap())
            .collect();
        let mut sorted = tags.clone();
        sorted.sort_unstable();
        assert_eq!(tags, sorted);
        assert_eq!(tags, [0x010E, 0x010F, 0x013B, 0x8298, 0x8769]);
    }

    #[test]
    fn non_ascii_comment_is_utf16() {
        let out = inject_fields(EMPTY_TIFF, &fields("A", "équipe")).unwrap();
        let raw = read_tag(&out, TAG_USER_COMMENT).unwrap();
        assert!(raw.starts_with(b"UNICODE\0"));
        assert_eq!(&raw[8..10], &0x00E9u16.to_le_bytes());
    }

    #[test]
    fn write_exif_without_existing_block() {
        let out = write_exif(None, &fields("GroundSwell", "k")).unwrap();
        assert_eq!(read_ascii(&out, TAG_ARTIST).as_deref(), Some("GroundSwell"));
        assert_eq!(read_tag(&out, TAG_USER_COMMENT).unwrap(), b"ASCII\0\0\0k");
    }

    #[test]
    fn write_exif_without_existing_block_has_a_walkable_exif_ifd() {
        let out = write_exif(None, &fields("GroundSwell", "storefront, retail")).unwrap();
        assert!(out.starts_with(b"II*\0"));
        let tiff = Tiff::parse(&out).unwrap();
        let ifd0 = tiff.read_ifd(tiff.ifd0_offset().unwrap()).unwrap();
        let pointer = ifd0.entries.get(&TAG_EXIF_IFD).expect("Exif IFD pointer");
        let exif = tiff.read_ifd(tiff.entry_value_offset(pointer)).unwrap();
        assert!(exif.entries.contains_key(&TAG_USER_COMMENT));
        assert_eq!(
            read_ascii(&out, TAG_IMAGE_DESCRIPTION).as_deref(),
            Some("Storefront view")
        );
        // the result is itself a valid starting point
        let again = write_exif(Some(&out), &fields("Second", "x")).unwrap();
        assert_eq!(read_ascii(&again, TAG_ARTIST).as_deref(), Some("Second"));
    }

    #[test]
    fn unwalkable_existing_block_is_replaced() {
        // valid header, Exif IFD pointer far past the end of the block
        let mut tiff = b"II*\0\x08\0\0\0".to_vec();
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&TAG_EXIF_IFD.to_le_bytes());
        tiff.extend_from_slice(&FORMAT_LONG.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&0xFFFFu32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());
        assert!(inject_fields(&tiff, &fields("A", "b")).is_err());

        let out = write_exif(Some(&tiff), &fields("GroundSwell", "k")).unwrap();
        assert_eq!(read_ascii(&out, TAG_ARTIST).as_deref(), Some("GroundSwell"));
        assert_eq!(read_tag(&out, TAG_USER_COMMENT).unwrap(), b"ASCII\0\0\0k");
    }

    #[test]
    fn write_exif_replaces_garbage() {
        let out = write_exif(Some(&b"not a tiff"[..]), &fields("GroundSwell", "k")).unwrap();
        assert_eq!(read_ascii(&out, TAG_ARTIST).as_deref(), Some("GroundSwell"));
    }

    #[test]
    fn truncated_ifd_is_an_error() {
        let mut tiff = big_endian_with_make();
        tiff.truncate(12);
        assert!(inject_fields(&tiff, &fields("A", "b")).is_err());
    }
}
