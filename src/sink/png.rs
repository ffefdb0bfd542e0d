use anyhow::{Result, anyhow};
use img_parts::png::{Png, PngChunk};
use img_parts::{Bytes, ImageEXIF};

use super::{BrandContact, tiff, xmp};
use crate::metadata::{ExifField, FieldKey, IptcField, MetadataFieldSet, XmpField};

const CHUNK_ITXT: [u8; 4] = *b"iTXt";
const CHUNK_TEXT: [u8; 4] = *b"tEXt";
const CHUNK_ZTXT: [u8; 4] = *b"zTXt";

/// PNG text keywords and the field each one mirrors.
const TEXT_CHUNKS: [(&str, FieldKey); 9] = [
    ("Title", FieldKey::Xmp(XmpField::Title)),
    ("Description", FieldKey::Xmp(XmpField::Description)),
    ("Author", FieldKey::Exif(ExifField::Artist)),
    ("Copyright", FieldKey::Exif(ExifField::Copyright)),
    ("Comment", FieldKey::Exif(ExifField::UserComment)),
    ("Keywords", FieldKey::Iptc(IptcField::Keywords)),
    ("Headline", FieldKey::Iptc(IptcField::Headline)),
    ("Credit", FieldKey::Iptc(IptcField::Credit)),
    ("Source", FieldKey::Xmp(XmpField::Source)),
];

/// Embed metadata into a PNG: `eXIf`, an XMP `iTXt` chunk and one `iTXt`
/// chunk per text keyword. Earlier text chunks with the same keywords are
/// replaced; all other chunks are kept as they are.
pub fn embed(image: &[u8], fields: &MetadataFieldSet, contact: &BrandContact) -> Result<Vec<u8>> {
    let mut png = Png::from_bytes(Bytes::copy_from_slice(image))
        .map_err(|e| anyhow!("Failed to parse PNG: {e}"))?;

    let existing_exif = png.exif();
    let exif = tiff::write_exif(existing_exif.as_deref(), fields)?;
    png.set_exif(Some(Bytes::from(exif)));

    let mut text_chunks = vec![itxt_chunk(
        xmp::XMP_PNG_KEYWORD,
        &xmp::build_packet(fields, contact),
    )];
    for (keyword, key) in TEXT_CHUNKS {
        let value = fields.text(key);
        if !value.is_empty() {
            text_chunks.push(itxt_chunk(keyword, &value));
        }
    }

    let replaced: Vec<&str> = std::iter::once(xmp::XMP_PNG_KEYWORD)
        .chain(TEXT_CHUNKS.iter().map(|(keyword, _)| *keyword))
        .collect();

    let chunks = png.chunks_mut();
    chunks.retain(|chunk| {
        !is_text_chunk(chunk)
            || !replaced.iter().any(|k| text_keyword(chunk) == Some(k.as_bytes()))
    });
    // Directly after IHDR
    let insert_at = chunks.len().min(1);
    for (i, chunk) in text_chunks.into_iter().enumerate() {
        chunks.insert(insert_at + i, chunk);
    }

    Ok(png.encoder().bytes().to_vec())
}

/// Uncompressed international text chunk with no language tag.
fn itxt_chunk(keyword: &str, text: &str) -> PngChunk {
    let mut data = Vec::with_capacity(keyword.len() + text.len() + 5);
    data.extend_from_slice(keyword.as_bytes());
    data.push(0); // keyword terminator
    data.push(0); // compression flag
    data.push(0); // compression method
    data.push(0); // language tag terminator
    data.push(0); // translated keyword terminator
    data.extend_from_slice(text.as_bytes());
    PngChunk::new(CHUNK_ITXT, Bytes::from(data))
}

fn is_text_chunk(chunk: &PngChunk) -> bool {
    matches!(chunk.kind(), CHUNK_ITXT | CHUNK_TEXT | CHUNK_ZTXT)
}

fn text_keyword(chunk: &PngChunk) -> Option<&[u8]> {
    let contents = chunk.contents();
    let end = contents.iter().position(|&b| b == 0)?;
    Some(&contents[..end])
}

/// Text of the uncompressed `iTXt` chunk named `keyword`.
#[cfg(test)]
pub(crate) fn read_itxt(png: &Png, keyword: &str) -> Option<String> {
    png.chunks()
        .iter()
        .filter(|c| c.kind() == CHUNK_ITXT)
        .find(|c| text_keyword(c) == Some(keyword.as_bytes()))
        .and_then(|c| {
            // keyword \0 flag method lang\0 translated\0 text
            let text = c.contents().get(keyword.len() + 5..)?;
            String::from_utf8(text.to_vec()).ok()
        })
}
