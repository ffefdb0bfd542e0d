use crate::metadata::{FieldKey, IptcField, MetadataFieldSet, truncate_utf8};

/// APP13 prefix of a Photoshop image resource block.
pub const IPTC_HEADER: &[u8] = b"Photoshop 3.0\0";
const IPTC_8BIM: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

// 1:90 CodedCharacterSet = ESC % G (UTF-8)
const UTF8_CHARSET: &[u8] = &[0x1C, 0x01, 0x5A, 0x00, 0x03, 0x1B, 0x25, 0x47];
// 2:0 RecordVersion = 4
const RECORD_VERSION: &[u8] = &[0x1C, 0x02, 0x00, 0x00, 0x02, 0x00, 0x04];

/// IIM repeats Keywords once per keyword, each capped at 64 bytes.
const KEYWORD_MAX: usize = 64;

/// Build APP13 contents holding the IPTC fields.
///
/// 8BIM resources of `existing` other than the IPTC-IIM block are carried
/// over unchanged; the IIM block is rebuilt from `fields`.
pub fn build_app13(existing: Option<&[u8]>, fields: &MetadataFieldSet) -> Vec<u8> {
    let mut result = Vec::new();
    result.extend_from_slice(IPTC_HEADER);

    if let Some(data) = existing {
        for resource in resources(data) {
            if resource.id != IPTC_RESOURCE_ID {
                result.extend_from_slice(resource.raw);
            }
        }
    }

    let iim = build_iim(fields);
    result.extend_from_slice(IPTC_8BIM);
    result.extend_from_slice(&IPTC_RESOURCE_ID.to_be_bytes());
    result.extend_from_slice(&[0x00, 0x00]); // empty pascal name, padded
    result.extend_from_slice(&(iim.len() as u32).to_be_bytes());
    result.extend_from_slice(&iim);
    if iim.len() % 2 != 0 {
        result.push(0x00);
    }

    result
}

/// Encode the IIM datasets (records 1 and 2) for `fields`.
fn build_iim(fields: &MetadataFieldSet) -> Vec<u8> {
    let mut iim = Vec::new();
    iim.extend_from_slice(UTF8_CHARSET);
    iim.extend_from_slice(RECORD_VERSION);

    for field in IptcField::ALL {
        let key = FieldKey::Iptc(field);
        if field == IptcField::Keywords {
            for keyword in fields.list(key) {
                push_dataset(&mut iim, field.dataset(), truncate_utf8(keyword, KEYWORD_MAX));
            }
        } else {
            let value = fields.text(key);
            if !value.is_empty() {
                push_dataset(&mut iim, field.dataset(), truncate_utf8(&value, key.max_len()));
            }
        }
    }

    iim
}

fn push_dataset(iim: &mut Vec<u8>, dataset: u8, value: &str) {
    let bytes = value.as_bytes();
    iim.extend_from_slice(&[0x1C, 0x02, dataset]);
    iim.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    iim.extend_from_slice(bytes);
}

struct Resource<'a> {
    id: u16,
    raw: &'a [u8],
}

/// Walk the 8BIM resources after the Photoshop header. Stops at the first
/// malformed entry.
fn resources(data: &[u8]) -> Vec<Resource<'_>> {
    let mut out = Vec::new();
    let mut pos = IPTC_HEADER.len();

    while pos + 12 <= data.len() && &data[pos..pos + 4] == IPTC_8BIM {
        let id = u16::from_be_bytes([data[pos + 4], data[pos + 5]]);
        // Pascal name: length byte + name, padded to even
        let name_len = data[pos + 6] as usize;
        let name_padded = (name_len + 2) & !1;
        let size_at = pos + 6 + name_padded;
        let Some(size) = data.get(size_at..size_at + 4) else { break };
        let size = u32::from_be_bytes([size[0], size[1], size[2], size[3]]) as usize;
        let end = size_at + 4 + size + (size % 2);
        if end > data.len() {
            break;
        }
        out.push(Resource {
            id,
            raw: &data[pos..end],
        });
        pos = end;
    }

    out
}

/// Decode the record-2 datasets of an APP13 block as `(dataset, value)`.
#[cfg(test)]
pub(crate) fn read_datasets(app13: &[u8]) -> Vec<(u8, String)> {
    let Some(resource) = resources(app13).into_iter().find(|r| r.id == IPTC_RESOURCE_ID) else {
        return Vec::new();
    };
    // 4 signature + 2 id + 2 name + 4 size
    let iim = &resource.raw[12..];
    let mut out = Vec::new();
    let mut pos = 0;
    while pos + 5 <= iim.len() && iim[pos] == 0x1C {
        let (record, dataset) = (iim[pos + 1], iim[pos + 2]);
        let len = u16::from_be_bytes([iim[pos + 3], iim[pos + 4]]) as usize;
        let value = &iim[pos + 5..pos + 5 + len];
        if record == 2 && dataset != 0 {
            out.push((dataset, String::from_utf8_lossy(value).into_owned()));
        }
        pos += 5 + len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldValue;

    fn fields() -> MetadataFieldSet {
        let mut set = MetadataFieldSet::default();
        set.set(
            FieldKey::Iptc(IptcField::ObjectName),
            FieldValue::Text("Storefront view".into()),
        );
        set.set(FieldKey::Iptc(IptcField::ByLine), FieldValue::Text("GroundSwell".into()));
        set.set(
            FieldKey::Iptc(IptcField::Keywords),
            FieldValue::List(vec!["storefront".into(), "retail".into()]),
        );
        set.set(FieldKey::Iptc(IptcField::Headline), FieldValue::Text(String::new()));
        set
    }

    #[test]
    fn datasets_follow_the_vocabulary() {
        let app13 = build_app13(None, &fields());
        assert!(app13.starts_with(IPTC_HEADER));
        assert_eq!(
            read_datasets(&app13),
            [
                (5, "Storefront view".to_string()),
                (25, "storefront".to_string()),
                (25, "retail".to_string()),
                (80, "GroundSwell".to_string()),
            ]
        );
    }

    #[test]
    fn iim_declares_utf8() {
        let app13 = build_app13(None, &fields());
        assert!(app13.windows(UTF8_CHARSET.len()).any(|w| w == UTF8_CHARSET));
    }

    #[test]
    fn long_keyword_is_capped_on_char_boundary() {
        let mut set = MetadataFieldSet::default();
        set.set(
            FieldKey::Iptc(IptcField::Keywords),
            FieldValue::List(vec![format!("{}é", "k".repeat(63))]),
        );
        let datasets = read_datasets(&build_app13(None, &set));
        assert_eq!(datasets, [(25, "k".repeat(63))]);
    }

    #[test]
    fn other_resources_are_preserved_and_iptc_replaced() {
        let mut existing = IPTC_HEADER.to_vec();
        // Resolution info resource 0x03ED, 3-byte payload padded to 4
        existing.extend_from_slice(b"8BIM\x03\xED\x00\x00\x00\x00\x00\x03abc\x00");
        let old = build_app13(None, &fields());
        existing.extend_from_slice(&old[IPTC_HEADER.len()..]);

        let mut updated_fields = fields();
        updated_fields.set(
            FieldKey::Iptc(IptcField::ObjectName),
            FieldValue::Text("Renamed".into()),
        );
        let app13 = build_app13(Some(&existing), &updated_fields);

        let ids: Vec<u16> = resources(&app13).iter().map(|r| r.id).collect();
        assert_eq!(ids, [0x03ED, IPTC_RESOURCE_ID]);
        assert_eq!(read_datasets(&app13)[0], (5, "Renamed".to_string()));
    }

    #[test]
    fn malformed_existing_block_is_dropped() {
        let mut existing = IPTC_HEADER.to_vec();
        existing.extend_from_slice(b"8BIM\x03\xED\x00\x00\xFF\xFF\xFF\xFF");
        let app13 = build_app13(Some(&existing), &fields());
        let ids: Vec<u16> = resources(&app13).iter().map(|r| r.id).collect();
        assert_eq!(ids, [IPTC_RESOURCE_ID]);
    }
}
