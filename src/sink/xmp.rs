use std::fmt::Write;

use super::BrandContact;
use crate::metadata::{FieldKey, MetadataFieldSet, XmpField};

/// APP1 prefix of a JPEG XMP segment.
pub const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// PNG iTXt keyword for an XMP packet.
pub const XMP_PNG_KEYWORD: &str = "XML:com.adobe.xmp";

/// Build a complete XMP packet from the XMP fields plus the brand contact.
///
/// The packet replaces any existing one wholesale. Empty fields are left out.
pub fn build_packet(fields: &MetadataFieldSet, contact: &BrandContact) -> String {
    let text = move |field| fields.text(FieldKey::Xmp(field));
    let list = move |field| fields.list(FieldKey::Xmp(field));

    let mut xmp = String::new();
    xmp.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
    xmp.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    xmp.push_str("<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
    xmp.push_str("<rdf:Description rdf:about=\"\"\n");
    xmp.push_str("  xmlns:dc=\"http://purl.org/dc/elements/1.1/\"\n");
    xmp.push_str("  xmlns:xmp=\"http://ns.adobe.com/xap/1.0/\"\n");
    xmp.push_str("  xmlns:xmpRights=\"http://ns.adobe.com/xap/1.0/rights/\"\n");
    xmp.push_str("  xmlns:photoshop=\"http://ns.adobe.com/photoshop/1.0/\"\n");
    xmp.push_str("  xmlns:Iptc4xmpCore=\"http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/\">\n");

    push_alt(&mut xmp, "dc:title", &text(XmpField::Title));
    push_alt(&mut xmp, "dc:description", &text(XmpField::Description));
    push_array(&mut xmp, "dc:creator", "rdf:Seq", &[text(XmpField::Creator)]);
    push_alt(&mut xmp, "dc:rights", &text(XmpField::Rights));
    push_array(&mut xmp, "dc:subject", "rdf:Bag", list(XmpField::Subject));

    push_simple(&mut xmp, "xmp:Label", &text(XmpField::Label));
    push_simple(&mut xmp, "photoshop:Headline", &text(XmpField::Headline));
    push_simple(&mut xmp, "photoshop:Credit", &text(XmpField::Credit));
    push_simple(&mut xmp, "photoshop:Source", &text(XmpField::Source));
    push_simple(&mut xmp, "photoshop:Category", &text(XmpField::Category));
    push_array(
        &mut xmp,
        "photoshop:SupplementalCategories",
        "rdf:Bag",
        list(XmpField::SupplementalCategories),
    );

    if !text(XmpField::Rights).is_empty() {
        xmp.push_str("  <xmpRights:Marked>True</xmpRights:Marked>\n");
    }

    if !contact.website.is_empty() || !contact.phone.is_empty() {
        xmp.push_str("  <Iptc4xmpCore:CreatorContactInfo rdf:parseType=\"Resource\">\n");
        push_indented(&mut xmp, "    ", "Iptc4xmpCore:CiUrlWork", &contact.website);
        push_indented(&mut xmp, "    ", "Iptc4xmpCore:CiTelWork", &contact.phone);
        xmp.push_str("  </Iptc4xmpCore:CreatorContactInfo>\n");
    }

    xmp.push_str("</rdf:Description>\n");
    xmp.push_str("</rdf:RDF>\n");
    xmp.push_str("</x:xmpmeta>\n");
    xmp.push_str("<?xpacket end=\"w\"?>");
    xmp
}

fn push_simple(xmp: &mut String, element: &str, value: &str) {
    push_indented(xmp, "  ", element, value);
}

fn push_indented(xmp: &mut String, indent: &str, element: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let _ = writeln!(xmp, "{indent}<{element}>{}</{element}>", xml_escape(value));
}

fn push_alt(xmp: &mut String, element: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let _ = writeln!(
        xmp,
        "  <{element}><rdf:Alt><rdf:li xml:lang=\"x-default\">{}</rdf:li></rdf:Alt></{element}>",
        xml_escape(value)
    );
}

fn push_array<S: AsRef<str>>(xmp: &mut String, element: &str, container: &str, items: &[S]) {
    let items: Vec<&str> = items
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return;
    }
    let _ = writeln!(xmp, "  <{element}><{container}>");
    for item in items {
        let _ = writeln!(xmp, "    <rdf:li>{}</rdf:li>", xml_escape(item));
    }
    let _ = writeln!(xmp, "  </{container}></{element}>");
}

/// Escape special XML characters.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
