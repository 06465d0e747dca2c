//! Transport string encoding of an item's image list.
//!
//! Format: `MULTI:` followed by base64 of the percent-encoded JSON array
//! `[{"url":…,"isMain":…,"sortOrder":…}]`. A string without the prefix is a
//! legacy single image url. Stored rows depend on this layout byte for byte.
//!
//! Decoding never fails. Each of the three unpacking steps falls back to its
//! input when it cannot be applied, and a payload that still does not parse
//! is salvaged by scanning it for upload urls. A truncated base64 payload is
//! decoded up to its last complete quantum so its leading urls survive.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use regex::Regex;

use super::{ImageRef, MAX_IMAGES_PER_ITEM};

/// Marker of the multi-image encoding.
pub const MULTI_PREFIX: &str = "MULTI:";

/// Path segment every uploaded image url contains.
///
/// Salvage only recovers urls of the form `[scheme://host[:port]]/uploads/…`,
/// so the configured public upload prefix must be one of those. See
/// [`is_recoverable_url`].
pub const UPLOAD_PATH_MARKER: &str = "/uploads/";

static UPLOAD_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:https?://[A-Za-z0-9.\-]+(?::\d+)?)?{}[A-Za-z0-9._~\-/]+",
        regex::escape(UPLOAD_PATH_MARKER)
    ))
    .expect("Invalid regex")
});

/// Accepts payloads with or without padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Whether salvage would recover `url` whole from a damaged payload.
#[must_use]
pub fn is_recoverable_url(url: &str) -> bool {
    UPLOAD_URL_RE
        .find(url)
        .is_some_and(|m| m.start() == 0 && m.end() == url.len())
}

/// Encode an image list as a transport string.
///
/// Returns an empty string for an empty list.
#[must_use]
pub fn encode(images: &[ImageRef]) -> String {
    if images.is_empty() {
        return String::new();
    }

    // Serializing plain strings, bools and integers cannot fail.
    let json = serde_json::to_string(images).unwrap_or_default();
    let escaped = escape_component(&json);
    format!("{MULTI_PREFIX}{}", STANDARD.encode(escaped.as_bytes()))
}

/// Percent-encode like a browser's `encodeURIComponent`, which leaves
/// `!'()*` alone on top of the characters `urlencoding` keeps.
fn escape_component(text: &str) -> String {
    let mut escaped = urlencoding::encode(text).into_owned();
    for (code, literal) in [("%21", "!"), ("%27", "'"), ("%28", "("), ("%29", ")"), ("%2A", "*")] {
        if escaped.contains(code) {
            escaped = escaped.replace(code, literal);
        }
    }
    escaped
}

/// How [`decode_detailed`] arrived at its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    /// No input.
    Blank,
    /// An unprefixed legacy url.
    Legacy,
    /// A well-formed multi-image payload.
    Parsed,
    /// The payload did not parse; upload urls were recovered from it.
    Salvaged,
    /// The payload did not parse and nothing could be recovered.
    Unrecoverable,
}

/// Decode a transport string into image refs.
///
/// * `None` or blank input yields no images.
/// * Input without [`MULTI_PREFIX`] is one legacy url, main at position 0.
/// * Undecodable multi-image payloads are salvaged for upload urls, and
///   yield no images when nothing can be recovered.
#[must_use]
pub fn decode(encoded: Option<&str>) -> Vec<ImageRef> {
    decode_detailed(encoded).0
}

/// Like [`decode`], also reporting which path produced the result.
#[must_use]
pub fn decode_detailed(encoded: Option<&str>) -> (Vec<ImageRef>, Decoding) {
    let Some(raw) = encoded.map(str::trim).filter(|s| !s.is_empty()) else {
        return (Vec::new(), Decoding::Blank);
    };

    let Some(payload) = raw.strip_prefix(MULTI_PREFIX) else {
        return (vec![ImageRef::legacy(raw)], Decoding::Legacy);
    };

    let unpacked = unpack(payload);
    let unescaped = unescape(&unpacked);

    if let Ok(images) = serde_json::from_str::<Vec<ImageRef>>(&unescaped) {
        return (images, Decoding::Parsed);
    }

    let salvaged = salvage(&[unescaped.as_ref(), unpacked.as_ref(), payload]);
    if salvaged.is_empty() {
        (salvaged, Decoding::Unrecoverable)
    } else {
        (salvaged, Decoding::Salvaged)
    }
}

/// Step 1: base64. A payload cut short decodes up to its last complete
/// 4-character quantum. Falls back to the payload itself.
fn unpack(payload: &str) -> Cow<'_, str> {
    let trimmed = payload.trim();
    LENIENT
        .decode(trimmed)
        .ok()
        .or_else(|| {
            let data = trimmed.trim_end_matches('=');
            let aligned = data.get(..data.len() - data.len() % 4)?;
            if aligned.is_empty() {
                return None;
            }
            LENIENT.decode(aligned).ok()
        })
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .map_or(Cow::Borrowed(payload), Cow::Owned)
}

/// Step 2: percent-decoding. A dangling `%` or `%X` is kept as is, and a
/// multi-byte character cut in half becomes U+FFFD.
fn unescape(unpacked: &str) -> Cow<'_, str> {
    urlencoding::decode(unpacked).unwrap_or_else(|_| {
        let bytes = urlencoding::decode_binary(unpacked.as_bytes());
        Cow::Owned(String::from_utf8_lossy(&bytes).into_owned())
    })
}

/// Step 3 fallback: rebuild refs from upload urls found in the first
/// candidate text that contains any.
fn salvage(candidates: &[&str]) -> Vec<ImageRef> {
    for text in candidates {
        let mut seen = HashSet::new();
        let urls: Vec<&str> = UPLOAD_URL_RE
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|url| seen.insert(*url))
            .take(MAX_IMAGES_PER_ITEM)
            .collect();

        if !urls.is_empty() {
            return urls
                .into_iter()
                .zip(0..)
                .map(|(url, sort_order)| ImageRef {
                    url: url.to_owned(),
                    is_main: sort_order == 0,
                    sort_order,
                })
                .collect();
        }
    }
    Vec::new()
}

/// Repair a decoded list before persisting it.
///
/// Drops blank and duplicate urls, orders by `sort_order`, keeps at most
/// [`MAX_IMAGES_PER_ITEM`], keeps exactly one main image (the first flagged
/// one, else the first) and renumbers `sort_order` from 0.
#[must_use]
pub fn normalize(mut images: Vec<ImageRef>) -> Vec<ImageRef> {
    images.sort_by_key(|image| image.sort_order);

    let mut seen = HashSet::new();
    let mut kept: Vec<ImageRef> = images
        .into_iter()
        .map(|mut image| {
            image.url = image.url.trim().to_owned();
            image
        })
        .filter(|image| !image.url.is_empty() && seen.insert(image.url.clone()))
        .take(MAX_IMAGES_PER_ITEM)
        .collect();

    let main = kept.iter().position(|image| image.is_main).unwrap_or(0);
    for (index, image) in kept.iter_mut().enumerate() {
        image.is_main = index == main;
        image.sort_order = i32::try_from(index).unwrap_or(i32::MAX);
    }
    kept
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn image(url: &str, is_main: bool, sort_order: i32) -> ImageRef {
        ImageRef {
            url: url.to_owned(),
            is_main,
            sort_order,
        }
    }

    fn three_images() -> Vec<ImageRef> {
        vec![
            image("/uploads/milk.jpg", true, 0),
            image("/uploads/bread (1).png", false, 1),
            image("https://cdn.example.com/uploads/eggs.webp?v=2&x=ü", false, 2),
        ]
    }

    #[test]
    fn test_encode_empty_is_empty_string() {
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_encode_has_prefix_and_is_plain_text() {
        let encoded = encode(&three_images());
        assert!(encoded.starts_with(MULTI_PREFIX));
        assert!(encoded.is_ascii());
        assert!(!encoded.contains('"'));
    }

    #[test]
    fn test_round_trip() {
        for n in 0..=3 {
            let images: Vec<ImageRef> = three_images().into_iter().take(n).collect();
            assert_eq!(decode(Some(&encode(&images))), images);
        }
    }

    #[test]
    fn test_round_trip_preserves_non_main_first_and_gaps() {
        let images = vec![
            image("/uploads/b.jpg", false, 2),
            image("/uploads/a.jpg", true, 5),
        ];
        assert_eq!(decode(Some(&encode(&images))), images);
    }

    #[test]
    fn test_decode_reads_stored_layout() {
        // base64 of the percent-encoded JSON, as written by existing clients.
        let json = r#"[{"url":"/uploads/x.jpg","isMain":true,"sortOrder":0}]"#;
        let escaped = urlencoding::encode(json);
        let stored = format!("MULTI:{}", STANDARD.encode(escaped.as_bytes()));
        assert_eq!(decode(Some(&stored)), vec![image("/uploads/x.jpg", true, 0)]);
    }

    #[test]
    fn test_decode_none_and_blank() {
        assert!(decode(None).is_empty());
        assert!(decode(Some("")).is_empty());
        assert!(decode(Some("   ")).is_empty());
    }

    #[test]
    fn test_decode_legacy_single_url() {
        assert_eq!(
            decode(Some("/uploads/legacy.jpg")),
            vec![image("/uploads/legacy.jpg", true, 0)]
        );
    }

    #[test]
    fn test_decode_unpacked_but_unescaped_payload() {
        // Payload that skipped base64: unpack falls back to the raw text.
        let json = r#"[{"url":"/uploads/a.jpg","isMain":true,"sortOrder":0}]"#;
        let stored = format!("MULTI:{}", urlencoding::encode(json));
        assert_eq!(decode(Some(&stored)), vec![image("/uploads/a.jpg", true, 0)]);
    }

    #[test]
    fn test_decode_salvages_truncated_json() {
        let json = r#"[{"url":"/uploads/a.jpg","isMain":true,"sortOrder":0},{"url":"/uploads/b.jpg","isMa"#;
        let stored = format!(
            "MULTI:{}",
            STANDARD.encode(urlencoding::encode(json).as_bytes())
        );
        assert_eq!(
            decode(Some(&stored)),
            vec![
                image("/uploads/a.jpg", true, 0),
                image("/uploads/b.jpg", false, 1),
            ]
        );
    }

    #[test]
    fn test_decode_recovers_cut_off_transport_string() {
        let images = vec![
            image("/uploads/milk.jpg", true, 0),
            image("https://cdn.example.com/uploads/bread.jpg", false, 1),
        ];
        let encoded = encode(&images);

        for cut in [1, 2, 3, 10] {
            let truncated = &encoded[..encoded.len() - cut];
            let (decoded, decoding) = decode_detailed(Some(truncated));
            assert_eq!(decoded, images, "cut {cut}: {decoding:?}");
            assert_ne!(decoding, Decoding::Unrecoverable);
        }
    }

    #[test]
    fn test_decode_salvages_before_a_split_character() {
        let json = r#"[{"url":"/uploads/a.jpg","isMain":true,"sortOrder":0},{"url":"/uploads/ü"#;
        let escaped = urlencoding::encode(json);
        let cut = &escaped[..escaped.len() - 3];
        let stored = format!("MULTI:{}", STANDARD.encode(cut.as_bytes()));
        assert_eq!(
            decode_detailed(Some(&stored)),
            (vec![image("/uploads/a.jpg", true, 0)], Decoding::Salvaged)
        );
    }

    #[test]
    fn test_decode_accepts_missing_padding() {
        for n in 1..=3 {
            let images: Vec<ImageRef> = three_images().into_iter().take(n).collect();
            let encoded = encode(&images);
            let unpadded = encoded.trim_end_matches('=');
            assert_eq!(decode_detailed(Some(unpadded)), (images, Decoding::Parsed));
        }
    }

    #[test]
    fn test_encode_escapes_like_encode_uri_component() {
        let images = vec![image("/uploads/it's (1)*!.jpg", true, 0)];
        let encoded = encode(&images);
        let payload = encoded.strip_prefix(MULTI_PREFIX).unwrap();
        let escaped = String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap();

        assert!(escaped.contains("it's%20(1)*!.jpg"), "{escaped}");
        assert!(escaped.starts_with("%5B%7B%22url%22%3A%22%2Fuploads%2F"));
        assert_eq!(decode(Some(&encoded)), images);
    }

    #[test]
    fn test_recoverable_urls_follow_upload_marker() {
        assert!(is_recoverable_url("/uploads/a.jpg"));
        assert!(is_recoverable_url("https://cdn.example.com:8443/uploads/a.jpg"));
        assert!(!is_recoverable_url("/media/a.jpg"));
        assert!(!is_recoverable_url("https://cdn.example.com/static/uploads/a.jpg"));
    }

    #[test]
    fn test_decode_salvages_from_raw_payload() {
        let stored = "MULTI:garbage /uploads/one.jpg junk /uploads/two.png /uploads/one.jpg";
        assert_eq!(
            decode(Some(stored)),
            vec![
                image("/uploads/one.jpg", true, 0),
                image("/uploads/two.png", false, 1),
            ]
        );
    }

    #[test]
    fn test_decode_salvage_caps_at_three() {
        let stored = "MULTI:/uploads/1.jpg /uploads/2.jpg /uploads/3.jpg /uploads/4.jpg";
        assert_eq!(decode(Some(stored)).len(), MAX_IMAGES_PER_ITEM);
    }

    #[test]
    fn test_decode_unrecoverable_is_empty() {
        assert_eq!(
            decode_detailed(Some("MULTI:%%%not-base64%%%")),
            (Vec::new(), Decoding::Unrecoverable)
        );
        assert!(decode(Some("MULTI:")).is_empty());
    }

    #[test]
    fn test_decode_reports_path() {
        assert_eq!(decode_detailed(None).1, Decoding::Blank);
        assert_eq!(decode_detailed(Some("/uploads/a.jpg")).1, Decoding::Legacy);
        assert_eq!(
            decode_detailed(Some(&encode(&three_images()))).1,
            Decoding::Parsed
        );
        assert_eq!(
            decode_detailed(Some("MULTI:x /uploads/a.jpg")).1,
            Decoding::Salvaged
        );
    }

    #[test]
    fn test_normalize_repairs_lists() {
        let images = vec![
            image("/uploads/c.jpg", false, 9),
            image(" /uploads/a.jpg ", false, 1),
            image("/uploads/a.jpg", true, 2),
            image("", true, 3),
            image("/uploads/b.jpg", false, 4),
            image("/uploads/d.jpg", false, 10),
        ];
        assert_eq!(
            normalize(images),
            vec![
                image("/uploads/a.jpg", true, 0),
                image("/uploads/b.jpg", false, 1),
                image("/uploads/c.jpg", false, 2),
            ]
        );
    }

    #[test]
    fn test_normalize_keeps_flagged_main() {
        let images = vec![image("/uploads/a.jpg", false, 0), image("/uploads/b.jpg", true, 1)];
        let normalized = normalize(images);
        assert!(!normalized[0].is_main);
        assert!(normalized[1].is_main);
    }
}
