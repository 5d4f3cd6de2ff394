use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use scraper::{Html, Selector};

use crate::{DecodeError, VerificationError};

/// Decode a response body to text: BOM -> Content-Type charset -> chardetng guess.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Result<String, DecodeError> {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            content_type
                .and_then(charset_label)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(DecodeError::Charset {
            encoding: encoding.name().to_string(),
        });
    }
    Ok(text.into_owned())
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(&['"', '\''][..]))
    })
}

/// Values of the first `<input name="…">` for each name, in `names` order.
/// Names with no matching input (or no `value`) are skipped.
pub fn verification_inputs(
    html: &str,
    names: &[String],
) -> Result<Vec<(String, String)>, VerificationError> {
    let document = Html::parse_document(html);
    let mut found = Vec::with_capacity(names.len());
    for name in names {
        let selector = Selector::parse(&format!("input[name=\"{name}\"]")).map_err(|err| {
            VerificationError::Selector {
                name: name.clone(),
                message: err.to_string(),
            }
        })?;
        let value = document
            .select(&selector)
            .next()
            .and_then(|input| input.value().attr("value"));
        if let Some(value) = value {
            found.push((name.clone(), value.to_string()));
        }
    }
    Ok(found)
}
