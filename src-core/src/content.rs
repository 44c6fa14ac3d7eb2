//! Plain-text body resolution for inbound mail.

use std::sync::LazyLock;

use mailparse::ParsedMail;
use regex::Regex;

static DOCTYPE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*<!DOCTYPE .*$").unwrap());

static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[^>]*>").unwrap());

/// Returns the plain-text version of a message.
///
/// The first `text/plain` leaf wins. Without one the message is assumed to be
/// HTML-only and the whole message body is stripped of markup. For multipart
/// mail that body still carries boundary lines and part headers. The result is
/// trimmed and uses `\n` line endings.
pub fn plain_text_body(mail: &ParsedMail) -> String {
    let body = match leaf_parts(mail)
        .into_iter()
        .find(|p| p.ctype.mimetype.contains("text/plain"))
    {
        Some(part) => decoded_body(part),
        None => strip_markup(&decoded_body(mail)),
    };

    body.trim().replace("\r\n", "\n")
}

/// Removes every `<...>` tag, then any line left starting with a doctype
/// directive.
pub fn strip_markup(html: &str) -> String {
    let without_tags = MARKUP_TAG.replace_all(html, "");
    DOCTYPE_LINE.replace_all(&without_tags, "").into_owned()
}

/// Flattens the part tree into its leaves, in document order. A message with
/// no sub-parts is its own single leaf.
pub fn leaf_parts<'m, 'a>(mail: &'m ParsedMail<'a>) -> Vec<&'m ParsedMail<'a>> {
    let mut leaves = Vec::new();
    collect_leaves(mail, &mut leaves);
    leaves
}

fn collect_leaves<'m, 'a>(part: &'m ParsedMail<'a>, out: &mut Vec<&'m ParsedMail<'a>>) {
    if part.subparts.is_empty() {
        out.push(part);
        return;
    }
    for sub in &part.subparts {
        collect_leaves(sub, out);
    }
}

// Charset/transfer decoding can fail on malformed parts; fall back to the raw
// bytes so extraction stays total.
fn decoded_body(part: &ParsedMail) -> String {
    part.get_body()
        .or_else(|_| {
            part.get_body_raw()
                .map(|raw| String::from_utf8_lossy(&raw).into_owned())
        })
        .unwrap_or_default()
}
