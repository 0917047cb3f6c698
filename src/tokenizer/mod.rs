//! Message decomposition into scored tokens.
//!
//! Two strategies share this module's plumbing: [`ngram`] emits words and
//! optional adjacent-word chains, [`sparse`] emits every anchored subset of
//! a sliding window (SBPH/OSB). Both walk the header text line by line,
//! scope header tokens by their field name, and feed everything into a
//! [`Diction`].

pub mod ngram;
pub mod sparse;

use xxhash_rust::xxh3::xxh3_64;

use crate::config::ClassifierConfig;
use crate::diction::Diction;

/// Body token separators.
pub(crate) const DELIMITERS: &[char] =
    &[' ', '.', ',', ';', ':', '\n', '\t', '\r', '@', '-', '+', '*'];

/// Header-value separators. The period is absent so things like IP
/// addresses and hostnames in Received headers survive whole.
pub(crate) const DELIMITERS_HEADING: &[char] =
    &[' ', ',', ';', ':', '\n', '\t', '\r', '@', '-', '+', '*'];

/// End-of-token characters collapsed by [`truncate_token`].
pub(crate) const DELIMITERS_EOT: &[char] = &['!'];

/// Tokens longer than this many bytes carry no statistical value and are
/// skipped outright.
pub(crate) const MAX_TOKEN_BYTES: usize = 49;

/// Header-field prefix the engine itself writes; never tokenized.
const SELF_HEADER_PREFIX: &str = "X-Chaff-";

/// 64-bit key of a token name.
pub fn token_key(name: &str) -> u64 {
    xxh3_64(name.as_bytes())
}

/// Key of the reserved control record some storage backends keep alongside
/// real tokens. It never participates in scoring or training.
pub fn control_token() -> u64 {
    token_key("$$CONTROL$$")
}

/// Tokenize a message into `diction` under the configured strategy.
pub fn tokenize(config: &ClassifierConfig, headers: &str, body: &str, diction: &mut Diction) {
    if config.is_sparse() {
        sparse::tokenize_sparse(config, headers, body, diction);
    } else {
        ngram::tokenize_ngram(config, headers, body, diction);
    }
}

/// Collapse a trailing run of end-of-token characters down to one, so
/// "free!!!!" and "free!" score as the same token.
pub(crate) fn truncate_token(token: &str) -> &str {
    let mut end = token.len();
    let bytes = token.as_bytes();
    while end > 1 && bytes[end - 2] == b'!' {
        end -= 1;
    }
    &token[..end]
}

fn token_len_ok(token: &str) -> bool {
    !token.is_empty() && token.len() <= MAX_TOKEN_BYTES
}

/// One logical header line.
pub(crate) enum HeaderLine<'a> {
    /// Introduces a new field: `Subject: hello` or a bare field name.
    Heading { heading: &'a str, value: &'a str },
    /// Folded continuation of the previous field.
    Continuation { value: &'a str },
}

/// Classify a header line. A line introduces a new heading when the text
/// before the first colon is non-empty and free of whitespace; anything
/// else continues the previous field. A folded line containing a colon only
/// contributes the text before it.
pub(crate) fn split_header_line(line: &str) -> HeaderLine<'_> {
    match line.split_once(':') {
        Some((head, value)) => {
            if !head.is_empty()
                && !head.starts_with(' ')
                && !head.starts_with('\t')
                && !head.contains(' ')
            {
                HeaderLine::Heading {
                    heading: head,
                    value,
                }
            } else {
                HeaderLine::Continuation { value: head }
            }
        }
        None => {
            if !line.is_empty()
                && !line.starts_with(' ')
                && !line.starts_with('\t')
                && !line.contains(' ')
            {
                HeaderLine::Heading {
                    heading: line,
                    value: "",
                }
            } else {
                HeaderLine::Continuation { value: line }
            }
        }
    }
}

/// Whether a header field's values are excluded from tokenization.
pub(crate) fn header_ignored(config: &ClassifierConfig, heading: &str) -> bool {
    heading.starts_with(SELF_HEADER_PREFIX)
        || config.ignored_headers.iter().any(|h| h == heading)
}

/// Record the whole sender line as a single whitelist token.
pub(crate) fn touch_whitelist(diction: &mut Diction, heading: &str, value: &str) {
    let value = value.strip_prefix(' ').unwrap_or(value);
    let name = format!("{heading}*{value}");
    let key = token_key(&name);
    diction.touch(key, &name, None);
    diction.whitelist_token = Some(key);
}

/// Pull the contents of URLs into their own `Url*` token scope, then blank
/// the URL out of `body` so its pieces are not tokenized a second time.
/// `pattern` is matched case-insensitively; the URL extends to the next
/// whitespace/control byte, `>`, non-ASCII byte, or (past the pattern
/// itself) quote character.
pub(crate) fn url_tokenize(diction: &mut Diction, body: &mut String, pattern: &str) {
    let pattern_len = pattern.len();
    let mut lower = body.to_ascii_lowercase();
    let mut from = 0;

    while let Some(offset) = lower[from..].find(pattern) {
        let start = from + offset;
        let bytes = body.as_bytes();
        let mut end = start;
        while end < bytes.len() {
            let b = bytes[end];
            if !b.is_ascii_graphic() || b == b'>' {
                break;
            }
            if (b == b'"' || b == b'\'') && end - start > pattern_len {
                break;
            }
            end += 1;
        }

        let url = body[start..end].to_owned();
        for word in url.split(DELIMITERS).filter(|w| !w.is_empty()) {
            let name = format!("Url*{word}");
            diction.touch(token_key(&name), &name, None);
        }

        let blank = " ".repeat(end - start);
        body.replace_range(start..end, &blank);
        lower.replace_range(start..end, &blank);
        from = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_collapses_trailing_bangs() {
        assert_eq!(truncate_token("free!!!!"), "free!");
        assert_eq!(truncate_token("free!"), "free!");
        assert_eq!(truncate_token("free"), "free");
        assert_eq!(truncate_token("!!"), "!");
        assert_eq!(truncate_token("!"), "!");
    }

    #[test]
    fn heading_detection() {
        assert!(matches!(
            split_header_line("Subject: hello"),
            HeaderLine::Heading {
                heading: "Subject",
                value: " hello"
            }
        ));
        assert!(matches!(
            split_header_line("\tby mx.example.org"),
            HeaderLine::Continuation { .. }
        ));
        // folded line with a colon only contributes the part before it
        assert!(matches!(
            split_header_line(" for bob; 10 Jan 2006 12:00:00"),
            HeaderLine::Continuation {
                value: " for bob; 10 Jan 2006 12"
            }
        ));
        // a heading may not contain spaces
        assert!(matches!(
            split_header_line("Not a: heading"),
            HeaderLine::Continuation { .. }
        ));
    }

    #[test]
    fn url_scanning_blanks_and_scopes() {
        let mut diction = Diction::new(53);
        let mut body = "visit HTTP://Spam.Example/buy?x=1 now".to_owned();
        url_tokenize(&mut diction, &mut body, "http://");
        assert_eq!(body, "visit                             now");
        assert!(diction.find(token_key("Url*HTTP")).is_some());
        assert!(diction.find(token_key("Url*//Spam")).is_some());
        assert!(diction.find(token_key("Url*Example/buy?x=1")).is_some());
        // untouched words are not in the diction yet
        assert!(diction.find(token_key("visit")).is_none());
    }

    #[test]
    fn url_stops_at_quote_after_pattern() {
        let mut diction = Diction::new(53);
        let mut body = r#"<a href="www.example.org/x">click</a>"#.to_owned();
        url_tokenize(&mut diction, &mut body, "www.");
        assert!(diction.find(token_key("Url*example")).is_some());
        assert!(diction.find(token_key("Url*org/x")).is_some());
    }

    #[test]
    fn key_is_stable() {
        assert_eq!(token_key("viagra"), token_key("viagra"));
        assert_ne!(token_key("viagra"), token_key("Viagra"));
    }
}
