use crate::domains::agents::TranscriptMessage;

/// Upper bound on a stored preview, counted in characters including the ellipsis.
pub const PREVIEW_MAX_CHARS: usize = 120;
const ELLIPSIS: char = '…';

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_meaningful(text: &str) -> bool {
    // Tool output and slash-command envelopes arrive wrapped in tags.
    !text.is_empty() && !text.starts_with('<')
}

pub fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(PREVIEW_MAX_CHARS - 1).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push(ELLIPSIS);
    truncated
}

pub fn derive_content_preview(messages: &[TranscriptMessage]) -> Option<String> {
    messages
        .iter()
        .map(|message| normalize_whitespace(&message.content))
        .find(|text| is_meaningful(text))
        .map(|text| truncate_preview(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> TranscriptMessage {
        TranscriptMessage::new("user", content)
    }

    #[test]
    fn skips_blank_and_envelope_messages() {
        let messages = vec![
            msg("   \n\t"),
            msg("<command-name>/clear</command-name>"),
            msg("  Refactor   the\nparser  "),
            msg("later"),
        ];
        assert_eq!(
            derive_content_preview(&messages).as_deref(),
            Some("Refactor the parser")
        );
    }

    #[test]
    fn long_text_is_truncated_with_ellipsis() {
        let long = "word ".repeat(60);
        let preview = derive_content_preview(&[msg(&long)]).unwrap();
        assert!(preview.chars().count() <= PREVIEW_MAX_CHARS);
        assert!(preview.ends_with('…'));
        assert!(!preview.ends_with(" …"));
    }

    #[test]
    fn exact_length_is_kept() {
        let exact = "x".repeat(PREVIEW_MAX_CHARS);
        assert_eq!(truncate_preview(&exact), exact);
    }

    #[test]
    fn multibyte_text_truncates_on_char_boundaries() {
        let text = "é".repeat(200);
        let preview = truncate_preview(&text);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn nothing_meaningful_gives_none() {
        assert_eq!(derive_content_preview(&[msg(""), msg("<system>x</system>")]), None);
        assert_eq!(derive_content_preview(&[]), None);
    }
}
