//! Response hygiene and command recognition.
//!
//! Small local models leak chat-template tokens, wrap answers in quotes or
//! backticks, and sometimes echo the memory-context marker back. Everything
//! the user sees, and everything recorded in history, passes through
//! [`clean_response`] first.

/// The exact token the agent says to ask for its memories.
pub const RETRIEVE_COMMAND: &str = "retrieve_memory";

/// Leading role artifacts, matched case-insensitively.
const ROLE_ARTIFACTS: &[&str] = &[
    "<|assistant|>",
    "<|im_start|>assistant",
    "assistant:",
    "agent:",
    "anemone:",
];

/// Memory-context markers a backend may echo; longest first.
const MEMORY_MARKERS: &[&str] = &["RETRIEVED MEMORIES:", "RETRIEVED MEMORIES"];

const WRAPPING: &[char] = &['"', '\'', '`'];
const SENTENCE_END: &[char] = &['.', '!', '?'];

fn is_wrapping(c: char) -> bool {
    c.is_whitespace() || WRAPPING.contains(&c)
}

/// Strip `prefix` from the start of `text`, ignoring ASCII case.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn strip_role_artifacts(mut text: &str) -> &str {
    loop {
        let trimmed = text.trim_start();
        let stripped = ROLE_ARTIFACTS
            .iter()
            .find_map(|artifact| strip_prefix_ignore_case(trimmed, artifact));
        match stripped {
            Some(rest) => text = rest,
            None => return trimmed,
        }
    }
}

/// Clean one raw backend response.
///
/// In order: strip leading role artifacts, trim whitespace/quote/backtick
/// wrapping, strip one trailing `.`, `!` or `?`, remove echoed memory
/// markers, trim again.
pub fn clean_response(raw: &str) -> String {
    let text = strip_role_artifacts(raw).trim_matches(is_wrapping);

    let text = match text.strip_suffix(SENTENCE_END) {
        Some(rest) => rest,
        None => text,
    };

    let mut text = text.to_string();
    for marker in MEMORY_MARKERS {
        text = text.replace(marker, "");
    }

    text.trim().to_string()
}

/// Whether a response is the retrieve command.
///
/// Exact match or starts-with on the cleaned, lower-cased text: the backend
/// may append trailing text after the command.
pub fn is_retrieve_command(text: &str) -> bool {
    clean_response(text)
        .to_lowercase()
        .starts_with(RETRIEVE_COMMAND)
}

/// Whether more text could still turn `cleaned` into something else at its start.
///
/// True while the cleaned text is empty or is a proper prefix of the command
/// or of a role artifact.
fn start_is_undecided(cleaned: &str) -> bool {
    let lower = cleaned.to_lowercase();
    lower.is_empty()
        || RETRIEVE_COMMAND.starts_with(&lower)
        || ROLE_ARTIFACTS.iter().any(|a| a.starts_with(&lower))
}

/// Length of the longest suffix of `text` that is a proper prefix of a marker.
fn partial_marker_len(text: &str) -> usize {
    MEMORY_MARKERS
        .iter()
        .flat_map(|marker| {
            (1..marker.len())
                .rev()
                .filter(move |&n| text.ends_with(&marker[..n]))
                .take(1)
        })
        .max()
        .unwrap_or(0)
}

/// The part of a partially streamed, cleaned response that can no longer change.
///
/// Everything that end-of-stream cleanup might still alter is held back:
/// an undecided start, trailing wrapping characters and sentence punctuation,
/// and a trailing partial memory marker. The result is always a prefix of
/// the final cleaned response.
pub fn stable_prefix(cleaned: &str) -> &str {
    if start_is_undecided(cleaned) {
        return "";
    }

    let mut text = cleaned;
    loop {
        let before = text.len();
        text = &text[..text.len() - partial_marker_len(text)];
        text = text.trim_end_matches(|c: char| is_wrapping(c) || SENTENCE_END.contains(&c));
        if text.len() == before {
            return text;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_detection_cases() {
        let cases = [
            ("retrieve_memory", true),
            ("retrieve_memory ", true),
            (" retrieve_memory", true),
            ("retrieve_memory\n", true),
            ("retrieve_memory RETRIEVED MEMORIES:", true),
            ("retrieve_memory\n\nRETRIEVED MEMORIES:", true),
            ("<|assistant|>retrieve_memory", true),
            ("assistant: retrieve_memory", true),
            ("Assistant: Retrieve_Memory.", true),
            ("retrieve_memory and then some text", true),
            ("retrieve_memory extra", true),
            ("`retrieve_memory`", true),
            ("\"retrieve_memory\"", true),
            ("I need to retrieve_memory", false),
            ("Hello world", false),
            ("RETRIEVED MEMORIES:", false),
            ("", false),
        ];
        for (input, expected) in cases {
            assert_eq!(is_retrieve_command(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn cleanup_steps_apply_in_order() {
        assert_eq!(clean_response("  \"Hello there!\"  "), "Hello there");
        assert_eq!(clean_response("assistant: Hi."), "Hi");
        assert_eq!(clean_response("<|im_start|>assistant\nHi"), "Hi");
        assert_eq!(clean_response("agent: anemone: Hey"), "Hey");
        // Only one trailing sentence-ending character is stripped.
        assert_eq!(clean_response("Wait..."), "Wait..");
        assert_eq!(clean_response("Sure RETRIEVED MEMORIES: done"), "Sure  done");
        assert_eq!(clean_response("RETRIEVED MEMORIES:"), "");
    }

    #[test]
    fn inner_punctuation_is_kept() {
        assert_eq!(clean_response("Hi! How are you?"), "Hi! How are you");
    }

    #[test]
    fn stable_prefix_holds_undecided_starts() {
        assert_eq!(stable_prefix(""), "");
        assert_eq!(stable_prefix("retr"), "");
        assert_eq!(stable_prefix("Retrieve_mem"), "");
        assert_eq!(stable_prefix("assis"), "");
        assert_eq!(stable_prefix("<|im_st"), "");
        assert_eq!(stable_prefix("Agent Smith"), "Agent Smith");
    }

    #[test]
    fn stable_prefix_holds_trailing_cleanup_candidates() {
        assert_eq!(stable_prefix("Hello there,"), "Hello there,");
        assert_eq!(stable_prefix("Hello there. "), "Hello there");
        assert_eq!(stable_prefix("He said \"yes"), "He said \"yes");
        assert_eq!(stable_prefix("Sure. RETRIEV"), "Sure");
        assert_eq!(stable_prefix("I am R"), "I am");
    }

    #[test]
    fn stable_prefix_is_prefix_of_final_cleanup() {
        let raw = "assistant: \"Hello there. I recall a duck named Bartholomew!\"";
        let final_text = clean_response(raw);
        let mut previous = 0;
        for end in 0..=raw.len() {
            if !raw.is_char_boundary(end) {
                continue;
            }
            let cleaned = clean_response(&raw[..end]);
            let stable = stable_prefix(&cleaned);
            assert!(
                final_text.starts_with(stable),
                "{stable:?} is not a prefix of {final_text:?}"
            );
            assert!(stable.len() >= previous, "stable text shrank at {end}");
            previous = stable.len();
        }
    }
}
