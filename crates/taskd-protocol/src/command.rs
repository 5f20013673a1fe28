use crate::reason::ErrorReason;

/// A parsed client request, or an `Invalid` marker carrying the reason the
/// line was rejected. Invalid lines still produce a `Command` (never a parse
/// error the caller has to propagate) so the reader loop never desynchronizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Activate(String),
    Deactivate(u32),
    Shutdown,
    Invalid(ErrorReason),
}

/// Parses one line (without its trailing `\n`; a trailing `\r` is tolerated
/// and stripped here).
///
/// `max_id` bounds the `DEACTIVATE` argument (`[0, max_id]`, i.e. `MAX_TASKS`).
/// The grammar is byte-oriented, never UTF-8: any byte outside printable
/// ASCII (`0x20..=0x7E`) anywhere on the line is rejected as `BadToken`
/// before any tokenizing happens, so binary fuzzing can't desynchronize the
/// tokenizer or panic on invalid UTF-8.
pub fn parse_line(raw: &[u8], max_id: u32) -> Command {
    let line = strip_trailing_cr(raw);

    if line.iter().any(|&b| !(0x20..=0x7E).contains(&b)) {
        return Command::Invalid(ErrorReason::BadToken);
    }

    // Safe: every byte was just verified to be in 0x20..=0x7E, a subset of
    // valid single-byte UTF-8.
    let text = std::str::from_utf8(line).expect("line was validated as printable ASCII");
    let mut tokens = text.split_whitespace();

    let verb = match tokens.next() {
        Some(v) => v,
        None => return Command::Invalid(ErrorReason::BadCmd),
    };

    match verb {
        "ACTIVATE" | "a" => parse_activate(tokens),
        "DEACTIVATE" | "d" => parse_deactivate(tokens, max_id),
        "SHUTDOWN" | "s" => parse_shutdown(tokens),
        _ => Command::Invalid(ErrorReason::BadCmd),
    }
}

fn parse_activate<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Command {
    let arg = tokens.next();
    if tokens.next().is_some() {
        return Command::Invalid(ErrorReason::Trailing);
    }
    match arg {
        Some(name) if is_valid_token(name) => Command::Activate(name.to_string()),
        _ => Command::Invalid(ErrorReason::BadToken),
    }
}

fn parse_deactivate<'a>(mut tokens: impl Iterator<Item = &'a str>, max_id: u32) -> Command {
    let arg = tokens.next();
    if tokens.next().is_some() {
        return Command::Invalid(ErrorReason::Trailing);
    }
    match arg.and_then(|a| a.parse::<i64>().ok()) {
        Some(id) if (0..=max_id as i64).contains(&id) => Command::Deactivate(id as u32),
        _ => Command::Invalid(ErrorReason::BadId),
    }
}

fn parse_shutdown<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Command {
    if tokens.next().is_some() {
        return Command::Invalid(ErrorReason::Trailing);
    }
    Command::Shutdown
}

fn is_valid_token(s: &str) -> bool {
    (1..=32).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn strip_trailing_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activates_known_shaped_name() {
        assert_eq!(
            parse_line(b"ACTIVATE t1", 20),
            Command::Activate("t1".to_string())
        );
    }

    #[test]
    fn abbreviated_verbs_are_accepted() {
        assert_eq!(parse_line(b"a t1", 20), Command::Activate("t1".to_string()));
        assert_eq!(parse_line(b"d 3", 20), Command::Deactivate(3));
        assert_eq!(parse_line(b"s", 20), Command::Shutdown);
    }

    #[test]
    fn trailing_cr_is_tolerated() {
        assert_eq!(
            parse_line(b"ACTIVATE t1\r", 20),
            Command::Activate("t1".to_string())
        );
    }

    #[test]
    fn unknown_verb_is_bad_cmd() {
        assert_eq!(
            parse_line(b"GARBAGE_DATA", 20),
            Command::Invalid(ErrorReason::BadCmd)
        );
    }

    #[test]
    fn empty_line_is_bad_cmd() {
        assert_eq!(parse_line(b"", 20), Command::Invalid(ErrorReason::BadCmd));
    }

    #[test]
    fn deactivate_requires_id_in_range() {
        assert_eq!(parse_line(b"DEACTIVATE 999999999999", 20), Command::Invalid(ErrorReason::BadId));
        assert_eq!(parse_line(b"DEACTIVATE -1", 20), Command::Invalid(ErrorReason::BadId));
        assert_eq!(parse_line(b"DEACTIVATE abc", 20), Command::Invalid(ErrorReason::BadId));
        assert_eq!(parse_line(b"DEACTIVATE 21", 20), Command::Invalid(ErrorReason::BadId));
        assert_eq!(parse_line(b"DEACTIVATE 20", 20), Command::Deactivate(20));
    }

    #[test]
    fn trailing_garbage_after_argument_is_rejected() {
        assert_eq!(
            parse_line(b"ACTIVATE t1 extra", 20),
            Command::Invalid(ErrorReason::Trailing)
        );
        assert_eq!(
            parse_line(b"SHUTDOWN now", 20),
            Command::Invalid(ErrorReason::Trailing)
        );
    }

    #[test]
    fn binary_bytes_are_bad_token() {
        assert_eq!(
            parse_line(b"\x00\xFF ACTIVATE t1", 20),
            Command::Invalid(ErrorReason::BadToken)
        );
    }

    #[test]
    fn oversized_or_malformed_activate_argument_is_bad_token() {
        assert_eq!(
            parse_line(b"ACTIVATE not-a-valid-token-because-hyphen", 20),
            Command::Invalid(ErrorReason::BadToken)
        );
        assert_eq!(parse_line(b"ACTIVATE", 20), Command::Invalid(ErrorReason::BadToken));
    }

    proptest::proptest! {
        #[test]
        fn parser_never_panics_on_arbitrary_bytes(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let _ = parse_line(&bytes, 20);
        }
    }
}
