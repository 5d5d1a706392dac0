//! Hamlib `rigctld` TCP protocol glosses.
//!
//! Commands such as `F 14074000` or `\get_vfo` and reply codes such as
//! `RPRT -5` are rendered as `SET FREQ: 14074000`, `GET VFO` and `ERROR: 5`.

use std::sync::LazyLock;

use regex::Regex;

use super::ProtocolDecoder;

/// Ordered (pattern, label) rules. First match wins, so the argument-taking
/// forms precede the bare single-letter getters they would otherwise shadow.
const RULES: &[(&str, &str)] = &[
    (r"^\+?F\s+(\d+)", "SET FREQ"),
    (r"^\+?f", "GET FREQ"),
    (r"^\+?M\s+(\w+)\s+(\d+)", "SET MODE"),
    (r"^\+?m", "GET MODE"),
    (r"^\+?L\s+(\w+)\s+([\d.]+)", "SET LEVEL"),
    (r"^\+?l\s+(\w+)", "GET LEVEL"),
    (r"^\+?T\s+([01])", "SET PTT"),
    (r"^\+?t", "GET PTT"),
    (r"^\+?\\dump_state", "DUMP STATE"),
    (r"^\+?\\dump_caps", "DUMP CAPS"),
    (r"^\+?\\get_powerstat", "GET POWERSTAT"),
    (r"^\+?\\chk_vfo", "CHECK VFO"),
    (r"^\+?\\set_vfo\s+(\w+)", "SET VFO"),
    (r"^\+?\\get_vfo", "GET VFO"),
    (r"^RPRT\s+0", "SUCCESS"),
    (r"^RPRT\s+-(\d+)", "ERROR"),
];

/// Bare digit strings longer than this are taken to be a frequency in Hz.
const FREQUENCY_MIN_DIGITS: usize = 7;

#[allow(clippy::expect_used)]
static COMPILED: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|(pattern, label)| {
            (
                Regex::new(pattern).expect("static regex is valid"),
                *label,
            )
        })
        .collect()
});

/// Decoder for the `hamlib` family.
#[derive(Debug, Clone, Copy, Default)]
pub struct HamlibDecoder;

impl ProtocolDecoder for HamlibDecoder {
    fn family(&self) -> &'static str {
        "hamlib"
    }

    fn decode(&self, data: &[u8]) -> String {
        let Ok(text) = std::str::from_utf8(data) else {
            return format!("<BINARY: {} bytes>", data.len());
        };
        let text = text.trim();
        if text.is_empty() {
            return "<EMPTY>".to_string();
        }

        for (re, label) in COMPILED.iter() {
            if let Some(caps) = re.captures(text) {
                let args = caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                return if args.is_empty() {
                    (*label).to_string()
                } else {
                    format!("{label}: {args}")
                };
            }
        }

        if text.chars().all(|c| c.is_ascii_digit()) && text.chars().count() >= FREQUENCY_MIN_DIGITS
        {
            return format!("DATA: {text} Hz");
        }

        format!("RAW: {text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gloss(data: &[u8]) -> String {
        HamlibDecoder.decode(data)
    }

    #[test]
    fn set_freq_with_argument() {
        assert_eq!(gloss(b"F 14074000"), "SET FREQ: 14074000");
        assert_eq!(gloss(b"F 14074000\n"), "SET FREQ: 14074000");
    }

    #[test]
    fn bare_getters() {
        assert_eq!(gloss(b"f"), "GET FREQ");
        assert_eq!(gloss(b"m\n"), "GET MODE");
        assert_eq!(gloss(b"t"), "GET PTT");
    }

    #[test]
    fn multi_argument_commands_join_with_space() {
        assert_eq!(gloss(b"M USB 2400"), "SET MODE: USB 2400");
        assert_eq!(gloss(b"L RFPOWER 0.5"), "SET LEVEL: RFPOWER 0.5");
        assert_eq!(gloss(b"l AF"), "GET LEVEL: AF");
        assert_eq!(gloss(b"T 1"), "SET PTT: 1");
    }

    #[test]
    fn extended_response_prefix_is_accepted() {
        assert_eq!(gloss(b"+F 7074000"), "SET FREQ: 7074000");
        assert_eq!(gloss(b"+\\get_vfo"), "GET VFO");
    }

    #[test]
    fn backslash_long_commands() {
        assert_eq!(gloss(b"\\dump_state"), "DUMP STATE");
        assert_eq!(gloss(b"\\dump_caps"), "DUMP CAPS");
        assert_eq!(gloss(b"\\get_powerstat"), "GET POWERSTAT");
        assert_eq!(gloss(b"\\chk_vfo"), "CHECK VFO");
        assert_eq!(gloss(b"\\set_vfo VFOA"), "SET VFO: VFOA");
        assert_eq!(gloss(b"\\get_vfo"), "GET VFO");
    }

    #[test]
    fn report_codes() {
        assert_eq!(gloss(b"RPRT 0"), "SUCCESS");
        assert_eq!(gloss(b"RPRT 0\n"), "SUCCESS");
        assert_eq!(gloss(b"RPRT -5"), "ERROR: 5");
        assert_eq!(gloss(b"RPRT -1"), "ERROR: 1");
    }

    #[test]
    fn empty_and_whitespace_only() {
        assert_eq!(gloss(b""), "<EMPTY>");
        assert_eq!(gloss(b" \r\n"), "<EMPTY>");
    }

    #[test]
    fn invalid_utf8_is_binary() {
        assert_eq!(gloss(&[0xff, 0xfe, 0xfd]), "<BINARY: 3 bytes>");
    }

    #[test]
    fn long_digit_strings_are_frequencies() {
        assert_eq!(gloss(b"14074000"), "DATA: 14074000 Hz");
        assert_eq!(gloss(b"1407400"), "DATA: 1407400 Hz");
    }

    #[test]
    fn short_digit_strings_stay_raw() {
        assert_eq!(gloss(b"140740"), "RAW: 140740");
    }

    #[test]
    fn unmatched_text_is_raw() {
        assert_eq!(gloss(b"UNKNOWN COMMAND"), "RAW: UNKNOWN COMMAND");
        assert_eq!(gloss(b"RPRT x"), "RAW: RPRT x");
    }

    #[test]
    fn set_freq_without_digits_falls_through() {
        assert_eq!(gloss(b"F abc"), "RAW: F abc");
    }
}
