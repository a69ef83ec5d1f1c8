//! Command-list parsing.
//!
//! One command per line. A line starting with `[` is a JSON array of strings
//! and gives the exact argv; any other line is split on whitespace with no
//! quoting or escaping. Blank lines and `#` comments are skipped.

use std::io::BufRead;

use crate::error::{Error, Result};

/// Parse a whole batch from `reader`.
pub fn parse_batch<R: BufRead>(reader: R) -> Result<Vec<Vec<String>>> {
    let mut commands = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(argv) = parse_line(&line, index + 1)? {
            commands.push(argv);
        }
    }
    Ok(commands)
}

/// Parse a single line; `Ok(None)` for blanks and comments.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<Vec<String>>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let argv: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| Error::Batch {
            line: line_no,
            reason: e.to_string(),
        })?
    } else {
        trimmed.split_whitespace().map(str::to_string).collect()
    };

    if argv.first().is_none_or(String::is_empty) {
        return Err(Error::Batch {
            line: line_no,
            reason: "empty program name".to_string(),
        });
    }
    Ok(Some(argv))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn mixes_plain_and_json_lines() {
        let input = "\
# warm-up
echo hello world

[\"printf\", \"%s\\n\", \"two words\"]
   sleep 1
";
        let commands = parse_batch(input.as_bytes()).unwrap();
        assert_eq!(
            commands,
            vec![
                vec!["echo", "hello", "world"],
                vec!["printf", "%s\n", "two words"],
                vec!["sleep", "1"],
            ]
        );
    }

    #[test]
    fn shell_syntax_is_not_interpreted() {
        let argv = parse_line("echo $HOME | wc", 1).unwrap().unwrap();
        assert_eq!(argv, vec!["echo", "$HOME", "|", "wc"]);
    }

    #[test]
    fn bad_json_reports_line_number() {
        let err = parse_batch("true\n[\"unterminated\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Batch { line: 2, .. }));
    }

    #[test]
    fn empty_json_argv_is_rejected() {
        assert!(matches!(
            parse_line("[]", 7),
            Err(Error::Batch { line: 7, .. })
        ));
        assert!(matches!(
            parse_line("[\"\"]", 8),
            Err(Error::Batch { line: 8, .. })
        ));
    }

    #[test]
    fn non_string_json_is_rejected() {
        assert!(parse_line("[\"echo\", 1]", 1).is_err());
    }
}
