//! SRT subtitle rendering and parsing.
//!
//! Timestamps are integer milliseconds rendered as `HH:MM:SS,mmm`.

#[derive(thiserror::Error, Debug)]
pub enum SrtError {
    #[error("Empty SRT content")]
    Empty,
    #[error("No valid subtitle blocks found")]
    NoBlocks,
    #[error("Invalid timestamp line: {0}")]
    InvalidTimestamp(String),
}

/// One subtitle segment with millisecond timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtSegment {
    pub text: String,
    pub start_time: i64,
    pub end_time: i64,
}

/// Formats milliseconds as `HH:MM:SS,mmm`.
pub fn format_srt_timestamp(ms: i64) -> String {
    let total_seconds = ms / 1000;
    let milliseconds = ms % 1000;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        hours, minutes, seconds, milliseconds
    )
}

/// Parses an `HH:MM:SS,mmm` timestamp into milliseconds.
pub fn parse_srt_timestamp(s: &str) -> Result<i64, SrtError> {
    let s = s.trim();
    let (hms, ms) = s
        .split_once(',')
        .ok_or_else(|| SrtError::InvalidTimestamp(s.to_string()))?;

    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 {
        return Err(SrtError::InvalidTimestamp(s.to_string()));
    }

    let parse = |p: &str| -> Result<i64, SrtError> {
        p.trim()
            .parse::<i64>()
            .map_err(|_| SrtError::InvalidTimestamp(s.to_string()))
    };

    let hours = parse(parts[0])?;
    let minutes = parse(parts[1])?;
    let seconds = parse(parts[2])?;
    let millis = parse(ms)?;

    Ok(((hours * 3600 + minutes * 60 + seconds) * 1000) + millis)
}

/// Renders segments as an SRT document.
pub fn render_srt(segments: &[SrtSegment]) -> String {
    let mut srt = String::new();

    for (i, segment) in segments.iter().enumerate() {
        srt.push_str(&format!("{}\n", i + 1));
        srt.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(segment.start_time),
            format_srt_timestamp(segment.end_time)
        ));
        srt.push_str(&segment.text);
        srt.push_str("\n\n");
    }

    srt
}

/// Parses an SRT document into segments.
///
/// Blocks missing an index, timestamp line or text are skipped.
pub fn parse_srt(content: &str) -> Result<Vec<SrtSegment>, SrtError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(SrtError::Empty);
    }

    let mut segments = Vec::new();

    for block in content.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 3 {
            continue;
        }

        // first line is the index, second the timestamp range
        if lines[0].trim().parse::<u64>().is_err() {
            continue;
        }

        let Some((start, end)) = lines[1].split_once("-->") else {
            continue;
        };

        let (Ok(start_time), Ok(end_time)) = (parse_srt_timestamp(start), parse_srt_timestamp(end))
        else {
            continue;
        };

        let text = lines[2..].join("\n").trim().to_string();
        if text.is_empty() {
            continue;
        }

        segments.push(SrtSegment {
            text,
            start_time,
            end_time,
        });
    }

    if segments.is_empty() {
        return Err(SrtError::NoBlocks);
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_segments() -> Vec<SrtSegment> {
        vec![
            SrtSegment {
                text: "こんにちは".to_string(),
                start_time: 0,
                end_time: 2_500,
            },
            SrtSegment {
                text: "today we play Factorio".to_string(),
                start_time: 3_000,
                end_time: 7_250,
            },
            SrtSegment {
                text: "multi\nline".to_string(),
                start_time: 3_600_000,
                end_time: 3_661_001,
            },
        ]
    }

    #[test]
    fn test_format_srt_timestamp() {
        assert_eq!(format_srt_timestamp(0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(2_500), "00:00:02,500");
        assert_eq!(format_srt_timestamp(3_661_001), "01:01:01,001");
    }

    #[test]
    fn test_parse_srt_timestamp() {
        assert_eq!(parse_srt_timestamp("00:00:00,000").unwrap(), 0);
        assert_eq!(parse_srt_timestamp("01:01:01,001").unwrap(), 3_661_001);
        assert!(parse_srt_timestamp("1:2,3").is_err());
    }

    #[test]
    fn test_render_parse_roundtrip() {
        let segments = sample_segments();
        let rendered = render_srt(&segments);
        let parsed = parse_srt(&rendered).unwrap();
        assert_eq!(parsed, segments);
    }

    #[test]
    fn test_parse_skips_malformed_blocks() {
        let content = "1\n00:00:00,000 --> 00:00:01,000\nok\n\nnot a block\n\n2\nbad timestamps\ntext\n\n3\n00:00:02,000 --> 00:00:03,000\nalso ok\n";
        let parsed = parse_srt(content).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].text, "ok");
        assert_eq!(parsed[1].text, "also ok");
    }

    #[test]
    fn test_parse_empty_errors() {
        assert!(matches!(parse_srt(""), Err(SrtError::Empty)));
        assert!(matches!(parse_srt("   \n  "), Err(SrtError::Empty)));
    }
}
