//! Streaming serve loop: user keys in, recommendations out.

use std::fmt;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

use serde::Serialize;

use crate::engine::{Recommendation, Recommender, Source};

/// How each recommendation is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One external id per line
    #[default]
    Plain,
    /// One JSON object per key: `{"user", "source", "items"}`
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(OutputFormat::Plain),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format {other:?} (expected plain|json)")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => f.write_str("plain"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

/// Counts for one run of [`serve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServeSummary {
    pub keys: usize,
    pub ranked: usize,
    pub cached: usize,
    pub fallback: usize,
}

impl ServeSummary {
    fn record(&mut self, source: Source) {
        self.keys += 1;
        match source {
            Source::Ranked => self.ranked += 1,
            Source::Cached => self.cached += 1,
            Source::Fallback => self.fallback += 1,
        }
    }
}

/// Read whitespace-separated user keys from `reader` until EOF and write one
/// recommendation per key to `writer`, flushing after each key.
///
/// Keys that are not valid UTF-8 are skipped with a warning. Only I/O
/// errors on the two streams end the loop; per-key problems are absorbed by
/// [`Recommender::recommend`].
pub fn serve<R, W>(
    recommender: &Recommender,
    reader: R,
    mut writer: W,
    format: OutputFormat,
) -> io::Result<ServeSummary>
where
    R: BufRead,
    W: Write,
{
    let mut summary = ServeSummary::default();

    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        for key in line.split_whitespace() {
            if key.contains(char::REPLACEMENT_CHARACTER) {
                tracing::warn!("Skipping input key {:?}: not valid UTF-8", key);
                continue;
            }
            let rec = recommender.recommend(key);
            summary.record(rec.source);
            write_recommendation(&mut writer, &rec, format)?;
            writer.flush()?;
        }
    }

    tracing::info!(
        "Served {} keys ({} ranked, {} cached, {} fallback)",
        summary.keys,
        summary.ranked,
        summary.cached,
        summary.fallback
    );
    Ok(summary)
}

pub fn write_recommendation<W: Write>(
    writer: &mut W,
    rec: &Recommendation,
    format: OutputFormat,
) -> io::Result<()> {
    match format {
        OutputFormat::Plain => {
            for id in &rec.items {
                writeln!(writer, "{id}")?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, rec)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("plain".parse::<OutputFormat>(), Ok(OutputFormat::Plain));
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("csv".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_plain_output() {
        let rec = Recommendation {
            user: "u1".into(),
            items: vec![30, 10],
            source: Source::Ranked,
        };
        let mut out = Vec::new();
        write_recommendation(&mut out, &rec, OutputFormat::Plain).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "30\n10\n");
    }

    #[test]
    fn test_json_output() {
        let rec = Recommendation {
            user: "u2".into(),
            items: vec![30, 10],
            source: Source::Fallback,
        };
        let mut out = Vec::new();
        write_recommendation(&mut out, &rec, OutputFormat::Json).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["user"], "u2");
        assert_eq!(value["source"], "fallback");
        assert_eq!(value["items"], serde_json::json!([30, 10]));
    }

    #[test]
    fn test_empty_list_writes_nothing_in_plain() {
        let rec = Recommendation {
            user: "u".into(),
            items: Vec::new(),
            source: Source::Ranked,
        };
        let mut out = Vec::new();
        write_recommendation(&mut out, &rec, OutputFormat::Plain).unwrap();
        assert!(out.is_empty());
    }
}
