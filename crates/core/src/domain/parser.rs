//! Sample-rate extraction from media player diagnostics
//!
//! Players do not publish the rate they decode at, but several of their
//! subsystems mention it in log messages. Each recognised message shape is a
//! [`RatePattern`] row in [`PATTERNS`]; a batch of messages is scanned in
//! chronological order and the last match wins.
//!
//! The `> 1000 Hz` bound on the decoder and output-settings rows is a
//! heuristic against channel counts and sub-fields sharing the `sampleRate`
//! key. It filters obvious misreads, nothing more.

use crate::domain::audio::SampleRate;
use serde::Serialize;
use tracing::{debug, trace};

/// Characters stripped around an extracted value
const BLANKS: [char; 2] = [' ', '\t'];

/// How the numeric value is delimited after its start marker
#[derive(Debug, Clone, Copy)]
pub enum ValueEnd {
    /// Value runs up to this marker, which must be present
    Marker(&'static str),
    /// Value runs up to the first of these characters, or the end of text
    Delimiters(&'static [char]),
}

/// One recognised log message shape
#[derive(Debug)]
pub struct RatePattern {
    pub name: &'static str,
    /// Every group must be present; any string of a group satisfies it
    pub requires: &'static [&'static [&'static str]],
    /// Marker immediately preceding the value
    pub start: &'static str,
    pub end: ValueEnd,
    /// Multiplier turning the parsed value into Hz
    pub scale: f64,
    /// Values at or below this bound (in Hz) are rejected
    pub min_exclusive_hz: Option<f64>,
}

/// Recognised patterns, in evaluation order
pub static PATTERNS: [RatePattern; 5] = [
    RatePattern {
        name: "audio-capabilities",
        requires: &[&["audioCapabilities:"]],
        start: "asbdSampleRate = ",
        end: ValueEnd::Marker(" kHz"),
        scale: 1000.0,
        min_exclusive_hz: None,
    },
    RatePattern {
        name: "audio-queue",
        requires: &[&["Creating AudioQueue"], &["sampleRate:"]],
        start: "sampleRate:",
        end: ValueEnd::Delimiters(&[' ', '\n', ',']),
        scale: 1.0,
        min_exclusive_hz: None,
    },
    RatePattern {
        name: "alac-decoder",
        requires: &[&["ACAppleLosslessDecoder"], &["Input format:"]],
        start: "ch, ",
        end: ValueEnd::Marker(" Hz"),
        scale: 1.0,
        min_exclusive_hz: None,
    },
    RatePattern {
        name: "flac-aac-decoder",
        requires: &[&["FLACDecoder", "AACDecoder"], &["sampleRate:"]],
        start: "sampleRate:",
        end: ValueEnd::Delimiters(&[' ', '\n', ',']),
        scale: 1.0,
        min_exclusive_hz: Some(1000.0),
    },
    RatePattern {
        name: "output-settings",
        requires: &[&["outputSettings"], &["sampleRate ="]],
        start: "sampleRate =",
        end: ValueEnd::Delimiters(&[' ', '\n', ',', ';']),
        scale: 1.0,
        min_exclusive_hz: Some(1000.0),
    },
];

impl RatePattern {
    /// Whether this pattern owns the entry
    pub fn is_present(&self, entry: &str) -> bool {
        self.requires
            .iter()
            .all(|group| group.iter().any(|anchor| entry.contains(anchor)))
    }

    /// Extract and validate the rate carried by an entry this pattern owns
    pub fn extract(&self, entry: &str) -> Option<SampleRate> {
        let (_, rest) = entry.split_once(self.start)?;

        let raw = match self.end {
            ValueEnd::Marker(marker) => rest.split_once(marker)?.0,
            ValueEnd::Delimiters(delimiters) => {
                let rest = rest.trim_matches(&BLANKS[..]);
                rest.split(delimiters).next().unwrap_or(rest)
            }
        };

        let value: f64 = raw.trim_matches(&BLANKS[..]).parse().ok()?;
        let hz = value * self.scale;

        if let Some(bound) = self.min_exclusive_hz {
            if hz <= bound {
                trace!(pattern = self.name, hz, "Rejected implausible rate");
                return None;
            }
        }

        SampleRate::from_hz_f64(hz)
    }
}

/// A rate found in one entry of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateMatch {
    /// Position of the entry in the batch
    pub index: usize,
    pub pattern: &'static str,
    pub rate: SampleRate,
}

/// Match a single entry.
///
/// The first pattern whose anchors are all present owns the entry; if its
/// value cannot be extracted the entry yields nothing.
pub fn match_entry(entry: &str) -> Option<(&'static RatePattern, SampleRate)> {
    let pattern = PATTERNS.iter().find(|p| p.is_present(entry))?;
    pattern.extract(entry).map(|rate| (pattern, rate))
}

/// Every match in a batch, in entry order
pub fn scan<S: AsRef<str>>(entries: &[S]) -> Vec<RateMatch> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            match_entry(entry.as_ref()).map(|(pattern, rate)| RateMatch {
                index,
                pattern: pattern.name,
                rate,
            })
        })
        .collect()
}

/// Candidate rate for a chronological batch: the value of the last matching entry
pub fn extract_candidate_rate<S: AsRef<str>>(entries: &[S]) -> Option<SampleRate> {
    let mut candidate = None;

    for entry in entries {
        if let Some((pattern, rate)) = match_entry(entry.as_ref()) {
            debug!(pattern = pattern.name, rate = rate.hz(), "Matched rate in log entry");
            candidate = Some(rate);
        }
    }

    candidate
}
