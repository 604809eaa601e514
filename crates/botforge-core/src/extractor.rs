//! Log-to-event extraction: one line of trial output in, zero or one event out.

use crate::events::Event;
use regex::{Captures, Regex};

type Build = fn(&Captures<'_>, f64) -> Option<Event>;

struct Rule {
    pattern: Regex,
    build: Build,
}

/// Stateless classifier over an ordered rule list. Rules are tried in fixed
/// priority order and the first match wins; a line matching no rule is
/// silently skipped. A match whose captured fields fail to parse is treated
/// as no match, never as an error.
pub struct LogExtractor {
    clock: Regex,
    rules: Vec<Rule>,
}

impl LogExtractor {
    pub fn new() -> Self {
        // Regex literals are known-good; failure here is unreachable.
        let rule = |pattern: &str, build: Build| Rule {
            pattern: Regex::new(pattern).unwrap(),
            build,
        };

        Self {
            clock: Regex::new(r"^\[(\d+):(\d{2})\]\s*").unwrap(),
            rules: vec![
                rule(r"^Building: (\S+) destroyed\b", |caps, ts| {
                    Some(Event::StructureDestroyed {
                        entity_id: caps.get(1)?.as_str().to_string(),
                        timestamp: ts,
                    })
                }),
                rule(r"^(\S+) assisted in killing (\S+)", |caps, ts| {
                    Some(Event::Assist {
                        entity_id: caps.get(1)?.as_str().to_string(),
                        timestamp: ts,
                    })
                }),
                rule(r"^(\S+) killed (\S+)", |caps, ts| {
                    Some(Event::Kill {
                        entity_id: caps.get(1)?.as_str().to_string(),
                        victim: caps.get(2)?.as_str().to_string(),
                        timestamp: ts,
                    })
                }),
                rule(r"^(\S+) gains (\d+) gold\b", |caps, ts| {
                    Some(Event::GoldGain {
                        entity_id: caps.get(1)?.as_str().to_string(),
                        amount: caps.get(2)?.as_str().parse().ok()?,
                        timestamp: ts,
                    })
                }),
                rule(r"^(\S+) gains (\d+) XP\b", |caps, ts| {
                    Some(Event::ExperienceGain {
                        entity_id: caps.get(1)?.as_str().to_string(),
                        amount: caps.get(2)?.as_str().parse().ok()?,
                        timestamp: ts,
                    })
                }),
                rule(r"^(\S+) died\b", |caps, ts| {
                    Some(Event::Death {
                        entity_id: caps.get(1)?.as_str().to_string(),
                        timestamp: ts,
                    })
                }),
                rule(r"^Victory: (\S+)", |caps, ts| {
                    Some(Event::Victory {
                        entity_id: caps.get(1)?.as_str().to_string(),
                        timestamp: ts,
                    })
                }),
            ],
        }
    }

    /// Classify one line. `seq` is the extraction-order sequence number and
    /// stands in for the timestamp when the line carries no `[mm:ss]` clock.
    pub fn extract(&self, line: &str, seq: u64) -> Option<Event> {
        let line = line.trim();
        let (timestamp, rest) = match self.clock.captures(line) {
            Some(caps) => {
                let minutes: f64 = caps.get(1)?.as_str().parse().ok()?;
                let seconds: f64 = caps.get(2)?.as_str().parse().ok()?;
                let whole = caps.get(0)?;
                (minutes * 60.0 + seconds, &line[whole.end()..])
            }
            None => (seq as f64, line),
        };

        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(rest) {
                if let Some(event) = (rule.build)(&caps, timestamp) {
                    return Some(event);
                }
            }
        }
        None
    }

    /// Extract every event from a whole log, in source-line order.
    pub fn extract_all(&self, log: &str) -> Vec<Event> {
        log.lines()
            .enumerate()
            .filter_map(|(seq, line)| self.extract(line, seq as u64))
            .collect()
    }
}

impl Default for LogExtractor {
    fn default() -> Self {
        Self::new()
    }
}
