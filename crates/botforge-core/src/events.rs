//! Typed events extracted from raw trial output.

use serde::{Deserialize, Serialize};

/// One in-game occurrence attributed to an entity.
///
/// Events within a trial are totally ordered by extraction; `timestamp` is
/// the embedded game clock in seconds when the source line carried one, else
/// the extraction-order sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StructureDestroyed {
        entity_id: String,
        timestamp: f64,
    },
    Kill {
        entity_id: String,
        victim: String,
        timestamp: f64,
    },
    Assist {
        entity_id: String,
        timestamp: f64,
    },
    GoldGain {
        entity_id: String,
        amount: u32,
        timestamp: f64,
    },
    ExperienceGain {
        entity_id: String,
        amount: u32,
        timestamp: f64,
    },
    Death {
        entity_id: String,
        timestamp: f64,
    },
    Victory {
        entity_id: String,
        timestamp: f64,
    },
}

impl Event {
    /// The acting entity.
    pub fn entity_id(&self) -> &str {
        match self {
            Event::StructureDestroyed { entity_id, .. }
            | Event::Kill { entity_id, .. }
            | Event::Assist { entity_id, .. }
            | Event::GoldGain { entity_id, .. }
            | Event::ExperienceGain { entity_id, .. }
            | Event::Death { entity_id, .. }
            | Event::Victory { entity_id, .. } => entity_id,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Event::StructureDestroyed { timestamp, .. }
            | Event::Kill { timestamp, .. }
            | Event::Assist { timestamp, .. }
            | Event::GoldGain { timestamp, .. }
            | Event::ExperienceGain { timestamp, .. }
            | Event::Death { timestamp, .. }
            | Event::Victory { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_type_tagged() {
        let event = Event::GoldGain {
            entity_id: "bot_a".to_string(),
            amount: 45,
            timestamp: 12.0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"gold_gain\""));
        assert!(json.contains("\"entity_id\":\"bot_a\""));

        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn accessors() {
        let event = Event::Kill {
            entity_id: "bot_a".to_string(),
            victim: "bot_b".to_string(),
            timestamp: 3.5,
        };
        assert_eq!(event.entity_id(), "bot_a");
        assert_eq!(event.timestamp(), 3.5);
    }
}
