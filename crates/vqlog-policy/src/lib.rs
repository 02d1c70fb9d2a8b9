use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use vqlog_protocol::{EventCategory, EventIdentifier};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("identifier {identifier} listed as both {first} and {second}")]
    Overlap {
        identifier: EventIdentifier,
        first: EventCategory,
        second: EventCategory,
    },
    #[error("playback-ended identifier {identifier} cannot be routed as {category}")]
    PlaybackEndedRouted {
        identifier: EventIdentifier,
        category: EventCategory,
    },
}

/// Ordered identifier lists that decide where engine events are routed.
///
/// Lists are checked in order buffer, progress, error, ignored and must be
/// disjoint. Anything not listed is `Unclassified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    #[serde(default)]
    pub buffer: Vec<EventIdentifier>,
    #[serde(default)]
    pub progress: Vec<EventIdentifier>,
    #[serde(default)]
    pub error: Vec<EventIdentifier>,
    #[serde(default)]
    pub ignored: Vec<EventIdentifier>,
    /// Engine signal that ends playback; subscribed by the session itself.
    #[serde(default = "default_playback_ended")]
    pub playback_ended: EventIdentifier,
}

fn default_playback_ended() -> EventIdentifier {
    EventIdentifier::from_string("playbackEnded")
}

fn ids(names: &[&str]) -> Vec<EventIdentifier> {
    names.iter().map(|name| EventIdentifier::from(*name)).collect()
}

impl ClassificationPolicy {
    /// Lists for the dash.js `MediaPlayer.events` surface.
    pub fn dashjs() -> Self {
        Self {
            buffer: ids(&[
                "bufferStalled",
                "bufferLoaded",
                "bufferStateChanged",
                "bufferLevelUpdated",
            ]),
            progress: ids(&["playbackTimeUpdated"]),
            error: ids(&["playbackNotAllowed"]),
            ignored: ids(&[
                // no payload
                "metricsChanged",
                // media type only
                "metricChanged",
                "playbackProgress",
                "playbackPlaying",
                "playbackPaused",
                "playbackSeeked",
                // covered by the element's seeking interaction
                "playbackSeeking",
                "playbackLoadedData",
                // stream initialisation is recorded during setup
                "streamInitialized",
                "playbackMetaDataLoaded",
                "canPlay",
                "canPlayThrough",
                // handled by the session lifecycle subscription
                "playbackEnded",
            ]),
            playback_ended: default_playback_ended(),
        }
    }

    fn ordered_lists(&self) -> [(EventCategory, &[EventIdentifier]); 4] {
        [
            (EventCategory::Buffer, self.buffer.as_slice()),
            (EventCategory::Progress, self.progress.as_slice()),
            (EventCategory::Error, self.error.as_slice()),
            (EventCategory::Ignored, self.ignored.as_slice()),
        ]
    }

    /// Reject an identifier that appears in more than one list, and a
    /// playback-ended identifier listed anywhere but `ignored`.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut seen: HashMap<&EventIdentifier, EventCategory> = HashMap::new();
        for (category, list) in self.ordered_lists() {
            for identifier in list {
                if let Some(first) = seen.get(identifier)
                    && *first != category
                {
                    return Err(PolicyError::Overlap {
                        identifier: identifier.clone(),
                        first: *first,
                        second: category,
                    });
                }
                if *identifier == self.playback_ended && category != EventCategory::Ignored {
                    return Err(PolicyError::PlaybackEndedRouted {
                        identifier: identifier.clone(),
                        category,
                    });
                }
                seen.insert(identifier, category);
            }
        }
        Ok(())
    }

    /// First list containing `identifier`, or `Unclassified`.
    ///
    /// The playback-ended identifier is always `Ignored`.
    pub fn category_of(&self, identifier: &EventIdentifier) -> EventCategory {
        if *identifier == self.playback_ended {
            return EventCategory::Ignored;
        }
        self.ordered_lists()
            .into_iter()
            .find(|(_, list)| list.contains(identifier))
            .map(|(category, _)| category)
            .unwrap_or(EventCategory::Unclassified)
    }

    /// Build the session's classification table from every identifier the engine knows.
    pub fn classify<I>(&self, identifiers: I) -> Result<ClassificationTable, PolicyError>
    where
        I: IntoIterator<Item = EventIdentifier>,
    {
        self.validate()?;
        let mut entries = IndexMap::new();
        for identifier in identifiers {
            let category = self.category_of(&identifier);
            if category == EventCategory::Unclassified {
                debug!(identifier = %identifier, "engine event not covered by policy");
            }
            entries.insert(identifier, category);
        }
        Ok(ClassificationTable { entries })
    }
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self::dashjs()
    }
}

/// Identifier → category mapping, fixed for the lifetime of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationTable {
    entries: IndexMap<EventIdentifier, EventCategory>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    pub buffer: usize,
    pub progress: usize,
    pub error: usize,
    pub ignored: usize,
    pub unclassified: usize,
}

impl ClassificationTable {
    pub fn get(&self, identifier: &EventIdentifier) -> Option<EventCategory> {
        self.entries.get(identifier).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EventIdentifier, EventCategory)> {
        self.entries.iter().map(|(id, category)| (id, *category))
    }

    /// Entries that need an engine subscription (everything but `Ignored`).
    pub fn subscribed(&self) -> impl Iterator<Item = (&EventIdentifier, EventCategory)> {
        self.iter().filter(|(_, category)| category.is_subscribed())
    }

    pub fn unclassified(&self) -> impl Iterator<Item = &EventIdentifier> {
        self.iter()
            .filter(|(_, category)| *category == EventCategory::Unclassified)
            .map(|(id, _)| id)
    }

    pub fn summary(&self) -> ClassificationSummary {
        let mut summary = ClassificationSummary::default();
        for (_, category) in self.iter() {
            match category {
                EventCategory::Buffer => summary.buffer += 1,
                EventCategory::Progress => summary.progress += 1,
                EventCategory::Error => summary.error += 1,
                EventCategory::Ignored => summary.ignored += 1,
                EventCategory::Unclassified => summary.unclassified += 1,
                EventCategory::Interaction => {}
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_identifiers() -> Vec<EventIdentifier> {
        ids(&[
            "bufferLevelUpdated",
            "bufferStalled",
            "playbackTimeUpdated",
            "playbackNotAllowed",
            "metricsChanged",
            "playbackEnded",
            "qualityChangeRendered",
            "fragmentLoadingCompleted",
        ])
    }

    #[test]
    fn dashjs_policy_is_disjoint() {
        assert_eq!(ClassificationPolicy::dashjs().validate(), Ok(()));
    }

    #[test]
    fn classify_assigns_exactly_one_category_per_identifier() {
        let policy = ClassificationPolicy::dashjs();
        let table = policy.classify(engine_identifiers()).unwrap();

        assert_eq!(table.len(), engine_identifiers().len());
        for identifier in engine_identifiers() {
            assert!(table.get(&identifier).is_some(), "{identifier} dropped");
        }
        assert_eq!(
            table.get(&"bufferLevelUpdated".into()),
            Some(EventCategory::Buffer)
        );
        assert_eq!(
            table.get(&"playbackTimeUpdated".into()),
            Some(EventCategory::Progress)
        );
        assert_eq!(
            table.get(&"playbackNotAllowed".into()),
            Some(EventCategory::Error)
        );
        assert_eq!(
            table.get(&"metricsChanged".into()),
            Some(EventCategory::Ignored)
        );
        assert_eq!(
            table.get(&"qualityChangeRendered".into()),
            Some(EventCategory::Unclassified)
        );
    }

    #[test]
    fn unknown_vendor_events_stay_visible() {
        let table = ClassificationPolicy::dashjs()
            .classify(engine_identifiers())
            .unwrap();
        let unclassified: Vec<_> = table.unclassified().map(|id| id.as_str()).collect();
        assert_eq!(
            unclassified,
            vec!["qualityChangeRendered", "fragmentLoadingCompleted"]
        );
        let subscribed: Vec<_> = table.subscribed().map(|(id, _)| id.as_str()).collect();
        assert!(subscribed.contains(&"fragmentLoadingCompleted"));
        assert!(!subscribed.contains(&"metricsChanged"));
    }

    #[test]
    fn summary_counts_every_entry() {
        let table = ClassificationPolicy::dashjs()
            .classify(engine_identifiers())
            .unwrap();
        let summary = table.summary();
        assert_eq!(
            summary,
            ClassificationSummary {
                buffer: 2,
                progress: 1,
                error: 1,
                ignored: 2,
                unclassified: 2,
            }
        );
    }

    #[test]
    fn overlapping_lists_are_rejected() {
        let mut policy = ClassificationPolicy::dashjs();
        policy.error.push("bufferStalled".into());
        let err = policy.classify(engine_identifiers()).unwrap_err();
        assert_eq!(
            err,
            PolicyError::Overlap {
                identifier: "bufferStalled".into(),
                first: EventCategory::Buffer,
                second: EventCategory::Error,
            }
        );
    }

    #[test]
    fn playback_ended_is_never_subscribed_by_the_table() {
        let policy: ClassificationPolicy =
            serde_json::from_str(r#"{"buffer":["bufferLevelUpdated"]}"#).unwrap();
        let table = policy.classify(engine_identifiers()).unwrap();
        assert_eq!(
            table.get(&"playbackEnded".into()),
            Some(EventCategory::Ignored)
        );
        assert!(!table.subscribed().any(|(id, _)| id.as_str() == "playbackEnded"));
    }

    #[test]
    fn routing_playback_ended_is_rejected() {
        let mut policy = ClassificationPolicy::dashjs();
        policy.ignored.retain(|id| id.as_str() != "playbackEnded");
        policy.progress.push("playbackEnded".into());
        assert_eq!(
            policy.validate(),
            Err(PolicyError::PlaybackEndedRouted {
                identifier: "playbackEnded".into(),
                category: EventCategory::Progress,
            })
        );
    }

    #[test]
    fn policy_loads_from_partial_json() {
        let policy: ClassificationPolicy =
            serde_json::from_str(r#"{"buffer":["bufferLevelUpdated"],"ignored":["canPlay"]}"#)
                .unwrap();
        assert!(policy.progress.is_empty());
        assert_eq!(policy.playback_ended.as_str(), "playbackEnded");
        assert_eq!(
            policy.category_of(&"canPlay".into()),
            EventCategory::Ignored
        );
        assert_eq!(
            policy.category_of(&"playbackTimeUpdated".into()),
            EventCategory::Unclassified
        );
    }
}
