//! Lane layout for the scrolling word ticker.
//!
//! Each named entity becomes an [`Appearance`]: a window of `envelope_width`
//! seconds centred on the mention. Overlapping mentions of the same term are
//! merged into one window, and the resulting windows are stacked into lanes so
//! that no two appearances in a lane overlap. The renderer script reads the
//! serialized [`Ticker`] and animates one text object per appearance.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::{error::TickerError, models::NamedEntity};

pub const DEFAULT_FPS: u32 = 24;
pub const DEFAULT_ENVELOPE_WIDTH: f64 = 120.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Appearance {
    pub term: String,
    pub apid: String,
    #[serde(serialize_with = "round2")]
    pub start: f64,
    #[serde(serialize_with = "round2")]
    pub end: f64,
    #[serde(serialize_with = "round2")]
    pub width: f64,
}

impl Appearance {
    /// An appearance of `width` seconds centred on `center`.
    pub fn centered(
        term: impl Into<String>,
        apid: impl Into<String>,
        center: f64,
        width: f64,
    ) -> Result<Self, TickerError> {
        if !(width.is_finite() && width > 0.0) {
            return Err(TickerError::InvalidWidth(width));
        }
        Ok(Self {
            term: term.into(),
            apid: apid.into(),
            start: center - width / 2.0,
            end: center + width / 2.0,
            width,
        })
    }

    pub fn spanning(
        term: impl Into<String>,
        apid: impl Into<String>,
        start: f64,
        end: f64,
    ) -> Result<Self, TickerError> {
        if end < start {
            return Err(TickerError::InvertedSpan { start, end });
        }
        Ok(Self {
            term: term.into(),
            apid: apid.into(),
            start,
            end,
            width: end - start,
        })
    }

    /// Progress of the envelope at `t`: 0 before start, 1 after end, linear in between.
    pub fn value_at(&self, t: f64) -> f64 {
        if t <= self.start {
            0.0
        } else if self.end <= t {
            1.0
        } else {
            (t - self.start) / (self.end - self.start)
        }
    }

    pub fn overlaps(&self, other: &Appearance) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Joins two overlapping (or touching) appearances of one term. The result
    /// keeps the apid of whichever appearance starts first.
    pub fn merge(a: &Appearance, b: &Appearance) -> Result<Appearance, TickerError> {
        if a.term != b.term {
            return Err(TickerError::TermMismatch {
                left: a.term.clone(),
                right: b.term.clone(),
            });
        }
        if !a.overlaps(b) {
            return Err(TickerError::Disjoint {
                left: a.apid.clone(),
                right: b.apid.clone(),
            });
        }

        let first = if b.start < a.start { b } else { a };
        Appearance::spanning(
            first.term.clone(),
            first.apid.clone(),
            a.start.min(b.start),
            a.end.max(b.end),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticker {
    lanes: Vec<Vec<Appearance>>,
    fps: u32,
    end: f64,
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ticker {
    pub fn new() -> Self {
        Self::with_fps(DEFAULT_FPS)
    }

    pub fn with_fps(fps: u32) -> Self {
        Self {
            lanes: Vec::new(),
            fps,
            end: 0.0,
        }
    }

    /// Builds the full layout from raw mentions.
    pub fn from_named_entities(
        entities: &[NamedEntity],
        envelope_width: f64,
    ) -> Result<Self, TickerError> {
        if entities.is_empty() {
            return Err(TickerError::Empty);
        }

        // Grouped by apid stem, so spellings that would share a renderer object
        // name ("Berlin", "berlin") are treated as one term.
        let mut by_stem: BTreeMap<String, Vec<(f64, &str)>> = BTreeMap::new();
        for entity in entities {
            by_stem
                .entry(apid_stem(&entity.token))
                .or_default()
                .push((entity.timestamp, entity.token.as_str()));
        }

        let mut appearances = Vec::with_capacity(entities.len());
        for (stem, mut mentions) in by_stem {
            mentions.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            let term = mentions[0].1;

            let mut group = mentions.iter().enumerate().map(|(index, &(center, _))| {
                Appearance::centered(term, format!("{stem}.{index}"), center, envelope_width)
            });

            let Some(mut current) = group.next().transpose()? else {
                continue;
            };
            for next in group {
                let next = next?;
                if current.end < next.start {
                    appearances.push(current);
                    current = next;
                } else {
                    current = Appearance::merge(&current, &next)?;
                }
            }
            appearances.push(current);
        }

        appearances.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut ticker = Ticker::new();
        for appearance in appearances {
            ticker.add_appearance(appearance);
        }
        Ok(ticker)
    }

    /// Places `appearance` in the lowest lane whose last appearance has ended
    /// by the time it starts, opening a new lane if none has room.
    pub fn add_appearance(&mut self, appearance: Appearance) {
        self.end = if self.lanes.is_empty() {
            appearance.end
        } else {
            self.end.max(appearance.end)
        };

        let free_lane = self.lanes.iter_mut().find(|lane| {
            lane.last()
                .map_or(true, |last| last.end <= appearance.start)
        });
        match free_lane {
            Some(lane) => lane.push(appearance),
            None => self.lanes.push(vec![appearance]),
        }
    }

    pub fn lanes(&self) -> &[Vec<Appearance>] {
        &self.lanes
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// End of the last appearance, in seconds.
    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn appearances(&self) -> impl Iterator<Item = &Appearance> {
        self.lanes.iter().flatten()
    }

    pub fn find(&self, apid: &str) -> Option<&Appearance> {
        self.appearances().find(|a| a.apid == apid)
    }

    /// Envelope value of `apid` at `t`; unknown ids are 0.
    pub fn value_at(&self, apid: &str, t: f64) -> f64 {
        self.find(apid).map_or(0.0, |a| a.value_at(t))
    }

    /// Number of frames the renderer will produce.
    pub fn frame_count(&self) -> u64 {
        (self.end.max(0.0) * f64::from(self.fps)) as u64
    }
}

/// `Angela Merkel` -> `angela_merkel`; apids append `.<n>`.
fn apid_stem(term: &str) -> String {
    term.replace(' ', "_").to_lowercase()
}

fn round2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}
