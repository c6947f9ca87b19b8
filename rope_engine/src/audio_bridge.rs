use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    /// Character starts walking toward a cell.
    Start,
    /// Character bumped into a cell it cannot occupy.
    Blocked,
}

impl Cue {
    pub fn name(self) -> &'static str {
        match self {
            Cue::Start => "start",
            Cue::Blocked => "blocked",
        }
    }
}

/// Sound bank injected into the engine. Fire-and-forget: the engine never
/// waits on playback.
pub trait SoundBank {
    fn play_cue(&self, cue: Cue);
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioEvent {
    CuePlay { cue: Cue, at_ms: u64 },
    /// Request for a cue that was still playing.
    CueOverlap { cue: Cue, at_ms: u64 },
}

#[derive(Debug, Default)]
struct AudioState {
    now_ms: u64,
    /// Cue -> time at which it stops playing.
    playing: BTreeMap<Cue, u64>,
    lengths: BTreeMap<Cue, u64>,
    events: Vec<AudioEvent>,
}

/// Headless sound bank that records playback. A cue requested while the same
/// cue is still playing is not restarted.
#[derive(Clone, Default)]
pub struct RecordingSoundBank {
    state: Rc<RefCell<AudioState>>,
}

impl RecordingSoundBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cue_length(self, cue: Cue, length_ms: u64) -> Self {
        self.state.borrow_mut().lengths.insert(cue, length_ms);
        self
    }

    /// Advances playback time; cues whose length has elapsed stop playing.
    pub fn advance(&self, delta_ms: u64) {
        let mut state = self.state.borrow_mut();
        state.now_ms += delta_ms;
        let now = state.now_ms;
        state.playing.retain(|_, ends_at| *ends_at > now);
    }

    pub fn is_playing(&self, cue: Cue) -> bool {
        self.state.borrow().playing.contains_key(&cue)
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.state.borrow().events.clone()
    }

    pub fn played(&self) -> Vec<Cue> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                AudioEvent::CuePlay { cue, .. } => Some(*cue),
                AudioEvent::CueOverlap { .. } => None,
            })
            .collect()
    }
}

impl SoundBank for RecordingSoundBank {
    fn play_cue(&self, cue: Cue) {
        let mut state = self.state.borrow_mut();
        let at_ms = state.now_ms;
        if state.playing.contains_key(&cue) {
            state.events.push(AudioEvent::CueOverlap { cue, at_ms });
            return;
        }
        // Zero-length cues still count as playing until the next advance.
        let length = state.lengths.get(&cue).copied().unwrap_or(0);
        state.playing.insert(cue, at_ms + length.max(1));
        state.events.push(AudioEvent::CuePlay { cue, at_ms });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_bank_tracks_cues() {
        let bank = RecordingSoundBank::new();
        bank.play_cue(Cue::Start);
        bank.advance(16);
        bank.play_cue(Cue::Blocked);

        assert_eq!(
            bank.events(),
            vec![
                AudioEvent::CuePlay {
                    cue: Cue::Start,
                    at_ms: 0,
                },
                AudioEvent::CuePlay {
                    cue: Cue::Blocked,
                    at_ms: 16,
                },
            ]
        );
    }

    #[test]
    fn overlapping_requests_do_not_restart_a_cue() {
        let bank = RecordingSoundBank::new().with_cue_length(Cue::Blocked, 400);
        bank.play_cue(Cue::Blocked);
        bank.advance(100);
        bank.play_cue(Cue::Blocked);
        assert!(bank.is_playing(Cue::Blocked));
        bank.advance(300);
        assert!(!bank.is_playing(Cue::Blocked));
        bank.play_cue(Cue::Blocked);

        assert_eq!(bank.played(), vec![Cue::Blocked, Cue::Blocked]);
        assert_eq!(
            bank.events()[1],
            AudioEvent::CueOverlap {
                cue: Cue::Blocked,
                at_ms: 100,
            }
        );
    }

    #[test]
    fn cue_events_serialize_with_kind_tag() {
        let json = serde_json::to_string(&AudioEvent::CuePlay {
            cue: Cue::Start,
            at_ms: 200,
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"cue_play","cue":"start","at_ms":200}"#);
    }
}
