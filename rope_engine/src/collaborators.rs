//! Capabilities the engine drives but does not own: the character's sprite
//! body (animation, tint, physics) and the markers on authored instructions.
//! Headless recording implementations back the CLI runtime and the tests.

use std::{cell::RefCell, collections::BTreeSet, rc::Rc};

use serde::Serialize;

use crate::character::Facing;
use crate::maze::ScreenPoint;
use crate::program::InstructionId;

/// 0xRRGGBB tint.
pub type Color = u32;

pub const HIGHLIGHT_TINT: Color = 0xffff00;
pub const BLOCKED_TINT: Color = 0xff0000;

pub trait CharacterBody {
    fn play_animation(&self, facing: Facing);
    /// Starts moving toward `point` at `speed` pixels per second.
    fn move_toward(&self, point: ScreenPoint, speed: f32);
    fn distance_to(&self, point: ScreenPoint) -> f32;
    fn set_tint(&self, color: Color);
    fn clear_tint(&self);
    /// Teleports to `point` and drops any velocity.
    fn reset_to(&self, point: ScreenPoint);
    fn stop(&self);
}

pub trait InstructionMarkers {
    fn animate(&self, id: InstructionId);
    fn disanimate(&self, id: InstructionId);
    fn highlight(&self, id: InstructionId, color: Color);
    fn clear_highlight(&self, id: InstructionId);
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyEvent {
    Animation { facing: Facing },
    MoveToward { x: f32, y: f32, speed: f32 },
    Tint { color: Color },
    ClearTint,
    Reset { x: f32, y: f32 },
    Stop,
}

#[derive(Debug)]
struct BodyState {
    position: ScreenPoint,
    target: Option<ScreenPoint>,
    speed: f32,
    tint: Option<Color>,
    animation: Option<Facing>,
    events: Vec<BodyEvent>,
}

/// Headless sprite body. Seeks the requested point in a straight line each
/// time [`KinematicBody::integrate`] runs and never overshoots it.
#[derive(Clone)]
pub struct KinematicBody {
    state: Rc<RefCell<BodyState>>,
}

impl KinematicBody {
    pub fn new(position: ScreenPoint) -> Self {
        Self {
            state: Rc::new(RefCell::new(BodyState {
                position,
                target: None,
                speed: 0.0,
                tint: None,
                animation: None,
                events: Vec::new(),
            })),
        }
    }

    pub fn integrate(&self, delta_ms: u64) {
        let mut state = self.state.borrow_mut();
        let Some(target) = state.target else {
            return;
        };
        let remaining = state.position.distance(target);
        let travel = state.speed * delta_ms as f32 / 1000.0;
        if travel >= remaining {
            state.position = target;
            return;
        }
        let scale = travel / remaining;
        state.position = ScreenPoint {
            x: state.position.x + (target.x - state.position.x) * scale,
            y: state.position.y + (target.y - state.position.y) * scale,
        };
    }

    pub fn position(&self) -> ScreenPoint {
        self.state.borrow().position
    }

    pub fn is_moving(&self) -> bool {
        self.state.borrow().target.is_some()
    }

    pub fn tint(&self) -> Option<Color> {
        self.state.borrow().tint
    }

    pub fn animation(&self) -> Option<Facing> {
        self.state.borrow().animation
    }

    pub fn events(&self) -> Vec<BodyEvent> {
        self.state.borrow().events.clone()
    }
}

impl CharacterBody for KinematicBody {
    fn play_animation(&self, facing: Facing) {
        let mut state = self.state.borrow_mut();
        state.animation = Some(facing);
        state.events.push(BodyEvent::Animation { facing });
    }

    fn move_toward(&self, point: ScreenPoint, speed: f32) {
        let mut state = self.state.borrow_mut();
        state.target = Some(point);
        state.speed = speed;
        state.events.push(BodyEvent::MoveToward {
            x: point.x,
            y: point.y,
            speed,
        });
    }

    fn distance_to(&self, point: ScreenPoint) -> f32 {
        self.state.borrow().position.distance(point)
    }

    fn set_tint(&self, color: Color) {
        let mut state = self.state.borrow_mut();
        state.tint = Some(color);
        state.events.push(BodyEvent::Tint { color });
    }

    fn clear_tint(&self) {
        let mut state = self.state.borrow_mut();
        if state.tint.take().is_some() {
            state.events.push(BodyEvent::ClearTint);
        }
    }

    fn reset_to(&self, point: ScreenPoint) {
        let mut state = self.state.borrow_mut();
        state.position = point;
        state.target = None;
        state.speed = 0.0;
        state.events.push(BodyEvent::Reset {
            x: point.x,
            y: point.y,
        });
    }

    fn stop(&self) {
        let mut state = self.state.borrow_mut();
        state.target = None;
        state.speed = 0.0;
        state.events.push(BodyEvent::Stop);
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerEvent {
    Animate { id: InstructionId },
    Disanimate { id: InstructionId },
    Highlight { id: InstructionId, color: Color },
    ClearHighlight { id: InstructionId },
}

#[derive(Debug, Default)]
struct MarkerState {
    animated: BTreeSet<InstructionId>,
    highlighted: BTreeSet<InstructionId>,
    events: Vec<MarkerEvent>,
}

/// Records marker toggles and tracks which instructions are currently lit.
#[derive(Clone, Default)]
pub struct RecordingMarkers {
    state: Rc<RefCell<MarkerState>>,
}

impl RecordingMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_animated(&self, id: InstructionId) -> bool {
        self.state.borrow().animated.contains(&id)
    }

    pub fn animated(&self) -> Vec<InstructionId> {
        self.state.borrow().animated.iter().copied().collect()
    }

    pub fn highlighted(&self) -> Vec<InstructionId> {
        self.state.borrow().highlighted.iter().copied().collect()
    }

    pub fn events(&self) -> Vec<MarkerEvent> {
        self.state.borrow().events.clone()
    }
}

impl InstructionMarkers for RecordingMarkers {
    fn animate(&self, id: InstructionId) {
        let mut state = self.state.borrow_mut();
        state.animated.insert(id);
        state.events.push(MarkerEvent::Animate { id });
    }

    fn disanimate(&self, id: InstructionId) {
        let mut state = self.state.borrow_mut();
        state.animated.remove(&id);
        state.events.push(MarkerEvent::Disanimate { id });
    }

    fn highlight(&self, id: InstructionId, color: Color) {
        let mut state = self.state.borrow_mut();
        state.highlighted.insert(id);
        state.events.push(MarkerEvent::Highlight { id, color });
    }

    fn clear_highlight(&self, id: InstructionId) {
        let mut state = self.state.borrow_mut();
        state.highlighted.remove(&id);
        state.events.push(MarkerEvent::ClearHighlight { id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinematic_body_seeks_target_without_overshooting() {
        let body = KinematicBody::new(ScreenPoint::new(0.0, 0.0));
        let target = ScreenPoint::new(30.0, 40.0);
        body.move_toward(target, 40.0);

        body.integrate(500);
        assert!((body.distance_to(target) - 30.0).abs() < 1e-3);

        body.integrate(5000);
        assert_eq!(body.position(), target);
        assert_eq!(body.distance_to(target), 0.0);
    }

    #[test]
    fn reset_and_stop_drop_motion() {
        let body = KinematicBody::new(ScreenPoint::new(0.0, 0.0));
        body.move_toward(ScreenPoint::new(100.0, 0.0), 40.0);
        body.reset_to(ScreenPoint::new(10.0, 10.0));
        assert!(!body.is_moving());
        body.integrate(1000);
        assert_eq!(body.position(), ScreenPoint::new(10.0, 10.0));

        body.move_toward(ScreenPoint::new(100.0, 0.0), 40.0);
        body.stop();
        body.integrate(1000);
        assert_eq!(body.position(), ScreenPoint::new(10.0, 10.0));
    }

    #[test]
    fn clear_tint_is_only_recorded_when_tinted() {
        let body = KinematicBody::new(ScreenPoint::new(0.0, 0.0));
        body.clear_tint();
        body.set_tint(BLOCKED_TINT);
        body.clear_tint();
        assert_eq!(
            body.events(),
            vec![BodyEvent::Tint { color: BLOCKED_TINT }, BodyEvent::ClearTint]
        );
        assert_eq!(body.tint(), None);
    }

    #[test]
    fn markers_track_lit_instructions() {
        let markers = RecordingMarkers::new();
        let id = InstructionId {
            program: 0,
            index: 2,
        };
        markers.animate(id);
        markers.highlight(id, HIGHLIGHT_TINT);
        assert!(markers.is_animated(id));
        assert_eq!(markers.highlighted(), vec![id]);

        markers.clear_highlight(id);
        markers.disanimate(id);
        assert!(markers.animated().is_empty());
        assert_eq!(markers.events().len(), 4);
    }
}
