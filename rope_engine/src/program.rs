use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CALL_MARKER: &str = "prog";

/// Authored action carried by an [`Instruction`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    MoveDown,
    MoveUp,
    MoveLeft,
    MoveRight,
    /// Invoke another program; the tag is the callee's name.
    Call(String),
    /// Tag the engine does not understand. Executes as a move in place.
    Unknown(String),
}

impl Action {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "moveDown" => Action::MoveDown,
            "moveUp" => Action::MoveUp,
            "moveLeft" => Action::MoveLeft,
            "moveRight" => Action::MoveRight,
            other if other.contains(CALL_MARKER) => Action::Call(other.to_string()),
            other => Action::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Action::MoveDown => "moveDown",
            Action::MoveUp => "moveUp",
            Action::MoveLeft => "moveLeft",
            Action::MoveRight => "moveRight",
            Action::Call(name) | Action::Unknown(name) => name,
        }
    }

    pub fn callee(&self) -> Option<&str> {
        match self {
            Action::Call(name) => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for Action {
    fn from(tag: &str) -> Self {
        Action::parse(tag)
    }
}

impl From<String> for Action {
    fn from(tag: String) -> Self {
        Action::parse(&tag)
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.tag().to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Handle to the authored instruction's on-screen representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstructionId {
    pub program: u32,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    action: Action,
    id: InstructionId,
}

impl Instruction {
    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn id(&self) -> InstructionId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    name: String,
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn callees(&self) -> impl Iterator<Item = &str> {
        self.instructions
            .iter()
            .filter_map(|instruction| instruction.action.callee())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramError {
    #[error("program name must not be empty")]
    EmptyName,
    #[error("program `{0}` is defined more than once")]
    DuplicateName(String),
}

/// Programs loaded for one run, in authored order. The first program is the
/// entry point; the rest are reachable through calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramSet {
    programs: Vec<Program>,
    by_name: BTreeMap<String, usize>,
}

impl ProgramSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<I, A>(
        &mut self,
        name: impl Into<String>,
        actions: I,
    ) -> Result<&Program, ProgramError>
    where
        I: IntoIterator<Item = A>,
        A: Into<Action>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProgramError::EmptyName);
        }
        if self.by_name.contains_key(&name) {
            return Err(ProgramError::DuplicateName(name));
        }

        let slot = self.programs.len();
        let instructions = actions
            .into_iter()
            .enumerate()
            .map(|(index, action)| Instruction {
                action: action.into(),
                id: InstructionId {
                    program: slot as u32,
                    index: index as u32,
                },
            })
            .collect();
        self.by_name.insert(name.clone(), slot);
        self.programs.push(Program { name, instructions });
        Ok(&self.programs[slot])
    }

    pub fn entry(&self) -> Option<&Program> {
        self.programs.first()
    }

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.by_name.get(name).map(|slot| &self.programs[*slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Program> {
        self.programs.iter()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Call targets that no loaded program answers to.
    pub fn unresolved_calls(&self) -> Vec<(&str, &str)> {
        let mut missing = Vec::new();
        for program in &self.programs {
            for callee in program.callees() {
                if !self.contains(callee) {
                    missing.push((program.name(), callee));
                }
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_parse_into_actions() {
        assert_eq!(Action::parse("moveDown"), Action::MoveDown);
        assert_eq!(Action::parse("moveLeft"), Action::MoveLeft);
        assert_eq!(Action::parse("prog_2"), Action::Call("prog_2".to_string()));
        assert_eq!(Action::parse("jump"), Action::Unknown("jump".to_string()));
        assert_eq!(Action::parse("prog_2").tag(), "prog_2");
    }

    #[test]
    fn actions_serialize_as_authored_tags() {
        let json = serde_json::to_string(&vec![Action::MoveUp, Action::Call("prog_1".into())])
            .unwrap();
        assert_eq!(json, r#"["moveUp","prog_1"]"#);
        let parsed: Vec<Action> = serde_json::from_str(r#"["moveRight","dance"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![Action::MoveRight, Action::Unknown("dance".to_string())]
        );
    }

    #[test]
    fn program_set_assigns_instruction_ids_per_slot() {
        let mut programs = ProgramSet::new();
        programs.add("prog_0", ["moveDown", "prog_1"]).unwrap();
        programs.add("prog_1", ["moveUp"]).unwrap();

        let entry = programs.entry().expect("entry program");
        assert_eq!(entry.name(), "prog_0");
        assert_eq!(
            entry.instructions()[1].id(),
            InstructionId {
                program: 0,
                index: 1
            }
        );
        let callee = programs.get("prog_1").expect("callee");
        assert_eq!(callee.instructions()[0].id().program, 1);
        assert!(programs.unresolved_calls().is_empty());
    }

    #[test]
    fn duplicate_and_blank_names_are_rejected() {
        let mut programs = ProgramSet::new();
        programs.add("prog_0", ["moveDown"]).unwrap();
        assert_eq!(
            programs.add("prog_0", Vec::<Action>::new()).unwrap_err(),
            ProgramError::DuplicateName("prog_0".to_string())
        );
        assert_eq!(
            programs.add("  ", ["moveUp"]).unwrap_err(),
            ProgramError::EmptyName
        );
    }

    #[test]
    fn unresolved_calls_name_caller_and_callee() {
        let mut programs = ProgramSet::new();
        programs.add("prog_0", ["prog_9"]).unwrap();
        assert_eq!(programs.unresolved_calls(), vec![("prog_0", "prog_9")]);
    }
}
