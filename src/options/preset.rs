//! Named instruction bundles and their recursive expansion

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Instruction;
use crate::error::ProcessingError;

/// Preset name → ordered instructions
///
/// Serialized as a map of name → `/`-separated instruction list, e.g.
/// `thumb: "rt:fill/w:150/h:150"`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct PresetTable(BTreeMap<String, Vec<Instruction>>);

impl PresetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, instructions: Vec<Instruction>) {
        self.0.insert(name.into(), instructions);
    }

    pub fn get(&self, name: &str) -> Option<&[Instruction]> {
        self.0.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Expand `names` into a flat instruction list.
    ///
    /// Every name reached is recorded in `used`; a name already there is
    /// skipped, which also breaks reference loops. Nested `preset`
    /// instructions are expanded in place.
    pub fn expand(
        &self,
        names: &[String],
        used: &mut Vec<String>,
        ignore_unknown: bool,
    ) -> Result<Vec<Instruction>, ProcessingError> {
        let mut out = Vec::new();
        self.expand_into(names, used, ignore_unknown, &mut out)?;
        Ok(out)
    }

    fn expand_into(
        &self,
        names: &[String],
        used: &mut Vec<String>,
        ignore_unknown: bool,
        out: &mut Vec<Instruction>,
    ) -> Result<(), ProcessingError> {
        for name in names {
            if used.iter().any(|seen| seen == name) {
                debug!(preset = %name, "preset already applied, skipping");
                continue;
            }

            let Some(instructions) = self.get(name) else {
                if ignore_unknown {
                    debug!(preset = %name, "ignoring unknown preset");
                    continue;
                }
                return Err(ProcessingError::UnknownPreset(name.clone()));
            };

            used.push(name.clone());

            for instruction in instructions {
                if instruction.is_preset() {
                    self.expand_into(&instruction.args, used, ignore_unknown, out)?;
                } else {
                    out.push(instruction.clone());
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<BTreeMap<String, String>> for PresetTable {
    type Error = String;

    fn try_from(raw: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mut table = PresetTable::new();
        for (name, list) in raw {
            if name.is_empty() {
                return Err("preset name cannot be empty".to_string());
            }
            let instructions = Instruction::parse_list(&list)
                .map_err(|e| format!("preset '{}': {}", name, e))?;
            table.insert(name, instructions);
        }
        Ok(table)
    }
}

impl From<PresetTable> for BTreeMap<String, String> {
    fn from(table: PresetTable) -> Self {
        table
            .0
            .into_iter()
            .map(|(name, instructions)| {
                let list = instructions
                    .iter()
                    .map(Instruction::to_string)
                    .collect::<Vec<_>>()
                    .join("/");
                (name, list)
            })
            .collect()
    }
}
