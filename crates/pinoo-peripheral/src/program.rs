// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Program graphs for upload to the board
//!
//! A program is a set of instruction blocks keyed by id, linked through
//! `next` (sequence) and `parent` (enclosing block). Top-level blocks start
//! scripts. The board receives the whole graph plus the id of the block to
//! start executing from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SessionError};

/// Where an uploaded program goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadMode {
    /// Run once while connected
    Dev,
    /// Persist on the board and run standalone
    Run,
}

impl UploadMode {
    pub fn command_name(&self) -> &'static str {
        match self {
            UploadMode::Dev => "upload_dev_mode",
            UploadMode::Run => "upload_run_mode",
        }
    }
}

impl FromStr for UploadMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "upload_dev_mode" => Ok(UploadMode::Dev),
            "run" | "upload_run_mode" => Ok(UploadMode::Run),
            other => Err(SessionError::InvalidArgument(format!(
                "unknown upload mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Dev => write!(f, "dev"),
            UploadMode::Run => write!(f, "run"),
        }
    }
}

/// One instruction block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramBlock {
    #[serde(default)]
    pub id: String,
    pub opcode: String,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub shadow: bool,
    #[serde(default)]
    pub top_level: bool,
}

impl ProgramBlock {
    pub fn new(id: impl Into<String>, opcode: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            opcode: opcode.into(),
            next: None,
            parent: None,
            inputs: Map::new(),
            fields: Map::new(),
            shadow: false,
            top_level: false,
        }
    }

    pub fn top_level(mut self) -> Self {
        self.top_level = true;
        self
    }

    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }
}

/// Blocks of one program, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramGraph {
    blocks: BTreeMap<String, ProgramBlock>,
}

/// Upload body as the board expects it
#[derive(Debug, Serialize)]
struct UploadData<'a> {
    blocks: &'a BTreeMap<String, ProgramBlock>,
    #[serde(rename = "startingBlock")]
    starting_block: &'a str,
}

impl ProgramGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of blocks keyed by id
    ///
    /// Blocks without an explicit `id` take their key.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut blocks: BTreeMap<String, ProgramBlock> = serde_json::from_str(json)?;
        for (key, block) in blocks.iter_mut() {
            if block.id.is_empty() {
                block.id = key.clone();
            }
        }
        Ok(Self { blocks })
    }

    /// Add a block, replacing any block with the same id
    pub fn insert(&mut self, block: ProgramBlock) -> Option<ProgramBlock> {
        self.blocks.insert(block.id.clone(), block)
    }

    pub fn get(&self, id: &str) -> Option<&ProgramBlock> {
        self.blocks.get(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ProgramBlock> {
        self.blocks.values()
    }

    /// Ids of the top-level blocks, in id order
    pub fn scripts(&self) -> Vec<&str> {
        self.blocks
            .values()
            .filter(|b| b.top_level)
            .map(|b| b.id.as_str())
            .collect()
    }

    /// Default block to start from: the first script
    pub fn entry_point(&self) -> Option<&str> {
        self.scripts().into_iter().next()
    }

    /// Check that `entry` exists and no `next`/`parent` link dangles
    pub fn validate(&self, entry: &str) -> Result<()> {
        if !self.blocks.contains_key(entry) {
            return Err(SessionError::InvalidProgram(format!(
                "entry block '{}' not in program",
                entry
            )));
        }
        for block in self.blocks.values() {
            for (link, target) in [("next", &block.next), ("parent", &block.parent)] {
                if let Some(target) = target {
                    if !self.blocks.contains_key(target) {
                        return Err(SessionError::InvalidProgram(format!(
                            "block '{}' has dangling {} reference '{}'",
                            block.id, link, target
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialize the upload body (`blocks` plus `startingBlock`)
    pub(crate) fn upload_data(&self, entry: &str) -> Result<Value> {
        self.validate(entry)?;
        Ok(serde_json::to_value(UploadData {
            blocks: &self.blocks,
            starting_block: entry,
        })?)
    }
}
