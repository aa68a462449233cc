#![forbid(unsafe_code)]

use std::collections::HashMap;

use crate::ir::{FileId, Position};
use crate::model::ProgramModel;

/// Comment text by (file, line). Built once per run.
#[derive(Debug, Default)]
pub struct CommentIndex {
    by_line: HashMap<(FileId, u32), String>,
}

impl CommentIndex {
    pub fn new(model: &ProgramModel) -> Self {
        let mut by_line: HashMap<(FileId, u32), String> = HashMap::new();
        for c in model.comments() {
            by_line
                .entry(c.pos.line_key())
                .and_modify(|text| {
                    text.push('\n');
                    text.push_str(&c.text);
                })
                .or_insert_with(|| c.text.clone());
        }
        Self { by_line }
    }

    /// Raw comment text anchored on the line of `pos`; column is ignored.
    pub fn comments_at(&self, pos: Position) -> &str {
        self.by_line
            .get(&pos.line_key())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.by_line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_line.is_empty()
    }
}
