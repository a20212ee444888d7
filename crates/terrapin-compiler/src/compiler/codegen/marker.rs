// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Per-function instruction lists and the marker/backpatch protocol.
//!
//! A [`Marker`] names an index in one function's instruction list. Patching
//! a marker *inserts* an instruction at that index, so every other live
//! marker at or after the insertion point is shifted to keep pointing at
//! the instruction it was tracking:
//!
//! - a marker with a larger index always shifts;
//! - a marker with the same index shifts only if it was acquired after the
//!   marker being patched (it names code emitted later, which now sits after
//!   the inserted jump).
//!
//! A baked jump keeps two anchors, one for its own position and one copied
//! from its target marker, and both follow the same rule. Its relative
//! operand is refreshed after every insertion, so patch order never moves a
//! jump off the instruction it was aimed at.

use crate::ast::Span;
use crate::compiler::bytecode::{Instruction, OpCode};
use crate::compiler::scope::FunctionId;
use crate::diagnostic::{Diagnostic, Result};
use tracing::trace;

/// A reserved position in one function's instruction list.
#[must_use = "a marker must be patched or released"]
#[derive(Debug, PartialEq, Eq)]
pub struct Marker {
    id: u32,
    function: FunctionId,
}

impl Marker {
    /// The function context the marker was acquired under.
    pub fn function(&self) -> FunctionId {
        self.function
    }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    id: u32,
    index: usize,
}

impl Anchor {
    // an emitted instruction always moves when something is inserted at its index
    const SITE: u32 = u32::MAX;

    fn shift(&mut self, patched: Anchor) {
        if self.index > patched.index || (self.index == patched.index && self.id > patched.id) {
            self.index += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BakedJump {
    site: Anchor,
    target: Anchor,
}

/// The instruction list of one function under construction.
#[derive(Debug)]
pub struct CodeBuilder {
    function: FunctionId,
    code: Vec<Instruction>,
    live: Vec<Anchor>,
    jumps: Vec<BakedJump>,
    next_marker: u32,
}

impl CodeBuilder {
    /// An empty list for `function`.
    pub fn new(function: FunctionId) -> Self {
        Self {
            function,
            code: Vec::new(),
            live: Vec::new(),
            jumps: Vec::new(),
            next_marker: 0,
        }
    }

    /// The function this list belongs to.
    pub fn function(&self) -> FunctionId {
        self.function
    }

    /// Number of instructions emitted so far.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The instructions emitted so far.
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    /// Number of markers not yet released.
    pub fn live_markers(&self) -> usize {
        self.live.len()
    }

    /// Finishes the list. Fails if any marker is still live.
    pub fn finish(self) -> Result<Vec<Instruction>> {
        if !self.live.is_empty() {
            return Err(Diagnostic::generator(
                format!(
                    "function {} finished with {} live marker(s)",
                    self.function,
                    self.live.len()
                ),
                Span::default(),
            ));
        }
        Ok(self.code)
    }

    /// Appends an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.code.len();
        self.code.push(instruction);
        index
    }

    /// Reserves the current end of the list.
    pub fn acquire(&mut self) -> Marker {
        let id = self.next_marker;
        self.next_marker += 1;
        self.live.push(Anchor {
            id,
            index: self.code.len(),
        });
        Marker {
            id,
            function: self.function,
        }
    }

    /// Current index of a live marker.
    pub fn index_of(&self, marker: &Marker) -> Result<usize> {
        Ok(self.live[self.position(marker)?].index)
    }

    /// Inserts `instruction` at the marker, shifting the other live markers.
    /// Returns the index of the inserted instruction.
    pub fn set_operation(&mut self, marker: &Marker, instruction: Instruction) -> Result<usize> {
        let patched = self.live[self.position(marker)?];
        self.code.insert(patched.index, instruction);
        for other in self.live.iter_mut().filter(|m| m.id != patched.id) {
            other.shift(patched);
        }
        for jump in &mut self.jumps {
            jump.site.shift(patched);
            jump.target.shift(patched);
            self.code[jump.site.index].set_a(jump.target.index as i32 - jump.site.index as i32);
        }
        trace!(
            function = %self.function,
            at = patched.index,
            op = instruction.opcode.name(),
            "patched marker"
        );
        Ok(patched.index)
    }

    /// Inserts a jump at `at` aimed at the instruction `target` tracks.
    pub fn patch_jump(&mut self, at: &Marker, opcode: OpCode, target: &Marker) -> Result<()> {
        debug_assert!(opcode.is_jump());
        let index = self.set_operation(at, Instruction::with_operand(opcode, 0))?;
        self.bake(index, target)
    }

    /// Appends a jump to a position that is already known.
    pub fn emit_jump_to(&mut self, opcode: OpCode, target: &Marker) -> Result<usize> {
        debug_assert!(opcode.is_jump());
        let index = self.emit(Instruction::with_operand(opcode, 0));
        self.bake(index, target)?;
        Ok(index)
    }

    fn bake(&mut self, site: usize, target: &Marker) -> Result<()> {
        let target = self.live[self.position(target)?];
        self.code[site].set_a(target.index as i32 - site as i32);
        self.jumps.push(BakedJump {
            site: Anchor {
                id: Anchor::SITE,
                index: site,
            },
            target,
        });
        Ok(())
    }

    /// Ends a marker's tracked lifetime. Baked jumps are unaffected.
    pub fn release(&mut self, marker: Marker) -> Result<()> {
        let position = self.position(&marker)?;
        self.live.swap_remove(position);
        Ok(())
    }

    fn position(&self, marker: &Marker) -> Result<usize> {
        if marker.function != self.function {
            return Err(Diagnostic::generator(
                format!(
                    "marker of function {} used in function {}",
                    marker.function, self.function
                ),
                Span::default(),
            ));
        }
        self.live
            .iter()
            .position(|m| m.id == marker.id)
            .ok_or_else(|| {
                Diagnostic::generator(
                    format!("marker {} is no longer live", marker.id),
                    Span::default(),
                )
            })
    }
}
