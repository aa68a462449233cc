#![forbid(unsafe_code)]

//! Lock intervals inside a single function body.
//!
//! Positions are compared by line. A usage on the same line as the acquire
//! or the release is outside the interval.

use mutex_check_ir::{Instruction, Position};

use crate::guard::Location;
use crate::variant::{GuardOp, GuardOpKind, Variant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockInterval {
    Bounded { start: u32, end: u32 },
    /// Held until the function returns.
    Open { start: u32 },
}

impl LockInterval {
    pub fn covers(&self, line: u32) -> bool {
        match *self {
            LockInterval::Bounded { start, end } => line > start && line < end,
            LockInterval::Open { start } => line > start,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockIntervals {
    intervals: Vec<LockInterval>,
}

impl LockIntervals {
    /// Pair acquires with releases.
    ///
    /// With a deferred release anywhere in the body every acquire is held to
    /// the end of the function. Otherwise each acquire pairs with the nearest
    /// following release; reaching the next acquire first leaves it open.
    pub fn from_ops(ops: &[GuardOp]) -> Self {
        let deferred = ops.iter().any(|op| op.kind == GuardOpKind::DeferredRelease);
        let mut intervals = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            if op.kind != GuardOpKind::Acquire {
                continue;
            }
            let start = op.pos.line;
            if deferred {
                intervals.push(LockInterval::Open { start });
                continue;
            }
            let release = ops[i + 1..]
                .iter()
                .take_while(|o| o.kind != GuardOpKind::Acquire)
                .find(|o| o.kind == GuardOpKind::Release);
            intervals.push(match release {
                Some(r) => LockInterval::Bounded {
                    start,
                    end: r.pos.line,
                },
                None => LockInterval::Open { start },
            });
        }
        Self { intervals }
    }

    pub fn covers(&self, pos: Position) -> bool {
        self.intervals.iter().any(|iv| iv.covers(pos.line))
    }

    pub fn as_slice(&self) -> &[LockInterval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Positions of usages of `location` in `body` that no local lock interval
/// of `guard` covers, in discovery order.
pub fn unprotected_usages<V: Variant + ?Sized>(
    variant: &V,
    body: &[Instruction],
    guard: Location,
    location: Location,
) -> Vec<Position> {
    let intervals = LockIntervals::from_ops(&variant.guard_ops(body, guard));
    body.iter()
        .filter(|i| i.pos.is_valid() && variant.is_usage(i, location))
        .map(|i| i.pos)
        .filter(|pos| !intervals.covers(*pos))
        .collect()
}
