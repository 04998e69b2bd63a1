//! Conditional compilation: `#RANDOM`, `#SETRANDOM`, `#IF`, `#ELSEIF`, `#ELSE` and `#ENDIF`.
//!
//! The evaluator keeps a stack of frames. The root frame always executes and is never popped. Each `#IF` pushes a
//! frame that executes only when its parent executes and its value equals the random value of the parent. Lines
//! other than these directives are compiled only while the innermost frame executes.
//!
//! ```
//! use bms_timeline::bms::{random::{ConditionalEvaluator, ControlDirective}, rng::RngMock};
//!
//! let mut eval = ConditionalEvaluator::new(RngMock([2]));
//! eval.apply(ControlDirective::Random(2)).unwrap();
//! eval.apply(ControlDirective::If(1)).unwrap();
//! assert!(!eval.is_executing());
//! eval.apply(ControlDirective::ElseIf(2)).unwrap();
//! assert!(eval.is_executing());
//! eval.apply(ControlDirective::EndIf).unwrap();
//! assert!(eval.is_executing());
//! ```

use thiserror::Error;

use super::rng::Rng;
use crate::timeline::BranchTag;

/// Violations of the block structure. The offending directive is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum ControlFlowRule {
    /// An `#ENDIF` without an open `#IF`.
    #[error("unmatched end if")]
    UnmatchedEndIf,
    /// An `#ELSEIF` without an open `#IF`.
    #[error("unmatched else if")]
    UnmatchedElseIf,
    /// An `#ELSE` without an open `#IF`.
    #[error("unmatched else")]
    UnmatchedElse,
}

/// A conditional directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlDirective {
    /// `#RANDOM n`: draws a value in `1..=n`.
    Random(u64),
    /// `#SETRANDOM n`: sets the value to `n`.
    SetRandom(u64),
    /// `#IF n`.
    If(u64),
    /// `#ELSEIF n`.
    ElseIf(u64),
    /// `#ELSE`.
    Else,
    /// `#ENDIF`.
    EndIf,
    /// `#ENDRANDOM`. Accepted and ignored.
    EndRandom,
}

/// The result of reading a directive line as a conditional directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlParse {
    /// Not a conditional directive.
    NotControl,
    /// A conditional directive whose argument is not a number.
    Malformed,
    /// A well-formed directive.
    Directive(ControlDirective),
}

impl ControlDirective {
    /// Reads `command` (without `#`) and `param` as a conditional directive.
    #[must_use]
    pub fn parse(command: &str, param: &str) -> ControlParse {
        let number = || {
            param
                .split_whitespace()
                .next()
                .and_then(|token| token.parse::<u64>().ok())
        };
        let with_number = |make: fn(u64) -> Self| match number() {
            Some(n) => ControlParse::Directive(make(n)),
            None => ControlParse::Malformed,
        };
        let upper = command.to_ascii_uppercase();
        match upper.as_str() {
            "RANDOM" | "RONDAM" => with_number(Self::Random),
            "SETRANDOM" => with_number(Self::SetRandom),
            "IF" => with_number(Self::If),
            "ELSEIF" => with_number(Self::ElseIf),
            "ELSE" => ControlParse::Directive(Self::Else),
            "ENDIF" => ControlParse::Directive(Self::EndIf),
            "END" if param.trim().eq_ignore_ascii_case("IF") => {
                ControlParse::Directive(Self::EndIf)
            }
            "ENDRANDOM" => ControlParse::Directive(Self::EndRandom),
            _ => ControlParse::NotControl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Frame {
    executing: bool,
    matched_branch: bool,
    random_value: u64,
    /// The `#RANDOM` block `random_value` came from, 0 when none.
    group: u32,
}

impl Frame {
    const ROOT: Self = Self {
        executing: true,
        matched_branch: false,
        random_value: 0,
        group: 0,
    };
}

/// Tracks nested conditional blocks while a source is compiled.
#[derive(Debug, Clone)]
pub struct ConditionalEvaluator<R> {
    stack: Vec<Frame>,
    rng: R,
    groups: u32,
}

impl<R: Rng> ConditionalEvaluator<R> {
    /// Creates an evaluator at the root frame.
    pub fn new(rng: R) -> Self {
        Self {
            stack: vec![Frame::ROOT],
            rng,
            groups: 0,
        }
    }

    fn current(&self) -> Frame {
        self.stack.last().copied().unwrap_or(Frame::ROOT)
    }

    fn parent(&self) -> Option<Frame> {
        let len = self.stack.len();
        (len >= 2).then(|| self.stack[len - 2])
    }

    /// Whether lines at the current position are compiled.
    #[must_use]
    pub fn is_executing(&self) -> bool {
        self.current().executing
    }

    /// The nesting depth; `0` at the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// The branch lines at the current position belong to, or `None` outside any `#IF`.
    #[must_use]
    pub fn branch(&self) -> Option<BranchTag> {
        let parent = self.parent()?;
        Some(BranchTag {
            group: parent.group,
            index: parent.random_value,
        })
    }

    fn set_random(&mut self, value: u64) {
        self.groups += 1;
        let group = self.groups;
        if let Some(frame) = self.stack.last_mut() {
            frame.random_value = value;
            frame.group = group;
            frame.matched_branch = false;
        }
    }

    /// Applies a directive.
    ///
    /// # Errors
    ///
    /// Returns the violated rule when a directive does not fit the block structure. The evaluator stays unchanged
    /// in that case.
    pub fn apply(&mut self, directive: ControlDirective) -> Result<(), ControlFlowRule> {
        match directive {
            ControlDirective::Random(max) => {
                if self.is_executing() {
                    let value = if max == 0 {
                        0
                    } else {
                        self.rng.generate(1..=max).clamp(1, max)
                    };
                    self.set_random(value);
                }
            }
            ControlDirective::SetRandom(value) => {
                if self.is_executing() {
                    self.set_random(value);
                }
            }
            ControlDirective::If(n) => {
                let parent = self.current();
                let executing = parent.executing && n == parent.random_value;
                if let Some(frame) = self.stack.last_mut() {
                    frame.matched_branch = executing;
                }
                self.stack.push(Frame {
                    executing,
                    matched_branch: false,
                    random_value: parent.random_value,
                    group: parent.group,
                });
            }
            ControlDirective::ElseIf(n) => {
                let parent = self.parent().ok_or(ControlFlowRule::UnmatchedElseIf)?;
                let executing =
                    parent.executing && !parent.matched_branch && n == parent.random_value;
                self.enter_branch(executing);
            }
            ControlDirective::Else => {
                let parent = self.parent().ok_or(ControlFlowRule::UnmatchedElse)?;
                self.enter_branch(parent.executing && !parent.matched_branch);
            }
            ControlDirective::EndIf => {
                if self.stack.len() <= 1 {
                    return Err(ControlFlowRule::UnmatchedEndIf);
                }
                self.stack.pop();
            }
            ControlDirective::EndRandom => {}
        }
        Ok(())
    }

    /// Switches the innermost `#IF` frame to a sibling branch.
    fn enter_branch(&mut self, executing: bool) {
        let len = self.stack.len();
        if executing {
            self.stack[len - 2].matched_branch = true;
        }
        let parent = self.stack[len - 2];
        self.stack[len - 1] = Frame {
            executing,
            matched_branch: false,
            random_value: parent.random_value,
            group: parent.group,
        };
    }
}
