//! Prelude module for the crate.
//!
//! You can use `use bms_timeline::prelude::*;` to import the common types at once.

#[cfg(feature = "diagnostics")]
pub use crate::diagnostics::{SimpleSource, ToAriadne, emit_compile_warnings};

#[cfg(feature = "bmson")]
pub use crate::bmson::{Bmson, BmsonCompileOutput, BmsonWarning, compile_bmson, parse_bmson};
pub use crate::{
    DEFAULT_TEMPO,
    bms::{
        BmsCompileOutput, BmsCompiler, BmsWarning, BmsWarningWithRange, CompilePasses,
        compile_bms,
        rng::{Rng, RngMock},
    },
    cache::{CacheError, read_timeline, write_timeline},
    chart_process::{
        CancelFlag, ChartHandle, ChartSource, CompileError, CompileOptions, CompileOutput,
        CompileWarning, compile,
        dispatcher::{Direction, EventDispatcher},
    },
    command::{
        INVALID_ID, ObjId,
        channel::{ChannelKind, ChannelMap, INVALID_CHANNEL, PlayerSide},
        decode_base36, encode_base36,
        mixin::{SourceRangeMixin, SourceRangeMixinExt},
    },
    judge::{HitResult, ScoreCalculator, ScoreConfig, ScoreConfigError, ScoreTier},
    time::{MeasureBeat, ObjTime, TimingPoint, TimingResolver},
    timeline::{
        AudioSlice, BranchTag, ChartHeader, EventKind, ResourceEntry, ResourceKind, ResourceTable,
        Timeline, TimelineEvent,
    },
};
