//! Structural verification errors.

use thiserror::Error;

use crate::ids::{BlockId, InstId, ValueId};

/// A structural defect found by [`verify_function`](crate::verify_function).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("in function `{func}`: {kind}")]
pub struct VerifyError {
    pub func: String,
    pub kind: VerifyErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VerifyErrorKind {
    #[error("function has no blocks")]
    NoBlocks,

    #[error("block {block:?} does not end in a terminator")]
    MissingTerminator { block: BlockId },

    #[error("terminator {inst:?} is not the last instruction of {block:?}")]
    TerminatorNotLast { block: BlockId, inst: InstId },

    #[error("phi {inst:?} follows a non-phi instruction in {block:?}")]
    PhiNotAtStart { block: BlockId, inst: InstId },

    #[error("phi {inst:?} in {block:?} has incoming blocks {incoming:?}, predecessors are {preds:?}")]
    PhiPredecessors {
        block: BlockId,
        inst: InstId,
        incoming: Vec<BlockId>,
        preds: Vec<BlockId>,
    },

    #[error("{inst:?} reads {value:?}, which is not a live value")]
    DeadOperand { inst: InstId, value: ValueId },

    #[error("{inst:?} branches to unknown block {target:?}")]
    UnknownBlock { inst: InstId, target: BlockId },

    #[error("{inst:?}: {detail}")]
    OperandType { inst: InstId, detail: String },

    #[error("{inst:?}: call to `{callee}` does not match its signature")]
    CallSignature { inst: InstId, callee: &'static str },
}
