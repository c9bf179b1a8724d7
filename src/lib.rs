//! An interpreter for a two-dimensional, stack-oriented language whose
//! programs are boards of domino tiles. [`Board`] parses the grid,
//! [`Interpreter`] runs it; hosts hook output, input and import resolution
//! or drive execution themselves through [`Interpreter::tick`].

pub mod board;
pub mod navigate;
pub mod stack;
pub mod vm;

pub use board::{Board, Cell, Dir, GridError};
pub use navigate::{NavMode, Rel};
pub use stack::Stack;
pub use vm::{
    Config, ExecutionContext, InputKind, InputReply, Interpreter, RunState, RunStats,
    RuntimeError,
};

/// Everything that can go wrong while loading or running a board, in two
/// tiers: grid construction errors and run-time errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
