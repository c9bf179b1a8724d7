//! The execution engine: context state, the stepper that moves the
//! instruction pointer across the board, and the interpreter driving the
//! fetch-decode-execute loop.

mod ops;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Write;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::Error;
use crate::board::{Board, Dir};
use crate::navigate::{NavMode, Rel};
use crate::stack::Stack;
use ops::{Effect, Host};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("address {address} is out of bounds")]
    Address { address: i64 },
    #[error("stepped onto the empty cell at address {address}")]
    StepToEmptyCell { address: usize },
    #[error("jump to the current domino at address {address}")]
    JumpToItself { address: usize },
    #[error("call to the current domino at address {address}")]
    CallToItself { address: usize },
    #[error("unknown label {id}")]
    InvalidLabel { id: i32 },
    #[error("label {id} belongs to another context and cannot be jumped to")]
    JumpToExternalLabel { id: i32 },
    #[error("invalid navigation mode index {index}")]
    InvalidNavigationMode { index: i32 },
    #[error("invalid value {value}")]
    InvalidValue { value: i32 },
    #[error("base {value} is out of range (7-16)")]
    InvalidBase { value: i32 },
    #[error("literal parse mode {value} is out of range (0-6)")]
    InvalidLiteralParseMode { value: i32 },
    #[error("the board ended in the middle of a number")]
    UnexpectedEndOfNumber,
    #[error("pop from an empty stack")]
    EmptyStack,
    #[error("push onto a full stack")]
    FullStack,
    #[error("invalid instruction {opcode}")]
    InvalidInstruction { opcode: i32 },
    #[error("import of '{filename}' failed: {reason}")]
    ImportFailed { filename: String, reason: String },
}

/// Counters kept per context and aggregated over the import tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub instructions: u64,
    pub steps: u64,
    pub jumps: u64,
    pub calls: u64,
    pub returns: u64,
    pub imports: u64,
    pub opcodes: BTreeMap<&'static str, u64>,
}

impl RunStats {
    fn record(&mut self, mnemonic: &'static str) {
        self.instructions += 1;
        *self.opcodes.entry(mnemonic).or_insert(0) += 1;
    }

    fn merge(&mut self, other: &RunStats) {
        self.instructions += other.instructions;
        self.steps += other.steps;
        self.jumps += other.jumps;
        self.calls += other.calls;
        self.returns += other.returns;
        self.imports += other.imports;
        for (&name, &count) in &other.opcodes {
            *self.opcodes.entry(name).or_insert(0) += count;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LabelDef {
    address: usize,
    origin: u32,
}

/// One move of the instruction pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    To(usize),
    Finished,
}

/// Mutable interpreter state for one board: the instruction pointer, both
/// stacks, navigation state, labels, radix and parse flags, statistics, and
/// the child contexts spawned by `IMPORT`.
#[derive(Debug)]
pub struct ExecutionContext {
    pub id: u32,
    pub board: Board,
    pub stack: Stack,
    pub base: u32,
    pub stats: RunStats,
    pub children: Vec<ExecutionContext>,
    return_stack: Vec<usize>,
    return_capacity: usize,
    current: Option<usize>,
    last: Option<usize>,
    started: bool,
    pending_jump: Option<usize>,
    pending_call: Option<usize>,
    nav_mode: NavMode,
    nav_overrides: VecDeque<Rel>,
    labels: HashMap<i32, LabelDef>,
    next_label_id: i32,
    literal_mode: u32,
    extended: bool,
}

impl ExecutionContext {
    fn new(id: u32, board: Board, base: u32, stack_capacity: usize) -> ExecutionContext {
        ExecutionContext {
            id,
            board,
            stack: Stack::new(stack_capacity),
            base,
            stats: RunStats::default(),
            children: Vec::new(),
            return_stack: Vec::new(),
            return_capacity: stack_capacity,
            current: None,
            last: None,
            started: false,
            pending_jump: None,
            pending_call: None,
            nav_mode: NavMode::default(),
            nav_overrides: VecDeque::new(),
            labels: HashMap::new(),
            next_label_id: -1,
            literal_mode: 0,
            extended: false,
        }
    }

    /// Statistics summed over this context and all of its descendants.
    pub fn aggregate_stats(&self) -> RunStats {
        let mut total = self.stats.clone();
        for child in &self.children {
            total.merge(&child.aggregate_stats());
        }
        total
    }

    fn bind_label(&mut self, address: usize, origin: u32) -> i32 {
        let id = self.next_label_id;
        self.next_label_id -= 1;
        self.labels.insert(id, LabelDef { address, origin });
        id
    }

    /// The cardinal direction the instruction pointer travels: away from
    /// the connection of the cell it currently sits on.
    fn travel_dir(&self) -> Option<Dir> {
        let cur = self.current?;
        let conn = self.board.connection(cur)?;
        let cell = self.board.cell(cur)?;
        if cell.west == Some(conn) {
            Some(Dir::East)
        } else if cell.east == Some(conn) {
            Some(Dir::West)
        } else if cell.north == Some(conn) {
            Some(Dir::South)
        } else {
            Some(Dir::North)
        }
    }

    /// Forward, left and right neighbours of an exit half, oriented by the
    /// direction the domino was entered from.
    fn relative_neighbors(&self, addr: usize) -> (Option<usize>, Option<usize>, Option<usize>) {
        let cell = match self.board.cell(addr) {
            Some(c) => c,
            None => return (None, None, None),
        };
        match cell.connection {
            Some(conn) if cell.west == Some(conn) => (cell.east, cell.north, cell.south),
            Some(conn) if cell.east == Some(conn) => (cell.west, cell.south, cell.north),
            Some(conn) if cell.north == Some(conn) => (cell.south, cell.east, cell.west),
            Some(conn) if cell.south == Some(conn) => (cell.north, cell.west, cell.east),
            _ => (None, None, None),
        }
    }

    fn check_leap(&self, from: usize, target: usize, is_jump: bool) -> Result<(), RuntimeError> {
        if target >= self.board.len() {
            return Err(RuntimeError::Address { address: target as i64 });
        }
        if target == from || Some(target) == self.board.connection(from) {
            return Err(if is_jump {
                RuntimeError::JumpToItself { address: target }
            } else {
                RuntimeError::CallToItself { address: target }
            });
        }
        if self.board.value(target).is_none() {
            return Err(RuntimeError::StepToEmptyCell { address: target });
        }
        Ok(())
    }

    /// Advance the instruction pointer by one half-cell.
    ///
    /// Priority: first step of the program, pending jump, pending call,
    /// crossing to the exit half of a freshly entered domino, then the
    /// navigation-mode decision. Dead ends return through the call stack
    /// when possible and finish the context otherwise.
    pub(crate) fn step(&mut self, rng: &mut fastrand::Rng) -> Result<Step, RuntimeError> {
        if !self.started {
            self.started = true;
            return match (0..self.board.len()).find(|&a| self.board.value(a).is_some()) {
                Some(addr) => {
                    self.current = Some(addr);
                    self.stats.steps += 1;
                    Ok(Step::To(addr))
                }
                None => Ok(Step::Finished),
            };
        }

        let cur = match self.current {
            Some(c) => c,
            None => {
                // a finished context re-entered through one of its labels
                if let Some(target) = self.pending_jump.take() {
                    if target >= self.board.len() {
                        return Err(RuntimeError::Address { address: target as i64 });
                    }
                    if self.board.value(target).is_none() {
                        return Err(RuntimeError::StepToEmptyCell { address: target });
                    }
                    self.current = Some(target);
                    self.last = None;
                    self.stats.jumps += 1;
                    self.stats.steps += 1;
                    return Ok(Step::To(target));
                }
                return Ok(Step::Finished);
            }
        };

        if let Some(target) = self.pending_jump.take() {
            self.check_leap(cur, target, true)?;
            self.last = Some(cur);
            self.current = Some(target);
            self.stats.jumps += 1;
            self.stats.steps += 1;
            return Ok(Step::To(target));
        }

        if let Some(target) = self.pending_call.take() {
            self.check_leap(cur, target, false)?;
            if self.return_stack.len() >= self.return_capacity {
                return Err(RuntimeError::FullStack);
            }
            self.return_stack.push(cur);
            self.last = Some(cur);
            self.current = Some(target);
            self.stats.calls += 1;
            self.stats.steps += 1;
            return Ok(Step::To(target));
        }

        let conn = match self.board.connection(cur) {
            Some(c) => c,
            None => return Err(RuntimeError::StepToEmptyCell { address: cur }),
        };
        if self.last != Some(conn) {
            // entry half of a fresh domino: cross unconditionally
            self.last = Some(cur);
            self.current = Some(conn);
            self.stats.steps += 1;
            return Ok(Step::To(conn));
        }

        let mut cur = cur;
        loop {
            let (forward, left, right) = self.relative_neighbors(cur);
            let order = match self.nav_overrides.pop_front() {
                Some(dir) => vec![dir],
                None => self.nav_mode.consult(rng),
            };
            let chosen = order
                .into_iter()
                .filter_map(|dir| match dir {
                    Rel::Forward => forward,
                    Rel::Left => left,
                    Rel::Right => right,
                })
                .find(|&a| self.board.value(a).is_some());
            match chosen {
                Some(next) => {
                    self.last = Some(cur);
                    self.current = Some(next);
                    self.stats.steps += 1;
                    return Ok(Step::To(next));
                }
                None => match self.return_stack.pop() {
                    Some(site) => {
                        // resume at the call site, treated as an exit half
                        self.stats.returns += 1;
                        self.stats.steps += 1;
                        self.last = self.board.connection(site);
                        self.current = Some(site);
                        cur = site;
                    }
                    None => {
                        self.current = None;
                        return Ok(Step::Finished);
                    }
                },
            }
        }
    }
}

fn half_value(ctx: &ExecutionContext, addr: usize) -> i32 {
    let v = ctx.board.value(addr).unwrap_or(0) as i32;
    v.min(ctx.base as i32 - 1)
}

/// Fetch the next opcode, or `None` when the context has run out of road.
fn fetch_opcode(
    ctx: &mut ExecutionContext,
    rng: &mut fastrand::Rng,
) -> Result<Option<i32>, RuntimeError> {
    let h1 = match ctx.step(rng)? {
        Step::To(a) => a,
        Step::Finished => return Ok(None),
    };
    let h2 = match ctx.step(rng)? {
        Step::To(a) => a,
        Step::Finished => return Err(RuntimeError::InvalidInstruction { opcode: -1 }),
    };
    let base = ctx.base as i32;
    let mut opcode = half_value(ctx, h1) * base + half_value(ctx, h2);
    if ctx.extended {
        // two dominoes per opcode while extended addressing is on
        let h3 = match ctx.step(rng)? {
            Step::To(a) => a,
            Step::Finished => return Err(RuntimeError::InvalidInstruction { opcode }),
        };
        let h4 = match ctx.step(rng)? {
            Step::To(a) => a,
            Step::Finished => return Err(RuntimeError::InvalidInstruction { opcode }),
        };
        opcode = opcode * base * base + half_value(ctx, h3) * base + half_value(ctx, h4);
    }
    Ok(Some(opcode))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Num,
    Str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputReply {
    Num(i32),
    Str(String),
}

/// What the poll loop is doing after one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Yielded,
    Sleeping(u32),
    AwaitingInput(InputKind),
    Finished,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Initial radix for values and opcodes, 7-16.
    pub base: u32,
    pub stack_capacity: usize,
    /// Delay inserted by `run()` after every instruction, in milliseconds.
    pub step_delay_ms: u64,
    /// Report `RunState::Yielded` every N instructions; 0 disables.
    pub yield_interval: u64,
    pub seed: Option<u64>,
    /// Trace every executed instruction to stderr.
    pub trace: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            base: 7,
            stack_capacity: 512,
            step_delay_ms: 0,
            yield_interval: 0,
            seed: None,
            trace: false,
        }
    }
}

type OutputHook = Box<dyn FnMut(u32, &str)>;
type InputHook = Box<dyn FnMut(u32, InputKind) -> InputReply>;
type ImportHook = Box<dyn FnMut(u32, &str) -> Option<String>>;

/// Drives the fetch-decode-execute loop over a tree of contexts.
///
/// `tick()` executes one instruction and reports suspension explicitly;
/// `run()` is the built-in driver that services input, import and delay
/// requests through the registered hooks.
pub struct Interpreter {
    root: ExecutionContext,
    path: Vec<usize>,
    rng: fastrand::Rng,
    start: Instant,
    config: Config,
    keys: HashSet<String>,
    pending_input: Option<InputKind>,
    finished: bool,
    executed: u64,
    next_ctx_id: u32,
    on_output: OutputHook,
    on_input: Option<InputHook>,
    on_import: Option<ImportHook>,
}

fn ctx_at<'a>(root: &'a mut ExecutionContext, path: &[usize]) -> &'a mut ExecutionContext {
    let mut ctx = root;
    for &idx in path {
        ctx = &mut ctx.children[idx];
    }
    ctx
}

fn ctx_ref<'a>(root: &'a ExecutionContext, path: &[usize]) -> &'a ExecutionContext {
    let mut ctx = root;
    for &idx in path {
        ctx = &ctx.children[idx];
    }
    ctx
}

impl Interpreter {
    pub fn new(source: &str, config: Config) -> Result<Interpreter, Error> {
        if !(7..=16).contains(&config.base) {
            return Err(RuntimeError::InvalidBase { value: config.base as i32 }.into());
        }
        let board = Board::parse(source, config.base)?;
        let root = ExecutionContext::new(0, board, config.base, config.stack_capacity);
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Ok(Interpreter {
            root,
            path: Vec::new(),
            rng,
            start: Instant::now(),
            config,
            keys: HashSet::new(),
            pending_input: None,
            finished: false,
            executed: 0,
            next_ctx_id: 1,
            on_output: Box::new(|_, msg| {
                print!("{msg}");
                let _ = std::io::stdout().flush();
            }),
            on_input: None,
            on_import: None,
        })
    }

    pub fn on_output(&mut self, hook: impl FnMut(u32, &str) + 'static) {
        self.on_output = Box::new(hook);
    }

    pub fn on_input(&mut self, hook: impl FnMut(u32, InputKind) -> InputReply + 'static) {
        self.on_input = Some(Box::new(hook));
    }

    pub fn on_import(&mut self, hook: impl FnMut(u32, &str) -> Option<String> + 'static) {
        self.on_import = Some(Box::new(hook));
    }

    pub fn press_key(&mut self, key: &str) {
        self.keys.insert(key.to_string());
    }

    pub fn release_key(&mut self, key: &str) {
        self.keys.remove(key);
    }

    pub fn clear_keys(&mut self) {
        self.keys.clear();
    }

    pub fn root(&self) -> &ExecutionContext {
        &self.root
    }

    pub fn stats(&self) -> RunStats {
        self.root.aggregate_stats()
    }

    /// Execute one instruction in the active context.
    pub fn tick(&mut self) -> Result<RunState, RuntimeError> {
        if self.finished {
            return Ok(RunState::Finished);
        }
        if let Some(kind) = self.pending_input {
            return Ok(RunState::AwaitingInput(kind));
        }

        let elapsed_ms = self.start.elapsed().as_millis() as i64 as i32;
        let ctx = ctx_at(&mut self.root, &self.path);
        let opcode = match fetch_opcode(ctx, &mut self.rng)? {
            Some(op) => op,
            None => {
                if self.path.is_empty() {
                    self.finished = true;
                    return Ok(RunState::Finished);
                }
                self.pop_context();
                return Ok(RunState::Running);
            }
        };

        if self.config.trace {
            let name = ops::mnemonic(opcode);
            eprintln!("trace: ctx {} op {:>3} {}", ctx.id, opcode, name);
        }

        let effect = {
            let mut host = Host {
                rng: &mut self.rng,
                keys: &mut self.keys,
                output: &mut self.on_output,
                elapsed_ms,
            };
            ops::dispatch(ctx, &mut host, opcode)?
        };

        match effect {
            Effect::None => {}
            Effect::AwaitInput(kind) => {
                self.pending_input = Some(kind);
                self.executed += 1;
                return Ok(RunState::AwaitingInput(kind));
            }
            Effect::Sleep(ms) => {
                self.executed += 1;
                return Ok(RunState::Sleeping(ms));
            }
            Effect::MirrorLabel { address } => self.mirror_label(address),
            Effect::Import(filename) => self.import(&filename)?,
            Effect::EnterChild { child, address } => self.enter_child(child, address),
        }

        self.executed += 1;
        if self.config.yield_interval > 0 && self.executed % self.config.yield_interval == 0 {
            return Ok(RunState::Yielded);
        }
        Ok(RunState::Running)
    }

    /// Drive the program to completion, servicing suspensions with the
    /// registered hooks (stdin when no input hook is set).
    pub fn run(&mut self) -> Result<&ExecutionContext, Error> {
        loop {
            match self.tick()? {
                RunState::Finished => return Ok(&self.root),
                RunState::AwaitingInput(kind) => {
                    let id = ctx_ref(&self.root, &self.path).id;
                    let reply = match self.on_input.as_mut() {
                        Some(hook) => hook(id, kind),
                        None => read_stdin(kind)?,
                    };
                    match reply {
                        InputReply::Num(v) => self.provide_num(v)?,
                        InputReply::Str(s) => self.provide_str(&s)?,
                    }
                }
                RunState::Sleeping(ms) => std::thread::sleep(Duration::from_millis(ms as u64)),
                RunState::Running | RunState::Yielded => {
                    if self.config.step_delay_ms > 0 {
                        std::thread::sleep(Duration::from_millis(self.config.step_delay_ms));
                    }
                }
            }
        }
    }

    /// Answer a pending `NUMIN`.
    pub fn provide_num(&mut self, value: i32) -> Result<(), RuntimeError> {
        match self.pending_input.take() {
            Some(InputKind::Num) => {
                ctx_at(&mut self.root, &self.path).stack.push(value)?;
                Ok(())
            }
            other => {
                self.pending_input = other;
                Err(RuntimeError::InvalidValue { value })
            }
        }
    }

    /// Answer a pending `STRIN`: the string lands zero-terminated with its
    /// first character on top, like `STR`.
    pub fn provide_str(&mut self, value: &str) -> Result<(), RuntimeError> {
        match self.pending_input.take() {
            Some(InputKind::Str) => {
                let ctx = ctx_at(&mut self.root, &self.path);
                let chars: Vec<char> = value.chars().collect();
                if chars.len() + 1 > ctx.stack.free() {
                    return Err(RuntimeError::FullStack);
                }
                ctx.stack.push(0)?;
                for &c in chars.iter().rev() {
                    ctx.stack.push(c as i32)?;
                }
                Ok(())
            }
            other => {
                self.pending_input = other;
                Err(RuntimeError::InvalidValue { value: 0 })
            }
        }
    }

    fn mirror_label(&mut self, address: usize) {
        if self.path.is_empty() {
            return;
        }
        let origin = ctx_at(&mut self.root, &self.path).id;
        let parent = ctx_at(&mut self.root, &self.path[..self.path.len() - 1]);
        parent.bind_label(address, origin);
    }

    fn import(&mut self, filename: &str) -> Result<(), RuntimeError> {
        let ctx_id = ctx_at(&mut self.root, &self.path).id;
        let source = self
            .on_import
            .as_mut()
            .and_then(|hook| hook(ctx_id, filename))
            .ok_or_else(|| RuntimeError::ImportFailed {
                filename: filename.to_string(),
                reason: "no import hook resolved the file".to_string(),
            })?;
        let base = ctx_at(&mut self.root, &self.path).base;
        let board = Board::parse(&source, base).map_err(|e| RuntimeError::ImportFailed {
            filename: filename.to_string(),
            reason: e.to_string(),
        })?;
        let id = self.next_ctx_id;
        self.next_ctx_id += 1;
        let mut child = ExecutionContext::new(id, board, base, self.config.stack_capacity);

        let parent = ctx_at(&mut self.root, &self.path);
        parent.stats.imports += 1;
        // the data stack moves into the child for the duration of its run
        std::mem::swap(&mut parent.stack, &mut child.stack);
        parent.children.push(child);
        self.path.push(parent.children.len() - 1);
        Ok(())
    }

    fn enter_child(&mut self, idx: usize, address: usize) {
        let parent = ctx_at(&mut self.root, &self.path);
        let mut moved = std::mem::take(&mut parent.stack);
        std::mem::swap(&mut parent.children[idx].stack, &mut moved);
        parent.stack = moved;
        parent.children[idx].pending_jump = Some(address);
        self.path.push(idx);
    }

    fn pop_context(&mut self) {
        if let Some(idx) = self.path.pop() {
            let parent = ctx_at(&mut self.root, &self.path);
            let mut moved = std::mem::take(&mut parent.children[idx].stack);
            std::mem::swap(&mut parent.stack, &mut moved);
            parent.children[idx].stack = moved;
        }
    }
}

fn read_stdin(kind: InputKind) -> Result<InputReply, RuntimeError> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|_| RuntimeError::InvalidValue { value: 0 })?;
    let line = line.trim_end_matches(['\n', '\r']);
    match kind {
        InputKind::Num => {
            let value = line
                .trim()
                .parse::<i32>()
                .map_err(|_| RuntimeError::InvalidValue { value: 0 })?;
            Ok(InputReply::Num(value))
        }
        InputKind::Str => Ok(InputReply::Str(line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(source: &str) -> ExecutionContext {
        let board = Board::parse(source, 7).unwrap();
        ExecutionContext::new(0, board, 7, 64)
    }

    fn rng() -> fastrand::Rng {
        fastrand::Rng::with_seed(1)
    }

    #[test]
    fn first_step_finds_the_first_occupied_cell() {
        let mut ctx = context(". . 1-2 . .");
        assert_eq!(ctx.step(&mut rng()).unwrap(), Step::To(2));
    }

    #[test]
    fn empty_board_finishes_immediately() {
        let mut ctx = context(". . . .");
        assert_eq!(ctx.step(&mut rng()).unwrap(), Step::Finished);
    }

    #[test]
    fn entry_half_crosses_to_the_partner() {
        let mut ctx = context("1-2 3-4");
        let mut r = rng();
        assert_eq!(ctx.step(&mut r).unwrap(), Step::To(0));
        assert_eq!(ctx.step(&mut r).unwrap(), Step::To(1));
        // exit half: forward is the entry half of the next domino
        assert_eq!(ctx.step(&mut r).unwrap(), Step::To(2));
        assert_eq!(ctx.step(&mut r).unwrap(), Step::To(3));
        assert_eq!(ctx.step(&mut r).unwrap(), Step::Finished);
    }

    #[test]
    fn dead_end_with_empty_return_stack_finishes() {
        let mut ctx = context("1-2 . 3-4");
        let mut r = rng();
        ctx.step(&mut r).unwrap();
        ctx.step(&mut r).unwrap();
        assert_eq!(ctx.step(&mut r).unwrap(), Step::Finished);
    }

    #[test]
    fn pending_jump_moves_and_counts() {
        let mut ctx = context("1-2 3-4 5-6");
        let mut r = rng();
        ctx.step(&mut r).unwrap();
        ctx.step(&mut r).unwrap();
        ctx.pending_jump = Some(4);
        assert_eq!(ctx.step(&mut r).unwrap(), Step::To(4));
        assert_eq!(ctx.stats.jumps, 1);
    }

    #[test]
    fn jump_to_own_domino_errors() {
        let mut ctx = context("1-2 3-4");
        let mut r = rng();
        ctx.step(&mut r).unwrap();
        ctx.step(&mut r).unwrap();
        ctx.pending_jump = Some(0);
        assert!(matches!(ctx.step(&mut r), Err(RuntimeError::JumpToItself { address: 0 })));
    }

    #[test]
    fn jump_to_empty_cell_errors() {
        let mut ctx = context("1-2 . 3-4");
        let mut r = rng();
        ctx.step(&mut r).unwrap();
        ctx.step(&mut r).unwrap();
        ctx.pending_jump = Some(2);
        assert!(matches!(ctx.step(&mut r), Err(RuntimeError::StepToEmptyCell { address: 2 })));
    }

    #[test]
    fn call_pushes_a_return_address() {
        let mut ctx = context("1-2 3-4 5-6");
        let mut r = rng();
        ctx.step(&mut r).unwrap();
        ctx.step(&mut r).unwrap();
        ctx.pending_call = Some(4);
        assert_eq!(ctx.step(&mut r).unwrap(), Step::To(4));
        assert_eq!(ctx.return_stack, vec![1]);
        assert_eq!(ctx.stats.calls, 1);
    }

    #[test]
    fn dead_end_returns_through_the_call_stack() {
        let mut ctx = context("1-2 . 3-4");
        let mut r = rng();
        ctx.step(&mut r).unwrap();
        ctx.step(&mut r).unwrap();
        ctx.pending_call = Some(4);
        ctx.step(&mut r).unwrap();
        ctx.step(&mut r).unwrap(); // cross to 3, the exit half when entered at 4
        // the called domino dead-ends, so the next step returns to the call
        // site and navigates on from there; address 2 is empty, so the
        // context finishes
        assert_eq!(ctx.step(&mut r).unwrap(), Step::Finished);
        assert_eq!(ctx.stats.returns, 1);
    }

    #[test]
    fn branch_override_wins_one_decision() {
        let mut ctx = context("1-2 3-4");
        let mut r = rng();
        ctx.step(&mut r).unwrap();
        ctx.step(&mut r).unwrap();
        ctx.nav_overrides.push_back(Rel::Left);
        // left of the exit half is off the board, so the context finishes
        // even though forward is occupied
        assert_eq!(ctx.step(&mut r).unwrap(), Step::Finished);
    }

    #[test]
    fn stats_merge_aggregates_the_tree() {
        let mut parent = context("1-2");
        let mut child = context("3-4");
        parent.stats.record("NUM");
        child.stats.record("NUM");
        child.stats.record("ADD");
        parent.children.push(child);
        let total = parent.aggregate_stats();
        assert_eq!(total.instructions, 3);
        assert_eq!(total.opcodes["NUM"], 2);
    }
}
