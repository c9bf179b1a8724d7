//! The board: a rectangular grid of half-cells joined into dominoes.
//!
//! Source text interleaves values and connectors: even rows/columns hold
//! value glyphs (`0`-`9`, `a`-`f` up to the active radix, `.` for empty),
//! odd columns hold horizontal connectors and odd rows vertical ones.
//! Lines outside the contiguous block of lines that start with a value
//! glyph are commentary and ignored.

const HORIZONTAL: [char; 8] = ['-', '\u{2010}', '\u{2212}', '–', '—', '─', '━', '═'];
const VERTICAL: [char; 4] = ['|', '│', '┃', '║'];

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("invalid grid: {reason}")]
    InvalidGrid { reason: String },
    #[error("unexpected character '{ch}' at line {line}, column {col}")]
    Syntax { line: usize, col: usize, ch: char },
    #[error("character '{ch}' at line {line}, column {col} is not a digit in base {base}")]
    ForbiddenCharacter { line: usize, col: usize, ch: char, base: u32 },
    #[error("cell at line {line}, column {col} is connected to more than one neighbour")]
    MultiConnection { line: usize, col: usize },
    #[error("cell at line {line}, column {col} has a value but no connection")]
    MissingConnection { line: usize, col: usize },
    #[error("connector at line {line}, column {col} attaches to an empty cell")]
    ConnectionToEmptyCell { line: usize, col: usize },
    #[error("connector at line {line}, column {col} attaches two empty cells")]
    ConnectionToEmptyCells { line: usize, col: usize },
}

/// Which way a step through the grid points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    North,
    East,
    South,
    West,
}

/// One half of a domino. Neighbour addresses are fixed at construction;
/// `value` and `connection` change together under the `SET` instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub address: usize,
    pub value: Option<u8>,
    pub connection: Option<usize>,
    pub north: Option<usize>,
    pub east: Option<usize>,
    pub south: Option<usize>,
    pub west: Option<usize>,
}

impl Cell {
    pub fn neighbor(&self, dir: Dir) -> Option<usize> {
        match dir {
            Dir::North => self.north,
            Dir::East => self.east,
            Dir::South => self.south,
            Dir::West => self.west,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Board {
    pub fn parse(source: &str, base: u32) -> Result<Board, GridError> {
        let lines: Vec<&str> = source.lines().collect();
        let starts_code = |l: &&str| l.chars().next().is_some_and(|c| is_value_glyph(c, base));
        let first = lines
            .iter()
            .position(starts_code)
            .ok_or_else(|| GridError::InvalidGrid { reason: "no code lines found".into() })?;
        let last = lines.iter().rposition(starts_code).unwrap_or(first);
        // 1-based line numbers relative to the whole source, commentary included
        let line_of = |r: usize| first + r + 1;

        let matrix: Vec<Vec<char>> = lines[first..=last].iter().map(|l| l.chars().collect()).collect();
        let cols = matrix[0].len();
        if matrix.iter().any(|row| row.len() != cols) {
            return Err(GridError::InvalidGrid { reason: "code lines have unequal lengths".into() });
        }
        if cols % 2 == 0 || matrix.len() % 2 == 0 {
            return Err(GridError::InvalidGrid {
                reason: "the code block must span an odd number of columns and lines".into(),
            });
        }
        let width = (cols + 1) / 2;
        let height = (matrix.len() + 1) / 2;

        let mut cells = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                let addr = row * width + col;
                cells.push(Cell {
                    address: addr,
                    value: None,
                    connection: None,
                    north: (row > 0).then(|| addr - width),
                    east: (col + 1 < width).then(|| addr + 1),
                    south: (row + 1 < height).then(|| addr + width),
                    west: (col > 0).then(|| addr - 1),
                });
            }
        }

        // (from, to, line, col) for every connector glyph
        let mut links: Vec<(usize, usize, usize, usize)> = Vec::new();
        for (r, row) in matrix.iter().enumerate() {
            for (c, &ch) in row.iter().enumerate() {
                let (line, col) = (line_of(r), c + 1);
                match (r % 2, c % 2) {
                    (0, 0) => {
                        let addr = (r / 2) * width + c / 2;
                        if ch == '.' {
                            continue;
                        }
                        match ch.to_digit(16) {
                            Some(d) if d < base => cells[addr].value = Some(d as u8),
                            Some(_) => {
                                return Err(GridError::ForbiddenCharacter { line, col, ch, base });
                            }
                            None => return Err(GridError::Syntax { line, col, ch }),
                        }
                    }
                    (0, 1) => {
                        if HORIZONTAL.contains(&ch) {
                            let a = (r / 2) * width + (c - 1) / 2;
                            links.push((a, a + 1, line, col));
                        } else if ch != ' ' {
                            return Err(GridError::Syntax { line, col, ch });
                        }
                    }
                    (1, 0) => {
                        if VERTICAL.contains(&ch) {
                            let a = ((r - 1) / 2) * width + c / 2;
                            links.push((a, a + width, line, col));
                        } else if ch != ' ' {
                            return Err(GridError::Syntax { line, col, ch });
                        }
                    }
                    _ => {
                        if ch != ' ' {
                            return Err(GridError::Syntax { line, col, ch });
                        }
                    }
                }
            }
        }

        let mut connectors = 0usize;
        for (a, b, line, col) in links {
            match (cells[a].value.is_some(), cells[b].value.is_some()) {
                (false, false) => return Err(GridError::ConnectionToEmptyCells { line, col }),
                (true, true) => {}
                _ => return Err(GridError::ConnectionToEmptyCell { line, col }),
            }
            if cells[a].connection.is_some() || cells[b].connection.is_some() {
                return Err(GridError::MultiConnection { line, col });
            }
            cells[a].connection = Some(b);
            cells[b].connection = Some(a);
            connectors += 1;
        }

        let mut occupied = 0usize;
        for cell in &cells {
            if cell.value.is_some() {
                occupied += 1;
                if cell.connection.is_none() {
                    let row = cell.address / width;
                    let col = cell.address % width;
                    return Err(GridError::MissingConnection {
                        line: line_of(row * 2),
                        col: col * 2 + 1,
                    });
                }
            }
        }
        if connectors != occupied / 2 {
            return Err(GridError::InvalidGrid {
                reason: format!("found {connectors} connectors for {occupied} occupied cells"),
            });
        }

        Ok(Board { width, height, cells })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, addr: usize) -> Option<&Cell> {
        self.cells.get(addr)
    }

    pub fn value(&self, addr: usize) -> Option<u8> {
        self.cells.get(addr).and_then(|c| c.value)
    }

    pub fn connection(&self, addr: usize) -> Option<usize> {
        self.cells.get(addr).and_then(|c| c.connection)
    }

    pub fn neighbor(&self, addr: usize, dir: Dir) -> Option<usize> {
        self.cells.get(addr).and_then(|c| c.neighbor(dir))
    }

    /// Empty a cell and sever it from its partner, which becomes empty too.
    pub(crate) fn detach(&mut self, addr: usize) {
        if let Some(partner) = self.cells[addr].connection.take() {
            self.cells[partner].value = None;
            self.cells[partner].connection = None;
        }
        self.cells[addr].value = None;
    }

    pub(crate) fn write_domino(&mut self, a: usize, b: usize, va: u8, vb: u8) {
        self.cells[a].value = Some(va);
        self.cells[b].value = Some(vb);
        self.cells[a].connection = Some(b);
        self.cells[b].connection = Some(a);
    }

    /// Reconstruct canonical source text from the live grid, the inverse of
    /// [`Board::parse`]. Fails if external mutation broke the domino
    /// invariants.
    pub fn source(&self) -> Result<String, GridError> {
        let mut connectors = 0usize;
        let mut occupied = 0usize;
        for cell in &self.cells {
            match (cell.value, cell.connection) {
                (None, None) => {}
                (Some(_), Some(partner)) => {
                    occupied += 1;
                    let other = self.cells.get(partner).ok_or_else(|| inconsistent(cell.address))?;
                    if other.connection != Some(cell.address) || other.value.is_none() {
                        return Err(inconsistent(cell.address));
                    }
                    if partner > cell.address {
                        connectors += 1;
                    }
                }
                _ => return Err(inconsistent(cell.address)),
            }
        }
        if connectors != occupied / 2 {
            return Err(inconsistent(0));
        }

        let rows = self.height * 2 - 1;
        let cols = self.width * 2 - 1;
        let mut out = vec![vec![' '; cols]; rows];
        for cell in &self.cells {
            let (row, col) = (cell.address / self.width, cell.address % self.width);
            out[row * 2][col * 2] = match cell.value {
                Some(v) => char::from_digit(v as u32, 16).unwrap_or('.'),
                None => '.',
            };
            match cell.connection {
                Some(p) if p == cell.address + 1 => out[row * 2][col * 2 + 1] = '-',
                Some(p) if p == cell.address + self.width => out[row * 2 + 1][col * 2] = '|',
                _ => {}
            }
        }
        Ok(out
            .into_iter()
            .map(|row| row.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn is_value_glyph(c: char, base: u32) -> bool {
    c == '.' || c.to_digit(16).is_some_and(|d| d < base)
}

fn inconsistent(addr: usize) -> GridError {
    GridError::InvalidGrid {
        reason: format!("board state is inconsistent around address {addr}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_row() {
        let board = Board::parse("0-1 2-3", 7).unwrap();
        assert_eq!(board.width(), 4);
        assert_eq!(board.height(), 1);
        assert_eq!(board.value(0), Some(0));
        assert_eq!(board.value(3), Some(3));
        assert_eq!(board.connection(0), Some(1));
        assert_eq!(board.connection(3), Some(2));
    }

    #[test]
    fn parse_vertical_connector() {
        let source = "0 .\n|  \n1 .";
        let board = Board::parse(source, 7).unwrap();
        assert_eq!(board.width(), 2);
        assert_eq!(board.height(), 2);
        assert_eq!(board.connection(0), Some(2));
        assert_eq!(board.connection(2), Some(0));
        assert_eq!(board.value(1), None);
    }

    #[test]
    fn commentary_is_discarded() {
        let source = "this line explains the program\n\n0-1 2-3\n\ntrailing notes";
        let board = Board::parse(source, 7).unwrap();
        assert_eq!(board.width(), 4);
    }

    #[test]
    fn connection_symmetry_holds() {
        let board = Board::parse("6-6 . 0-1", 7).unwrap();
        for cell in (0..board.len()).filter_map(|a| board.cell(a)) {
            if let Some(p) = cell.connection {
                assert_eq!(board.connection(p), Some(cell.address));
                assert!(board.value(p).is_some());
            }
        }
    }

    #[test]
    fn neighbors_absent_only_on_edges() {
        let board = Board::parse("0-1 2-3", 7).unwrap();
        let cell = board.cell(0).unwrap();
        assert_eq!(cell.west, None);
        assert_eq!(cell.north, None);
        assert_eq!(cell.south, None);
        assert_eq!(cell.east, Some(1));
    }

    #[test]
    fn no_code_lines_is_invalid() {
        let err = Board::parse("just words\nmore words", 7).unwrap_err();
        assert!(matches!(err, GridError::InvalidGrid { .. }));
    }

    #[test]
    fn unequal_lines_are_invalid() {
        let err = Board::parse("0-1\n2-3 4", 7).unwrap_err();
        assert!(matches!(err, GridError::InvalidGrid { .. }));
    }

    #[test]
    fn digit_beyond_base_is_forbidden() {
        let err = Board::parse("0-1 a-2", 7).unwrap_err();
        match err {
            GridError::ForbiddenCharacter { line, col, ch, base } => {
                assert_eq!((line, col, ch, base), (1, 5, 'a', 7));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn stray_glyph_is_a_syntax_error() {
        let err = Board::parse("0-1 2x3", 7).unwrap_err();
        assert!(matches!(err, GridError::Syntax { col: 6, .. }));
    }

    #[test]
    fn double_connection_is_rejected() {
        let err = Board::parse("0-1-2", 7).unwrap_err();
        assert!(matches!(err, GridError::MultiConnection { .. }));
    }

    #[test]
    fn value_without_connection_is_rejected() {
        let err = Board::parse("0-1 2", 7).unwrap_err();
        assert!(matches!(err, GridError::MissingConnection { .. }));
    }

    #[test]
    fn connector_against_one_empty_cell() {
        let err = Board::parse("0-1 2-.", 7).unwrap_err();
        assert!(matches!(err, GridError::ConnectionToEmptyCell { .. }));
    }

    #[test]
    fn connector_between_two_empty_cells() {
        let err = Board::parse("0-1 .-.", 7).unwrap_err();
        assert!(matches!(err, GridError::ConnectionToEmptyCells { .. }));
    }

    #[test]
    fn alternate_connector_glyphs_are_accepted() {
        let board = Board::parse("0═1 4 .\n    │  \n2─3 4 .", 7).unwrap();
        assert_eq!(board.connection(0), Some(1));
        assert_eq!(board.connection(2), Some(6));
        assert_eq!(board.connection(4), Some(5));
        // canonical serialization normalizes the glyphs
        let canon = board.source().unwrap();
        assert!(canon.contains("2-3"));
        assert!(canon.contains('|'));
    }

    #[test]
    fn source_round_trips_canonical_text() {
        let source = "0-1 . 2 . .\n      |    \n3-4 . 5 . .";
        let board = Board::parse(source, 7).unwrap();
        assert_eq!(board.source().unwrap(), source);
    }

    #[test]
    fn source_rejects_broken_invariants() {
        let mut board = Board::parse("0-1 2-3", 7).unwrap();
        board.cells[1].value = None;
        assert!(matches!(board.source(), Err(GridError::InvalidGrid { .. })));
    }
}
