use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A direction to move/merge tiles.
///
/// The discriminants follow clockwise order starting from `Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Up,
    Right,
    Down,
    Left,
}

impl Move {
    /// All directions, in the order the search tries them.
    pub const ALL: [Move; 4] = [Move::Up, Move::Right, Move::Down, Move::Left];

    /// Position of this direction inside [`Move::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The axis tiles travel along when sliding in this direction.
    #[inline]
    pub fn axis(self) -> Axis {
        match self {
            Move::Up | Move::Down => Axis::Vertical,
            Move::Left | Move::Right => Axis::Horizontal,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Move::Up => "up",
            Move::Right => "right",
            Move::Down => "down",
            Move::Left => "left",
        };
        f.pad(name)
    }
}

/// A board axis, used to group adjacent empty cells into runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Along a row (varying `x`).
    Horizontal,
    /// Along a column (varying `y`).
    Vertical,
}

const LINE_TABLE_SIZE: usize = 0x1_0000; // 65,536 possible 16-bit lines
/// Set in a slide-table entry when sliding that line would merge two 2^15 tiles.
const LINE_OVERFLOW: u32 = 1 << 16;
const LOW_NIBBLES: u64 = 0x1111_1111_1111_1111;
/// One bit per cell with a right-hand neighbour (x < 3).
const HORIZONTAL_PAIRS: u64 = 0x0111_0111_0111_0111;
/// One bit per cell with a lower neighbour (y < 3).
const VERTICAL_PAIRS: u64 = 0x0000_1111_1111_1111;

pub const MAX_EXPONENT: u8 = 15;

type BoardRaw = u64;

static SLIDE_TABLE: OnceLock<Box<[u32]>> = OnceLock::new();

/// Packed 4x4 2048 board as 16 4-bit exponents in a `u64`.
///
/// Cell `(x, y)` lives at bit offset `4 * x + 16 * y`, so each row is one
/// 16-bit line with `x = 0` in its low nibble. An exponent `e` stands for the
/// tile `2^e`; `0` is an empty cell.
///
/// Boards are plain values: every operation returns a new board and leaves
/// the receiver untouched.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Board(BoardRaw);

impl Board {
    /// A constant empty board (all zeros).
    pub const EMPTY: Board = Board(0);

    /// Construct a `Board` from its raw packed representation.
    #[inline]
    pub fn from_raw(raw: BoardRaw) -> Self {
        Board(raw)
    }

    /// Consume this `Board`, returning the raw packed `u64`.
    #[inline]
    pub fn into_raw(self) -> BoardRaw {
        self.0
    }

    /// Borrow the raw packed `u64` for this `Board`.
    #[inline]
    pub fn raw(&self) -> BoardRaw {
        self.0
    }

    /// Build a board from exponents laid out as `rows[y][x]`.
    ///
    /// ```
    /// use solver_2048::engine::Board;
    /// let b = Board::from_rows([[1, 0, 0, 1], [0; 4], [0; 4], [0; 4]]);
    /// assert_eq!(b.get(3, 0), 1);
    /// assert_eq!(b.count_empty(), 14);
    /// ```
    pub fn from_rows(rows: [[u8; 4]; 4]) -> Self {
        let mut board = Board::EMPTY;
        for (y, row) in rows.iter().enumerate() {
            for (x, &exponent) in row.iter().enumerate() {
                board.set(x, y, exponent);
            }
        }
        board
    }

    /// Exponents laid out as `rows[y][x]`.
    pub fn to_rows(self) -> [[u8; 4]; 4] {
        let mut rows = [[0u8; 4]; 4];
        for (y, row) in rows.iter_mut().enumerate() {
            for (x, cell) in row.iter_mut().enumerate() {
                *cell = self.get(x, y);
            }
        }
        rows
    }

    /// Exponent stored at `(x, y)`.
    #[inline]
    pub fn get(self, x: usize, y: usize) -> u8 {
        debug_assert!(x < 4 && y < 4, "cell ({x}, {y}) is off the board");
        ((self.0 >> offset(x, y)) & 0xf) as u8
    }

    /// Overwrite the exponent at `(x, y)` on this copy of the board.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, exponent: u8) {
        debug_assert!(x < 4 && y < 4, "cell ({x}, {y}) is off the board");
        assert!(exponent <= MAX_EXPONENT, "exponent {exponent} does not fit in a cell");
        let shift = offset(x, y);
        self.0 = (self.0 & !(0xf << shift)) | ((exponent as u64) << shift);
    }

    /// Return a copy of the board with `(x, y)` set to `exponent`.
    #[inline]
    pub fn with_tile(self, x: usize, y: usize, exponent: u8) -> Self {
        let mut board = self;
        board.set(x, y, exponent);
        board
    }

    /// Mirror across the main diagonal: `(x, y) <-> (y, x)`.
    #[inline]
    pub fn transpose(self) -> Self {
        Board(transpose(self.0))
    }

    /// Mirror every row left-to-right: `(x, y) <-> (3 - x, y)`.
    #[inline]
    pub fn flip(self) -> Self {
        Board(flip(self.0))
    }

    /// Quarter turn: transpose then flip, taking `(x, y)` to `(3 - y, x)`.
    #[inline]
    pub fn rotate(self) -> Self {
        self.transpose().flip()
    }

    /// The 8 symmetric images of this board: four rotations, then the
    /// same four rotations mirrored.
    pub fn orientations(self) -> [Board; 8] {
        let mut out = [self; 8];
        let mut current = self;
        for i in 0..4 {
            out[i] = current;
            out[i + 4] = current.flip();
            current = current.rotate();
        }
        out
    }

    /// Return the board resulting from sliding/merging tiles in `dir` (no random insert).
    ///
    /// Example
    /// ```
    /// use solver_2048::engine::{Board, Move};
    /// let b = Board::from_rows([[1, 1, 0, 0], [0; 4], [0; 4], [0; 4]]);
    /// assert_eq!(b.shift(Move::Left).to_rows()[0], [2, 0, 0, 0]);
    /// ```
    #[inline]
    pub fn shift(self, dir: Move) -> Self {
        let raw = self.0;
        let shifted = match dir {
            Move::Left => slide_rows_left(raw),
            Move::Right => flip(slide_rows_left(flip(raw))),
            Move::Up => transpose(slide_rows_left(transpose(raw))),
            Move::Down => transpose(flip(slide_rows_left(flip(transpose(raw))))),
        };
        Board(shifted)
    }

    /// Slide in `dir`, reporting whether any tile moved or merged.
    ///
    /// ```
    /// use solver_2048::engine::{Board, Move};
    /// let b = Board::from_rows([[1, 2, 1, 0], [0; 4], [0; 4], [0; 4]]);
    /// let (after, moved) = b.apply_move(Move::Left);
    /// assert!(!moved);
    /// assert_eq!(after, b);
    /// ```
    #[inline]
    pub fn apply_move(self, dir: Move) -> (Self, bool) {
        let shifted = self.shift(dir);
        (shifted, shifted != self)
    }

    /// Insert a random 2 (90%) or 4 (10%) tile into a random empty slot, using the provided RNG.
    ///
    /// A full board is returned unchanged.
    ///
    /// ```
    /// use solver_2048::engine::Board;
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(123);
    /// let b = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// assert_eq!(b.count_empty(), 14);
    /// ```
    pub fn with_random_tile<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let empty = self.count_empty();
        if empty == 0 {
            return self;
        }
        let pick = rng.gen_range(0..empty);
        let exponent = if rng.gen_range(0..10) < 9 { 1 } else { 2 };
        match self.empty_cells().nth(pick) {
            Some((x, y)) => self.with_tile(x, y, exponent),
            None => self,
        }
    }

    /// Perform a move then insert a random tile if the move changed the board, using the provided RNG.
    #[inline]
    pub fn make_move<R: Rng + ?Sized>(self, direction: Move, rng: &mut R) -> Self {
        let (moved, changed) = self.apply_move(direction);
        if changed {
            moved.with_random_tile(rng)
        } else {
            self
        }
    }

    /// Bitmask of empty cells, bit `4 * y + x` set when `(x, y)` is empty.
    #[inline]
    pub fn empty_mask(self) -> u16 {
        gather_nibble_flags(zero_nibbles(self.0))
    }

    /// Empty cells in row-major order (`y` outer, `x` inner).
    #[inline]
    pub fn empty_cells(self) -> Cells {
        Cells(self.empty_mask())
    }

    /// One empty cell per maximal run of adjacent empty cells along `axis`.
    ///
    /// The representative of each run is its first cell (lowest `x` for
    /// horizontal runs, lowest `y` for vertical runs).
    ///
    /// ```
    /// use solver_2048::engine::{Axis, Board};
    /// let b = Board::from_rows([[1, 0, 0, 1], [1; 4], [1; 4], [1; 4]]);
    /// assert_eq!(b.relevant_cells(Axis::Horizontal).collect::<Vec<_>>(), vec![(1, 0)]);
    /// assert_eq!(b.relevant_cells(Axis::Vertical).len(), 2);
    /// ```
    pub fn relevant_cells(self, axis: Axis) -> Cells {
        let empty = self.empty_mask();
        let continues_run = match axis {
            // Bit 4y + x is set when (x - 1, y) is empty; x = 0 never continues a run.
            Axis::Horizontal => (empty << 1) & 0xeeee,
            Axis::Vertical => empty << 4,
        };
        Cells(empty & !continues_run)
    }

    /// Count the number of empty cells on the board.
    #[inline]
    pub fn count_empty(self) -> usize {
        zero_nibbles(self.0).count_ones() as usize
    }

    /// Highest exponent on the board (0 for an empty board).
    pub fn max_exponent(self) -> u8 {
        (0..16).map(|i| ((self.0 >> (4 * i)) & 0xf) as u8).max().unwrap_or(0)
    }

    /// Return the highest tile value (e.g., 2048) present on the board, 0 when empty.
    #[inline]
    pub fn highest_tile(self) -> u32 {
        exponent_value(self.max_exponent())
    }

    /// Tile value at `(x, y)`, 0 when the cell is empty.
    #[inline]
    pub fn tile_value(self, x: usize, y: usize) -> u32 {
        exponent_value(self.get(x, y))
    }

    /// True if some direction would change the board: an empty cell exists
    /// or two neighbouring cells hold the same tile.
    ///
    /// ```
    /// use solver_2048::engine::Board;
    /// let stuck = Board::from_rows([[1, 2, 1, 2], [2, 1, 2, 1], [1, 2, 1, 2], [2, 1, 2, 1]]);
    /// assert!(!stuck.moves_available());
    /// ```
    pub fn moves_available(self) -> bool {
        let raw = self.0;
        if zero_nibbles(raw) != 0 {
            return true;
        }
        let horizontal = zero_nibbles(raw ^ (raw >> 4)) & HORIZONTAL_PAIRS;
        let vertical = zero_nibbles(raw ^ (raw >> 16)) & VERTICAL_PAIRS;
        (horizontal | vertical) != 0
    }

    /// Return true if no legal moves remain.
    #[inline]
    pub fn is_game_over(self) -> bool {
        !self.moves_available()
    }

    /// Number of horizontally or vertically adjacent pairs holding the same
    /// non-empty tile.
    pub fn smoothness(self) -> u32 {
        let raw = self.0;
        let occupied = !zero_nibbles(raw) & LOW_NIBBLES;
        let horizontal = zero_nibbles(raw ^ (raw >> 4)) & HORIZONTAL_PAIRS & occupied;
        let vertical = zero_nibbles(raw ^ (raw >> 16)) & VERTICAL_PAIRS & occupied;
        horizontal.count_ones() + vertical.count_ones()
    }

    /// Classic game score: every merge into `2^e` earns `2^e` points, so a
    /// tile `2^e` (e >= 2) accounts for `(e - 1) * 2^e`.
    pub fn score(self) -> u64 {
        (0..16).fold(0, |acc, i| {
            let e = (self.0 >> (4 * i)) & 0xf;
            if e >= 2 {
                acc + (e - 1) * (1 << e)
            } else {
                acc
            }
        })
    }
}

/// Iterator over board cells selected by a 16-bit mask, yielding `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cells(u16);

impl Cells {
    /// The underlying mask (bit `4 * y + x`).
    #[inline]
    pub fn mask(self) -> u16 {
        self.0
    }
}

impl Iterator for Cells {
    type Item = (usize, usize);

    #[inline]
    fn next(&mut self) -> Option<(usize, usize)> {
        if self.0 == 0 {
            return None;
        }
        let idx = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some((idx % 4, idx / 4))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Cells {}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board({:#018x})", self.0)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str = "-------------------------------";
        for y in 0..4 {
            let row: Vec<String> = (0..4).map(|x| format_val(self.tile_value(x, y))).collect();
            writeln!(f, "{}", row.join("|"))?;
            if y < 3 {
                writeln!(f, "{RULE}")?;
            }
        }
        Ok(())
    }
}

impl From<BoardRaw> for Board {
    fn from(v: BoardRaw) -> Self {
        Board::from_raw(v)
    }
}

impl From<Board> for BoardRaw {
    fn from(b: Board) -> Self {
        b.into_raw()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseBoardError {
    #[error("expected 16 cells, found {0}")]
    CellCount(usize),
    #[error("invalid cell digit {0:?} (expected a hex exponent 0-f)")]
    InvalidDigit(char),
}

/// Parse 16 hex exponents in row-major order, `(0, 0)` first.
///
/// An optional `0x` prefix is accepted, and `_`, `/`, `,` or whitespace may
/// separate cells or rows.
///
/// ```
/// use solver_2048::engine::Board;
/// let b: Board = "1001/0000/0000/0002".parse().unwrap();
/// assert_eq!(b.get(0, 0), 1);
/// assert_eq!(b.get(3, 3), 2);
/// ```
impl FromStr for Board {
    type Err = ParseBoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let digits = s
            .chars()
            .filter(|c| !(c.is_whitespace() || matches!(c, '_' | '/' | ',')))
            .map(|c| c.to_digit(16).map(|d| d as u8).ok_or(ParseBoardError::InvalidDigit(c)))
            .collect::<Result<Vec<u8>, _>>()?;
        if digits.len() != 16 {
            return Err(ParseBoardError::CellCount(digits.len()));
        }
        let mut board = Board::EMPTY;
        for (idx, &exponent) in digits.iter().enumerate() {
            board.set(idx % 4, idx / 4, exponent);
        }
        Ok(board)
    }
}

/// Initialize the slide table on first use. Safe to call multiple times.
pub fn new() {
    let _ = slide_table();
}

/// Slide/merge tiles in the given direction, reporting whether anything moved.
pub fn apply_move(board: Board, direction: Move) -> (Board, bool) {
    board.apply_move(direction)
}

#[inline]
fn offset(x: usize, y: usize) -> u32 {
    (4 * x + 16 * y) as u32
}

#[inline]
fn exponent_value(exponent: u8) -> u32 {
    if exponent == 0 {
        0
    } else {
        1 << exponent
    }
}

// Credit to Nneonneo. The permutation is its own inverse on any layout that
// keeps rows as 16-bit lines.
pub(crate) fn transpose(x: BoardRaw) -> BoardRaw {
    let a1 = x & 0xF0F00F0FF0F00F0F;
    let a2 = x & 0x0000F0F00000F0F0;
    let a3 = x & 0x0F0F00000F0F0000;
    let a = a1 | (a2 << 12) | (a3 >> 12);
    let b1 = a & 0xFF00FF0000FF00FF;
    let b2 = a & 0x00FF00FF00000000;
    let b3 = a & 0x00000000FF00FF00;
    b1 | (b2 >> 24) | (b3 << 24)
}

pub(crate) fn flip(x: BoardRaw) -> BoardRaw {
    ((x & 0x000F000F000F000F) << 12)
        | ((x & 0x00F000F000F000F0) << 4)
        | ((x & 0x0F000F000F000F00) >> 4)
        | ((x & 0xF000F000F000F000) >> 12)
}

/// `0x1` in every nibble of `x` that is zero, `0x0` elsewhere.
#[inline]
fn zero_nibbles(x: u64) -> u64 {
    let mut t = x | (x >> 1);
    t |= t >> 2;
    !t & LOW_NIBBLES
}

/// Parallel bit extraction of the low bit of each nibble into a `u16`.
#[inline]
fn gather_nibble_flags(flags: u64) -> u16 {
    let mut m = flags & LOW_NIBBLES;
    m = (m | (m >> 3)) & 0x0303_0303_0303_0303;
    m = (m | (m >> 6)) & 0x000F_000F_000F_000F;
    m = (m | (m >> 12)) & 0x0000_00FF_0000_00FF;
    m = (m | (m >> 24)) & 0xFFFF;
    m as u16
}

fn slide_table() -> &'static [u32] {
    SLIDE_TABLE
        .get_or_init(|| {
            // Allocate on the heap to avoid large stack frames
            let mut table = vec![0u32; LINE_TABLE_SIZE];
            for (line, slot) in table.iter_mut().enumerate() {
                *slot = slide_line(line as u16);
            }
            table.into_boxed_slice()
        })
        .as_ref()
}

fn slide_rows_left(board: BoardRaw) -> BoardRaw {
    let table = slide_table();
    (0..4).fold(0, |acc, row| {
        let line = ((board >> (16 * row)) & 0xffff) as usize;
        let entry = table[line];
        assert!(entry & LINE_OVERFLOW == 0, "merging two 2^15 tiles overflows a cell");
        acc | (((entry & 0xffff) as u64) << (16 * row))
    })
}

/// Table entry for one line: the line slid toward nibble 0, plus
/// [`LINE_OVERFLOW`] when that would need an exponent above 15.
fn slide_line(line: u16) -> u32 {
    let mut cells = [0u8; 4];
    for (i, cell) in cells.iter_mut().enumerate() {
        *cell = ((line >> (4 * i)) & 0xf) as u8;
    }
    let overflow = slide_cells(&mut cells);
    let packed = cells
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, &c)| acc | (((c & 0xf) as u32) << (4 * i)));
    if overflow {
        packed | LINE_OVERFLOW
    } else {
        packed
    }
}

/// Slide one line toward index 0. Returns true if a merge overflowed.
///
/// Walking from the destination edge: an empty slot pulls in the nearest
/// following tile, then the next tile further along merges into the slot if
/// it is equal. An unequal tile ends the merge check for that slot.
fn slide_cells(cells: &mut [u8; 4]) -> bool {
    let mut overflow = false;
    for dst in 0..4 {
        if cells[dst] == 0 {
            if let Some(src) = (dst + 1..4).find(|&i| cells[i] != 0) {
                cells[dst] = cells[src];
                cells[src] = 0;
            }
        }
        if let Some(next) = (dst + 1..4).find(|&i| cells[i] != 0) {
            if cells[dst] == cells[next] {
                cells[dst] += 1;
                cells[next] = 0;
                overflow |= cells[dst] > MAX_EXPONENT;
            }
        }
    }
    overflow
}

fn format_val(value: u32) -> String {
    if value == 0 {
        " ".repeat(7)
    } else {
        format!("{value:^7}")
    }
}
