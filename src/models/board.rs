use serde::{Deserialize, Serialize};

use crate::config::BOARD_SIZE;
use crate::engine::placement::Layout;
use crate::errors::CustomError;

// Grid wire values
pub const GRID_EMPTY: u8 = 0;
pub const GRID_SHIP: u8 = 1;
pub const GRID_MISS: u8 = 2;
pub const GRID_HIT: u8 = 3;
pub const GRID_SUNK: u8 = 4;

/// A cell position. `x` is the row, `y` the column.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize) -> Self {
        Coord { x, y }
    }

    /// Converts untrusted wire coordinates, failing with `OutOfBounds`.
    pub fn checked(x: i64, y: i64) -> Result<Self, CustomError> {
        if in_bounds(x, y) {
            Ok(Coord::new(x as usize, y as usize))
        } else {
            Err(CustomError::OutOfBounds)
        }
    }

    pub fn step(self, dir: Direction) -> Option<Coord> {
        let (dx, dy) = dir.delta();
        let (x, y) = (self.x as i64 + dx, self.y as i64 + dy);
        in_bounds(x, y).then(|| Coord::new(x as usize, y as usize))
    }

    /// The up to eight cells touching this one, diagonals included.
    pub fn surrounding(self) -> impl Iterator<Item = Coord> {
        (-1i64..=1)
            .flat_map(move |dx| (-1i64..=1).map(move |dy| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .filter_map(move |(dx, dy)| {
                let (x, y) = (self.x as i64 + dx, self.y as i64 + dy);
                in_bounds(x, y).then(|| Coord::new(x as usize, y as usize))
            })
    }

    /// Index into a flat `BOARD_SIZE * BOARD_SIZE` array.
    pub fn index(self) -> usize {
        self.x * BOARD_SIZE + self.y
    }

    pub fn all() -> impl Iterator<Item = Coord> {
        (0..BOARD_SIZE).flat_map(|x| (0..BOARD_SIZE).map(move |y| Coord::new(x, y)))
    }
}

pub fn in_bounds(x: i64, y: i64) -> bool {
    (0..BOARD_SIZE as i64).contains(&x) && (0..BOARD_SIZE as i64).contains(&y)
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    /// Probe order used when a ship's orientation is still unknown.
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Right, Direction::Down, Direction::Left];

    pub fn delta(self) -> (i64, i64) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Right => (0, 1),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
        }
    }

    /// Direction of a single orthogonal step from `from` to `to`, if it is one.
    pub fn between(from: Coord, to: Coord) -> Option<Direction> {
        Direction::ALL.into_iter().find(|&d| from.step(d) == Some(to))
    }
}

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CellState {
    #[default]
    Empty,
    Ship,
    Miss,
    Hit,
}

#[derive(Clone, Copy, Debug, Default)]
struct Cell {
    state: CellState,
    ship_id: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Ship {
    pub id: u32,
    pub length: usize,
    pub cells: Vec<Coord>,
    pub sunk: bool,
}

/// What a single shot did to a board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShotOutcome {
    pub hit: bool,
    pub sunk: bool,
    pub already: bool,
    pub ship_id: Option<u32>,
}

/// One player's 10x10 grid with its fleet and shot history.
#[derive(Clone, Debug)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
    ships: Vec<Ship>,
    shots: usize,
}

impl Default for Board {
    fn default() -> Self {
        Board::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Board {
            cells: [[Cell::default(); BOARD_SIZE]; BOARD_SIZE],
            ships: Vec::new(),
            shots: 0,
        }
    }

    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    pub fn ship(&self, id: u32) -> Option<&Ship> {
        self.ships.iter().find(|s| s.id == id)
    }

    pub fn is_placed(&self) -> bool {
        !self.ships.is_empty()
    }

    /// True once any shot has landed on this board.
    pub fn has_been_shot(&self) -> bool {
        self.shots > 0
    }

    /// Replaces the fleet with an already validated layout.
    pub fn place_ships(&mut self, layout: &Layout) -> Result<(), CustomError> {
        if self.has_been_shot() {
            return Err(CustomError::PlacementLocked);
        }
        self.cells = [[Cell::default(); BOARD_SIZE]; BOARD_SIZE];
        for ship in &layout.ships {
            for c in &ship.cells {
                self.cells[c.x][c.y] = Cell {
                    state: CellState::Ship,
                    ship_id: Some(ship.id),
                };
            }
        }
        self.ships = layout.ships.clone();
        Ok(())
    }

    pub fn state(&self, c: Coord) -> CellState {
        self.cells[c.x][c.y].state
    }

    /// A cell is resolved once it has been shot, hit or miss.
    pub fn is_resolved(&self, c: Coord) -> bool {
        matches!(self.state(c), CellState::Hit | CellState::Miss)
    }

    pub fn is_hit(&self, c: Coord) -> bool {
        self.state(c) == CellState::Hit
    }

    /// A hit cell whose ship is still afloat.
    pub fn is_open_hit(&self, c: Coord) -> bool {
        let cell = self.cells[c.x][c.y];
        cell.state == CellState::Hit
            && cell
                .ship_id
                .and_then(|id| self.ship(id))
                .map_or(false, |s| !s.sunk)
    }

    pub fn open_hits(&self) -> Vec<Coord> {
        Coord::all().filter(|&c| self.is_open_hit(c)).collect()
    }

    /// Lengths of the ships still afloat.
    pub fn remaining_lengths(&self) -> Vec<usize> {
        self.ships.iter().filter(|s| !s.sunk).map(|s| s.length).collect()
    }

    pub fn apply_shot(&mut self, c: Coord) -> Result<ShotOutcome, CustomError> {
        if c.x >= BOARD_SIZE || c.y >= BOARD_SIZE {
            return Err(CustomError::OutOfBounds);
        }
        let cell = self.cells[c.x][c.y];
        match cell.state {
            CellState::Hit | CellState::Miss => Ok(ShotOutcome {
                already: true,
                ..ShotOutcome::default()
            }),
            CellState::Empty => {
                self.shots += 1;
                self.cells[c.x][c.y].state = CellState::Miss;
                Ok(ShotOutcome::default())
            }
            CellState::Ship => {
                self.shots += 1;
                self.cells[c.x][c.y].state = CellState::Hit;
                let sunk = match cell.ship_id {
                    Some(id) => self.recompute_sunk(id),
                    None => false,
                };
                Ok(ShotOutcome {
                    hit: true,
                    sunk,
                    already: false,
                    ship_id: cell.ship_id,
                })
            }
        }
    }

    fn recompute_sunk(&mut self, id: u32) -> bool {
        let cells = &self.cells;
        match self.ships.iter_mut().find(|s| s.id == id) {
            Some(ship) => {
                ship.sunk = ship.cells.iter().all(|c| cells[c.x][c.y].state == CellState::Hit);
                ship.sunk
            }
            None => false,
        }
    }

    pub fn is_fleet_destroyed(&self) -> bool {
        self.is_placed() && self.ships.iter().all(|s| s.sunk)
    }

    /// Numeric grid for the wire. With `reveal` false, intact ship cells read as empty.
    pub fn to_grid(&self, reveal: bool) -> Vec<Vec<u8>> {
        (0..BOARD_SIZE)
            .map(|x| {
                (0..BOARD_SIZE)
                    .map(|y| {
                        let cell = self.cells[x][y];
                        match cell.state {
                            CellState::Empty => GRID_EMPTY,
                            CellState::Ship if reveal => GRID_SHIP,
                            CellState::Ship => GRID_EMPTY,
                            CellState::Miss => GRID_MISS,
                            CellState::Hit => {
                                let sunk = cell.ship_id.and_then(|id| self.ship(id)).map_or(false, |s| s.sunk);
                                if sunk {
                                    GRID_SUNK
                                } else {
                                    GRID_HIT
                                }
                            }
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::placement::classic_layout;

    fn placed_board() -> Board {
        let mut board = Board::new();
        board.place_ships(&classic_layout()).unwrap();
        board
    }

    #[test]
    fn fresh_fleet_is_not_destroyed_until_every_cell_is_hit() {
        let mut board = placed_board();
        assert!(!board.is_fleet_destroyed());

        let cells: Vec<Coord> = board.ships().iter().flat_map(|s| s.cells.clone()).collect();
        let (last, rest) = cells.split_last().unwrap();
        for &c in rest {
            assert!(board.apply_shot(c).unwrap().hit);
            assert!(!board.is_fleet_destroyed());
        }
        let outcome = board.apply_shot(*last).unwrap();
        assert!(outcome.hit && outcome.sunk);
        assert!(board.is_fleet_destroyed());
    }

    #[test]
    fn repeated_shot_reports_already_and_changes_nothing() {
        let mut board = placed_board();
        let first = board.apply_shot(Coord::new(9, 9)).unwrap();
        assert!(!first.hit && !first.already);
        let grid = board.to_grid(true);

        let second = board.apply_shot(Coord::new(9, 9)).unwrap();
        assert!(second.already);
        assert!(!second.hit);
        assert_eq!(board.to_grid(true), grid);
    }

    #[test]
    fn sinking_marks_only_the_owning_ship() {
        let mut board = placed_board();
        // four-decker along row 0
        for y in 0..3 {
            let outcome = board.apply_shot(Coord::new(0, y)).unwrap();
            assert!(outcome.hit && !outcome.sunk);
        }
        let outcome = board.apply_shot(Coord::new(0, 3)).unwrap();
        assert!(outcome.sunk);
        assert_eq!(board.ships().iter().filter(|s| s.sunk).count(), 1);
        assert_eq!(board.to_grid(false)[0][..4], [GRID_SUNK; 4]);
    }

    #[test]
    fn out_of_bounds_shot_fails() {
        let mut board = placed_board();
        assert_eq!(board.apply_shot(Coord::new(10, 0)), Err(CustomError::OutOfBounds));
        assert_eq!(Coord::checked(-1, 3), Err(CustomError::OutOfBounds));
        assert_eq!(Coord::checked(3, 10), Err(CustomError::OutOfBounds));
    }

    #[test]
    fn placement_is_locked_after_first_shot() {
        let mut board = placed_board();
        board.place_ships(&classic_layout()).unwrap();
        board.apply_shot(Coord::new(5, 5)).unwrap();
        assert_eq!(board.place_ships(&classic_layout()), Err(CustomError::PlacementLocked));
    }

    #[test]
    fn hidden_grid_never_shows_intact_ships() {
        let mut board = placed_board();
        board.apply_shot(Coord::new(0, 0)).unwrap();
        let hidden = board.to_grid(false);
        assert!(hidden.iter().flatten().all(|&v| v != GRID_SHIP));
        assert_eq!(hidden[0][0], GRID_HIT);
        assert_eq!(board.to_grid(true)[0][1], GRID_SHIP);
    }

    #[test]
    fn open_hits_track_unsunk_ships() {
        let mut board = placed_board();
        board.apply_shot(Coord::new(0, 0)).unwrap();
        assert_eq!(board.open_hits(), vec![Coord::new(0, 0)]);
        // single-decker at (4,3) sinks at once and never counts as open
        board.apply_shot(Coord::new(4, 3)).unwrap();
        assert_eq!(board.open_hits(), vec![Coord::new(0, 0)]);
        assert_eq!(board.remaining_lengths().len(), 9);
    }

    #[test]
    fn surrounding_is_clipped_at_edges() {
        assert_eq!(Coord::new(0, 0).surrounding().count(), 3);
        assert_eq!(Coord::new(0, 5).surrounding().count(), 5);
        assert_eq!(Coord::new(5, 5).surrounding().count(), 8);
        assert_eq!(Direction::between(Coord::new(5, 5), Coord::new(5, 6)), Some(Direction::Right));
        assert_eq!(Direction::between(Coord::new(5, 5), Coord::new(6, 6)), None);
    }
}
