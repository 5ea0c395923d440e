//! Hunt/target shooting for the computer opponent.
//!
//! The engine only looks at what a human could see: which cells were shot, which of those
//! were hits, and which ships are already sunk.

use bit_vec::BitVec;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::BOARD_SIZE;
use crate::models::board::{Board, Coord, Direction, ShotOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotMode {
    Hunt,
    Target { origin: Coord, direction: Option<Direction> },
}

#[derive(Clone, Debug)]
pub struct BotEngine {
    mode: BotMode,
    // cells around sunk ships, treated like misses
    excluded: BitVec,
    reversed: bool,
}

impl Default for BotEngine {
    fn default() -> Self {
        BotEngine::new()
    }
}

impl BotEngine {
    pub fn new() -> Self {
        BotEngine {
            mode: BotMode::Hunt,
            excluded: BitVec::from_elem(BOARD_SIZE * BOARD_SIZE, false),
            reversed: false,
        }
    }

    pub fn mode(&self) -> BotMode {
        self.mode
    }

    pub fn is_excluded(&self, c: Coord) -> bool {
        self.excluded.get(c.index()).unwrap_or(false)
    }

    fn is_available(&self, board: &Board, c: Coord) -> bool {
        !board.is_resolved(c) && !self.is_excluded(c)
    }

    /// Picks the next cell to shoot at. `None` only when every cell is resolved.
    pub fn select<R: Rng + ?Sized>(&mut self, board: &Board, rng: &mut R) -> Option<Coord> {
        self.sync(board);
        if let BotMode::Target { origin, direction } = self.mode {
            if let Some(c) = self.target_shot(board, origin, direction) {
                return Some(c);
            }
            debug!("Bot lost track of the ship at {:?}, hunting again", origin);
            self.hunt();
        }
        self.hunt_shot(board, rng)
    }

    /// Updates the mode after `at` was shot with the given result.
    pub fn observe(&mut self, board: &Board, at: Coord, outcome: &ShotOutcome) {
        if outcome.already {
            return;
        }

        if outcome.sunk {
            if let Some(ship) = outcome.ship_id.and_then(|id| board.ship(id)) {
                for n in ship.cells.iter().flat_map(|c| c.surrounding()) {
                    self.excluded.set(n.index(), true);
                }
            }
            self.hunt();
            return;
        }

        match (self.mode, outcome.hit) {
            (BotMode::Hunt, true) => {
                self.mode = BotMode::Target { origin: at, direction: None };
                self.reversed = false;
            }
            (BotMode::Target { origin, direction: None }, true) => {
                self.mode = BotMode::Target { origin, direction: line_direction(origin, at) };
            }
            (BotMode::Target { origin, direction: Some(dir) }, false) if !self.reversed => {
                self.reversed = true;
                self.mode = BotMode::Target { origin, direction: Some(dir.opposite()) };
            }
            _ => {}
        }
    }

    fn hunt(&mut self) {
        self.mode = BotMode::Hunt;
        self.reversed = false;
    }

    // Drops a target whose ship is gone and resumes one the board still shows as open.
    fn sync(&mut self, board: &Board) {
        match self.mode {
            BotMode::Target { origin, .. } if !board.is_open_hit(origin) => self.hunt(),
            _ => {}
        }
        if self.mode == BotMode::Hunt {
            if let Some(&origin) = board.open_hits().first() {
                self.mode = BotMode::Target { origin, direction: None };
                self.reversed = false;
            }
        }
    }

    fn target_shot(&mut self, board: &Board, origin: Coord, direction: Option<Direction>) -> Option<Coord> {
        match direction {
            None => {
                let probe = Direction::ALL
                    .into_iter()
                    .filter_map(|d| origin.step(d))
                    .find(|&n| self.is_available(board, n));
                if probe.is_some() {
                    return probe;
                }
            }
            Some(dir) => {
                if let Some(c) = self.walk(board, origin, dir) {
                    return Some(c);
                }
                if !self.reversed {
                    self.reversed = true;
                    self.mode = BotMode::Target { origin, direction: Some(dir.opposite()) };
                    if let Some(c) = self.walk(board, origin, dir.opposite()) {
                        return Some(c);
                    }
                }
            }
        }

        // both ends closed, try around every open hit
        board
            .open_hits()
            .into_iter()
            .flat_map(|h| Direction::ALL.into_iter().filter_map(move |d| h.step(d)))
            .find(|&n| self.is_available(board, n))
    }

    // First unresolved cell past the run of hits starting at `origin`.
    fn walk(&self, board: &Board, origin: Coord, dir: Direction) -> Option<Coord> {
        let mut c = origin;
        loop {
            match c.step(dir) {
                Some(n) if board.is_hit(n) => c = n,
                Some(n) if self.is_available(board, n) => return Some(n),
                _ => return None,
            }
        }
    }

    fn hunt_shot<R: Rng + ?Sized>(&self, board: &Board, rng: &mut R) -> Option<Coord> {
        let step = board.remaining_lengths().into_iter().min().unwrap_or(1).max(1);

        let open: Vec<Coord> = Coord::all().filter(|&c| self.is_available(board, c)).collect();
        let parity: Vec<Coord> = open.iter().copied().filter(|c| (c.x + c.y) % step == 0).collect();

        if let Some(&c) = parity.choose(rng) {
            return Some(c);
        }
        if let Some(&c) = open.choose(rng) {
            return Some(c);
        }
        let leftover: Vec<Coord> = Coord::all().filter(|&c| !board.is_resolved(c)).collect();
        leftover.choose(rng).copied()
    }
}

fn line_direction(origin: Coord, to: Coord) -> Option<Direction> {
    if origin.x == to.x && origin.y != to.y {
        Some(if to.y > origin.y { Direction::Right } else { Direction::Left })
    } else if origin.y == to.y && origin.x != to.x {
        Some(if to.x > origin.x { Direction::Down } else { Direction::Up })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::placement::{auto_place, classic_layout, Layout};
    use crate::models::board::Ship;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn classic_board() -> Board {
        let mut board = Board::new();
        board.place_ships(&classic_layout()).unwrap();
        board
    }

    fn shoot(bot: &mut BotEngine, board: &mut Board, at: Coord) -> ShotOutcome {
        let outcome = board.apply_shot(at).unwrap();
        bot.observe(board, at, &outcome);
        outcome
    }

    #[test]
    fn hunt_uses_parity_of_smallest_remaining_ship() {
        let layout = Layout::from_ships(vec![Ship {
            id: 1,
            length: 4,
            cells: (0..4).map(|y| Coord::new(9, y)).collect(),
            sunk: false,
        }]);
        for seed in 0..20 {
            let mut board = Board::new();
            board.place_ships(&layout).unwrap();
            let mut bot = BotEngine::new();
            let c = bot.select(&board, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert_eq!((c.x + c.y) % 4, 0);
        }
    }

    #[test]
    fn target_probes_neighbours_then_follows_the_line() {
        let mut board = classic_board();
        let mut bot = BotEngine::new();
        let mut rng = StdRng::seed_from_u64(7);

        // middle of the three-decker on row 2
        shoot(&mut bot, &mut board, Coord::new(2, 1));
        assert_eq!(bot.mode(), BotMode::Target { origin: Coord::new(2, 1), direction: None });

        let up = bot.select(&board, &mut rng).unwrap();
        assert_eq!(up, Coord::new(1, 1));
        assert!(!shoot(&mut bot, &mut board, up).hit);

        let right = bot.select(&board, &mut rng).unwrap();
        assert_eq!(right, Coord::new(2, 2));
        assert!(shoot(&mut bot, &mut board, right).hit);
        assert_eq!(
            bot.mode(),
            BotMode::Target { origin: Coord::new(2, 1), direction: Some(Direction::Right) }
        );

        let past = bot.select(&board, &mut rng).unwrap();
        assert_eq!(past, Coord::new(2, 3));
        assert!(!shoot(&mut bot, &mut board, past).hit);

        let back = bot.select(&board, &mut rng).unwrap();
        assert_eq!(back, Coord::new(2, 0));
        assert!(shoot(&mut bot, &mut board, back).sunk);
        assert_eq!(bot.mode(), BotMode::Hunt);
    }

    #[test]
    fn sinking_excludes_the_surrounding_cells() {
        let mut board = classic_board();
        let mut bot = BotEngine::new();
        let outcome = shoot(&mut bot, &mut board, Coord::new(4, 3));
        assert!(outcome.sunk);
        assert_eq!(bot.mode(), BotMode::Hunt);
        for n in Coord::new(4, 3).surrounding() {
            assert!(bot.is_excluded(n), "{:?} should be excluded", n);
        }
        assert!(!bot.is_excluded(Coord::new(6, 6)));
    }

    #[test]
    fn resumes_target_from_open_hits() {
        let mut board = classic_board();
        board.apply_shot(Coord::new(0, 0)).unwrap();
        let mut bot = BotEngine::new();
        let next = bot.select(&board, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(next, Coord::new(0, 1));
    }

    proptest! {
        #[test]
        fn bot_sinks_any_fleet_without_repeating(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut board = Board::new();
            board.place_ships(&auto_place(&mut rng).unwrap()).unwrap();
            let mut bot = BotEngine::new();

            let mut shots = 0;
            while !board.is_fleet_destroyed() {
                let c = bot.select(&board, &mut rng).unwrap();
                prop_assert!(!board.is_resolved(c));
                let outcome = board.apply_shot(c).unwrap();
                prop_assert!(!outcome.already);
                bot.observe(&board, c, &outcome);
                shots += 1;
                prop_assert!(shots <= BOARD_SIZE * BOARD_SIZE);
            }
        }
    }
}
