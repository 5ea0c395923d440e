//! Fleet layout validation and random generation.
//!
//! Both entry points produce a [`Layout`]: the ships with their cells and the 0/1 grid the
//! client expects back. Only layouts produced here ever reach a [`Board`](crate::models::board::Board).

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ATTEMPTS_PER_SHIP, BOARD_SIZE, FLEET, MAX_RESTARTS, MAX_SHIP_LENGTH};
use crate::errors::CustomError;
use crate::models::board::{in_bounds, Coord, Ship, GRID_EMPTY, GRID_SHIP};

/// Cell as submitted by a client; may be outside the board.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellSpec {
    pub x: i64,
    pub y: i64,
}

/// Ship as submitted by a client. `sunk` is accepted for shape compatibility and ignored.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ShipSpec {
    pub id: u32,
    pub length: usize,
    pub cells: Vec<CellSpec>,
    #[serde(default)]
    pub sunk: bool,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementRule {
    OutOfBounds,
    BadLength,
    LengthMismatch,
    NotStraight,
    DuplicateId,
    Overlap,
    Adjacent,
    FleetComposition,
    BadGridSize,
    GridMismatch,
}

/// One broken rule. `ship_id` is `None` for fleet-wide rules.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementViolation {
    pub ship_id: Option<u32>,
    pub rule: PlacementRule,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    pub ships: Vec<Ship>,
    pub grid: Vec<Vec<u8>>,
}

impl Layout {
    pub fn from_ships(ships: Vec<Ship>) -> Self {
        let mut grid = vec![vec![GRID_EMPTY; BOARD_SIZE]; BOARD_SIZE];
        for c in ships.iter().flat_map(|s| s.cells.iter()) {
            grid[c.x][c.y] = GRID_SHIP;
        }
        Layout { ships, grid }
    }
}

#[derive(Default)]
struct Violations(Vec<PlacementViolation>);

impl Violations {
    fn push(&mut self, ship_id: Option<u32>, rule: PlacementRule) {
        let v = PlacementViolation { ship_id, rule };
        if !self.0.contains(&v) {
            self.0.push(v);
        }
    }
}

/// Checks a client-submitted fleet. `grid`, when present, must agree with the ship cells.
pub fn validate(ships: &[ShipSpec], size: Option<usize>, grid: Option<&[Vec<u8>]>) -> Result<Layout, Vec<PlacementViolation>> {
    let mut violations = Violations::default();
    let mut owner: [[Option<usize>; BOARD_SIZE]; BOARD_SIZE] = [[None; BOARD_SIZE]; BOARD_SIZE];
    let mut shaped: Vec<(usize, Vec<Coord>)> = Vec::new();

    if size.map_or(false, |s| s != BOARD_SIZE) {
        violations.push(None, PlacementRule::BadGridSize);
    }

    for (i, spec) in ships.iter().enumerate() {
        if ships[..i].iter().any(|other| other.id == spec.id) {
            violations.push(Some(spec.id), PlacementRule::DuplicateId);
        }
        match ship_cells(spec) {
            Ok(cells) => shaped.push((i, cells)),
            Err(rules) => rules.into_iter().for_each(|r| violations.push(Some(spec.id), r)),
        }
    }

    for (i, cells) in &shaped {
        for c in cells {
            match owner[c.x][c.y] {
                Some(_) => violations.push(Some(ships[*i].id), PlacementRule::Overlap),
                None => owner[c.x][c.y] = Some(*i),
            }
        }
    }

    for (i, cells) in &shaped {
        let touches = cells
            .iter()
            .flat_map(|c| c.surrounding())
            .any(|n| matches!(owner[n.x][n.y], Some(j) if j != *i));
        if touches {
            violations.push(Some(ships[*i].id), PlacementRule::Adjacent);
        }
    }

    let mut lengths: Vec<usize> = ships.iter().map(|s| s.length).collect();
    lengths.sort_unstable_by(|a, b| b.cmp(a));
    if lengths != FLEET {
        violations.push(None, PlacementRule::FleetComposition);
    }

    if let Some(grid) = grid {
        if grid.len() != BOARD_SIZE || grid.iter().any(|row| row.len() != BOARD_SIZE) {
            violations.push(None, PlacementRule::BadGridSize);
        } else {
            let mismatch = Coord::all().any(|c| (grid[c.x][c.y] != GRID_EMPTY) != owner[c.x][c.y].is_some());
            if mismatch {
                violations.push(None, PlacementRule::GridMismatch);
            }
        }
    }

    if !violations.0.is_empty() {
        return Err(violations.0);
    }

    let placed = shaped
        .into_iter()
        .map(|(i, cells)| Ship {
            id: ships[i].id,
            length: ships[i].length,
            cells,
            sunk: false,
        })
        .collect();
    Ok(Layout::from_ships(placed))
}

// Sorted cells of a single ship, or the shape rules it breaks.
fn ship_cells(spec: &ShipSpec) -> Result<Vec<Coord>, Vec<PlacementRule>> {
    let mut rules = Vec::new();
    if !(1..=MAX_SHIP_LENGTH).contains(&spec.length) {
        rules.push(PlacementRule::BadLength);
    }
    if spec.cells.len() != spec.length {
        rules.push(PlacementRule::LengthMismatch);
    }
    if spec.cells.iter().any(|c| !in_bounds(c.x, c.y)) {
        rules.push(PlacementRule::OutOfBounds);
        return Err(rules);
    }

    let mut cells: Vec<Coord> = spec.cells.iter().map(|c| Coord::new(c.x as usize, c.y as usize)).collect();
    cells.sort_unstable();
    let same_row = cells.iter().all(|c| c.x == cells[0].x);
    let same_col = cells.iter().all(|c| c.y == cells[0].y);
    let contiguous = cells.windows(2).all(|w| {
        (same_row && w[1].y == w[0].y + 1) || (same_col && w[1].x == w[0].x + 1)
    });
    if cells.is_empty() || !(same_row || same_col) || !contiguous {
        rules.push(PlacementRule::NotStraight);
    }

    if rules.is_empty() {
        Ok(cells)
    } else {
        Err(rules)
    }
}

/// Random fleet: ships go down largest first, each retried up to `ATTEMPTS_PER_SHIP`
/// times; a ship that cannot fit throws the whole layout away.
pub fn auto_place<R: Rng + ?Sized>(rng: &mut R) -> Result<Layout, CustomError> {
    for restart in 0..MAX_RESTARTS {
        if let Some(ships) = try_layout(rng) {
            if restart > 0 {
                debug!("Auto placement succeeded after {} restarts", restart);
            }
            return Ok(Layout::from_ships(ships));
        }
    }
    Err(CustomError::PlacementExhausted)
}

fn try_layout<R: Rng + ?Sized>(rng: &mut R) -> Option<Vec<Ship>> {
    let mut occupied = [[false; BOARD_SIZE]; BOARD_SIZE];
    let mut ships = Vec::with_capacity(FLEET.len());

    for (i, &length) in FLEET.iter().enumerate() {
        let cells = (0..ATTEMPTS_PER_SHIP).find_map(|_| {
            let horizontal = rng.gen_bool(0.5);
            let (max_x, max_y) = if horizontal {
                (BOARD_SIZE, BOARD_SIZE - length + 1)
            } else {
                (BOARD_SIZE - length + 1, BOARD_SIZE)
            };
            let origin = Coord::new(rng.gen_range(0..max_x), rng.gen_range(0..max_y));
            let cells: Vec<Coord> = (0..length)
                .map(|k| if horizontal { Coord::new(origin.x, origin.y + k) } else { Coord::new(origin.x + k, origin.y) })
                .collect();
            let free = cells
                .iter()
                .all(|c| !occupied[c.x][c.y] && c.surrounding().all(|n| !occupied[n.x][n.y]));
            free.then_some(cells)
        })?;

        for c in &cells {
            occupied[c.x][c.y] = true;
        }
        ships.push(Ship {
            id: i as u32 + 1,
            length,
            cells,
            sunk: false,
        });
    }
    Some(ships)
}

/// Fixed, valid fleet used across tests. The four-decker sits on (0,0)..(0,3).
#[cfg(test)]
pub(crate) fn classic_specs() -> Vec<ShipSpec> {
    let ship = |id: u32, cells: &[(i64, i64)]| ShipSpec {
        id,
        length: cells.len(),
        cells: cells.iter().map(|&(x, y)| CellSpec { x, y }).collect(),
        sunk: false,
    };
    vec![
        ship(1, &[(0, 0), (0, 1), (0, 2), (0, 3)]),
        ship(2, &[(0, 5), (0, 6), (0, 7)]),
        ship(3, &[(2, 0), (2, 1), (2, 2)]),
        ship(4, &[(2, 4), (2, 5)]),
        ship(5, &[(2, 7), (2, 8)]),
        ship(6, &[(4, 0), (4, 1)]),
        ship(7, &[(4, 3)]),
        ship(8, &[(4, 5)]),
        ship(9, &[(4, 7)]),
        ship(10, &[(4, 9)]),
    ]
}

#[cfg(test)]
pub(crate) fn classic_layout() -> Layout {
    validate(&classic_specs(), None, None).expect("classic layout is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn specs_of(layout: &Layout) -> Vec<ShipSpec> {
        layout
            .ships
            .iter()
            .map(|s| ShipSpec {
                id: s.id,
                length: s.length,
                cells: s.cells.iter().map(|c| CellSpec { x: c.x as i64, y: c.y as i64 }).collect(),
                sunk: false,
            })
            .collect()
    }

    fn rules(result: Result<Layout, Vec<PlacementViolation>>) -> Vec<PlacementViolation> {
        result.expect_err("layout should be rejected")
    }

    #[test]
    fn classic_fleet_is_accepted_with_matching_grid() {
        let layout = classic_layout();
        assert_eq!(layout.ships.len(), 10);
        assert_eq!(layout.grid.iter().flatten().filter(|&&v| v == GRID_SHIP).count(), 20);
        assert!(validate(&classic_specs(), Some(10), Some(&layout.grid)).is_ok());
    }

    #[test]
    fn overlapping_ships_are_rejected() {
        let mut specs = classic_specs();
        specs[9].cells = vec![CellSpec { x: 0, y: 0 }];
        let violations = rules(validate(&specs, None, None));
        assert!(violations.contains(&PlacementViolation { ship_id: Some(10), rule: PlacementRule::Overlap }));
    }

    #[test]
    fn diagonal_contact_is_rejected() {
        let mut specs = classic_specs();
        // touches (2,2) of ship 3 on the diagonal
        specs[9].cells = vec![CellSpec { x: 3, y: 3 }];
        let violations = rules(validate(&specs, None, None));
        assert!(violations.contains(&PlacementViolation { ship_id: Some(10), rule: PlacementRule::Adjacent }));
        assert!(violations.contains(&PlacementViolation { ship_id: Some(3), rule: PlacementRule::Adjacent }));
    }

    #[test]
    fn wrong_fleet_composition_is_rejected() {
        let mut specs = classic_specs();
        specs.pop();
        let violations = rules(validate(&specs, None, None));
        assert_eq!(violations, vec![PlacementViolation { ship_id: None, rule: PlacementRule::FleetComposition }]);
    }

    #[test]
    fn bent_and_out_of_bounds_ships_are_itemized() {
        let mut specs = classic_specs();
        specs[3].cells = vec![CellSpec { x: 6, y: 0 }, CellSpec { x: 7, y: 1 }];
        specs[4].cells = vec![CellSpec { x: 9, y: 9 }, CellSpec { x: 9, y: 10 }];
        let violations = rules(validate(&specs, None, None));
        assert!(violations.contains(&PlacementViolation { ship_id: Some(4), rule: PlacementRule::NotStraight }));
        assert!(violations.contains(&PlacementViolation { ship_id: Some(5), rule: PlacementRule::OutOfBounds }));
    }

    #[test]
    fn grid_must_agree_with_ships() {
        let mut grid = classic_layout().grid;
        grid[9][9] = GRID_SHIP;
        let violations = rules(validate(&classic_specs(), None, Some(&grid)));
        assert_eq!(violations, vec![PlacementViolation { ship_id: None, rule: PlacementRule::GridMismatch }]);

        let violations = rules(validate(&classic_specs(), Some(8), None));
        assert_eq!(violations, vec![PlacementViolation { ship_id: None, rule: PlacementRule::BadGridSize }]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut specs = classic_specs();
        specs[9].id = 9;
        let violations = rules(validate(&specs, None, None));
        assert!(violations.contains(&PlacementViolation { ship_id: Some(9), rule: PlacementRule::DuplicateId }));
    }

    proptest! {
        #[test]
        fn auto_layout_always_passes_manual_validation(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let layout = auto_place(&mut rng).unwrap();
            let revalidated = validate(&specs_of(&layout), Some(BOARD_SIZE), Some(&layout.grid));
            prop_assert_eq!(revalidated, Ok(layout));
        }
    }
}
