//! Tile layouts: seeded generation and ASCII parsing.

use mechminer_core::{EnvironmentError, GridPosition};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};

const MIN_ELEMENTS: usize = 2;
const MAX_ELEMENTS: usize = 20;
const GENERATION_RETRIES: usize = 32;
const SPIKE_CHANCE: f64 = 0.3;

/// Contents of a single tile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Tile {
    #[default]
    Empty,
    Solid,
    Spike,
    Exit,
}

impl Tile {
    #[must_use]
    pub const fn is_solid(self) -> bool {
        matches!(self, Tile::Solid)
    }

    const fn glyph(self) -> char {
        match self {
            Tile::Empty => '.',
            Tile::Solid => '#',
            Tile::Spike => '^',
            Tile::Exit => 'E',
        }
    }
}

/// Rectangular level enclosed by a solid border.
///
/// Coordinates grow rightwards and upwards; row 0 is the bottom border.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelLayout {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
    entry: GridPosition,
    exit: GridPosition,
}

impl LevelLayout {
    fn bordered(interior_width: i32, interior_height: i32) -> Self {
        let width = interior_width + 2;
        let height = interior_height + 2;
        let mut tiles = vec![Tile::Empty; (width * height) as usize];
        for y in 0..height {
            for x in 0..width {
                if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                    tiles[(y * width + x) as usize] = Tile::Solid;
                }
            }
        }
        Self {
            width,
            height,
            tiles,
            entry: GridPosition::new(1, 1),
            exit: GridPosition::new(interior_width, 1),
        }
    }

    /// Random layout with 2 to 20 box and platform elements.
    ///
    /// Fails when no distinct empty entry and exit tiles can be found after a
    /// bounded number of retries.
    pub fn generate(
        seed: u64,
        interior_width: usize,
        interior_height: usize,
    ) -> Result<Self, EnvironmentError> {
        let (Ok(width), Ok(height)) =
            (i32::try_from(interior_width), i32::try_from(interior_height))
        else {
            return Err(EnvironmentError::Construction(
                "level dimensions out of range".to_string(),
            ));
        };
        if width < 2 || height < 2 {
            return Err(EnvironmentError::Construction(format!(
                "interior {width}x{height} is too small"
            )));
        }

        let mut rng = SmallRng::seed_from_u64(seed);
        for _ in 0..GENERATION_RETRIES {
            let mut layout = Self::bordered(width, height);
            let elements = rng.random_range(MIN_ELEMENTS..=MAX_ELEMENTS);
            for _ in 0..elements {
                if rng.random_bool(0.5) {
                    layout.place_box(&mut rng);
                } else {
                    layout.place_platform(&mut rng);
                }
            }
            let empties: Vec<GridPosition> = layout
                .interior_positions()
                .filter(|position| layout.tile(*position) == Tile::Empty)
                .collect();
            if empties.len() < 2 {
                continue;
            }
            let entry = empties[rng.random_range(0..empties.len())];
            let exit = empties[rng.random_range(0..empties.len())];
            if entry == exit {
                continue;
            }
            layout.entry = entry;
            layout.exit = exit;
            layout.set(exit, Tile::Exit);
            return Ok(layout);
        }
        Err(EnvironmentError::Construction(format!(
            "no distinct entry and exit after {GENERATION_RETRIES} attempts"
        )))
    }

    fn place_box(&mut self, rng: &mut SmallRng) {
        let w = rng.random_range(1..=3);
        let h = rng.random_range(1..=3);
        let x0 = rng.random_range(1..=self.interior_width());
        let y0 = rng.random_range(1..=self.interior_height());
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                self.set_interior(GridPosition::new(x, y), Tile::Solid);
            }
        }
    }

    fn place_platform(&mut self, rng: &mut SmallRng) {
        let length = rng.random_range(2..=6);
        let x0 = rng.random_range(1..=self.interior_width());
        let y = rng.random_range(1..=self.interior_height());
        let spiked = rng.random_bool(SPIKE_CHANCE);
        for x in x0..x0 + length {
            self.set_interior(GridPosition::new(x, y), Tile::Solid);
            if spiked {
                self.set_interior(GridPosition::new(x, y + 1), Tile::Spike);
            }
        }
    }

    /// Parse rows of `#` (solid), `^` (spike), `S` (entry), `E` (exit) and `.` (empty).
    ///
    /// The first row is the top of the level. A solid border is added around
    /// the parsed interior.
    pub fn parse(ascii: &str) -> Result<Self, EnvironmentError> {
        let rows: Vec<&str> = ascii
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let Some(first) = rows.first() else {
            return Err(EnvironmentError::Construction("empty layout".to_string()));
        };
        let width = first.chars().count();
        if rows.iter().any(|row| row.chars().count() != width) {
            return Err(EnvironmentError::Construction(
                "layout rows differ in width".to_string(),
            ));
        }
        let (Ok(width), Ok(height)) = (i32::try_from(width), i32::try_from(rows.len())) else {
            return Err(EnvironmentError::Construction(
                "layout too large".to_string(),
            ));
        };

        let mut layout = Self::bordered(width, height);
        let mut entry = None;
        let mut exit = None;
        for (row_index, row) in rows.iter().enumerate() {
            let y = height - row_index as i32;
            for (column, glyph) in row.chars().enumerate() {
                let position = GridPosition::new(column as i32 + 1, y);
                let tile = match glyph {
                    '#' => Tile::Solid,
                    '^' => Tile::Spike,
                    '.' => Tile::Empty,
                    'S' => {
                        entry = Some(position);
                        Tile::Empty
                    }
                    'E' => {
                        exit = Some(position);
                        Tile::Exit
                    }
                    other => {
                        return Err(EnvironmentError::Construction(format!(
                            "unknown tile `{other}`"
                        )));
                    }
                };
                layout.set(position, tile);
            }
        }
        match (entry, exit) {
            (Some(entry), Some(exit)) => {
                layout.entry = entry;
                layout.exit = exit;
                Ok(layout)
            }
            _ => Err(EnvironmentError::Construction(
                "layout needs one `S` and one `E`".to_string(),
            )),
        }
    }

    #[must_use]
    pub fn interior_width(&self) -> i32 {
        self.width - 2
    }

    #[must_use]
    pub fn interior_height(&self) -> i32 {
        self.height - 2
    }

    /// Interior tile count used to normalize coverage.
    #[must_use]
    pub fn interior_size(&self) -> usize {
        (self.interior_width() * self.interior_height()) as usize
    }

    #[must_use]
    pub fn entry(&self) -> GridPosition {
        self.entry
    }

    #[must_use]
    pub fn exit(&self) -> GridPosition {
        self.exit
    }

    fn index(&self, position: GridPosition) -> Option<usize> {
        let inside =
            (0..self.width).contains(&position.x) && (0..self.height).contains(&position.y);
        inside.then(|| (position.y * self.width + position.x) as usize)
    }

    /// Tile at `position`; anything outside the level is solid.
    #[must_use]
    pub fn tile(&self, position: GridPosition) -> Tile {
        self.index(position)
            .map_or(Tile::Solid, |index| self.tiles[index])
    }

    #[must_use]
    pub fn is_interior(&self, position: GridPosition) -> bool {
        (1..=self.interior_width()).contains(&position.x)
            && (1..=self.interior_height()).contains(&position.y)
    }

    fn set(&mut self, position: GridPosition, tile: Tile) {
        if let Some(index) = self.index(position) {
            self.tiles[index] = tile;
        }
    }

    fn set_interior(&mut self, position: GridPosition, tile: Tile) {
        if self.is_interior(position) {
            self.set(position, tile);
        }
    }

    pub fn interior_positions(&self) -> impl Iterator<Item = GridPosition> + '_ {
        (1..=self.interior_height())
            .flat_map(move |y| (1..=self.interior_width()).map(move |x| GridPosition::new(x, y)))
    }

    /// ASCII rendering in the format accepted by [`LevelLayout::parse`].
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for y in (1..=self.interior_height()).rev() {
            for x in 1..=self.interior_width() {
                let position = GridPosition::new(x, y);
                let glyph = if position == self.entry {
                    'S'
                } else {
                    self.tile(position).glyph()
                };
                out.push(glyph);
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRIDOR: &str = "
        ......
        S....E
    ";

    #[test]
    fn parses_ascii_layout() {
        let layout = LevelLayout::parse(CORRIDOR).expect("layout");
        assert_eq!(layout.interior_width(), 6);
        assert_eq!(layout.interior_height(), 2);
        assert_eq!(layout.interior_size(), 12);
        assert_eq!(layout.entry(), GridPosition::new(1, 1));
        assert_eq!(layout.exit(), GridPosition::new(6, 1));
        assert_eq!(layout.tile(GridPosition::new(0, 1)), Tile::Solid);
        assert_eq!(layout.tile(GridPosition::new(3, 0)), Tile::Solid);
        assert_eq!(layout.tile(GridPosition::new(-4, 40)), Tile::Solid);
    }

    #[test]
    fn rejects_malformed_layouts() {
        assert!(LevelLayout::parse("").is_err());
        assert!(LevelLayout::parse("S..\n..").is_err());
        assert!(LevelLayout::parse("S.x.E").is_err());
        assert!(LevelLayout::parse("......").is_err());
    }

    #[test]
    fn generation_is_seeded() {
        let first = LevelLayout::generate(17, 10, 10).expect("layout");
        let second = LevelLayout::generate(17, 10, 10).expect("layout");
        assert_eq!(first, second);
        assert_ne!(first.entry(), first.exit());
        assert_eq!(first.tile(first.exit()), Tile::Exit);
        assert_eq!(first.tile(first.entry()), Tile::Empty);
        assert_eq!(first.interior_size(), 100);
    }

    #[test]
    fn render_round_trips_through_parse() {
        let layout = LevelLayout::generate(3, 8, 6).expect("layout");
        let parsed = LevelLayout::parse(&layout.render()).expect("parse");
        assert_eq!(parsed, layout);
    }

    #[test]
    fn tiny_interiors_are_rejected() {
        assert!(LevelLayout::generate(1, 1, 5).is_err());
    }
}
