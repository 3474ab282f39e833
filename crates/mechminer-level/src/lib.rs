//! Reference tile-platformer environment.
//!
//! Levels are bordered grids of empty, solid, spike and exit tiles. The agent
//! walks, jumps and settles under a configurable gravity; every tunable that
//! drives this behaviour is published as an editable field so the miner can
//! build mechanics from it. Camera fields are published too but have no
//! effect on play.

pub mod env;
pub mod layout;
pub mod params;

pub use env::{IDLE, JUMP, LEFT, LevelEnvironment, LevelFactory, RIGHT, SPECIAL};
pub use layout::{LevelLayout, Tile};
pub use params::Parameters;
