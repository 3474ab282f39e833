//! Discrete platformer implementing the environment contract.

use mechminer_core::{
    Action, Environment, EnvironmentError, EnvironmentFactory, FieldValue, Genotype,
    GenotypeError, GridPosition, Locus, StepOutcome, TargetCatalog, replay_genotype,
};
use std::sync::Arc;
use tracing::debug;

use crate::layout::{LevelLayout, Tile};
use crate::params::Parameters;

pub const LEFT: Action = Action(0);
pub const RIGHT: Action = Action(1);
pub const JUMP: Action = Action(2);
/// Switches the installed mechanic on or off.
pub const SPECIAL: Action = Action(3);
pub const IDLE: Action = Action(4);

const ACTIONS: [Action; 5] = [LEFT, RIGHT, JUMP, SPECIAL, IDLE];

#[derive(Debug, Clone)]
struct Mechanic {
    genotype: Genotype,
    base: FieldValue,
    modified: FieldValue,
    active: bool,
}

/// One playable instance of a level.
#[derive(Debug, Clone)]
pub struct LevelEnvironment {
    layout: Arc<LevelLayout>,
    defaults: Parameters,
    params: Parameters,
    mechanic: Option<Mechanic>,
    position: GridPosition,
    facing: i32,
    air_jumps_used: u64,
    catalog: TargetCatalog,
}

impl LevelEnvironment {
    #[must_use]
    pub fn new(layout: Arc<LevelLayout>) -> Self {
        let defaults = Parameters::default();
        let entry = layout.entry();
        let catalog = defaults.catalog([f64::from(entry.x), f64::from(entry.y)]);
        let mut env = Self {
            layout,
            params: defaults.clone(),
            defaults,
            mechanic: None,
            position: entry,
            facing: 1,
            air_jumps_used: 0,
            catalog,
        };
        env.reset();
        env
    }

    #[must_use]
    pub fn layout(&self) -> &LevelLayout {
        &self.layout
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Whether the installed mechanic currently holds its modified value.
    #[must_use]
    pub fn mechanic_active(&self) -> bool {
        self.mechanic.as_ref().is_some_and(|mechanic| mechanic.active)
    }

    fn settle_limit(&self) -> i32 {
        self.layout.interior_width() + self.layout.interior_height()
    }

    /// Move one tile; returns false when blocked or when a hazard respawned the agent.
    fn move_once(&mut self, dx: i32, dy: i32) -> bool {
        let mut target = GridPosition::new(self.position.x + dx, self.position.y + dy);
        if self.params.wrap_horizontal && dx != 0 {
            let width = self.layout.interior_width();
            if target.x < 1 {
                target.x = width;
            } else if target.x > width {
                target.x = 1;
            }
        }
        match self.layout.tile(target) {
            Tile::Solid => false,
            Tile::Spike if self.params.spikes_lethal => {
                self.position = self.layout.entry();
                self.air_jumps_used = 0;
                false
            }
            _ => {
                self.position = target;
                true
            }
        }
    }

    fn walk(&mut self, tiles: i32) {
        let direction = tiles.signum();
        for _ in 0..tiles.abs() {
            if !self.move_once(direction, 0) {
                break;
            }
        }
    }

    fn up_direction(&self) -> (i32, i32) {
        self.params
            .gravity_direction()
            .map_or((0, 1), |(gx, gy)| (-gx, -gy))
    }

    fn grounded(&self) -> bool {
        self.params.gravity_direction().is_some_and(|(gx, gy)| {
            let below = GridPosition::new(self.position.x + gx, self.position.y + gy);
            self.layout.tile(below).is_solid()
        })
    }

    fn settle(&mut self) {
        let Some((gx, gy)) = self.params.gravity_direction() else {
            return;
        };
        for _ in 0..self.settle_limit() {
            if !self.move_once(gx, gy) {
                break;
            }
        }
        if self.grounded() {
            self.air_jumps_used = 0;
        }
    }

    fn jump(&mut self) {
        if !self.grounded() {
            if self.air_jumps_used >= self.params.max_air_jumps {
                return;
            }
            self.air_jumps_used += 1;
        }
        let (ux, uy) = self.up_direction();
        let height = self.params.jump_height();
        let (ux, uy) = if height < 0 { (-ux, -uy) } else { (ux, uy) };
        for _ in 0..height.abs() {
            if !self.move_once(ux, uy) {
                break;
            }
        }
        self.walk(self.facing * self.params.stride());
    }

    fn toggle_mechanic(&mut self) {
        let Some(mechanic) = self.mechanic.as_mut() else {
            return;
        };
        mechanic.active = !mechanic.active;
        let value = if mechanic.active {
            mechanic.modified
        } else {
            mechanic.base
        };
        let genotype = mechanic.genotype.clone();
        // The field was validated when the mechanic was installed.
        if self.params.set(&genotype, value).is_err() {
            debug!(%genotype, "mechanic toggle rejected");
        }
    }

    fn reward(&self) -> f64 {
        1.0 / (1.0 + self.position.distance(self.layout.exit()))
    }
}

impl Environment for LevelEnvironment {
    fn reset(&mut self) {
        self.params = self.defaults.clone();
        if let Some(mechanic) = self.mechanic.as_mut() {
            mechanic.active = true;
            let genotype = mechanic.genotype.clone();
            let value = mechanic.modified;
            if self.params.set(&genotype, value).is_err() {
                debug!(%genotype, "mechanic could not be reinstalled");
            }
        }
        self.position = self.layout.entry();
        self.facing = if self.params.facing == 0 { -1 } else { 1 };
        self.air_jumps_used = 0;
        self.settle();
    }

    fn step(&mut self, action: Action, _iteration: u32) -> StepOutcome {
        match action {
            LEFT => {
                self.facing = -1;
                self.walk(-self.params.stride());
            }
            RIGHT => {
                self.facing = 1;
                self.walk(self.params.stride());
            }
            JUMP => self.jump(),
            SPECIAL => self.toggle_mechanic(),
            _ => {}
        }
        self.settle();
        StepOutcome {
            position: self.position,
            reward: self.reward(),
            is_terminal: self.layout.tile(self.position) == Tile::Exit,
            can_repeat: action != SPECIAL,
        }
    }

    fn teleport_to(&mut self, position: GridPosition) {
        self.position = position;
    }

    fn current_position(&self) -> GridPosition {
        self.position
    }

    fn action_space(&self) -> &[Action] {
        &ACTIONS
    }

    fn idle_action(&self) -> Action {
        IDLE
    }

    fn level_interior_size(&self) -> usize {
        self.layout.interior_size()
    }

    fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }

    fn apply_genotype(&mut self, genotype: &Genotype) -> Result<(), GenotypeError> {
        let genotype = replay_genotype(&self.catalog, genotype)?;
        let base = self
            .defaults
            .get(&genotype)
            .ok_or_else(|| GenotypeError::InvalidReplay {
                locus: Locus::Field,
                name: genotype.field_id.clone(),
            })?;
        let modified = base
            .apply(genotype.modifier)
            .ok_or_else(|| GenotypeError::InvalidModifier {
                field: genotype.field_id.clone(),
                kind: base.kind(),
                modifier: genotype.modifier,
            })?;
        self.mechanic = Some(Mechanic {
            genotype,
            base,
            modified,
            active: true,
        });
        self.reset();
        Ok(())
    }
}

/// Builds environments that all share one layout.
#[derive(Debug, Clone)]
pub struct LevelFactory {
    layout: Arc<LevelLayout>,
    catalog: TargetCatalog,
}

impl LevelFactory {
    #[must_use]
    pub fn new(layout: LevelLayout) -> Self {
        let layout = Arc::new(layout);
        let catalog = LevelEnvironment::new(Arc::clone(&layout)).catalog;
        Self { layout, catalog }
    }

    /// Factory over a freshly generated layout.
    pub fn generated(
        level_seed: u64,
        interior_width: usize,
        interior_height: usize,
    ) -> Result<Self, EnvironmentError> {
        LevelLayout::generate(level_seed, interior_width, interior_height).map(Self::new)
    }

    #[must_use]
    pub fn layout(&self) -> &LevelLayout {
        &self.layout
    }
}

impl EnvironmentFactory for LevelFactory {
    fn build(&self, seed: u64) -> Result<Box<dyn Environment>, EnvironmentError> {
        debug!(seed, "building level environment");
        Ok(Box::new(LevelEnvironment::new(Arc::clone(&self.layout))))
    }

    fn catalog(&self) -> &TargetCatalog {
        &self.catalog
    }
}
