//! Editable parameters of the platformer and their catalog.

use mechminer_core::{
    FieldDescriptor, FieldValue, Genotype, GenotypeError, Locus, Rect, TargetCatalog,
    capability::quaternion_rotate,
};

pub const PLAYER: &str = "player";
pub const PLAYER_CONTROLLER: &str = "PlayerController";
pub const TRANSFORM: &str = "Transform";
pub const PHYSICS: &str = "physics";
pub const PHYSICS_2D: &str = "Physics2D";
pub const LEVEL: &str = "level";
pub const LEVEL_RULES: &str = "LevelRules";
pub const CAMERA: &str = "camera";
pub const CAMERA_COMPONENT: &str = "Camera";

const IDENTITY_MATRIX: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Live values of every toggleable parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub speed: f64,
    pub jumping_power: f64,
    pub max_air_jumps: u64,
    /// Enum index: 0 faces left, 1 faces right.
    pub facing: u32,
    pub gravity: [f64; 2],
    pub gravity_scale: f64,
    pub orientation: [f64; 4],
    pub spikes_lethal: bool,
    pub wrap_horizontal: bool,
    pub zoom: f64,
    pub bounds: Rect,
    pub layer_transform: [f64; 9],
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            speed: 1.0,
            jumping_power: 2.0,
            max_air_jumps: 0,
            facing: 1,
            gravity: [0.0, -1.0],
            gravity_scale: 1.0,
            orientation: [0.0, 0.0, 0.0, 1.0],
            spikes_lethal: true,
            wrap_horizontal: false,
            zoom: 1.0,
            bounds: Rect {
                x: 0.0,
                y: 0.0,
                width: 16.0,
                height: 9.0,
            },
            layer_transform: IDENTITY_MATRIX,
        }
    }
}

impl Parameters {
    /// Descriptors for every field, reflecting the current values.
    #[must_use]
    pub fn catalog(&self, player_position: [f64; 2]) -> TargetCatalog {
        let player =
            |field: &str, value| FieldDescriptor::new(PLAYER, PLAYER_CONTROLLER, field, value);
        let physics = |field: &str, value| FieldDescriptor::new(PHYSICS, PHYSICS_2D, field, value);
        let rules = |field: &str, value| FieldDescriptor::new(LEVEL, LEVEL_RULES, field, value);
        let camera =
            |field: &str, value| FieldDescriptor::new(CAMERA, CAMERA_COMPONENT, field, value);
        TargetCatalog::new(vec![
            player("speed", FieldValue::Number(self.speed)),
            player("jumping_power", FieldValue::Number(self.jumping_power)),
            player("max_air_jumps", FieldValue::Unsigned(self.max_air_jumps)),
            player(
                "facing",
                FieldValue::Enum {
                    index: self.facing,
                    count: 2,
                },
            ),
            FieldDescriptor::new(
                PLAYER,
                TRANSFORM,
                "position",
                FieldValue::Vector2(player_position),
            )
            .read_only(),
            physics("gravity", FieldValue::Vector2(self.gravity)),
            physics("gravity_scale", FieldValue::Number(self.gravity_scale)),
            physics("orientation", FieldValue::Quaternion(self.orientation)),
            rules("spikes_lethal", FieldValue::Bool(self.spikes_lethal)),
            rules("wrap_horizontal", FieldValue::Bool(self.wrap_horizontal)),
            camera("zoom", FieldValue::Number(self.zoom)),
            camera("bounds", FieldValue::Rect(self.bounds)),
            camera("layer_transform", FieldValue::Matrix(self.layer_transform)),
        ])
    }

    /// Current value of the field addressed by `genotype`.
    #[must_use]
    pub fn get(&self, genotype: &Genotype) -> Option<FieldValue> {
        let value = match (
            genotype.object_id.as_str(),
            genotype.component_id.as_str(),
            genotype.field_id.as_str(),
        ) {
            (PLAYER, PLAYER_CONTROLLER, "speed") => FieldValue::Number(self.speed),
            (PLAYER, PLAYER_CONTROLLER, "jumping_power") => FieldValue::Number(self.jumping_power),
            (PLAYER, PLAYER_CONTROLLER, "max_air_jumps") => {
                FieldValue::Unsigned(self.max_air_jumps)
            }
            (PLAYER, PLAYER_CONTROLLER, "facing") => FieldValue::Enum {
                index: self.facing,
                count: 2,
            },
            (PHYSICS, PHYSICS_2D, "gravity") => FieldValue::Vector2(self.gravity),
            (PHYSICS, PHYSICS_2D, "gravity_scale") => FieldValue::Number(self.gravity_scale),
            (PHYSICS, PHYSICS_2D, "orientation") => FieldValue::Quaternion(self.orientation),
            (LEVEL, LEVEL_RULES, "spikes_lethal") => FieldValue::Bool(self.spikes_lethal),
            (LEVEL, LEVEL_RULES, "wrap_horizontal") => FieldValue::Bool(self.wrap_horizontal),
            (CAMERA, CAMERA_COMPONENT, "zoom") => FieldValue::Number(self.zoom),
            (CAMERA, CAMERA_COMPONENT, "bounds") => FieldValue::Rect(self.bounds),
            (CAMERA, CAMERA_COMPONENT, "layer_transform") => {
                FieldValue::Matrix(self.layer_transform)
            }
            _ => return None,
        };
        Some(value)
    }

    /// Write `value` into the field addressed by `genotype`.
    pub fn set(&mut self, genotype: &Genotype, value: FieldValue) -> Result<(), GenotypeError> {
        let target = (
            genotype.object_id.as_str(),
            genotype.component_id.as_str(),
            genotype.field_id.as_str(),
        );
        match (target, value) {
            ((PLAYER, PLAYER_CONTROLLER, "speed"), FieldValue::Number(v)) => self.speed = v,
            ((PLAYER, PLAYER_CONTROLLER, "jumping_power"), FieldValue::Number(v)) => {
                self.jumping_power = v;
            }
            ((PLAYER, PLAYER_CONTROLLER, "max_air_jumps"), FieldValue::Unsigned(v)) => {
                self.max_air_jumps = v;
            }
            ((PLAYER, PLAYER_CONTROLLER, "facing"), FieldValue::Enum { index, .. }) => {
                self.facing = index;
            }
            ((PHYSICS, PHYSICS_2D, "gravity"), FieldValue::Vector2(v)) => self.gravity = v,
            ((PHYSICS, PHYSICS_2D, "gravity_scale"), FieldValue::Number(v)) => {
                self.gravity_scale = v;
            }
            ((PHYSICS, PHYSICS_2D, "orientation"), FieldValue::Quaternion(v)) => {
                self.orientation = v;
            }
            ((LEVEL, LEVEL_RULES, "spikes_lethal"), FieldValue::Bool(v)) => self.spikes_lethal = v,
            ((LEVEL, LEVEL_RULES, "wrap_horizontal"), FieldValue::Bool(v)) => {
                self.wrap_horizontal = v;
            }
            ((CAMERA, CAMERA_COMPONENT, "zoom"), FieldValue::Number(v)) => self.zoom = v,
            ((CAMERA, CAMERA_COMPONENT, "bounds"), FieldValue::Rect(v)) => self.bounds = v,
            ((CAMERA, CAMERA_COMPONENT, "layer_transform"), FieldValue::Matrix(v)) => {
                self.layer_transform = v;
            }
            _ => {
                return Err(GenotypeError::InvalidReplay {
                    locus: Locus::Field,
                    name: genotype.field_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Unit step the agent falls along, or `None` when gravity vanishes.
    #[must_use]
    pub fn gravity_direction(&self) -> Option<(i32, i32)> {
        let [gx, gy] = self.gravity;
        let rotated = quaternion_rotate(self.orientation, [gx, gy, 0.0]);
        let x = rotated[0] * self.gravity_scale;
        let y = rotated[1] * self.gravity_scale;
        let magnitude = x.hypot(y);
        if !(magnitude > 1e-9) {
            return None;
        }
        let direction = ((x / magnitude).round() as i32, (y / magnitude).round() as i32);
        (direction != (0, 0)).then_some(direction)
    }

    /// Tiles moved per horizontal step; negative speeds walk backwards.
    #[must_use]
    pub fn stride(&self) -> i32 {
        rounded_tiles(self.speed)
    }

    /// Tiles risen per jump.
    #[must_use]
    pub fn jump_height(&self) -> i32 {
        rounded_tiles(self.jumping_power)
    }
}

fn rounded_tiles(value: f64) -> i32 {
    if value.is_finite() {
        value.round().clamp(-16.0, 16.0) as i32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mechminer_core::ModifierKind;

    #[test]
    fn catalog_mirrors_registry() {
        let params = Parameters::default();
        let catalog = params.catalog([1.0, 1.0]);
        for descriptor in catalog.iter().filter(|field| field.writable) {
            let genotype = Genotype::new(
                descriptor.object_id.clone(),
                descriptor.component_id.clone(),
                descriptor.field_id.clone(),
                ModifierKind::Invert,
            );
            assert_eq!(params.get(&genotype), Some(descriptor.value));
        }
    }

    #[test]
    fn default_gravity_points_down() {
        assert_eq!(Parameters::default().gravity_direction(), Some((0, -1)));
    }

    #[test]
    fn inverted_scale_flips_gravity() {
        let params = Parameters {
            gravity_scale: -1.0,
            ..Parameters::default()
        };
        assert_eq!(params.gravity_direction(), Some((0, 1)));
    }

    #[test]
    fn zero_gravity_has_no_direction() {
        let params = Parameters {
            gravity: [0.0, 0.0],
            ..Parameters::default()
        };
        assert_eq!(params.gravity_direction(), None);
    }

    #[test]
    fn mismatched_value_kind_is_rejected() {
        let mut params = Parameters::default();
        let genotype = Genotype::new(PLAYER, PLAYER_CONTROLLER, "speed", ModifierKind::Double);
        assert!(params.set(&genotype, FieldValue::Bool(true)).is_err());
        params
            .set(&genotype, FieldValue::Number(3.0))
            .expect("number accepted");
        assert_eq!(params.stride(), 3);
    }
}
