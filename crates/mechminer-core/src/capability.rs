//! Capability registry describing the editable fields an environment exposes.
//!
//! Environments publish a flat list of [`FieldDescriptor`]s at construction time.
//! Each descriptor carries the field's current [`FieldValue`]; the value's
//! [`ValueKind`] decides which [`ModifierKind`]s may be applied to it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rotation applied by the additive quaternion modifiers (radians about +Z).
const QUATERNION_STEP: f64 = std::f64::consts::FRAC_PI_4;

/// Edit applied to a field when a mechanic is toggled on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ModifierKind {
    Double,
    Half,
    Invert,
    Add,
    Subtract,
}

impl ModifierKind {
    /// Every modifier, in canonical order.
    pub const ALL: [ModifierKind; 5] = [
        ModifierKind::Double,
        ModifierKind::Half,
        ModifierKind::Invert,
        ModifierKind::Add,
        ModifierKind::Subtract,
    ];

    /// Stable identifier used in genotypes and persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Half => "half",
            Self::Invert => "invert",
            Self::Add => "add",
            Self::Subtract => "subtract",
        }
    }
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown modifier identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown modifier `{0}`")]
pub struct UnknownModifier(pub String);

impl FromStr for ModifierKind {
    type Err = UnknownModifier;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownModifier(value.to_string()))
    }
}

/// Shape of a field's value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Number,
    Unsigned,
    Vector2,
    Vector3,
    Vector4,
    Quaternion,
    Matrix,
    Rect,
    Enum,
}

const FULL_MODIFIERS: &[ModifierKind] = &ModifierKind::ALL;
const BOOL_MODIFIERS: &[ModifierKind] = &[ModifierKind::Invert];
const UNSIGNED_MODIFIERS: &[ModifierKind] = &[
    ModifierKind::Double,
    ModifierKind::Half,
    ModifierKind::Add,
    ModifierKind::Subtract,
];
const ENUM_MODIFIERS: &[ModifierKind] = &[ModifierKind::Add, ModifierKind::Subtract];

impl ValueKind {
    /// Modifiers that are meaningful for this kind of value.
    #[must_use]
    pub const fn valid_modifiers(self) -> &'static [ModifierKind] {
        match self {
            Self::Bool => BOOL_MODIFIERS,
            Self::Unsigned => UNSIGNED_MODIFIERS,
            Self::Enum => ENUM_MODIFIERS,
            Self::Number
            | Self::Vector2
            | Self::Vector3
            | Self::Vector4
            | Self::Quaternion
            | Self::Matrix
            | Self::Rect => FULL_MODIFIERS,
        }
    }

    /// Whether `modifier` may be applied to values of this kind.
    #[must_use]
    pub fn accepts(self, modifier: ModifierKind) -> bool {
        self.valid_modifiers().contains(&modifier)
    }

    /// Stable identifier used in persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Number => "number",
            Self::Unsigned => "unsigned",
            Self::Vector2 => "vector2",
            Self::Vector3 => "vector3",
            Self::Vector4 => "vector4",
            Self::Quaternion => "quaternion",
            Self::Matrix => "matrix",
            Self::Rect => "rect",
            Self::Enum => "enum",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned rectangle in level units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Tagged union over every value shape an editable field can hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Unsigned(u64),
    Vector2([f64; 2]),
    Vector3([f64; 3]),
    Vector4([f64; 4]),
    /// Components stored as `[x, y, z, w]`.
    Quaternion([f64; 4]),
    /// Row-major 3x3 matrix.
    Matrix([f64; 9]),
    Rect(Rect),
    Enum { index: u32, count: u32 },
}

impl FieldValue {
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Number(_) => ValueKind::Number,
            Self::Unsigned(_) => ValueKind::Unsigned,
            Self::Vector2(_) => ValueKind::Vector2,
            Self::Vector3(_) => ValueKind::Vector3,
            Self::Vector4(_) => ValueKind::Vector4,
            Self::Quaternion(_) => ValueKind::Quaternion,
            Self::Matrix(_) => ValueKind::Matrix,
            Self::Rect(_) => ValueKind::Rect,
            Self::Enum { .. } => ValueKind::Enum,
        }
    }

    /// Apply `modifier`, returning `None` when it is not valid for this value's kind.
    #[must_use]
    pub fn apply(&self, modifier: ModifierKind) -> Option<FieldValue> {
        if !self.kind().accepts(modifier) {
            return None;
        }
        let value = match *self {
            Self::Bool(value) => Self::Bool(!value),
            Self::Number(value) => Self::Number(scalar(value, modifier)),
            Self::Unsigned(value) => Self::Unsigned(unsigned(value, modifier)),
            Self::Vector2(value) => Self::Vector2(value.map(|v| scalar(v, modifier))),
            Self::Vector3(value) => Self::Vector3(value.map(|v| scalar(v, modifier))),
            Self::Vector4(value) => Self::Vector4(value.map(|v| scalar(v, modifier))),
            Self::Quaternion(value) => Self::Quaternion(quaternion(value, modifier)),
            Self::Matrix(value) => Self::Matrix(matrix(value, modifier)),
            Self::Rect(rect) => Self::Rect(rectangle(rect, modifier)),
            Self::Enum { index, count } => Self::Enum {
                index: enumeration(index, count, modifier),
                count,
            },
        };
        Some(value)
    }

    /// Whether applying `modifier` yields a value different from the current one.
    #[must_use]
    pub fn changes_under(&self, modifier: ModifierKind) -> bool {
        self.apply(modifier).is_some_and(|modified| modified != *self)
    }

    /// Modifiers valid for this value that actually change it.
    #[must_use]
    pub fn effective_modifiers(&self) -> Vec<ModifierKind> {
        self.kind()
            .valid_modifiers()
            .iter()
            .copied()
            .filter(|modifier| self.changes_under(*modifier))
            .collect()
    }

    /// True when every valid modifier leaves the value unchanged.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.effective_modifiers().is_empty()
    }
}

fn scalar(value: f64, modifier: ModifierKind) -> f64 {
    match modifier {
        ModifierKind::Double => value * 2.0,
        ModifierKind::Half => value / 2.0,
        ModifierKind::Invert => -value,
        ModifierKind::Add => value + 1.0,
        ModifierKind::Subtract => value - 1.0,
    }
}

fn unsigned(value: u64, modifier: ModifierKind) -> u64 {
    match modifier {
        ModifierKind::Double => value.saturating_mul(2),
        ModifierKind::Half => value / 2,
        ModifierKind::Add => value.saturating_add(1),
        ModifierKind::Subtract => value.saturating_sub(1),
        ModifierKind::Invert => value,
    }
}

fn enumeration(index: u32, count: u32, modifier: ModifierKind) -> u32 {
    if count <= 1 {
        return index;
    }
    match modifier {
        ModifierKind::Add => (index + 1) % count,
        ModifierKind::Subtract => (index + count - 1) % count,
        _ => index,
    }
}

fn rectangle(rect: Rect, modifier: ModifierKind) -> Rect {
    match modifier {
        ModifierKind::Double => Rect {
            width: rect.width * 2.0,
            height: rect.height * 2.0,
            ..rect
        },
        ModifierKind::Half => Rect {
            width: rect.width / 2.0,
            height: rect.height / 2.0,
            ..rect
        },
        ModifierKind::Invert => Rect {
            width: -rect.width,
            height: -rect.height,
            ..rect
        },
        ModifierKind::Add => Rect {
            x: rect.x + 1.0,
            y: rect.y + 1.0,
            ..rect
        },
        ModifierKind::Subtract => Rect {
            x: rect.x - 1.0,
            y: rect.y - 1.0,
            ..rect
        },
    }
}

/// Hamilton product `a * b` for `[x, y, z, w]` quaternions.
#[must_use]
pub fn quaternion_mul(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    let [ax, ay, az, aw] = a;
    let [bx, by, bz, bw] = b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}

/// Rotate a 3D vector by a (not necessarily unit) quaternion.
#[must_use]
pub fn quaternion_rotate(q: [f64; 4], v: [f64; 3]) -> [f64; 3] {
    let norm_sq = q.iter().map(|c| c * c).sum::<f64>();
    if norm_sq == 0.0 {
        return v;
    }
    let conjugate = [-q[0] / norm_sq, -q[1] / norm_sq, -q[2] / norm_sq, q[3] / norm_sq];
    let rotated = quaternion_mul(quaternion_mul(q, [v[0], v[1], v[2], 0.0]), conjugate);
    [rotated[0], rotated[1], rotated[2]]
}

fn z_rotation(angle: f64) -> [f64; 4] {
    let half = angle * 0.5;
    [0.0, 0.0, half.sin(), half.cos()]
}

fn quaternion(q: [f64; 4], modifier: ModifierKind) -> [f64; 4] {
    match modifier {
        // Twice the rotation.
        ModifierKind::Double => quaternion_mul(q, q),
        // Half the rotation: normalize(q + identity).
        ModifierKind::Half => {
            let sum = [q[0], q[1], q[2], q[3] + 1.0];
            let norm = sum.iter().map(|c| c * c).sum::<f64>().sqrt();
            if norm == 0.0 {
                q
            } else {
                sum.map(|c| c / norm)
            }
        }
        ModifierKind::Invert => {
            let norm_sq = q.iter().map(|c| c * c).sum::<f64>();
            if norm_sq == 0.0 {
                q
            } else {
                [-q[0] / norm_sq, -q[1] / norm_sq, -q[2] / norm_sq, q[3] / norm_sq]
            }
        }
        ModifierKind::Add => quaternion_mul(q, z_rotation(QUATERNION_STEP)),
        ModifierKind::Subtract => quaternion_mul(q, z_rotation(-QUATERNION_STEP)),
    }
}

fn matrix(m: [f64; 9], modifier: ModifierKind) -> [f64; 9] {
    match modifier {
        ModifierKind::Double => m.map(|v| v * 2.0),
        ModifierKind::Half => m.map(|v| v / 2.0),
        ModifierKind::Invert => matrix_inverse(m).unwrap_or(m),
        ModifierKind::Add => m.map(|v| v + 1.0),
        ModifierKind::Subtract => m.map(|v| v - 1.0),
    }
}

fn matrix_inverse(m: [f64; 9]) -> Option<[f64; 9]> {
    let [a, b, c, d, e, f, g, h, i] = m;
    let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv = 1.0 / det;
    Some([
        (e * i - f * h) * inv,
        (c * h - b * i) * inv,
        (b * f - c * e) * inv,
        (f * g - d * i) * inv,
        (a * i - c * g) * inv,
        (c * d - a * f) * inv,
        (d * h - e * g) * inv,
        (b * g - a * h) * inv,
        (a * e - b * d) * inv,
    ])
}

/// One editable field published by an environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDescriptor {
    /// Addressable object owning the component (e.g. `player`).
    pub object_id: String,
    /// Property owner on the object (e.g. `PlayerController`).
    pub component_id: String,
    /// Field name on the component.
    pub field_id: String,
    /// Current value; also defines the field's kind.
    pub value: FieldValue,
    /// Whether the environment accepts writes to this field.
    pub writable: bool,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(
        object_id: impl Into<String>,
        component_id: impl Into<String>,
        field_id: impl Into<String>,
        value: FieldValue,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            component_id: component_id.into(),
            field_id: field_id.into(),
            value,
            writable: true,
        }
    }

    /// Mark the field as read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Whether a mechanic can be built on this field.
    #[must_use]
    pub fn is_toggleable(&self) -> bool {
        self.writable && !self.value.is_inert()
    }
}

/// Declarative catalog of every field an environment exposes for editing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TargetCatalog {
    fields: Vec<FieldDescriptor>,
}

impl TargetCatalog {
    #[must_use]
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    /// Distinct object identifiers in publication order.
    #[must_use]
    pub fn objects(&self) -> Vec<&str> {
        let mut objects: Vec<&str> = Vec::new();
        for field in &self.fields {
            if !objects.contains(&field.object_id.as_str()) {
                objects.push(&field.object_id);
            }
        }
        objects
    }

    /// Distinct `(object, component)` pairs in publication order.
    #[must_use]
    pub fn components(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for field in &self.fields {
            let pair = (field.object_id.as_str(), field.component_id.as_str());
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs
    }

    /// Distinct components owned by `object`.
    #[must_use]
    pub fn components_of(&self, object: &str) -> Vec<&str> {
        self.components()
            .into_iter()
            .filter(|(owner, _)| *owner == object)
            .map(|(_, component)| component)
            .collect()
    }

    /// Fields of one component, in publication order.
    pub fn fields_of<'a>(
        &'a self,
        object: &'a str,
        component: &'a str,
    ) -> impl Iterator<Item = &'a FieldDescriptor> + 'a {
        self.fields
            .iter()
            .filter(move |field| field.object_id == object && field.component_id == component)
    }

    /// Exact lookup of a single field.
    #[must_use]
    pub fn field(&self, object: &str, component: &str, field: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|descriptor| {
            descriptor.object_id == object
                && descriptor.component_id == component
                && descriptor.field_id == field
        })
    }
}
