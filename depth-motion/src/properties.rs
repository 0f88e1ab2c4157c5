//! Tunable detector properties.
//!
//! Detectors expose their tuning knobs as named, typed and bounded properties so that tools can
//! list and adjust them without knowing the concrete type.

use anyhow::{anyhow, ensure, Result};
use std::ops::{Deref, DerefMut};

/// Object with named tuning properties.
pub trait Properties {
    /// Get available properties.
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![]
    }

    fn props(&mut self) -> Vec<(&str, Property)> {
        self.props_mut()
            .into_iter()
            .map(|(n, p)| (n, p.into()))
            .collect()
    }

    /// Parse `value` into the property called `name`.
    ///
    /// The value is clamped to the property bounds.
    fn set_prop(&mut self, name: &str, value: &str) -> Result<()> {
        let mut props = self.props_mut();

        let (_, prop) = props
            .iter_mut()
            .find(|(n, _)| *n == name)
            .ok_or_else(|| anyhow!("unknown property `{}`", name))?;

        prop.parse_set(value)
    }
}

/// Property with a lower and upper bound.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct BoundedProp<T> {
    pub val: T,
    pub min: T,
    pub max: T,
}

impl<T> Deref for BoundedProp<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.val
    }
}

impl<T> DerefMut for BoundedProp<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.val
    }
}

impl<'a, T: Copy> From<BoundedPropMut<'a, T>> for BoundedProp<T> {
    fn from(BoundedPropMut { val, min, max }: BoundedPropMut<'a, T>) -> Self {
        Self {
            val: *val,
            min,
            max,
        }
    }
}

/// Snapshot of a property value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum Property {
    Bool(bool),
    Float(BoundedProp<f32>),
    Depth(BoundedProp<u16>),
    Usize(BoundedProp<usize>),
}

impl<'a> From<PropertyMut<'a>> for Property {
    fn from(prop: PropertyMut<'a>) -> Self {
        match prop {
            PropertyMut::Bool(b) => Self::Bool(*b),
            PropertyMut::Float(p) => Self::Float(p.into()),
            PropertyMut::Depth(p) => Self::Depth(p.into()),
            PropertyMut::Usize(p) => Self::Usize(p.into()),
        }
    }
}

/// Mutable reference to a bounded value.
pub struct BoundedPropMut<'a, T> {
    pub val: &'a mut T,
    pub min: T,
    pub max: T,
}

impl<'a, T> Deref for BoundedPropMut<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.val
    }
}

impl<'a, T> DerefMut for BoundedPropMut<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.val
    }
}

impl<'a, T: PartialOrd + Copy> BoundedPropMut<'a, T> {
    /// Store `val` clamped between the lower and upper bounds.
    pub fn set_clamped(&mut self, val: T) {
        *self.val = if val < self.min {
            self.min
        } else if val > self.max {
            self.max
        } else {
            val
        };
    }
}

/// Mutable reference to a property.
pub enum PropertyMut<'a> {
    Bool(&'a mut bool),
    Float(BoundedPropMut<'a, f32>),
    Depth(BoundedPropMut<'a, u16>),
    Usize(BoundedPropMut<'a, usize>),
}

impl<'a> PropertyMut<'a> {
    /// Create a boolean property.
    ///
    /// # Arguments
    ///
    /// * `b` - reference to the underlying boolean to be mutated.
    pub fn bool(b: &'a mut bool) -> Self {
        Self::Bool(b)
    }

    /// Create a floating point property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying float to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn float(val: &'a mut f32, min: f32, max: f32) -> Self {
        Self::Float(BoundedPropMut { val, min, max })
    }

    /// Create a depth property, in millimetres.
    pub fn depth(val: &'a mut u16, min: u16, max: u16) -> Self {
        Self::Depth(BoundedPropMut { val, min, max })
    }

    /// Create an integer property.
    ///
    /// # Arguments
    ///
    /// * `val` - reference to the underlying usize to be mutated.
    /// * `min` - lowest value for the property.
    /// * `max` - highest value for the property.
    pub fn usize(val: &'a mut usize, min: usize, max: usize) -> Self {
        Self::Usize(BoundedPropMut { val, min, max })
    }

    /// Copy the value from a property snapshot of the same type, clamped to own bounds.
    ///
    /// Mismatched types are ignored.
    pub fn set(&mut self, other: &Property) {
        match (self, other) {
            (Self::Bool(b), Property::Bool(ob)) => **b = *ob,
            (Self::Float(val), Property::Float(oval)) => val.set_clamped(oval.val),
            (Self::Depth(val), Property::Depth(oval)) => val.set_clamped(oval.val),
            (Self::Usize(val), Property::Usize(oval)) => val.set_clamped(oval.val),
            _ => {}
        }
    }

    /// Parse a textual value and store it, clamped to the bounds.
    ///
    /// Non-finite floats are rejected.
    pub fn parse_set(&mut self, value: &str) -> Result<()> {
        let value = value.trim();

        match self {
            Self::Bool(b) => **b = value.parse()?,
            Self::Float(val) => {
                let v: f32 = value.parse()?;
                ensure!(v.is_finite(), "`{}` is not a finite number", value);
                val.set_clamped(v);
            }
            Self::Depth(val) => val.set_clamped(value.parse()?),
            Self::Usize(val) => val.set_clamped(value.parse()?),
        }

        Ok(())
    }
}
