//! Joint identity and per-joint storage.
//!
//! The joint set is fixed at compile time. Every per-joint table in the
//! bridge is a [`JointMap`], a plain array indexed by [`Joint`], so lookups
//! never hash and updates never allocate.

use crate::consts::JOINT_COUNT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// One controllable degree of freedom of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Joint {
    /// Left drive tread
    LeftTread = 0,
    /// Right drive tread
    RightTread = 1,
    /// Dump bin
    Bin = 2,
    /// Arm turntable
    Turntable = 3,
    /// Lower arm segment
    LowerArm = 4,
    /// Upper arm segment
    UpperArm = 5,
    /// Digging scoop
    Scoop = 6,
}

impl Joint {
    /// All joints in index order.
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::LeftTread,
        Joint::RightTread,
        Joint::Bin,
        Joint::Turntable,
        Joint::LowerArm,
        Joint::UpperArm,
        Joint::Scoop,
    ];

    /// Arm joints in the order reported by the arm pose accessor.
    pub const ARM: [Joint; crate::consts::ARM_JOINT_COUNT] = [
        Joint::Turntable,
        Joint::LowerArm,
        Joint::UpperArm,
        Joint::Scoop,
    ];

    /// Dense index of this joint.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Configuration / log name.
    pub const fn name(self) -> &'static str {
        match self {
            Joint::LeftTread => "left_tread",
            Joint::RightTread => "right_tread",
            Joint::Bin => "bin",
            Joint::Turntable => "turntable",
            Joint::LowerArm => "lower_arm",
            Joint::UpperArm => "upper_arm",
            Joint::Scoop => "scoop",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Joint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Joint::ALL
            .into_iter()
            .find(|j| j.name() == s)
            .ok_or_else(|| format!("unknown joint '{s}'"))
    }
}

/// How a joint's command is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    /// Command is a joint-space position; safe state holds the current position.
    #[default]
    Position,
    /// Command is a joint-space velocity; safe state is zero.
    Velocity,
}

/// Fixed-size table with one entry per [`Joint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMap<T>([T; JOINT_COUNT]);

impl<T> JointMap<T> {
    /// Build a map by evaluating `f` for every joint.
    pub fn from_fn(mut f: impl FnMut(Joint) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Joint::ALL[i])))
    }

    /// Iterate `(joint, &value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Joint, &T)> {
        Joint::ALL.into_iter().zip(self.0.iter())
    }

    /// Underlying array in index order.
    pub fn as_array(&self) -> &[T; JOINT_COUNT] {
        &self.0
    }
}

impl<T: Copy> JointMap<T> {
    /// Map with the same value for every joint.
    pub const fn splat(value: T) -> Self {
        Self([value; JOINT_COUNT])
    }
}

impl<T: Default> Default for JointMap<T> {
    fn default() -> Self {
        Self(std::array::from_fn(|_| T::default()))
    }
}

impl<T> Index<Joint> for JointMap<T> {
    type Output = T;

    #[inline]
    fn index(&self, joint: Joint) -> &T {
        &self.0[joint.index()]
    }
}

impl<T> IndexMut<Joint> for JointMap<T> {
    #[inline]
    fn index_mut(&mut self, joint: Joint) -> &mut T {
        &mut self.0[joint.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_indices_are_dense() {
        for (i, joint) in Joint::ALL.iter().enumerate() {
            assert_eq!(joint.index(), i);
        }
    }

    #[test]
    fn test_joint_name_round_trip() {
        for joint in Joint::ALL {
            assert_eq!(joint.name().parse::<Joint>().unwrap(), joint);
        }
        assert!("elbow".parse::<Joint>().is_err());
    }

    #[test]
    fn test_joint_serde_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            joint: Joint,
        }
        let w: Wrapper = toml::from_str("joint = \"lower_arm\"").unwrap();
        assert_eq!(w.joint, Joint::LowerArm);
        assert!(toml::to_string(&Wrapper { joint: Joint::RightTread })
            .unwrap()
            .contains("right_tread"));
    }

    #[test]
    fn test_joint_map_indexing() {
        let mut map = JointMap::splat(0.0);
        map[Joint::Scoop] = 3.0;
        assert_eq!(map[Joint::Scoop], 3.0);
        assert_eq!(map.as_array()[Joint::Scoop.index()], 3.0);
        assert_eq!(map[Joint::Bin], 0.0);
    }

    #[test]
    fn test_joint_map_from_fn_follows_index_order() {
        let map = JointMap::from_fn(|j| j.index() * 10);
        let collected: Vec<_> = map.iter().map(|(j, v)| (j, *v)).collect();
        assert_eq!(collected[0], (Joint::LeftTread, 0));
        assert_eq!(collected[6], (Joint::Scoop, 60));
    }

    #[test]
    fn test_arm_order() {
        assert_eq!(Joint::ARM[0], Joint::Turntable);
        assert_eq!(Joint::ARM[3], Joint::Scoop);
    }
}
