// Copyright (c) 2025 - Cowboy AI, LLC.

//! Propagation direction selecting the target set for a published envelope.

use crate::wire;
use serde::{Deserialize, Serialize};

/// Selects which neighbors in the parent/child graph receive a forwarded copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Deliver to the parent and to siblings (the parent's other children).
    Up,
    /// Deliver to children.
    Down,
    /// Deliver to parent, siblings, and children.
    Both,
    /// Deliver to the parent, which re-publishes Down once it receives it.
    UpThenDown,
}

impl From<Direction> for wire::Direction {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Up => wire::Direction::Up,
            Direction::Down => wire::Direction::Down,
            Direction::Both => wire::Direction::Both,
            Direction::UpThenDown => wire::Direction::UpThenDown,
        }
    }
}

impl From<wire::Direction> for Direction {
    fn from(d: wire::Direction) -> Self {
        match d {
            wire::Direction::Up => Direction::Up,
            wire::Direction::Down => Direction::Down,
            wire::Direction::Both => Direction::Both,
            wire::Direction::UpThenDown => Direction::UpThenDown,
        }
    }
}
