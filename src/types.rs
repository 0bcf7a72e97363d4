//! Core value types shared by the identity table, the classifier and the pool

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer identity of a screen. ID 0 always belongs to the primary connector.
pub type ScreenId = u32;

/// Output rectangle in the global (virtual desktop) coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Both dimensions are zero (nothing reported at all)
    pub fn is_null(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// At least one dimension is zero or negative
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Non-strict containment: `other` may share edges with `self`.
    /// Empty rectangles are never contained and never contain anything.
    pub fn contains(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        other.left() >= self.left()
            && other.right() <= self.right()
            && other.top() >= self.top()
            && other.bottom() <= self.bottom()
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Opaque handle of one reported output, stable for as long as it stays connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputHandle(pub u64);

impl fmt::Display for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// One output as reported by the display server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub handle: OutputHandle,
    /// Connector name (e.g. "eDP-1"); may be empty for placeholder outputs
    pub name: String,
    pub geometry: Rect,
}

impl Output {
    pub fn new(handle: OutputHandle, name: impl Into<String>, geometry: Rect) -> Self {
        Self {
            handle,
            name: name.into(),
            geometry,
        }
    }
}

/// Change in the logical screen set (after fake and redundant outputs are filtered out)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "output", rename_all = "snake_case")]
pub enum ScreenEvent {
    Added(Output),
    Removed(Output),
}

impl ScreenEvent {
    pub fn output(&self) -> &Output {
        match self {
            ScreenEvent::Added(output) | ScreenEvent::Removed(output) => output,
        }
    }
}
