//! Tokens and the color stack.
//!
//! A token is a live execution point moving through the graph. Its color
//! stack records which split firings it is inside: each `parallel_split`
//! firing mints a fresh color and pushes it, and the matching
//! `parallel_sync` pops it, restoring the pre-split color. Nested splits
//! therefore stack cleanly, and arrivals at a sync are keyed by the top
//! color so a loop re-entering a split can never mix waves.

use sequor_core::types::NodeId;
use std::time::Instant;

/// An opaque color identifier minted by the scheduler.
///
/// Color 0 is the shared root color of all start tokens.
pub type Color = u64;

/// The root color carried by start tokens.
pub const ROOT_COLOR: Color = 0;

/// A stack of colors, bottom first.
///
/// Never empty: popping the last entry leaves the root stack intact, so a
/// sync reached outside any split region still has a color to account
/// under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorStack(Vec<Color>);

impl ColorStack {
    /// The root stack `[0]`.
    pub fn root() -> Self {
        Self(vec![ROOT_COLOR])
    }

    /// The current (topmost) color.
    pub fn color(&self) -> Color {
        self.0.last().copied().unwrap_or(ROOT_COLOR)
    }

    /// The color below the top, if any.
    pub fn parent_color(&self) -> Option<Color> {
        let len = self.0.len();
        (len >= 2).then(|| self.0[len - 2])
    }

    /// A new stack with `color` pushed.
    #[must_use]
    pub fn push(&self, color: Color) -> Self {
        let mut colors = self.0.clone();
        colors.push(color);
        Self(colors)
    }

    /// A new stack with the top color popped. The root entry is never
    /// removed.
    #[must_use]
    pub fn pop(&self) -> Self {
        if self.0.len() <= 1 {
            return self.clone();
        }
        let mut colors = self.0.clone();
        colors.pop();
        Self(colors)
    }

    /// Nesting depth (1 for the root stack).
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl Default for ColorStack {
    fn default() -> Self {
        Self::root()
    }
}

/// A live execution point.
#[derive(Debug, Clone)]
pub struct Token {
    /// The node this token is at.
    pub node_id: NodeId,
    /// The node whose transition created this token. `None` for the
    /// initial start seeds. Sync nodes account arrivals by this origin.
    pub origin: Option<NodeId>,
    /// The color stack of this token.
    pub colors: ColorStack,
    /// When the token was created, for queue-latency diagnostics.
    pub created_at: Instant,
}

impl Token {
    /// Create a start seed token at the root color.
    pub fn seed(node_id: NodeId) -> Self {
        Self {
            node_id,
            origin: None,
            colors: ColorStack::root(),
            created_at: Instant::now(),
        }
    }

    /// Create a token produced by a fired transition.
    pub fn fired(node_id: NodeId, origin: NodeId, colors: ColorStack) -> Self {
        Self {
            node_id,
            origin: Some(origin),
            colors,
            created_at: Instant::now(),
        }
    }

    /// The token's current color.
    pub fn color(&self) -> Color {
        self.colors.color()
    }
}
