//! Layer map with an undoable list of brush edits.

use common::Buffer2;


/// Axis-aligned pixel rectangle. Empty when `width` or `height` is 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Smallest rectangle containing all `points`.
    fn bounding(points: &[(i32, i32)]) -> Self {
        let Some(&(first_x, first_y)) = points.first() else {
            return Self::default();
        };
        let (mut x0, mut y0, mut x1, mut y1) = (first_x, first_y, first_x, first_y);
        for &(x, y) in points {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        Self {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        }
    }
}

#[derive(Debug, Clone)]
struct EditAction {
    old_layer: u8,
    new_layer: u8,
    points: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, Default)]
pub struct EditableMask {
    layers: Buffer2<u8>,
    actions: Vec<EditAction>,
    /// Actions before this index are applied, the rest can be redone.
    next_action: usize,
}

impl EditableMask {
    pub fn new(layers: Buffer2<u8>) -> Self {
        Self {
            layers,
            actions: Vec::new(),
            next_action: 0,
        }
    }

    #[inline]
    pub fn layers(&self) -> &Buffer2<u8> {
        &self.layers
    }

    /// Layer at mask pixel `(x, y)`.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u8 {
        self.layers[(x, y)]
    }

    /// Replaces the layer map and forgets the edit history.
    pub fn reset(&mut self, layers: Buffer2<u8>) {
        self.layers = layers;
        self.actions.clear();
        self.next_action = 0;
    }

    /// Begins a brush stroke, discarding any undone actions.
    ///
    /// Adding moves pixels of layer `layer + 1` to `layer`; removing moves
    /// pixels of `layer` to `layer + 1`.
    pub fn start_action(&mut self, add: bool, layer: u8) {
        self.actions.truncate(self.next_action);
        let next = layer.saturating_add(1);
        let (old_layer, new_layer) = if add { (next, layer) } else { (layer, next) };
        self.actions.push(EditAction {
            old_layer,
            new_layer,
            points: Vec::new(),
        });
        self.next_action = self.actions.len();
    }

    /// Applies the current stroke to the disc of `radius` around `(x, y)`.
    ///
    /// Only pixels of the action's old layer change, and only where
    /// `is_valid(new_layer, x, y)` holds.
    pub fn paint<F>(&mut self, x: i32, y: i32, radius: i32, is_valid: F)
    where
        F: Fn(u8, i32, i32) -> bool,
    {
        if self.next_action != self.actions.len() {
            return;
        }
        let Some(action) = self.actions.last_mut() else {
            return;
        };
        let (old_layer, new_layer) = (action.old_layer, action.new_layer);
        self.layers.for_each_in_disc(x, y, radius, |px, py, layer| {
            if *layer == old_layer && is_valid(new_layer, px, py) {
                action.points.push((px, py));
                *layer = new_layer;
            }
        });
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        self.next_action > 0
    }

    #[inline]
    pub fn can_redo(&self) -> bool {
        self.next_action < self.actions.len()
    }

    /// Reverts the last applied action and returns the area it touched.
    pub fn undo(&mut self) -> Rect {
        if !self.can_undo() {
            return Rect::default();
        }
        self.next_action -= 1;
        let action = &self.actions[self.next_action];
        Self::modify_layer(&mut self.layers, &action.points, action.old_layer)
    }

    /// Reapplies the next undone action and returns the area it touched.
    pub fn redo(&mut self) -> Rect {
        if !self.can_redo() {
            return Rect::default();
        }
        let action = &self.actions[self.next_action];
        let rect = Self::modify_layer(&mut self.layers, &action.points, action.new_layer);
        self.next_action += 1;
        rect
    }

    fn modify_layer(layers: &mut Buffer2<u8>, points: &[(i32, i32)], layer: u8) -> Rect {
        for &(x, y) in points {
            *layers.at_mut(x, y) = layer;
        }
        Rect::bounding(points)
    }
}
