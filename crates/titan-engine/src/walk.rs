//! Depth-first walk over a scene's item tree.

use crate::{ItemInfo, MediaEngine, SourceId};

/// An item yielded by [`ItemWalk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedItem {
    pub item: ItemInfo,

    /// Nesting depth; 0 for items placed directly in the scene.
    pub depth: usize,
}

/// Iterator over every item of a scene, descending into groups.
///
/// Items are yielded pre-order: a group item comes before its children.
/// Each level is fetched from the engine when the walk reaches it.
pub struct ItemWalk<'a, E: ?Sized> {
    engine: &'a E,
    stack: Vec<std::vec::IntoIter<ItemInfo>>,
}

impl<'a, E: MediaEngine + ?Sized> ItemWalk<'a, E> {
    /// Start a walk at the top level of `scene`.
    pub fn new(engine: &'a E, scene: SourceId) -> Self {
        Self {
            engine,
            stack: vec![engine.scene_items(scene).into_iter()],
        }
    }
}

impl<E: MediaEngine + ?Sized> Iterator for ItemWalk<'_, E> {
    type Item = WalkedItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let depth = self.stack.len().checked_sub(1)?;
            match self.stack[depth].next() {
                Some(item) => {
                    if item.is_group() {
                        self.stack.push(self.engine.scene_items(item.source).into_iter());
                    }
                    return Some(WalkedItem { item, depth });
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
