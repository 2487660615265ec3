//! Per-frame render list
//!
//! Rebuilt from scratch every frame. Opaque items are drawn front to back,
//! transparent items back to front, each after the material render order.

use std::cmp::Ordering;

use super::geometry::SharedGeometry;
use super::material::SharedMaterial;
use crate::foundation::math::Mat4;
use crate::scene::NodeId;

/// One drawable selected for this frame
#[derive(Debug, Clone)]
pub struct RenderItem {
    /// Drawable node
    pub node: NodeId,
    /// Geometry to draw
    pub geometry: SharedGeometry,
    /// Material to draw with
    pub material: SharedMaterial,
    /// World matrix at traversal time
    pub world_matrix: Mat4,
    /// Distance along the view direction
    pub depth: f32,
    /// Material render order
    pub render_order: i32,
}

/// Opaque and transparent drawables for one frame
#[derive(Debug, Default)]
pub struct RenderList {
    opaque: Vec<RenderItem>,
    transparent: Vec<RenderItem>,
}

fn compare(a: &RenderItem, b: &RenderItem, depth: Ordering) -> Ordering {
    a.render_order.cmp(&b.render_order).then(depth)
}

impl RenderList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every item, keeping the allocations
    pub fn reset(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
    }

    /// Append an item
    pub fn add(&mut self, item: RenderItem, transparent: bool) {
        if transparent {
            self.transparent.push(item);
        } else {
            self.opaque.push(item);
        }
    }

    /// Stable sort: render order first, then opaque near to far and (when
    /// `sort_transparent`) transparent far to near. Ties keep traversal order.
    pub fn sort(&mut self, sort_transparent: bool) {
        self.opaque.sort_by(|a, b| {
            compare(a, b, a.depth.partial_cmp(&b.depth).unwrap_or(Ordering::Equal))
        });
        if sort_transparent {
            self.transparent.sort_by(|a, b| {
                compare(a, b, b.depth.partial_cmp(&a.depth).unwrap_or(Ordering::Equal))
            });
        } else {
            self.transparent
                .sort_by(|a, b| a.render_order.cmp(&b.render_order));
        }
    }

    /// Opaque items then transparent items
    pub fn iter(&self) -> impl Iterator<Item = &RenderItem> {
        self.opaque.iter().chain(self.transparent.iter())
    }

    /// Opaque items
    pub fn opaque(&self) -> &[RenderItem] {
        &self.opaque
    }

    /// Transparent items
    pub fn transparent(&self) -> &[RenderItem] {
        &self.transparent
    }

    /// Total items
    pub fn len(&self) -> usize {
        self.opaque.len() + self.transparent.len()
    }

    /// Whether nothing was added
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.transparent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::geometry::Geometry;
    use crate::render::material::Material;
    use slotmap::SlotMap;

    fn items(count: usize) -> Vec<RenderItem> {
        let mut nodes: SlotMap<NodeId, ()> = SlotMap::with_key();
        let geometry = Geometry::cube(1.0).into_shared();
        let material = Material::basic().into_shared();
        (0..count)
            .map(|_| RenderItem {
                node: nodes.insert(()),
                geometry: geometry.clone(),
                material: material.clone(),
                world_matrix: Mat4::identity(),
                depth: 0.0,
                render_order: 0,
            })
            .collect()
    }

    #[test]
    fn test_opaque_front_to_back_transparent_back_to_front() {
        let mut list = RenderList::new();
        let mut all = items(4);
        let depths = [5.0, 1.0, 3.0, 9.0];
        for (item, d) in all.iter_mut().zip(depths) {
            item.depth = d;
        }
        let ids: Vec<NodeId> = all.iter().map(|i| i.node).collect();
        let mut it = all.into_iter();
        list.add(it.next().unwrap(), false);
        list.add(it.next().unwrap(), false);
        list.add(it.next().unwrap(), true);
        list.add(it.next().unwrap(), true);

        list.sort(true);
        let order: Vec<NodeId> = list.iter().map(|i| i.node).collect();
        assert_eq!(order, vec![ids[1], ids[0], ids[3], ids[2]]);
    }

    #[test]
    fn test_render_order_wins_and_ties_are_stable() {
        let mut list = RenderList::new();
        let mut all = items(3);
        all[0].render_order = 1;
        all[0].depth = 0.5;
        all[1].depth = 2.0;
        all[2].depth = 2.0;
        let ids: Vec<NodeId> = all.iter().map(|i| i.node).collect();
        for item in all {
            list.add(item, false);
        }

        list.sort(true);
        let order: Vec<NodeId> = list.iter().map(|i| i.node).collect();
        assert_eq!(order, vec![ids[1], ids[2], ids[0]]);
        list.reset();
        assert!(list.is_empty());
    }
}
