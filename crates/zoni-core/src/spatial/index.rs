//! R-tree over feature envelopes, built once per layer per request.

use geo::{BoundingRect, Rect};
use rstar::{RTree, RTreeObject, AABB};

use crate::spatial::provider::Feature;

#[derive(Debug, Clone, Copy)]
pub struct IndexedEnvelope {
    pub index: usize,
    pub aabb: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Envelope index of a feature slice; hits are positions into that slice.
pub struct FeatureIndex {
    tree: RTree<IndexedEnvelope>,
}

fn aabb_of(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

impl FeatureIndex {
    pub fn build(features: &[Feature]) -> Self {
        let items: Vec<IndexedEnvelope> = features
            .iter()
            .enumerate()
            .filter_map(|(index, feature)| {
                let rect = feature.geometry.bounding_rect()?;
                Some(IndexedEnvelope {
                    index,
                    aabb: aabb_of(&rect),
                })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Features whose envelope intersects `rect`, in ascending feature order.
    pub fn candidates(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&aabb_of(rect))
            .map(|item| item.index)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Features whose envelope covers the point, in ascending feature order.
    pub fn candidates_at(&self, x: f64, y: f64) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .map(|item| item.index)
            .collect();
        hits.sort_unstable();
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::geometry::tests::rect;
    use crate::spatial::provider::Attributes;
    use geo::{coord, point};

    fn features() -> Vec<Feature> {
        vec![
            Feature::new(rect(0.0, 0.0, 10.0, 10.0), Attributes::new()),
            Feature::new(rect(20.0, 0.0, 30.0, 10.0), Attributes::new()),
            Feature::new(point!(x: 5.0, y: 5.0), Attributes::new()),
        ]
    }

    #[test]
    fn test_candidates_are_sorted_feature_positions() {
        let index = FeatureIndex::build(&features());
        assert_eq!(index.len(), 3);
        let all = index.candidates(&Rect::new(coord! { x: -1.0, y: -1.0 }, coord! { x: 31.0, y: 11.0 }));
        assert_eq!(all, vec![0, 1, 2]);
        let right = index.candidates(&Rect::new(coord! { x: 25.0, y: 2.0 }, coord! { x: 26.0, y: 3.0 }));
        assert_eq!(right, vec![1]);
    }

    #[test]
    fn test_point_lookup() {
        let index = FeatureIndex::build(&features());
        assert_eq!(index.candidates_at(5.0, 5.0), vec![0, 2]);
        assert!(index.candidates_at(15.0, 5.0).is_empty());
        assert!(FeatureIndex::build(&[]).is_empty());
    }
}
