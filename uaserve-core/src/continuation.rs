//! Continuation points for paged browse results.

use crate::error::CoreError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::trace;
use uaserve_types::service::ReferenceDescription;
use uuid::Uuid;

struct StoredPoint {
    remaining: VecDeque<ReferenceDescription>,
    page_size: usize,
}

/// Per-session store of unfinished browse traversals.
///
/// Tokens are opaque random byte strings; a point releases itself when its
/// last page is taken and everything vanishes when the session closes.
pub struct ContinuationPointManager {
    max_points: usize,
    points: Mutex<HashMap<Vec<u8>, StoredPoint>>,
}

impl ContinuationPointManager {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points: max_points.max(1),
            points: Mutex::new(HashMap::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.points.lock().len()
    }

    /// Takes the first page of a result set, parking the remainder under a
    /// fresh token when it does not fit.
    ///
    /// A page size of zero means unlimited.
    pub fn register(
        &self,
        max_per_page: usize,
        references: Vec<ReferenceDescription>,
    ) -> Result<(Vec<ReferenceDescription>, Option<Vec<u8>>), CoreError> {
        if max_per_page == 0 || references.len() <= max_per_page {
            return Ok((references, None));
        }

        let mut points = self.points.lock();
        if points.len() >= self.max_points {
            return Err(CoreError::NoContinuationPoints);
        }

        let mut remaining: VecDeque<ReferenceDescription> = references.into();
        let page: Vec<ReferenceDescription> = remaining.drain(..max_per_page).collect();
        let token = Uuid::new_v4().as_bytes().to_vec();
        points.insert(
            token.clone(),
            StoredPoint {
                remaining,
                page_size: max_per_page,
            },
        );
        trace!("continuation point registered ({} left)", points.len());
        Ok((page, Some(token)))
    }

    /// Takes the next page for a token. The token stays valid while results
    /// remain and is released automatically on the final page.
    pub fn get_next(
        &self,
        token: &[u8],
    ) -> Result<(Vec<ReferenceDescription>, Option<Vec<u8>>), CoreError> {
        let mut points = self.points.lock();
        let point = points
            .get_mut(token)
            .ok_or(CoreError::ContinuationPointInvalid)?;

        let take = point.page_size.min(point.remaining.len());
        let page: Vec<ReferenceDescription> = point.remaining.drain(..take).collect();
        if point.remaining.is_empty() {
            points.remove(token);
            Ok((page, None))
        } else {
            Ok((page, Some(token.to_vec())))
        }
    }

    /// Releases a token without returning further results.
    pub fn cancel(&self, token: &[u8]) -> Result<(), CoreError> {
        self.points
            .lock()
            .remove(token)
            .map(|_| ())
            .ok_or(CoreError::ContinuationPointInvalid)
    }

    /// Drops every point, e.g. when the owning session closes.
    pub fn clear(&self) {
        self.points.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uaserve_types::service::NodeClass;
    use uaserve_types::NodeId;

    fn references(count: usize) -> Vec<ReferenceDescription> {
        (0..count)
            .map(|i| ReferenceDescription {
                reference_type_id: NodeId::numeric(0, 35),
                is_forward: true,
                node_id: NodeId::numeric(2, i as u32),
                browse_name: format!("Node{}", i),
                display_name: format!("Node {}", i),
                node_class: NodeClass::Variable,
            })
            .collect()
    }

    #[test]
    fn test_small_result_needs_no_token() {
        let manager = ContinuationPointManager::new(10);
        let (page, token) = manager.register(100, references(50)).unwrap();
        assert_eq!(page.len(), 50);
        assert!(token.is_none());
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_zero_page_size_means_unlimited() {
        let manager = ContinuationPointManager::new(10);
        let (page, token) = manager.register(0, references(500)).unwrap();
        assert_eq!(page.len(), 500);
        assert!(token.is_none());
    }

    #[test]
    fn test_paging_until_exhaustion() {
        let manager = ContinuationPointManager::new(10);
        let (page, token) = manager.register(100, references(250)).unwrap();
        assert_eq!(page.len(), 100);
        let token = token.unwrap();

        let (page, token2) = manager.get_next(&token).unwrap();
        assert_eq!(page.len(), 100);
        assert_eq!(token2.as_deref(), Some(token.as_slice()));

        let (page, token3) = manager.get_next(&token).unwrap();
        assert_eq!(page.len(), 50);
        assert!(token3.is_none());
        assert_eq!(manager.count(), 0);

        // The token died with its last page
        assert!(matches!(
            manager.get_next(&token),
            Err(CoreError::ContinuationPointInvalid)
        ));
    }

    #[test]
    fn test_pages_preserve_order() {
        let manager = ContinuationPointManager::new(10);
        let (page, token) = manager.register(2, references(5)).unwrap();
        assert_eq!(page[0].browse_name, "Node0");
        assert_eq!(page[1].browse_name, "Node1");
        let (page, _) = manager.get_next(&token.unwrap()).unwrap();
        assert_eq!(page[0].browse_name, "Node2");
    }

    #[test]
    fn test_cancel_releases_token() {
        let manager = ContinuationPointManager::new(10);
        let (_, token) = manager.register(1, references(5)).unwrap();
        let token = token.unwrap();
        manager.cancel(&token).unwrap();
        assert!(manager.cancel(&token).is_err());
        assert!(manager.get_next(&token).is_err());
    }

    #[test]
    fn test_point_limit() {
        let manager = ContinuationPointManager::new(1);
        let (_, first) = manager.register(1, references(3)).unwrap();
        assert!(first.is_some());
        assert!(matches!(
            manager.register(1, references(3)),
            Err(CoreError::NoContinuationPoints)
        ));
    }

    #[test]
    fn test_clear_drops_everything() {
        let manager = ContinuationPointManager::new(10);
        let (_, token) = manager.register(1, references(3)).unwrap();
        manager.clear();
        assert!(manager.get_next(&token.unwrap()).is_err());
    }
}
