//! Viewer identity threading
//!
//! Every read path takes a [`Viewer`] instead of an `Option<i32>` so that
//! per-viewer EXISTS checks against edge tables uniformly resolve to false
//! for unauthenticated requests, without a null branch at each call site.

use serde::{Deserialize, Serialize};

use super::errors::{CoreError, Result};

/// Identity of the authenticated caller, or the anonymous sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewer(i32);

impl Viewer {
    /// Sentinel identity that never matches a user row. User ids are
    /// positive autoincrement integers, so -1 makes every edge existence
    /// check come back false.
    pub const ANONYMOUS: Viewer = Viewer(-1);

    pub fn user(id: i32) -> Self {
        Viewer(id)
    }

    /// Raw id for query parameters. Safe to embed in EXISTS subqueries
    /// even when anonymous.
    pub fn id(&self) -> i32 {
        self.0
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == Self::ANONYMOUS.0
    }

    /// Resolve to a concrete user id, failing for mutations that need one.
    pub fn require(&self) -> Result<i32> {
        if self.is_anonymous() {
            Err(CoreError::Unauthenticated)
        } else {
            Ok(self.0)
        }
    }
}

impl From<Option<i32>> for Viewer {
    fn from(id: Option<i32>) -> Self {
        match id {
            Some(id) => Viewer::user(id),
            None => Viewer::ANONYMOUS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_viewer_fails_require() {
        assert!(Viewer::ANONYMOUS.require().is_err());
        assert!(Viewer::ANONYMOUS.is_anonymous());
    }

    #[test]
    fn user_viewer_resolves() {
        let viewer = Viewer::user(7);
        assert_eq!(viewer.require().unwrap(), 7);
        assert!(!viewer.is_anonymous());
    }

    #[test]
    fn option_conversion_uses_sentinel() {
        assert_eq!(Viewer::from(None), Viewer::ANONYMOUS);
        assert_eq!(Viewer::from(Some(3)), Viewer::user(3));
    }
}
