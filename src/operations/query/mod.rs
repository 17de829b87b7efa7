//! Shared list-query policy: pagination, ordering, geographic and scope
//! filters
//!
//! Every aggregated read in the crate is parameterized by the same shape:
//! `{ text query?, order, reverse, page, bounding box?, scope }`. The services
//! own their SQL; this module owns the validated parameter types so bad input
//! is rejected before any query is built.

use std::str::FromStr;

use sea_orm::sea_query::Order;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::shared::{CoreError, Result};

/// A latitude/longitude pair, used in display views and request positions
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Offset/limit window, applied after ordering
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u64 = 10;
    pub const MAX_LIMIT: u64 = 100;

    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Limit clamped into 1..=100 (0 falls back to the default page size)
    pub fn clamped(&self) -> (u64, u64) {
        let limit = match self.limit {
            0 => Self::DEFAULT_LIMIT,
            n => n.min(Self::MAX_LIMIT),
        };
        (self.offset, limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// One page of display views plus the size of the filtered-but-unpaginated set
#[derive(Clone, Debug, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}

/// Ordering keys for maps, restaurants and diaries
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString)]
pub enum EngagementOrder {
    #[strum(serialize = "collectCount")]
    CollectCount,
    #[strum(serialize = "createTime")]
    CreateTime,
}

/// Ordering keys for user listings
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString)]
pub enum UserOrder {
    #[strum(serialize = "following")]
    Following,
    #[strum(serialize = "createTime")]
    CreateTime,
}

/// Parse a wire orderBy value, failing before any query construction
pub fn parse_order<O>(value: &str) -> Result<O>
where
    O: FromStr,
{
    O::from_str(value)
        .map_err(|_| CoreError::InvalidArgument(format!("unknown orderBy value: {value}")))
}

/// Primary sort direction. Counts default to descending (most engaged
/// first), creation time to newest first; `reverse` flips it. The id
/// tie-break stays ascending either way so pagination is stable.
pub fn direction(reverse: bool) -> Order {
    if reverse {
        Order::Asc
    } else {
        Order::Desc
    }
}

/// Inclusive per-axis bounding box for restaurant queries.
///
/// This is a range check on latitude and longitude independently, not true
/// geodesic containment; boxes crossing the antimeridian are rejected rather
/// than wrapped.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Build from southwest/northeast corners, validating the shape
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self> {
        let bbox = Self {
            south,
            west,
            north,
            east,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.south) || !(-90.0..=90.0).contains(&self.north) {
            return Err(CoreError::InvalidArgument(
                "bounding box latitude out of range".into(),
            ));
        }
        if !(-180.0..=180.0).contains(&self.west) || !(-180.0..=180.0).contains(&self.east) {
            return Err(CoreError::InvalidArgument(
                "bounding box longitude out of range".into(),
            ));
        }
        if self.south > self.north || self.west > self.east {
            return Err(CoreError::InvalidArgument(
                "bounding box corners are inverted".into(),
            ));
        }
        Ok(())
    }
}

/// Row shape for the parallel count query every listing runs
#[derive(Debug, sea_orm::FromQueryResult)]
pub(crate) struct TotalRow {
    pub total: i64,
}

/// Collection scope narrowing a listing to a slice of the entity table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// No scoping, the whole table
    All,
    /// Entities the given user has collected
    CollectedBy(i32),
    /// Entities authored by users the given user follows
    Followees(i32),
    /// Entities authored by the given user
    AuthoredBy(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PageRequest::new(0, 0).clamped(), (0, 10));
        assert_eq!(PageRequest::new(5, 50).clamped(), (5, 50));
        assert_eq!(PageRequest::new(0, 1000).clamped(), (0, 100));
    }

    #[test]
    fn order_values_parse_from_wire_strings() {
        assert_eq!(
            parse_order::<EngagementOrder>("collectCount").unwrap(),
            EngagementOrder::CollectCount
        );
        assert_eq!(
            parse_order::<EngagementOrder>("createTime").unwrap(),
            EngagementOrder::CreateTime
        );
        assert_eq!(
            parse_order::<UserOrder>("following").unwrap(),
            UserOrder::Following
        );
    }

    #[test]
    fn unknown_order_is_invalid_argument() {
        let err = parse_order::<EngagementOrder>("viewCount").unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn inverted_bounding_box_is_rejected() {
        assert!(BoundingBox::new(25.1, 121.5, 25.0, 121.6).is_err());
        assert!(BoundingBox::new(25.0, 121.6, 25.1, 121.5).is_err());
    }

    #[test]
    fn out_of_range_bounding_box_is_rejected() {
        assert!(BoundingBox::new(-91.0, 0.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 181.0).is_err());
    }

    #[test]
    fn valid_bounding_box_passes() {
        let bbox = BoundingBox::new(24.9, 121.4, 25.2, 121.7).unwrap();
        assert_eq!(bbox.south, 24.9);
        assert_eq!(bbox.east, 121.7);
    }
}
