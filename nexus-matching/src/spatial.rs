//! Privacy-preserving spatial index
//!
//! Coordinates are bucketed into H3 hexagonal cells. A cell id says "somewhere
//! in this hexagon" without revealing the exact point, so parties outside the
//! scoring boundary can do coarse proximity checks (same cell, neighboring
//! cells) on cell ids alone. The haversine distance in [`crate::geo`] stays
//! authoritative for ranking.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use h3o::{CellIndex, LatLng, Resolution};
use nexus_core::Location;
use tracing::debug;

use crate::error::{MatchError, MatchResult};

/// Default resolution: hexagons with ~0.46 km edges
pub const DEFAULT_RESOLUTION: u8 = 8;

/// Upper bound on neighbor rings, keeps disks bounded for huge radii
const MAX_RINGS: u32 = 64;

/// Hex encoded H3 cell identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(String);

impl CellId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn index(&self) -> MatchResult<CellIndex> {
        parse_cell(&self.0)
    }

    /// Resolution this cell was encoded at
    pub fn resolution(&self) -> MatchResult<u8> {
        Ok(u8::from(self.index()?.resolution()))
    }
}

impl From<CellIndex> for CellId {
    fn from(index: CellIndex) -> Self {
        CellId(index.to_string())
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CellId {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_cell(s).map(CellId::from)
    }
}

fn parse_cell(s: &str) -> MatchResult<CellIndex> {
    s.trim()
        .to_ascii_lowercase()
        .parse::<CellIndex>()
        .map_err(|_| MatchError::InvalidCellId(s.to_string()))
}

fn resolution(resolution: u8) -> MatchResult<Resolution> {
    Resolution::try_from(resolution).map_err(|_| MatchError::InvalidResolution(resolution))
}

/// Encode a coordinate into the cell containing it at `res`
///
/// Finer resolutions give smaller, more precise and less private cells.
pub fn encode(lat: f64, lon: f64, res: u8) -> MatchResult<CellId> {
    let res = resolution(res)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(MatchError::InvalidCoordinate { lat, lon });
    }
    let point = LatLng::new(lat, lon).map_err(|_| MatchError::InvalidCoordinate { lat, lon })?;
    Ok(point.to_cell(res).into())
}

/// Center of a cell as (lat, lon) degrees
pub fn decode(cell: &CellId) -> MatchResult<(f64, f64)> {
    let center = LatLng::from(cell.index()?);
    Ok((center.lat(), center.lng()))
}

/// Fill `location.cell` from its exact coordinates
pub fn attach_cell(location: &mut Location, res: u8) -> MatchResult<()> {
    let cell = encode(location.latitude, location.longitude, res)?;
    location.cell = Some(cell.to_string());
    Ok(())
}

/// Distance between the centers of two adjacent cells at `res`, in km
fn center_spacing_km(res: Resolution) -> f64 {
    res.edge_length_km() * 3f64.sqrt()
}

/// The origin cell plus the rings of neighbors covering `radius_km`
///
/// The ring count is derived from the cell's own resolution, so the same
/// radius yields more rings for finer cells. The origin is always included.
pub fn cells_within_radius(cell_id: &str, radius_km: f64) -> MatchResult<BTreeSet<CellId>> {
    let origin = parse_cell(cell_id)?;

    let radius_km = if radius_km.is_finite() { radius_km.max(0.0) } else { 0.0 };
    let rings = ((radius_km / center_spacing_km(origin.resolution())).ceil() as u32).min(MAX_RINGS);

    let cells: BTreeSet<CellId> = origin
        .grid_disk::<Vec<_>>(rings)
        .into_iter()
        .map(CellId::from)
        .chain(std::iter::once(CellId::from(origin)))
        .collect();

    debug!(
        "cells_within_radius: origin={}, radius_km={}, rings={}, cells={}",
        origin,
        radius_km,
        rings,
        cells.len()
    );

    Ok(cells)
}

/// Coarse proximity check on cell ids alone
pub fn is_nearby(a: &str, b: &str, radius_km: f64) -> MatchResult<bool> {
    let target = CellId::from_str(b)?;
    Ok(cells_within_radius(a, radius_km)?.contains(&target))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BERLIN: (f64, f64) = (52.5200, 13.4050);

    #[test]
    fn test_encode_is_stable() {
        let a = encode(BERLIN.0, BERLIN.1, DEFAULT_RESOLUTION).unwrap();
        let b = encode(BERLIN.0, BERLIN.1, DEFAULT_RESOLUTION).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.resolution().unwrap(), DEFAULT_RESOLUTION);
    }

    #[test]
    fn test_decode_then_encode_round_trips() {
        for res in [5u8, 8, 10] {
            let cell = encode(BERLIN.0, BERLIN.1, res).unwrap();
            let (lat, lon) = decode(&cell).unwrap();
            assert_eq!(encode(lat, lon, res).unwrap(), cell);
        }
    }

    #[test]
    fn test_coarser_resolution_hides_more() {
        let near = (BERLIN.0 + 0.001, BERLIN.1 + 0.001);
        let coarse_a = encode(BERLIN.0, BERLIN.1, 4).unwrap();
        let coarse_b = encode(near.0, near.1, 4).unwrap();
        assert_eq!(coarse_a, coarse_b);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            encode(BERLIN.0, BERLIN.1, 16),
            Err(MatchError::InvalidResolution(16))
        ));
        assert!(matches!(
            encode(f64::NAN, 0.0, 8),
            Err(MatchError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            encode(91.0, 0.0, 8),
            Err(MatchError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            cells_within_radius("not-a-cell", 1.0),
            Err(MatchError::InvalidCellId(_))
        ));
        assert!(matches!(
            cells_within_radius("", 1.0),
            Err(MatchError::InvalidCellId(_))
        ));
    }

    #[test]
    fn test_radius_always_includes_origin() {
        let cell = encode(BERLIN.0, BERLIN.1, DEFAULT_RESOLUTION).unwrap();
        for radius in [0.0, 0.1, 1.0, 5.0, -3.0, f64::NAN] {
            let cells = cells_within_radius(cell.as_str(), radius).unwrap();
            assert!(cells.contains(&cell), "radius {} lost the origin", radius);
        }
        assert_eq!(cells_within_radius(cell.as_str(), 0.0).unwrap().len(), 1);
    }

    #[test]
    fn test_radius_grows_with_rings() {
        let cell = encode(BERLIN.0, BERLIN.1, DEFAULT_RESOLUTION).unwrap();
        let one_ring = cells_within_radius(cell.as_str(), 0.5).unwrap();
        let wider = cells_within_radius(cell.as_str(), 3.0).unwrap();
        assert_eq!(one_ring.len(), 7);
        assert!(wider.len() > one_ring.len());
        assert!(one_ring.is_subset(&wider));
    }

    #[test]
    fn test_is_nearby() {
        let home = encode(BERLIN.0, BERLIN.1, DEFAULT_RESOLUTION).unwrap();
        let close = encode(BERLIN.0 + 0.005, BERLIN.1, DEFAULT_RESOLUTION).unwrap();
        let far = encode(48.1351, 11.5820, DEFAULT_RESOLUTION).unwrap();

        assert!(is_nearby(home.as_str(), close.as_str(), 2.0).unwrap());
        assert!(!is_nearby(home.as_str(), far.as_str(), 2.0).unwrap());
    }

    #[test]
    fn test_attach_cell() {
        let mut location = Location::new(BERLIN.0, BERLIN.1);
        attach_cell(&mut location, DEFAULT_RESOLUTION).unwrap();
        let expected = encode(BERLIN.0, BERLIN.1, DEFAULT_RESOLUTION).unwrap();
        assert_eq!(location.cell.as_deref(), Some(expected.as_str()));
    }
}
